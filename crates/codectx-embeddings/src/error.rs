//! Error types for embedding operations

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while constructing or calling an embedding provider
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Invalid provider configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A provider that needs a credential was built without one
    #[error("{provider} requires an API key (set {env_var} or embedding.{provider}.api_key)")]
    MissingCredential {
        /// Provider kind
        provider: String,
        /// Environment variable that would supply the key
        env_var: String,
    },

    /// Provider kind is not recognized
    #[error("Unsupported embedding provider '{requested}'. Supported providers: {}", supported.join(", "))]
    UnsupportedProvider {
        /// Value that was requested
        requested: String,
        /// Every recognized provider kind
        supported: Vec<String>,
    },

    /// The backend could not be reached at all
    #[error("Cannot connect to {endpoint}: {message}. Is the Ollama service running? Start it with `ollama serve`.")]
    ServiceUnavailable {
        /// Endpoint that refused the connection
        endpoint: String,
        /// Underlying connection error
        message: String,
    },

    /// The model is unknown to the backend
    #[error("Model '{model}' not found. {hint}")]
    ModelNotFound {
        /// Model identifier
        model: String,
        /// What to do about it
        hint: String,
    },

    /// Credential rejected by the backend
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Backend throttled the request
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        /// Seconds the backend asked us to wait, if it said
        retry_after_secs: Option<u64>,
        /// Backend message
        message: String,
    },

    /// Backend rejected the request as malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 5xx response
    #[error("Server error (HTTP {status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Backend message
        message: String,
    },

    /// Any other non-success status
    #[error("Backend returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Backend message
        message: String,
    },

    /// Request exceeded the configured timeout
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Transport-level failure (connection reset, DNS, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not match the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Backend returned a vector of the wrong length
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension declared by the provider
        expected: usize,
        /// Dimension actually returned
        actual: usize,
    },

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// Result type for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

impl EmbeddingError {
    /// Whether retrying the same request could succeed.
    ///
    /// Rate limits, 5xx responses, timeouts and transport failures are
    /// retryable. Credential problems and other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::RateLimited { .. }
            | EmbeddingError::Server { .. }
            | EmbeddingError::Timeout(_)
            | EmbeddingError::Network(_)
            | EmbeddingError::ServiceUnavailable { .. } => true,
            EmbeddingError::Http { status, .. } => *status >= 500 || *status == 429,
            EmbeddingError::Other(message) => message_indicates_transient(message),
            _ => false,
        }
    }

    /// Wait requested by the backend, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            EmbeddingError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Map a transport error from reqwest
    pub(crate) fn from_transport(err: reqwest::Error, endpoint: &str, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            EmbeddingError::Timeout(timeout_secs)
        } else if err.is_connect() {
            EmbeddingError::Network(format!("cannot connect to {}: {}", endpoint, err))
        } else if err.is_decode() {
            EmbeddingError::InvalidResponse(err.to_string())
        } else {
            EmbeddingError::Network(err.to_string())
        }
    }
}

fn message_indicates_transient(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["timeout", "timed out", "network", "connection reset", "econnreset"]
        .iter()
        .any(|needle| lower.contains(needle))
}

impl From<codectx_config::ConfigError> for EmbeddingError {
    fn from(err: codectx_config::ConfigError) -> Self {
        EmbeddingError::Config(err.to_string())
    }
}
