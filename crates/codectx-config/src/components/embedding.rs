//! Embedding configuration section with sensible defaults
//!
//! Provider-specific settings live in their own sub-tables so that switching
//! `provider` does not lose the other backend's settings:
//!
//! ```toml
//! [embedding]
//! provider = "openai"
//!
//! [embedding.ollama]
//! model = "mxbai-embed-large"
//!
//! [embedding.openai]
//! model = "text-embedding-3-large"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// `[embedding]` section of the application config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    /// Provider kind (`ollama`, `openai`). Kept as a string so that unknown
    /// values reach the provider factory, which reports the supported list.
    pub provider: String,
    /// Batch size override; each provider has its own default when absent
    pub batch_size: Option<usize>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Retry attempts after the first failure
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    pub initial_retry_delay_ms: u64,
    /// Growth factor applied to the delay on each further retry
    pub backoff_multiplier: f64,
    /// Attach a performance monitor to the constructed provider
    pub enable_monitoring: bool,
    /// Local model server settings
    pub ollama: OllamaSection,
    /// Cloud API settings
    pub openai: OpenAISection,
}

/// `[embedding.ollama]` sub-table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSection {
    /// Base URL of the Ollama server
    pub url: Option<String>,
    /// Embedding model to request
    pub model: Option<String>,
}

/// `[embedding.openai]` sub-table
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAISection {
    /// API key. `OPENAI_API_KEY` takes precedence, see [`crate::resolve_api_key`].
    pub api_key: Option<String>,
    /// Embedding model to request
    pub model: Option<String>,
    /// API base URL (for proxies and compatible gateways)
    pub base_url: Option<String>,
}

// Keep the key out of debug logs.
impl std::fmt::Debug for OpenAISection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAISection")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            batch_size: None,
            timeout_secs: 30,
            max_retries: 3,
            initial_retry_delay_ms: 1000,
            backoff_multiplier: 2.0,
            enable_monitoring: true,
            ollama: OllamaSection::default(),
            openai: OpenAISection::default(),
        }
    }
}

impl EmbeddingSection {
    /// Normalized provider name (trimmed, lowercase)
    pub fn provider_name(&self) -> String {
        self.provider.trim().to_ascii_lowercase()
    }

    /// Model configured for the active provider, if any
    pub fn active_model(&self) -> Option<&str> {
        match self.provider_name().as_str() {
            "ollama" => self.ollama.model.as_deref(),
            "openai" => self.openai.model.as_deref(),
            _ => None,
        }
    }

    /// Check numeric ranges. Provider names are validated by the factory.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch_size == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "embedding.batch_size".to_string(),
                value: "must be greater than 0".to_string(),
            });
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.timeout_secs".to_string(),
                value: "must be greater than 0".to_string(),
            });
        }

        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.backoff_multiplier".to_string(),
                value: format!("{} (must be at least 1.0)", self.backoff_multiplier),
            });
        }

        Ok(())
    }
}
