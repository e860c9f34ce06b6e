//! Configuration for embedding providers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::retry::RetryPolicy;

/// Supported embedding backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local Ollama model server
    Ollama,
    /// OpenAI embeddings API
    #[serde(rename = "openai")]
    OpenAI,
}

impl ProviderKind {
    /// Every recognized provider kind
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Ollama, ProviderKind::OpenAI];

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAI => "openai",
        }
    }

    /// Model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "nomic-embed-text",
            ProviderKind::OpenAI => "text-embedding-3-small",
        }
    }

    /// Endpoint used when none is configured
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::OpenAI => "https://api.openai.com/v1",
        }
    }

    /// Chunks per batch when none is configured. The cloud API takes a whole
    /// batch per request, so its default is ten times larger.
    pub fn default_batch_size(&self) -> usize {
        match self {
            ProviderKind::Ollama => 10,
            ProviderKind::OpenAI => 100,
        }
    }

    /// Whether construction must fail without a credential
    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderKind::OpenAI)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = EmbeddingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| EmbeddingError::UnsupportedProvider {
                requested: s.to_string(),
                supported: ProviderKind::ALL
                    .iter()
                    .map(|k| k.as_str().to_string())
                    .collect(),
            })
    }
}

/// Immutable settings for one provider instance
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend kind
    pub provider: ProviderKind,
    /// Model identifier; the kind's default applies when absent
    pub model: Option<String>,
    /// Credential for cloud backends
    pub api_key: Option<String>,
    /// Endpoint override
    pub endpoint: Option<String>,
    /// Chunks per batch; the kind's default applies when absent
    pub max_batch_size: Option<usize>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    pub initial_retry_delay_ms: u64,
    /// Growth factor for each further retry delay
    pub backoff_multiplier: f64,
    /// Attach a performance monitor on construction
    pub enable_monitoring: bool,
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("max_batch_size", &self.max_batch_size)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("initial_retry_delay_ms", &self.initial_retry_delay_ms)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("enable_monitoring", &self.enable_monitoring)
            .finish()
    }
}

impl EmbeddingConfig {
    /// Defaults for `provider`
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            model: None,
            api_key: None,
            endpoint: None,
            max_batch_size: None,
            timeout_secs: 30,
            max_retries: 3,
            initial_retry_delay_ms: 1000,
            backoff_multiplier: 2.0,
            enable_monitoring: true,
        }
    }

    /// Configuration for a local Ollama server
    pub fn ollama(endpoint: Option<String>, model: Option<String>) -> Self {
        Self {
            endpoint,
            model,
            ..Self::new(ProviderKind::Ollama)
        }
    }

    /// Configuration for the OpenAI API
    pub fn openai(api_key: impl Into<String>, model: Option<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            model,
            ..Self::new(ProviderKind::OpenAI)
        }
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the credential
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    /// Set retry count, initial delay and multiplier
    pub fn with_retry(mut self, max_retries: u32, initial_delay_ms: u64, multiplier: f64) -> Self {
        self.max_retries = max_retries;
        self.initial_retry_delay_ms = initial_delay_ms;
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Enable or disable the performance monitor
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.enable_monitoring = enabled;
        self
    }

    /// Effective model identifier
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Effective endpoint without a trailing slash
    pub fn endpoint_url(&self) -> &str {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| self.provider.default_endpoint())
            .trim_end_matches('/')
    }

    /// Effective batch size
    pub fn batch_size(&self) -> usize {
        self.max_batch_size
            .unwrap_or_else(|| self.provider.default_batch_size())
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy derived from these settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_retry_delay_ms),
            self.backoff_multiplier,
        )
    }

    /// Non-empty credential, if any
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Validate configuration
    pub fn validate(&self) -> EmbeddingResult<()> {
        if self.provider.requires_api_key() && self.credential().is_none() {
            return Err(EmbeddingError::MissingCredential {
                provider: self.provider.as_str().to_string(),
                env_var: codectx_config::credentials::env_var_for_provider(self.provider.as_str())
                    .unwrap_or("API key")
                    .to_string(),
            });
        }

        if self.max_batch_size == Some(0) {
            return Err(EmbeddingError::Config(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(EmbeddingError::Config(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(EmbeddingError::Config(format!(
                "Backoff multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }

        let endpoint = self.endpoint_url();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(EmbeddingError::Config(format!(
                "Endpoint must be an http(s) URL, got '{}'",
                endpoint
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!(" OpenAI ".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);

        let err = "cohere".parse::<ProviderKind>().unwrap_err();
        match err {
            EmbeddingError::UnsupportedProvider { requested, supported } => {
                assert_eq!(requested, "cohere");
                assert_eq!(supported, vec!["ollama", "openai"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_provider_kind_defaults() {
        assert_eq!(ProviderKind::Ollama.default_model(), "nomic-embed-text");
        assert_eq!(ProviderKind::OpenAI.default_model(), "text-embedding-3-small");
        assert_eq!(
            ProviderKind::OpenAI.default_batch_size(),
            ProviderKind::Ollama.default_batch_size() * 10
        );
        assert!(ProviderKind::OpenAI.requires_api_key());
        assert!(!ProviderKind::Ollama.requires_api_key());
    }

    #[test]
    fn test_effective_values() {
        let config = EmbeddingConfig::ollama(Some("http://gpu:11434/".into()), None);
        assert_eq!(config.model_name(), "nomic-embed-text");
        assert_eq!(config.endpoint_url(), "http://gpu:11434");
        assert_eq!(config.batch_size(), 10);

        let config = EmbeddingConfig::openai("sk-test", Some("text-embedding-3-large".into()))
            .with_batch_size(16);
        assert_eq!(config.model_name(), "text-embedding-3-large");
        assert_eq!(config.endpoint_url(), "https://api.openai.com/v1");
        assert_eq!(config.batch_size(), 16);
    }

    #[test]
    fn test_validate_requires_credential() {
        let mut config = EmbeddingConfig::new(ProviderKind::OpenAI);
        assert!(matches!(
            config.validate(),
            Err(EmbeddingError::MissingCredential { .. })
        ));

        config.api_key = Some("   ".into());
        assert!(config.validate().is_err());

        config.api_key = Some("sk-test".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_ranges() {
        let ok = EmbeddingConfig::ollama(None, None);
        assert!(ok.validate().is_ok());

        assert!(ok.clone().with_batch_size(0).validate().is_err());
        assert!(ok.clone().with_timeout_secs(0).validate().is_err());
        assert!(ok.clone().with_retry(3, 10, 0.5).validate().is_err());
        assert!(ok.clone().with_endpoint("localhost:11434").validate().is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = EmbeddingConfig::openai("sk-very-secret", None);
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
    }
}
