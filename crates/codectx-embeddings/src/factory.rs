//! Provider construction from configuration
//!
//! [`create_provider`] matches on [`ProviderKind`] and returns an
//! [`EmbeddingBackend`], a closed enum over the concrete providers. Adding a
//! provider kind makes every match here fail to compile until it is handled.

use async_trait::async_trait;
use codectx_config::{resolve_api_key, AppConfig};
use std::sync::Arc;
use tracing::info;

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::error::EmbeddingResult;
use crate::monitor::PerformanceMonitor;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAIProvider;
use crate::provider::{EmbeddingBatch, EmbeddingProvider, EmbeddingVector};

/// Any concrete provider
#[derive(Debug)]
pub enum EmbeddingBackend {
    Ollama(OllamaProvider),
    OpenAI(OpenAIProvider),
}

impl EmbeddingBackend {
    pub fn kind(&self) -> ProviderKind {
        match self {
            EmbeddingBackend::Ollama(_) => ProviderKind::Ollama,
            EmbeddingBackend::OpenAI(_) => ProviderKind::OpenAI,
        }
    }

    pub fn monitor(&self) -> Option<&Arc<PerformanceMonitor>> {
        match self {
            EmbeddingBackend::Ollama(p) => p.monitor(),
            EmbeddingBackend::OpenAI(p) => p.monitor(),
        }
    }

    /// The Ollama provider, for model listing and pulls
    pub fn as_ollama(&self) -> Option<&OllamaProvider> {
        match self {
            EmbeddingBackend::Ollama(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_openai(&self) -> Option<&OpenAIProvider> {
        match self {
            EmbeddingBackend::OpenAI(p) => Some(p),
            _ => None,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingBackend {
    async fn generate_embeddings(&self, chunks: &[String]) -> EmbeddingResult<Vec<EmbeddingVector>> {
        match self {
            EmbeddingBackend::Ollama(p) => p.generate_embeddings(chunks).await,
            EmbeddingBackend::OpenAI(p) => p.generate_embeddings(chunks).await,
        }
    }

    async fn generate_embeddings_detailed(&self, chunks: &[String]) -> EmbeddingResult<EmbeddingBatch> {
        match self {
            EmbeddingBackend::Ollama(p) => p.generate_embeddings_detailed(chunks).await,
            EmbeddingBackend::OpenAI(p) => p.generate_embeddings_detailed(chunks).await,
        }
    }

    fn dimensions(&self) -> usize {
        match self {
            EmbeddingBackend::Ollama(p) => p.dimensions(),
            EmbeddingBackend::OpenAI(p) => p.dimensions(),
        }
    }

    fn provider_name(&self) -> &str {
        match self {
            EmbeddingBackend::Ollama(p) => p.provider_name(),
            EmbeddingBackend::OpenAI(p) => p.provider_name(),
        }
    }

    async fn is_available(&self) -> bool {
        match self {
            EmbeddingBackend::Ollama(p) => p.is_available().await,
            EmbeddingBackend::OpenAI(p) => p.is_available().await,
        }
    }
}

/// Construct the provider `config.provider` names
pub fn create_provider(config: EmbeddingConfig) -> EmbeddingResult<EmbeddingBackend> {
    let backend = match config.provider {
        ProviderKind::Ollama => EmbeddingBackend::Ollama(OllamaProvider::new(config)?),
        ProviderKind::OpenAI => EmbeddingBackend::OpenAI(OpenAIProvider::new(config)?),
    };

    info!(provider = backend.provider_name(), dimensions = backend.dimensions(), "Created embedding provider");
    Ok(backend)
}

/// Translate the `[embedding]` section into an [`EmbeddingConfig`].
///
/// Unknown provider names fail with the list of supported kinds. The API key
/// is taken from the environment first, then the file.
pub fn embedding_config_from_app(app: &AppConfig) -> EmbeddingResult<EmbeddingConfig> {
    let section = &app.embedding;
    section.validate()?;

    let provider: ProviderKind = section.provider.parse()?;

    let (endpoint, api_key) = match provider {
        ProviderKind::Ollama => (section.ollama.url.clone(), None),
        ProviderKind::OpenAI => (
            section.openai.base_url.clone(),
            resolve_api_key(provider.as_str(), section.openai.api_key.as_deref()),
        ),
    };

    Ok(EmbeddingConfig {
        provider,
        model: section.active_model().map(str::to_string),
        api_key,
        endpoint,
        max_batch_size: section.batch_size,
        timeout_secs: section.timeout_secs,
        max_retries: section.max_retries,
        initial_retry_delay_ms: section.initial_retry_delay_ms,
        backoff_multiplier: section.backoff_multiplier,
        enable_monitoring: section.enable_monitoring,
    })
}

/// Build the provider described by the application configuration
pub fn create_provider_from_app_config(app: &AppConfig) -> EmbeddingResult<EmbeddingBackend> {
    create_provider(embedding_config_from_app(app)?)
}

/// Names of every recognized provider kind
pub fn supported_providers() -> Vec<&'static str> {
    ProviderKind::ALL.iter().map(ProviderKind::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use serial_test::serial;

    #[test]
    fn test_supported_providers() {
        assert_eq!(supported_providers(), vec!["ollama", "openai"]);
    }

    #[test]
    fn test_dispatch_on_kind() {
        let backend = create_provider(EmbeddingConfig::ollama(None, None)).unwrap();
        assert_eq!(backend.kind(), ProviderKind::Ollama);
        assert!(backend.as_ollama().is_some());

        let backend = create_provider(EmbeddingConfig::openai("x", None)).unwrap();
        assert_eq!(backend.kind(), ProviderKind::OpenAI);
        assert_eq!(backend.dimensions(), 1536);
        assert!(backend.as_openai().is_some());
        assert!(backend.monitor().is_some());
    }

    #[test]
    fn test_construction_errors_propagate() {
        let err = create_provider(EmbeddingConfig::new(ProviderKind::OpenAI)).unwrap_err();
        assert!(matches!(err, EmbeddingError::MissingCredential { .. }));
    }

    #[test]
    #[serial]
    fn test_app_config_translation() {
        std::env::remove_var("OPENAI_API_KEY");

        let mut app = AppConfig::default();
        app.embedding.provider = "openai".into();
        app.embedding.batch_size = Some(25);
        app.embedding.max_retries = 1;
        app.embedding.openai.api_key = Some("sk-file".into());
        app.embedding.openai.model = Some("text-embedding-3-large".into());
        app.embedding.openai.base_url = Some("https://gateway.example/v1".into());
        app.embedding.ollama.url = Some("http://ignored:11434".into());

        let config = embedding_config_from_app(&app).unwrap();
        assert_eq!(config.provider, ProviderKind::OpenAI);
        assert_eq!(config.model_name(), "text-embedding-3-large");
        assert_eq!(config.credential(), Some("sk-file"));
        assert_eq!(config.endpoint_url(), "https://gateway.example/v1");
        assert_eq!(config.batch_size(), 25);
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    #[serial]
    fn test_app_config_env_key_wins() {
        std::env::set_var("OPENAI_API_KEY", "sk-env");
        let mut app = AppConfig::default();
        app.embedding.provider = "openai".into();
        app.embedding.openai.api_key = Some("sk-file".into());

        let config = embedding_config_from_app(&app);
        std::env::remove_var("OPENAI_API_KEY");

        assert_eq!(config.unwrap().credential(), Some("sk-env"));
    }

    #[test]
    fn test_unknown_provider_names_supported_list() {
        let mut app = AppConfig::default();
        app.embedding.provider = "unknown".into();

        let err = create_provider_from_app_config(&app).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown"));
        assert!(msg.contains("ollama"));
        assert!(msg.contains("openai"));
    }

    #[test]
    fn test_default_app_config_builds_ollama() {
        let backend = create_provider_from_app_config(&AppConfig::default()).unwrap();
        assert_eq!(backend.provider_name(), "ollama:nomic-embed-text");
    }
}
