//! Ollama embedding provider
//!
//! The `/api/embeddings` endpoint takes one prompt per request, so chunks are
//! embedded one call at a time. The configured batch size only controls how
//! calls are grouped for failure substitution and progress logging.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::monitor::PerformanceMonitor;
use crate::provider::{embed_in_batches, EmbeddingBatch, EmbeddingProvider, EmbeddingVector};
use crate::retry::{execute_with_retry, RetryPolicy, TracingRetryObserver};

/// Dimension assumed for models missing from [`MODEL_DIMENSIONS`]
pub const FALLBACK_DIMENSIONS: usize = 768;

/// Pulls can download gigabytes; they get their own timeout
const PULL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Known local embedding models and their vector sizes
pub const MODEL_DIMENSIONS: &[(&str, usize)] = &[
    ("nomic-embed-text", 768),
    ("mxbai-embed-large", 1024),
    ("all-minilm", 384),
    ("snowflake-arctic-embed", 1024),
    ("bge-m3", 1024),
    ("bge-large", 1024),
];

/// Look up `model`, retrying without a `:tag` suffix
pub fn model_dimensions(model: &str) -> Option<usize> {
    let lookup = |name: &str| {
        MODEL_DIMENSIONS
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, dims)| *dims)
    };

    lookup(model).or_else(|| {
        model
            .split_once(':')
            .and_then(|(base, _tag)| lookup(base))
    })
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

/// A model installed on the Ollama server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

/// Provider backed by a local or remote Ollama server
pub struct OllamaProvider {
    client: Client,
    endpoint: String,
    model: String,
    name: String,
    dimensions: usize,
    dimensions_fallback: bool,
    batch_size: usize,
    timeout_secs: u64,
    retry: RetryPolicy,
    observer: TracingRetryObserver,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("batch_size", &self.batch_size)
            .field("monitored", &self.monitor.is_some())
            .finish()
    }
}

impl OllamaProvider {
    /// Build a provider. No network call is made.
    pub fn new(config: EmbeddingConfig) -> EmbeddingResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EmbeddingError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let model = config.model_name().to_string();
        let name = format!("{}:{}", config.provider, model);

        let (dimensions, dimensions_fallback) = match model_dimensions(&model) {
            Some(dims) => (dims, false),
            None => {
                warn!(
                    provider = %name,
                    fallback = FALLBACK_DIMENSIONS,
                    "Unknown Ollama model, assuming default embedding dimensions"
                );
                (FALLBACK_DIMENSIONS, true)
            }
        };

        let monitor = config
            .enable_monitoring
            .then(|| Arc::new(PerformanceMonitor::new(name.clone())));

        Ok(Self {
            client,
            endpoint: config.endpoint_url().to_string(),
            observer: TracingRetryObserver::new(name.clone()),
            model,
            name,
            dimensions,
            dimensions_fallback,
            batch_size: config.batch_size(),
            timeout_secs: config.timeout_secs,
            retry: config.retry_policy(),
            monitor,
        })
    }

    /// Attach a (possibly shared) monitor
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Stop recording metrics
    pub fn without_monitor(mut self) -> Self {
        self.monitor = None;
        self
    }

    pub fn monitor(&self) -> Option<&Arc<PerformanceMonitor>> {
        self.monitor.as_ref()
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// True when [`dimensions`](EmbeddingProvider::dimensions) is the
    /// fallback for an unrecognized model
    pub fn dimensions_are_fallback(&self) -> bool {
        self.dimensions_fallback
    }

    /// Models installed on the server
    pub async fn list_models(&self) -> EmbeddingResult<Vec<OllamaModel>> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(status, response, None).await);
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            EmbeddingError::InvalidResponse(format!("Failed to parse Ollama model list: {}", e))
        })?;

        Ok(tags.models)
    }

    /// Ask the server to download `model`, or the configured model when
    /// `None`. Blocks until the pull finishes; no progress is reported.
    pub async fn pull_model(&self, model: Option<&str>) -> EmbeddingResult<()> {
        let name = model.unwrap_or(&self.model);
        let url = format!("{}/api/pull", self.endpoint);

        info!(provider = %self.name, model = name, "Pulling Ollama model");

        let response = self
            .client
            .post(&url)
            .timeout(PULL_TIMEOUT)
            .json(&PullRequest { name, stream: false })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(status, response, Some(name)).await);
        }

        let body: PullResponse = response.json().await.map_err(|e| {
            EmbeddingError::InvalidResponse(format!("Failed to parse Ollama pull response: {}", e))
        })?;

        if let Some(error) = body.error {
            return Err(EmbeddingError::Other(format!("Pull of '{}' failed: {}", name, error)));
        }
        if body.status != "success" {
            return Err(EmbeddingError::Other(format!(
                "Pull of '{}' ended with status '{}'",
                name, body.status
            )));
        }

        info!(provider = %self.name, model = name, "Model pulled");
        Ok(())
    }

    async fn embed_single(&self, text: &str) -> EmbeddingResult<EmbeddingVector> {
        let url = format!("{}/api/embeddings", self.endpoint);

        debug!(provider = %self.name, chars = text.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(status, response, Some(&self.model)).await);
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            EmbeddingError::InvalidResponse(format!("Failed to parse Ollama response: {}", e))
        })?;

        if body.embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "Ollama returned an empty embedding".to_string(),
            ));
        }

        Ok(body.embedding)
    }

    async fn embed_with_retry(&self, text: &str) -> EmbeddingResult<EmbeddingVector> {
        let started = Instant::now();
        let result = execute_with_retry(&self.retry, &self.observer, || self.embed_single(text)).await;

        if let Some(monitor) = &self.monitor {
            match &result {
                Ok(_) => monitor.record_success(started.elapsed(), None),
                Err(e) => monitor.record_failure(started.elapsed(), &e.to_string()),
            }
        }

        result
    }

    fn transport_error(&self, err: reqwest::Error) -> EmbeddingError {
        if err.is_connect() {
            EmbeddingError::ServiceUnavailable {
                endpoint: self.endpoint.clone(),
                message: err.to_string(),
            }
        } else {
            EmbeddingError::from_transport(err, &self.endpoint, self.timeout_secs)
        }
    }

    /// `model` is the model the request was about; a 404 is only read as a
    /// missing model when there is one.
    async fn status_error(
        &self,
        status: StatusCode,
        response: reqwest::Response,
        model: Option<&str>,
    ) -> EmbeddingError {
        let body = response.text().await.unwrap_or_default();

        if let (StatusCode::NOT_FOUND, Some(model)) = (status, model) {
            return EmbeddingError::ModelNotFound {
                model: model.to_string(),
                hint: format!("Run `ollama pull {}` to download it.", model),
            };
        }

        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);

        EmbeddingError::Http {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn generate_embeddings_detailed(&self, chunks: &[String]) -> EmbeddingResult<EmbeddingBatch> {
        let batch = embed_in_batches(&self.name, chunks, self.batch_size, self.dimensions, |batch| async move {
            let mut vectors = Vec::with_capacity(batch.len());
            for text in batch {
                vectors.push(self.embed_with_retry(text).await?);
            }
            Ok::<_, EmbeddingError>(vectors)
        })
        .await;

        Ok(batch)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        let models = match self.list_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!(provider = %self.name, "Ollama is not available: {}", e);
                return false;
            }
        };

        let installed = models.iter().any(|m| {
            m.name == self.model || m.name.split_once(':').is_some_and(|(base, _)| base == self.model)
        });

        if !installed {
            warn!(
                provider = %self.name,
                "Ollama is running but model '{}' is not installed. Run `ollama pull {}`.",
                self.model,
                self.model
            );
        }

        installed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmbeddingConfig {
        EmbeddingConfig::ollama(Some("http://localhost:11434".to_string()), None)
    }

    #[test]
    fn test_dimension_table() {
        assert_eq!(model_dimensions("nomic-embed-text"), Some(768));
        assert_eq!(model_dimensions("mxbai-embed-large"), Some(1024));
        assert_eq!(model_dimensions("all-minilm"), Some(384));
        assert_eq!(model_dimensions("nomic-embed-text:latest"), Some(768));
        assert_eq!(model_dimensions("all-minilm:l6-v2"), Some(384));
        assert_eq!(model_dimensions("some-new-model"), None);
    }

    #[test]
    fn test_provider_creation() {
        let provider = OllamaProvider::new(config()).unwrap();
        assert_eq!(provider.provider_name(), "ollama:nomic-embed-text");
        assert_eq!(provider.dimensions(), 768);
        assert!(!provider.dimensions_are_fallback());
        assert_eq!(provider.batch_size(), 10);
        assert!(provider.monitor().is_some());
    }

    #[test]
    fn test_unknown_model_uses_fallback() {
        let provider = OllamaProvider::new(config().with_model("my-custom-embedder")).unwrap();
        assert_eq!(provider.dimensions(), FALLBACK_DIMENSIONS);
        assert!(provider.dimensions_are_fallback());
    }

    #[test]
    fn test_monitor_builders() {
        let provider = OllamaProvider::new(config().with_monitoring(false)).unwrap();
        assert!(provider.monitor().is_none());

        let shared = Arc::new(PerformanceMonitor::new("shared"));
        let provider = provider.with_monitor(shared.clone());
        assert!(Arc::ptr_eq(provider.monitor().unwrap(), &shared));
        assert!(provider.without_monitor().monitor().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(OllamaProvider::new(config().with_timeout_secs(0)).is_err());
    }

    #[test]
    fn test_request_serialization() {
        let json = serde_json::to_value(EmbeddingRequest {
            model: "nomic-embed-text",
            prompt: "fn main() {}",
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"model": "nomic-embed-text", "prompt": "fn main() {}"}));
    }

    #[tokio::test]
    async fn test_empty_input_needs_no_server() {
        // Nothing listens on the discard port; an empty call must not touch it.
        let provider = OllamaProvider::new(EmbeddingConfig::ollama(
            Some("http://127.0.0.1:9".to_string()),
            None,
        ))
        .unwrap();

        let vectors = provider.generate_embeddings(&[]).await.unwrap();
        assert!(vectors.is_empty());
        assert_eq!(provider.monitor().unwrap().metrics().total_requests, 0);
    }
}
