//! OpenAI embedding provider
//!
//! A whole batch goes out in one request and the API answers in input order.
//! Token helpers at the bottom of this module are character-count
//! approximations; they do not run the real tokenizer.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::monitor::PerformanceMonitor;
use crate::provider::{embed_in_batches, EmbeddingBatch, EmbeddingProvider, EmbeddingVector};
use crate::retry::{execute_with_retry, RetryPolicy, TracingRetryObserver};

/// Dimension assumed for models missing from [`MODEL_DIMENSIONS`]
pub const FALLBACK_DIMENSIONS: usize = 1536;

/// Input limit of the current embedding models
pub const MAX_INPUT_TOKENS: usize = 8191;

/// Appended by [`truncate_to_token_limit`]
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Rough characters-per-token ratio for English text and code
const CHARS_PER_TOKEN: usize = 4;

/// Known OpenAI embedding models and their vector sizes
pub const MODEL_DIMENSIONS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// Look up the vector size of `model`
pub fn model_dimensions(model: &str) -> Option<usize> {
    MODEL_DIMENSIONS
        .iter()
        .find(|(known, _)| *known == model)
        .map(|(_, dims)| *dims)
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Compatible gateways often report only one of the two counts
#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

impl Usage {
    fn tokens(&self) -> Option<u64> {
        self.prompt_tokens.or(self.total_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Provider backed by the OpenAI embeddings API
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    name: String,
    dimensions: usize,
    batch_size: usize,
    timeout_secs: u64,
    retry: RetryPolicy,
    observer: TracingRetryObserver,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl std::fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("batch_size", &self.batch_size)
            .field("monitored", &self.monitor.is_some())
            .finish_non_exhaustive()
    }
}

impl OpenAIProvider {
    /// Build a provider. Fails before any network call when no API key is set.
    pub fn new(config: EmbeddingConfig) -> EmbeddingResult<Self> {
        config.validate()?;

        let api_key = config
            .credential()
            .ok_or_else(|| EmbeddingError::MissingCredential {
                provider: config.provider.as_str().to_string(),
                env_var: "OPENAI_API_KEY".to_string(),
            })?
            .to_string();

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EmbeddingError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let model = config.model_name().to_string();
        let name = format!("{}:{}", config.provider, model);

        let dimensions = model_dimensions(&model).unwrap_or_else(|| {
            warn!(
                provider = %name,
                fallback = FALLBACK_DIMENSIONS,
                "Unknown OpenAI model, assuming default embedding dimensions"
            );
            FALLBACK_DIMENSIONS
        });

        let monitor = config
            .enable_monitoring
            .then(|| Arc::new(PerformanceMonitor::new(name.clone())));

        Ok(Self {
            client,
            api_key,
            endpoint: config.endpoint_url().to_string(),
            observer: TracingRetryObserver::new(name.clone()),
            model,
            name,
            dimensions,
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

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<(Vec<EmbeddingVector>, Option<u64>)> {
        let url = format!("{}/embeddings", self.endpoint);

        let prepared: Vec<std::borrow::Cow<'_, str>> = texts
            .iter()
            .map(|text| {
                if is_within_token_limit(text, MAX_INPUT_TOKENS) {
                    std::borrow::Cow::Borrowed(text.as_str())
                } else {
                    debug!(
                        provider = %self.name,
                        estimated_tokens = estimate_tokens(text),
                        "Truncating chunk to the model's input limit"
                    );
                    std::borrow::Cow::Owned(truncate_to_token_limit(text, MAX_INPUT_TOKENS))
                }
            })
            .collect();

        let request = EmbeddingRequest {
            model: &self.model,
            input: prepared.iter().map(|t| t.as_ref()).collect(),
            encoding_format: "float",
        };

        debug!(provider = %self.name, inputs = texts.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::from_transport(e, &self.endpoint, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(status, response).await);
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            EmbeddingError::InvalidResponse(format!("Failed to parse OpenAI response: {}", e))
        })?;

        // The API returns `data` in input order.
        let vectors = body.data.into_iter().map(|d| d.embedding).collect();
        Ok((vectors, body.usage.as_ref().and_then(Usage::tokens)))
    }

    async fn embed_with_retry(&self, texts: &[String]) -> EmbeddingResult<Vec<EmbeddingVector>> {
        let started = Instant::now();
        let result = execute_with_retry(&self.retry, &self.observer, || self.embed_batch(texts)).await;

        match result {
            Ok((vectors, tokens)) => {
                if let Some(monitor) = &self.monitor {
                    monitor.record_success(started.elapsed(), tokens);
                }
                Ok(vectors)
            }
            Err(e) => {
                if let Some(monitor) = &self.monitor {
                    monitor.record_failure(started.elapsed(), &e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn status_error(&self, status: StatusCode, response: reqwest::Response) -> EmbeddingError {
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| secs.ceil() as u64);

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| if body.is_empty() { status.to_string() } else { body });

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EmbeddingError::Authentication(message),
            StatusCode::TOO_MANY_REQUESTS => EmbeddingError::RateLimited {
                retry_after_secs,
                message,
            },
            StatusCode::BAD_REQUEST => EmbeddingError::InvalidRequest(message),
            StatusCode::NOT_FOUND => EmbeddingError::ModelNotFound {
                model: self.model.clone(),
                hint: format!("The API does not recognize this model: {}", message),
            },
            s if s.is_server_error() => EmbeddingError::Server {
                status: s.as_u16(),
                message,
            },
            s => EmbeddingError::Http {
                status: s.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn generate_embeddings_detailed(&self, chunks: &[String]) -> EmbeddingResult<EmbeddingBatch> {
        let batch = embed_in_batches(&self.name, chunks, self.batch_size, self.dimensions, |batch| {
            self.embed_with_retry(batch)
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
        let url = format!("{}/models", self.endpoint);
        let response = match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(provider = %self.name, "OpenAI API is not reachable: {}", e);
                return false;
            }
        };

        match response.status() {
            s if s.is_success() => true,
            StatusCode::TOO_MANY_REQUESTS => {
                info!(provider = %self.name, "OpenAI API is rate limiting but reachable");
                true
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(provider = %self.name, "OpenAI API rejected the API key");
                false
            }
            s => {
                warn!(provider = %self.name, status = s.as_u16(), "OpenAI availability check failed");
                false
            }
        }
    }
}

/// Approximate token count: one token per four characters, rounded up.
///
/// This is a heuristic for budgeting, not the model's tokenizer. Non-English
/// text and dense code can use noticeably more tokens than estimated.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Whether `text` is estimated to fit in `max_tokens`. Approximate, see
/// [`estimate_tokens`].
pub fn is_within_token_limit(text: &str, max_tokens: usize) -> bool {
    estimate_tokens(text) <= max_tokens
}

/// Cut `text` so its estimate fits `max_tokens`, appending
/// [`TRUNCATION_MARKER`] when the budget has room for it. Text that already
/// fits is returned unchanged. Approximate, see [`estimate_tokens`].
pub fn truncate_to_token_limit(text: &str, max_tokens: usize) -> String {
    if is_within_token_limit(text, max_tokens) {
        return text.to_string();
    }

    let budget = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    let marker_len = TRUNCATION_MARKER.chars().count();
    if budget <= marker_len {
        return text.chars().take(budget).collect();
    }

    let mut truncated: String = text.chars().take(budget - marker_len).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
