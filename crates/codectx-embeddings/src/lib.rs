//! # codectx Embeddings
//!
//! Embedding provider layer for the code context engine: turns source chunks
//! into vectors for the search index.
//!
//! ## Features
//!
//! - **Multi-provider**: local Ollama server or the OpenAI API behind one trait
//! - **Graceful degradation**: a failed batch becomes zero vectors, never a
//!   failed call, and [`EmbeddingBatch`] says which entries were substituted
//! - **Retry**: bounded exponential backoff for transient backend errors
//! - **Monitoring**: per-provider metrics and health reports
//!
//! ## Example
//!
//! ```rust,no_run
//! use codectx_embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = create_provider(EmbeddingConfig::ollama(
//!         None,
//!         Some("nomic-embed-text".to_string()),
//!     ))?;
//!
//!     let chunks = vec!["fn add(a: i32, b: i32) -> i32 { a + b }".to_string()];
//!     let vectors = provider.generate_embeddings(&chunks).await?;
//!
//!     println!("{}: {} dimensions", provider.provider_name(), vectors[0].len());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod factory;
pub mod monitor;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod retry;

pub use config::{EmbeddingConfig, ProviderKind};
pub use error::{EmbeddingError, EmbeddingResult};
pub use factory::{
    create_provider, create_provider_from_app_config, embedding_config_from_app,
    supported_providers, EmbeddingBackend,
};
pub use monitor::{
    EmbeddingMetrics, HealthStatus, IssueCategory, MonitorThresholds, PerformanceIssue,
    PerformanceMonitor, PerformanceReport, Severity,
};
pub use ollama::{OllamaModel, OllamaProvider};
pub use openai::{estimate_tokens, is_within_token_limit, truncate_to_token_limit, OpenAIProvider};
pub use provider::{BatchFailure, EmbeddingBatch, EmbeddingProvider, EmbeddingVector};
pub use retry::{execute_with_retry, RetryObserver, RetryPolicy, TracingRetryObserver};
