//! # codectx Configuration Library
//!
//! Centralized configuration for the code context engine. This crate owns the
//! on-disk format and environment overrides; consumers such as the embeddings
//! crate translate the sections they care about into their own typed configs.
//!
//! ## Features
//!
//! - TOML configuration file at `$XDG_CONFIG_HOME/codectx/config.toml`
//! - `CODECTX_*` environment overrides
//! - API key resolution from environment or config
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use codectx_config::ConfigLoader;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::load_default()?;
//!     println!("embedding provider: {}", config.embedding.provider);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod components;
pub mod credentials;
mod error;
mod loader;

pub use components::embedding::{EmbeddingSection, OllamaSection, OpenAISection};
pub use credentials::resolve_api_key;
pub use error::{ConfigError, ConfigResult};
pub use loader::{AppConfig, ConfigLoader};
