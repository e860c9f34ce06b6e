//! Configuration file loading and environment overrides

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::components::embedding::EmbeddingSection;
use crate::error::{ConfigError, ConfigResult};

/// Prefix shared by every environment override
const ENV_PREFIX: &str = "CODECTX_EMBEDDING_";

/// Root of the application configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Embedding provider settings
    pub embedding: EmbeddingSection,
}

impl AppConfig {
    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.embedding.validate()
    }

    /// Apply `CODECTX_EMBEDDING_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` to read variables
    ///
    /// Recognized suffixes: `PROVIDER`, `MODEL`, `URL`, `BATCH_SIZE`,
    /// `TIMEOUT_SECS`, `MAX_RETRIES`. `MODEL` and `URL` apply to whichever
    /// provider is active after `PROVIDER` has been applied.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let section = &mut self.embedding;

        if let Some(provider) = get("PROVIDER") {
            debug!(provider = %provider, "Overriding embedding provider from environment");
            section.provider = provider;
        }

        let provider = section.provider_name();

        if let Some(model) = get("MODEL") {
            match provider.as_str() {
                "openai" => section.openai.model = Some(model),
                _ => section.ollama.model = Some(model),
            }
        }

        if let Some(url) = get("URL") {
            match provider.as_str() {
                "openai" => section.openai.base_url = Some(url),
                _ => section.ollama.url = Some(url),
            }
        }

        if let Some(raw) = get("BATCH_SIZE") {
            section.batch_size = Some(parse_number(&raw, "BATCH_SIZE")?);
        }

        if let Some(raw) = get("TIMEOUT_SECS") {
            section.timeout_secs = parse_number(&raw, "TIMEOUT_SECS")?;
        }

        if let Some(raw) = get("MAX_RETRIES") {
            section.max_retries = parse_number(&raw, "MAX_RETRIES")?;
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, suffix: &str) -> ConfigResult<T> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        field: format!("{ENV_PREFIX}{suffix}"),
        value: format!("'{raw}' is not a valid number"),
    })
}

/// Loads [`AppConfig`] from disk and the environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Default config path: `$XDG_CONFIG_HOME/codectx/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".config")
            })
            .join("codectx")
            .join("config.toml")
    }

    /// Parse a TOML document without touching the environment
    pub fn from_toml_str(contents: &str) -> ConfigResult<AppConfig> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, apply environment overrides, and validate.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<AppConfig> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            info!("Loaded configuration from {}", path.display());
            toml::from_str(&contents)?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            AppConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from [`ConfigLoader::default_path`]
    pub fn load_default() -> ConfigResult<AppConfig> {
        Self::load_from_file(Self::default_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_toml_str_full_document() {
        let config = ConfigLoader::from_toml_str(
            r#"
            [embedding]
            provider = "openai"
            batch_size = 50
            timeout_secs = 10
            max_retries = 5
            initial_retry_delay_ms = 250
            backoff_multiplier = 1.5
            enable_monitoring = false

            [embedding.ollama]
            url = "http://gpu-box:11434"
            model = "mxbai-embed-large"

            [embedding.openai]
            api_key = "sk-test"
            model = "text-embedding-3-large"
            "#,
        )
        .unwrap();

        let e = &config.embedding;
        assert_eq!(e.provider, "openai");
        assert_eq!(e.batch_size, Some(50));
        assert_eq!(e.timeout_secs, 10);
        assert_eq!(e.max_retries, 5);
        assert_eq!(e.initial_retry_delay_ms, 250);
        assert_eq!(e.backoff_multiplier, 1.5);
        assert!(!e.enable_monitoring);
        assert_eq!(e.ollama.url.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(e.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(e.active_model(), Some("text-embedding-3-large"));
    }

    #[test]
    fn test_from_toml_str_empty_uses_defaults() {
        let config = ConfigLoader::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_from_toml_str_rejects_invalid_values() {
        let result = ConfigLoader::from_toml_str("[embedding]\nbatch_size = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let result = ConfigLoader::from_toml_str("[embedding]\ntimeout_secs = \"soon\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_overrides_apply_to_active_provider() {
        let mut config = AppConfig::default();
        config
            .apply_overrides_from(lookup(&[
                ("CODECTX_EMBEDDING_PROVIDER", "openai"),
                ("CODECTX_EMBEDDING_MODEL", "text-embedding-ada-002"),
                ("CODECTX_EMBEDDING_URL", "https://proxy.internal/v1"),
                ("CODECTX_EMBEDDING_BATCH_SIZE", "64"),
                ("CODECTX_EMBEDDING_TIMEOUT_SECS", "5"),
                ("CODECTX_EMBEDDING_MAX_RETRIES", "1"),
            ]))
            .unwrap();

        let e = &config.embedding;
        assert_eq!(e.provider, "openai");
        assert_eq!(e.openai.model.as_deref(), Some("text-embedding-ada-002"));
        assert_eq!(e.openai.base_url.as_deref(), Some("https://proxy.internal/v1"));
        assert!(e.ollama.model.is_none());
        assert_eq!(e.batch_size, Some(64));
        assert_eq!(e.timeout_secs, 5);
        assert_eq!(e.max_retries, 1);
    }

    #[test]
    fn test_overrides_default_to_ollama_fields() {
        let mut config = AppConfig::default();
        config
            .apply_overrides_from(lookup(&[
                ("CODECTX_EMBEDDING_MODEL", "all-minilm"),
                ("CODECTX_EMBEDDING_URL", "http://127.0.0.1:11434"),
            ]))
            .unwrap();

        assert_eq!(config.embedding.ollama.model.as_deref(), Some("all-minilm"));
        assert_eq!(
            config.embedding.ollama.url.as_deref(),
            Some("http://127.0.0.1:11434")
        );
    }

    #[test]
    fn test_overrides_reject_non_numeric() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides_from(lookup(&[("CODECTX_EMBEDDING_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("CODECTX_EMBEDDING_BATCH_SIZE"));
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let mut config = AppConfig::default();
        config
            .apply_overrides_from(lookup(&[("CODECTX_EMBEDDING_PROVIDER", "  ")]))
            .unwrap();
        assert_eq!(config.embedding.provider, "ollama");
    }
}
