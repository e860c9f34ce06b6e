//! API key resolution for cloud embedding providers
//!
//! [`resolve_api_key`] checks sources in this order:
//! 1. Environment variable (e.g., `OPENAI_API_KEY`)
//! 2. Config file value
//!
//! Empty or whitespace-only values are treated as absent at every step.

use tracing::debug;

/// Environment variable consulted for a provider's key, if the provider has one
pub fn env_var_for_provider(provider: &str) -> Option<&'static str> {
    match provider.trim().to_ascii_lowercase().as_str() {
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

/// Resolve the API key for `provider`, preferring the environment over `configured`
pub fn resolve_api_key(provider: &str, configured: Option<&str>) -> Option<String> {
    if let Some(var) = env_var_for_provider(provider) {
        if let Some(key) = std::env::var(var).ok().and_then(non_empty) {
            debug!(provider, source = var, "Resolved API key from environment");
            return Some(key);
        }
    }

    let key = configured.map(str::to_string).and_then(non_empty);
    if key.is_some() {
        debug!(provider, source = "config", "Resolved API key from config file");
    }
    key
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
