//! Shared helpers for provider integration tests
//!
//! Backends are simulated with wiremock. The responders here echo something
//! about each input back into its vector so tests can check ordering.

#![allow(dead_code)]

use codectx_embeddings::EmbeddingConfig;
use serde_json::{json, Value};
use wiremock::{Request, Respond, ResponseTemplate};

pub const OLLAMA_DIMS: usize = 768;
pub const OPENAI_DIMS: usize = 1536;

/// Route provider logs to the test output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Ollama config pointed at `uri` with millisecond retry delays
pub fn ollama_config(uri: &str) -> EmbeddingConfig {
    EmbeddingConfig::ollama(Some(uri.to_string()), Some("nomic-embed-text".to_string()))
        .with_retry(3, 1, 2.0)
        .with_timeout_secs(5)
}

/// OpenAI config pointed at `uri` with millisecond retry delays
pub fn openai_config(uri: &str) -> EmbeddingConfig {
    EmbeddingConfig::openai("sk-test", None)
        .with_endpoint(format!("{}/v1", uri))
        .with_retry(3, 1, 2.0)
        .with_timeout_secs(5)
}

pub fn chunks(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|s| s.to_string()).collect()
}

/// Body of a single Ollama embedding response
pub fn ollama_embedding_body(value: f32, dims: usize) -> Value {
    json!({ "embedding": vec![value; dims] })
}

/// Ollama tags response listing `names`
pub fn ollama_tags_body(names: &[&str]) -> Value {
    json!({
        "models": names
            .iter()
            .map(|n| json!({ "name": n, "size": 274_302_450u64, "modified_at": "2024-05-01T10:00:00Z" }))
            .collect::<Vec<_>>()
    })
}

/// Responds to `/api/embeddings` with a vector filled with the prompt's length
pub struct OllamaPromptLength {
    pub dims: usize,
}

impl Respond for OllamaPromptLength {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        let len = body["prompt"].as_str().map(|p| p.len()).unwrap_or(0);
        ResponseTemplate::new(200).set_body_json(ollama_embedding_body(len as f32, self.dims))
    }
}

/// Responds to `/embeddings` with one vector per input, each filled with the
/// input's length, plus a usage block
pub struct OpenAIInputLength {
    pub dims: usize,
}

impl Respond for OpenAIInputLength {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        let inputs = body["input"].as_array().cloned().unwrap_or_default();

        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let len = input.as_str().map(|s| s.len()).unwrap_or(0);
                json!({
                    "object": "embedding",
                    "index": index,
                    "embedding": vec![len as f32; self.dims],
                })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": data,
            "model": body["model"],
            "usage": { "prompt_tokens": inputs.len() * 3, "total_tokens": inputs.len() * 3 },
        }))
    }
}

/// OpenAI-style error body
pub fn openai_error_body(message: &str, kind: &str) -> Value {
    json!({ "error": { "message": message, "type": kind, "code": null } })
}
