//! Building providers from configuration

mod common;

use codectx_config::ConfigLoader;
use codectx_embeddings::{
    create_provider, create_provider_from_app_config, supported_providers, EmbeddingBackend,
    EmbeddingConfig, EmbeddingError, EmbeddingProvider, ProviderKind,
};
use common::{chunks, OllamaPromptLength, OLLAMA_DIMS};
use serial_test::serial;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

#[test]
fn test_openai_kind_builds_cloud_provider() {
    let backend = create_provider(EmbeddingConfig::openai("x", None)).unwrap();

    assert!(matches!(backend, EmbeddingBackend::OpenAI(_)));
    assert_eq!(backend.provider_name(), "openai:text-embedding-3-small");
    assert_eq!(backend.dimensions(), 1536);
}

#[test]
fn test_unknown_kind_lists_supported() {
    let err = "unknown".parse::<ProviderKind>().unwrap_err();
    match &err {
        EmbeddingError::UnsupportedProvider { supported, .. } => {
            assert_eq!(supported, &supported_providers());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("ollama, openai"));
}

#[test]
#[serial]
fn test_missing_key_fails_before_network() {
    std::env::remove_var("OPENAI_API_KEY");

    let app = ConfigLoader::from_toml_str("[embedding]\nprovider = \"openai\"\n").unwrap();
    let err = create_provider_from_app_config(&app).unwrap_err();

    assert!(matches!(err, EmbeddingError::MissingCredential { .. }));
    assert!(err.to_string().contains("OPENAI_API_KEY"));
}

#[test]
fn test_config_file_values_reach_provider() -> anyhow::Result<()> {
    let app = ConfigLoader::from_toml_str(
        r#"
        [embedding]
        provider = "ollama"
        batch_size = 4
        enable_monitoring = false

        [embedding.ollama]
        url = "http://gpu-box:11434/"
        model = "mxbai-embed-large:latest"
        "#,
    )?;

    let backend = create_provider_from_app_config(&app)?;
    let ollama = backend.as_ollama().expect("ollama backend");

    assert_eq!(ollama.endpoint(), "http://gpu-box:11434");
    assert_eq!(ollama.batch_size(), 4);
    assert_eq!(backend.dimensions(), 1024);
    assert_eq!(backend.provider_name(), "ollama:mxbai-embed-large:latest");
    assert!(backend.monitor().is_none());
    Ok(())
}

#[tokio::test]
async fn test_backend_dispatches_embedding_calls() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(OllamaPromptLength { dims: OLLAMA_DIMS })
        .expect(2)
        .mount(&server)
        .await;

    let app = ConfigLoader::from_toml_str(&format!(
        "[embedding]\nprovider = \"ollama\"\n\n[embedding.ollama]\nurl = \"{}\"\nmodel = \"nomic-embed-text\"\n",
        server.uri()
    ))?;

    let backend = create_provider_from_app_config(&app)?;
    let vectors = backend.generate_embeddings(&chunks(&["foo", "quux"])).await?;

    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0][0], 3.0);
    assert_eq!(vectors[1][0], 4.0);
    assert_eq!(backend.monitor().unwrap().metrics().successful_requests, 2);
    Ok(())
}
