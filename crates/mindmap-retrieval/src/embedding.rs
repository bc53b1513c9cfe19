//! OpenAI-compatible embedding client.
//!
//! Turns chunk and question text into fixed-dimension vectors via the
//! `/v1/embeddings` endpoint. The [`Embedder`] trait is the seam the ingest
//! and query paths depend on, so tests can substitute a deterministic fake.

use std::time::Duration;

use async_trait::async_trait;
use mindmap_core::{EmbeddingConfig, MindmapError};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Something that can turn text into a vector.
///
/// Implementations must return vectors of one fixed dimension for a given
/// model. Failures are reported as [`MindmapError::Embedding`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MindmapError>;

    /// Model identifier, for logs and diagnostics.
    fn model(&self) -> &str;
}

/// Client for an OpenAI-compatible embeddings endpoint.
///
/// # Examples
///
/// ```
/// use mindmap_retrieval::embedding::{Embedder, EmbeddingClient};
///
/// let client = EmbeddingClient::new("test-key");
/// assert_eq!(client.model(), "text-embedding-3-small");
/// ```
pub struct EmbeddingClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: Option<usize>,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    /// Create a client for the default endpoint and model.
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimensions: None,
        }
    }

    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// The config must already carry the API key; environment fallbacks are
    /// applied when the configuration is loaded, not here. Responses are
    /// checked against `config.dimensions`.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Config`] if no API key is set or the HTTP
    /// client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use mindmap_core::EmbeddingConfig;
    /// use mindmap_retrieval::embedding::EmbeddingClient;
    ///
    /// let config = EmbeddingConfig {
    ///     api_key: Some("sk-test".into()),
    ///     ..EmbeddingConfig::default()
    /// };
    /// assert!(EmbeddingClient::with_config(&config).is_ok());
    /// assert!(EmbeddingClient::with_config(&EmbeddingConfig::default()).is_err());
    /// ```
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, MindmapError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            MindmapError::Config(
                "embedding API key not found: set embedding.api_key in .mindmap.toml or OPENAI_API_KEY env var".into(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| MindmapError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            dimensions: Some(config.dimensions),
        })
    }

    /// Point the client at a different base URL (no trailing `/v1`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Require every returned vector to have exactly `dimensions` entries.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    /// Embed one text with a single request.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Input`] for blank text, and
    /// [`MindmapError::Embedding`] on transport failures, non-success
    /// statuses, malformed bodies, or a vector of unexpected length.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MindmapError> {
        if text.trim().is_empty() {
            return Err(MindmapError::Input("cannot embed empty text".into()));
        }

        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| MindmapError::Embedding(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(MindmapError::Embedding(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| MindmapError::Embedding(format!("failed to parse response: {e}")))?;

        let vector = embed_response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| MindmapError::Embedding("empty response from embedding API".into()))?;

        if vector.is_empty() {
            return Err(MindmapError::Embedding("embedding API returned an empty vector".into()));
        }
        if let Some(expected) = self.dimensions {
            if vector.len() != expected {
                return Err(MindmapError::Embedding(format!(
                    "expected {expected}-dimensional embedding, got {}",
                    vector.len()
                )));
            }
        }

        debug!(model = %self.model, dims = vector.len(), chars = text.len(), "embedded text");
        Ok(vector)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> EmbeddingClient {
        EmbeddingClient::new("sk-test").with_base_url(server.base_url())
    }

    #[test]
    fn request_format_is_correct() {
        let request = EmbedRequest {
            model: "text-embedding-3-small",
            input: "hello",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "text-embedding-3-small");
        assert_eq!(json["input"], "hello");
    }

    #[test]
    fn missing_api_key_gives_clear_error() {
        let config = EmbeddingConfig {
            api_key: None,
            ..EmbeddingConfig::default()
        };
        let err = EmbeddingClient::with_config(&config).unwrap_err().to_string();
        assert!(err.contains("API key"), "error should mention API key: {err}");
    }

    #[test]
    fn with_config_uses_configured_endpoint() {
        let config = EmbeddingConfig {
            api_key: Some("k".into()),
            base_url: Some("http://localhost:8080".into()),
            model: "nomic-embed".into(),
            ..EmbeddingConfig::default()
        };
        let client = EmbeddingClient::with_config(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/embeddings");
        assert_eq!(client.model(), "nomic-embed");
    }

    #[tokio::test]
    async fn embed_returns_first_vector() {
        let server = MockServer::start_async().await;

        let embed_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .header("authorization", "Bearer sk-test");
            then.status(200).json_body(json!({
                "data": [{ "embedding": [0.1, 0.2, 0.3] }]
            }));
        });

        let vector = client(&server).embed("hello").await.unwrap();

        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        embed_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn configured_base_url_with_trailing_slash() {
        let server = MockServer::start_async().await;

        let embed_mock = server.mock(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({
                "data": [{ "embedding": [1.0, 0.0, 0.0] }]
            }));
        });

        let config = EmbeddingConfig {
            api_key: Some("sk-test".into()),
            base_url: Some(format!("{}/", server.base_url())),
            dimensions: 3,
            ..EmbeddingConfig::default()
        };
        let client = EmbeddingClient::with_config(&config).unwrap();

        assert_eq!(client.endpoint(), format!("{}/v1/embeddings", server.base_url()));
        assert_eq!(client.embed("hello").await.unwrap().len(), 3);
        embed_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn embed_reports_http_failure() {
        let server = MockServer::start_async().await;

        let embed_mock = server.mock(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(401).body("bad key");
        });

        let err = client(&server).embed("hello").await.unwrap_err();

        assert!(matches!(err, MindmapError::Embedding(_)));
        let msg = err.to_string();
        assert!(msg.contains("401"), "{msg}");
        assert!(msg.contains("bad key"), "{msg}");
        embed_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn embed_rejects_malformed_body() {
        let server = MockServer::start_async().await;

        let embed_mock = server.mock(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({ "data": [] }));
        });

        let err = client(&server).embed("hello").await.unwrap_err();

        assert!(err.to_string().contains("empty response"));
        embed_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn embed_checks_dimensions() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({
                "data": [{ "embedding": [1.0, 2.0] }]
            }));
        });

        let err = client(&server)
            .with_dimensions(3)
            .embed("hello")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("3-dimensional"));
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_a_request() {
        let server = MockServer::start_async().await;

        let embed_mock = server.mock(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({ "data": [{ "embedding": [1.0] }] }));
        });

        let err = client(&server).embed("   ").await.unwrap_err();

        assert!(matches!(err, MindmapError::Input(_)));
        embed_mock.assert_calls(0);
    }
}
