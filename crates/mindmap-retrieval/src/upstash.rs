//! Upstash Vector REST backend.

use std::time::Duration;

use async_trait::async_trait;
use mindmap_core::{ChunkMetadata, IndexConfig, IndexEntry, IndexHit, MindmapError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::index::{validate_query, VectorIndex};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Vector index backed by the Upstash Vector REST API.
///
/// Upstash reports batch failures without naming entries, so upsert errors
/// from this backend always carry `failed_ids: None`.
///
/// # Examples
///
/// ```
/// use mindmap_retrieval::index::VectorIndex;
/// use mindmap_retrieval::upstash::UpstashIndex;
///
/// let index = UpstashIndex::new("https://example-vector.upstash.io", "token");
/// assert_eq!(index.name(), "upstash");
/// ```
pub struct UpstashIndex {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl std::fmt::Debug for UpstashIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstashIndex")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    vector: &'a [f32],
    metadata: &'a ChunkMetadata,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

/// Every Upstash response is either `{"result": ..}` or `{"error": ..}`.
#[derive(Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: f64,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl UpstashIndex {
    /// Create a client for the index at `url`.
    pub fn new(url: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Create a client from an [`IndexConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Config`] if the URL or token is missing.
    pub fn with_config(config: &IndexConfig) -> Result<Self, MindmapError> {
        let url = config.url.as_deref().ok_or_else(|| {
            MindmapError::Config(
                "Upstash URL not found: set index.url in .mindmap.toml or UPSTASH_VECTOR_URL env var".into(),
            )
        })?;
        let token = config.token.as_deref().ok_or_else(|| {
            MindmapError::Config(
                "Upstash token not found: set index.token in .mindmap.toml or UPSTASH_VECTOR_TOKEN env var".into(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| MindmapError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, MindmapError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(format!("{}/{path}", self.url))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| MindmapError::index_opaque(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MindmapError::index_opaque(format!("failed to read response: {e}")))?;

        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(MindmapError::index_opaque(format!(
                    "Upstash returned {status}: {text}"
                )));
            }
            Err(e) => {
                return Err(MindmapError::index_opaque(format!(
                    "failed to parse response: {e}"
                )));
            }
        };

        if let Some(message) = envelope.error {
            return Err(MindmapError::index_opaque(format!(
                "Upstash returned {status}: {message}"
            )));
        }
        if !status.is_success() {
            return Err(MindmapError::index_opaque(format!(
                "Upstash returned {status}: {text}"
            )));
        }

        envelope
            .result
            .ok_or_else(|| MindmapError::index_opaque("response has neither result nor error"))
    }
}

#[async_trait]
impl VectorIndex for UpstashIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), MindmapError> {
        if entries.is_empty() {
            return Ok(());
        }

        let body: Vec<UpsertVector<'_>> = entries
            .iter()
            .map(|e| UpsertVector {
                id: &e.id,
                vector: &e.vector,
                metadata: &e.metadata,
            })
            .collect();

        let _: serde_json::Value = self.post("upsert", &body).await.inspect_err(|e| {
            error!(count = entries.len(), error = %e, "upstash upsert failed");
        })?;

        debug!(count = entries.len(), "upserted vectors");
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>, MindmapError> {
        validate_query(vector, top_k)?;

        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        };
        let matches: Vec<QueryMatch> = self.post("query", &request).await?;

        let mut hits: Vec<IndexHit> = matches
            .into_iter()
            .map(|m| IndexHit {
                metadata: m.metadata.and_then(|v| serde_json::from_value(v).ok()),
                id: m.id,
                score: m.score,
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);

        debug!(top_k, hits = hits.len(), "queried upstash");
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<(), MindmapError> {
        if ids.is_empty() {
            return Ok(());
        }

        let _: serde_json::Value = self.post("delete", ids).await.inspect_err(|e| {
            error!(count = ids.len(), error = %e, "upstash delete failed");
        })?;

        debug!(count = ids.len(), "deleted vectors");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "upstash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn index(server: &MockServer) -> UpstashIndex {
        UpstashIndex::new(&server.base_url(), "tok")
    }

    fn entry(id: &str) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            vector: vec![0.1, 0.2],
            metadata: ChunkMetadata {
                document_id: 1,
                document_title: "Doc A".into(),
                chunk_index: 0,
                text_preview: "preview".into(),
            },
        }
    }

    #[test]
    fn query_request_uses_camel_case() {
        let request = QueryRequest {
            vector: &[0.5],
            top_k: 3,
            include_metadata: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["topK"], 3);
        assert_eq!(json["includeMetadata"], true);
    }

    #[test]
    fn with_config_requires_token() {
        let config = IndexConfig {
            url: Some("https://x.upstash.io".into()),
            ..IndexConfig::default()
        };
        let err = UpstashIndex::with_config(&config).unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[tokio::test]
    async fn upsert_posts_batch_with_metadata() {
        let server = MockServer::start_async().await;

        let upsert_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/upsert")
                .header("authorization", "Bearer tok")
                .json_body(json!([
                    {
                        "id": "c1",
                        "vector": [0.1, 0.2],
                        "metadata": {
                            "document_id": 1,
                            "document_title": "Doc A",
                            "chunk_index": 0,
                            "text_preview": "preview"
                        }
                    }
                ]));
            then.status(200).json_body(json!({ "result": "Success" }));
        });

        index(&server).upsert(&[entry("c1")]).await.unwrap();

        upsert_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn empty_upsert_makes_no_request() {
        let server = MockServer::start_async().await;

        let upsert_mock = server.mock(|when, then| {
            when.method(POST).path("/upsert");
            then.status(200).json_body(json!({ "result": "Success" }));
        });

        index(&server).upsert(&[]).await.unwrap();

        upsert_mock.assert_calls(0);
    }

    #[tokio::test]
    async fn upsert_failure_has_unknown_ids() {
        let server = MockServer::start_async().await;

        let upsert_mock = server.mock(|when, then| {
            when.method(POST).path("/upsert");
            then.status(400)
                .json_body(json!({ "error": "Invalid vector dimension", "status": 400 }));
        });

        let err = index(&server)
            .upsert(&[entry("c1"), entry("c2")])
            .await
            .unwrap_err();

        match &err {
            MindmapError::VectorIndex { failed_ids, message } => {
                assert!(failed_ids.is_none());
                assert!(message.contains("Invalid vector dimension"), "{message}");
            }
            other => panic!("expected vector index error, got {other:?}"),
        }
        assert!(err.to_string().contains("ids: unknown"));
        upsert_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn delete_posts_ids() {
        let server = MockServer::start_async().await;

        let delete_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/delete")
                .header("authorization", "Bearer tok")
                .json_body(json!(["c1", "c2"]));
            then.status(200).json_body(json!({ "result": { "deleted": 2 } }));
        });

        let idx = index(&server);
        idx.delete(&["c1".into(), "c2".into()]).await.unwrap();
        idx.delete(&[]).await.unwrap();

        delete_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn query_returns_hits_in_score_order() {
        let server = MockServer::start_async().await;

        let query_mock = server.mock(|when, then| {
            when.method(POST).path("/query").json_body(json!({
                "vector": [0.5, 0.5],
                "topK": 2,
                "includeMetadata": true
            }));
            then.status(200).json_body(json!({
                "result": [
                    { "id": "low", "score": 0.4 },
                    {
                        "id": "high",
                        "score": 0.9,
                        "metadata": {
                            "document_id": 2,
                            "document_title": "Doc B",
                            "chunk_index": 3,
                            "text_preview": "..."
                        }
                    }
                ]
            }));
        });

        let hits = index(&server).query(&[0.5, 0.5], 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "high");
        assert_eq!(hits[0].metadata.as_ref().unwrap().chunk_index, 3);
        assert_eq!(hits[1].id, "low");
        assert!(hits[1].metadata.is_none());
        query_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn query_validates_before_request() {
        let server = MockServer::start_async().await;

        let query_mock = server.mock(|when, then| {
            when.method(POST).path("/query");
            then.status(200).json_body(json!({ "result": [] }));
        });

        let err = index(&server).query(&[0.5], 0).await.unwrap_err();

        assert!(matches!(err, MindmapError::Input(_)));
        query_mock.assert_calls(0);
    }

    #[tokio::test]
    async fn non_json_error_body_is_reported() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/query");
            then.status(502).body("bad gateway");
        });

        let err = index(&server).query(&[0.5], 5).await.unwrap_err();

        assert!(err.to_string().contains("502"));
    }
}
