//! Ingest and retrieval orchestration.
//!
//! Ingest: store the document, chunk it, embed every chunk (bounded
//! concurrency, order preserved), persist chunk texts, then upsert all
//! vectors in one batch. Retrieval: embed the question, query the index,
//! and fetch the full chunk texts in hit order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use mindmap_core::{
    Chunk, ChunkMetadata, ChunkingConfig, Document, IndexEntry, IndexHit, MindmapError,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::chunker::chunk_document;
use crate::docstore::DocumentStore;
use crate::embedding::Embedder;
use crate::index::VectorIndex;

/// Characters of chunk text copied into index metadata.
const PREVIEW_CHARS: usize = 200;

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Store-assigned document id.
    pub document_id: i64,
    /// Document title.
    pub title: String,
    /// Number of chunks embedded and indexed.
    pub chunks: usize,
}

/// Retrieved context for one question.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// Index hits, best first.
    pub hits: Vec<IndexHit>,
    /// Chunk texts for the hits that exist in the store, in hit order.
    pub chunks: Vec<Chunk>,
}

impl Retrieval {
    /// `true` when the index returned nothing.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Chunk texts joined with blank lines, ready for prompting.
    ///
    /// # Examples
    ///
    /// ```
    /// use mindmap_core::Chunk;
    /// use mindmap_retrieval::ingest::Retrieval;
    ///
    /// let chunk = |id: &str, text: &str| Chunk {
    ///     id: id.into(),
    ///     document_id: 1,
    ///     text: text.into(),
    ///     index: 0,
    /// };
    /// let retrieval = Retrieval {
    ///     hits: vec![],
    ///     chunks: vec![chunk("a", "First."), chunk("b", "Second.")],
    /// };
    /// assert_eq!(retrieval.context(), "First.\n\nSecond.");
    /// ```
    pub fn context(&self) -> String {
        self.chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Wires an [`Embedder`], a [`VectorIndex`] and a [`DocumentStore`] together.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
    chunking: ChunkingConfig,
    embed_concurrency: usize,
}

impl Retriever {
    /// Create a retriever over the given components.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn DocumentStore>,
        chunking: ChunkingConfig,
        embed_concurrency: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            chunking,
            embed_concurrency: embed_concurrency.max(1),
        }
    }

    /// The document store backing this retriever.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The vector index backing this retriever.
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Store a new document and index its chunks.
    ///
    /// The document row is written first. If embedding or indexing fails
    /// afterwards, the document stays in the store without vectors and can
    /// be repaired with [`Retriever::reindex_document`].
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Input`] for a blank title or content, and the
    /// store, embedding or index error of the first stage that fails.
    pub async fn ingest(&self, title: &str, content: &str) -> Result<IngestReport, MindmapError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(MindmapError::Input("document title is empty".into()));
        }
        if content.trim().is_empty() {
            return Err(MindmapError::Input("document content is empty".into()));
        }

        let document_id = self.store.create(title, content)?;
        let document = self.store.get(document_id)?.ok_or_else(|| {
            MindmapError::Database(format!("document {document_id} vanished after insert"))
        })?;

        let chunks = self.index_document(&document).await?.len();
        info!(document_id, chunks, title, "ingested document");

        Ok(IngestReport {
            document_id,
            title: document.title,
            chunks,
        })
    }

    /// Re-chunk and re-embed a stored document.
    ///
    /// Chunk ids are deterministic, so this overwrites existing vectors and
    /// chunk rows instead of duplicating them. Chunks left over from an
    /// earlier chunking are removed from the index and the store once the
    /// new vectors are in.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Input`] if no document has this id.
    pub async fn reindex_document(&self, document_id: i64) -> Result<IngestReport, MindmapError> {
        let document = self
            .store
            .get(document_id)?
            .ok_or_else(|| MindmapError::Input(format!("no document with id {document_id}")))?;

        let previous = self.store.chunk_ids(document_id)?;
        let current: HashSet<String> = self.index_document(&document).await?.into_iter().collect();
        let stale: Vec<String> = previous
            .into_iter()
            .filter(|id| !current.contains(id))
            .collect();

        if !stale.is_empty() {
            self.index.delete(&stale).await?;
            self.store.delete_chunks(&stale)?;
            debug!(document_id, stale = stale.len(), "removed stale chunks");
        }

        let chunks = current.len();
        info!(document_id, chunks, "reindexed document");

        Ok(IngestReport {
            document_id,
            title: document.title,
            chunks,
        })
    }

    /// Returns the ids of the chunks now indexed for `document`.
    async fn index_document(&self, document: &Document) -> Result<Vec<String>, MindmapError> {
        let chunks = chunk_document(document, &self.chunking)?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        debug!(document_id = document.id, chunks = chunks.len(), "chunked document");

        let vectors: Vec<Vec<f32>> = stream::iter(chunks.iter().map(|c| self.embedder.embed(&c.text)))
            .buffered(self.embed_concurrency)
            .try_collect()
            .await
            .inspect_err(|e| {
                error!(document_id = document.id, error = %e, "embedding failed, nothing indexed");
            })?;

        for chunk in &chunks {
            self.store.put_chunk(chunk)?;
        }

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                id: chunk.id.clone(),
                vector,
                metadata: ChunkMetadata {
                    document_id: document.id,
                    document_title: document.title.clone(),
                    chunk_index: chunk.index,
                    text_preview: chunk.text.chars().take(PREVIEW_CHARS).collect(),
                },
            })
            .collect();

        self.index.upsert(&entries).await?;
        Ok(entries.into_iter().map(|e| e.id).collect())
    }

    /// Find the chunks most relevant to `question`.
    ///
    /// Zero hits is not an error: the returned [`Retrieval`] is empty.
    /// Hits whose chunk text is missing from the store are kept in `hits`
    /// but contribute no context.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Input`] for a blank question or zero `top_k`,
    /// otherwise the embedding, index or store error.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Retrieval, MindmapError> {
        if question.trim().is_empty() {
            return Err(MindmapError::Input("question is empty".into()));
        }
        if top_k == 0 {
            return Err(MindmapError::Input("top_k must be positive".into()));
        }

        let vector = self.embedder.embed(question).await?;
        let hits = self.index.query(&vector, top_k).await?;
        if hits.is_empty() {
            warn!(top_k, "no chunks matched the question");
            return Ok(Retrieval::default());
        }

        let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
        let mut by_id: HashMap<String, Chunk> = self
            .store
            .get_chunks(&ids)?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let chunks: Vec<Chunk> = hits
            .iter()
            .filter_map(|hit| {
                let chunk = by_id.remove(&hit.id);
                if chunk.is_none() {
                    warn!(chunk_id = %hit.id, "index hit has no stored chunk text");
                }
                chunk
            })
            .collect();

        debug!(hits = hits.len(), chunks = chunks.len(), "retrieved context");
        Ok(Retrieval { hits, chunks })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::docstore::SqliteDocumentStore;
    use crate::local::LocalIndex;

    const TOPICS: [&str; 3] = ["rust", "python", "graph"];

    /// One dimension per topic word, plus a constant so no vector is zero.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, MindmapError> {
            let lower = text.to_lowercase();
            let mut v: Vec<f32> = TOPICS
                .iter()
                .map(|t| lower.matches(t).count() as f32)
                .collect();
            v.push(0.1);
            Ok(v)
        }

        fn model(&self) -> &str {
            "keyword"
        }
    }

    /// Succeeds for the first `ok` calls, then fails.
    struct FlakyEmbedder {
        ok: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, MindmapError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.ok {
                Ok(vec![1.0, 0.0])
            } else {
                Err(MindmapError::Embedding("quota exceeded".into()))
            }
        }

        fn model(&self) -> &str {
            "flaky"
        }
    }

    fn retriever(embedder: Arc<dyn Embedder>) -> (Retriever, Arc<LocalIndex>, Arc<SqliteDocumentStore>) {
        let index = Arc::new(LocalIndex::in_memory().unwrap());
        let store = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let chunking = ChunkingConfig {
            chunk_size: 60,
            overlap: 10,
        };
        let r = Retriever::new(embedder, index.clone(), store.clone(), chunking, 4);
        (r, index, store)
    }

    fn corpus() -> String {
        [
            "Rust has ownership and borrowing rules.",
            "Python is dynamically typed and popular.",
            "A graph has nodes and edges between them.",
        ]
        .join("\n")
    }

    #[tokio::test]
    async fn ingest_indexes_every_chunk() {
        let (r, index, store) = retriever(Arc::new(KeywordEmbedder));

        let report = r.ingest("Doc A", &corpus()).await.unwrap();

        assert!(report.chunks >= 3, "got {} chunks", report.chunks);
        assert_eq!(index.count().unwrap(), report.chunks);
        let stored = store.chunks_for_document(report.document_id).unwrap();
        assert_eq!(stored.len(), report.chunks);
    }

    #[tokio::test]
    async fn reingest_same_document_is_idempotent_on_ids() {
        let (r, index, _) = retriever(Arc::new(KeywordEmbedder));
        let report = r.ingest("Doc A", &corpus()).await.unwrap();
        let before = index.count().unwrap();

        let again = r.reindex_document(report.document_id).await.unwrap();

        assert_eq!(again.chunks, report.chunks);
        assert_eq!(index.count().unwrap(), before);
    }

    #[tokio::test]
    async fn reindex_with_larger_chunks_drops_stale_entries() {
        let (r, index, store) = retriever(Arc::new(KeywordEmbedder));
        let report = r.ingest("Doc A", &corpus()).await.unwrap();
        assert!(report.chunks > 1);

        let coarse = Retriever::new(
            Arc::new(KeywordEmbedder),
            index.clone(),
            store.clone(),
            ChunkingConfig {
                chunk_size: 1000,
                overlap: 100,
            },
            4,
        );
        let again = coarse.reindex_document(report.document_id).await.unwrap();

        assert_eq!(again.chunks, 1);
        assert_eq!(index.count().unwrap(), 1);
        let stored = store.chunks_for_document(report.document_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, corpus());

        let retrieval = coarse.retrieve("python", 5).await.unwrap();
        assert_eq!(retrieval.hits.len(), 1);
    }

    #[tokio::test]
    async fn blank_input_is_rejected_before_storing() {
        let (r, _, store) = retriever(Arc::new(KeywordEmbedder));

        assert!(matches!(
            r.ingest("  ", "content").await.unwrap_err(),
            MindmapError::Input(_)
        ));
        assert!(matches!(
            r.ingest("Title", "\n\t").await.unwrap_err(),
            MindmapError::Input(_)
        ));
        assert!(store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_indexes_nothing() {
        let embedder = Arc::new(FlakyEmbedder {
            ok: 1,
            calls: AtomicUsize::new(0),
        });
        let (r, index, _) = retriever(embedder);

        let err = r.ingest("Doc A", &corpus()).await.unwrap_err();

        assert!(matches!(err, MindmapError::Embedding(_)));
        assert_eq!(index.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn retrieve_orders_chunks_by_relevance() {
        let (r, _, _) = retriever(Arc::new(KeywordEmbedder));
        r.ingest("Doc A", &corpus()).await.unwrap();

        let retrieval = r.retrieve("tell me about python", 2).await.unwrap();

        assert_eq!(retrieval.hits.len(), 2);
        assert!(retrieval.chunks[0].text.to_lowercase().contains("python"));
        assert!(retrieval.context().contains("Python is dynamically typed"));
    }

    #[tokio::test]
    async fn retrieve_on_empty_index_is_empty() {
        let (r, _, _) = retriever(Arc::new(KeywordEmbedder));

        let retrieval = r.retrieve("rust", 5).await.unwrap();

        assert!(retrieval.is_empty());
        assert_eq!(retrieval.context(), "");
    }

    #[tokio::test]
    async fn retrieve_rejects_bad_arguments() {
        let (r, _, _) = retriever(Arc::new(KeywordEmbedder));
        assert!(matches!(
            r.retrieve(" ", 5).await.unwrap_err(),
            MindmapError::Input(_)
        ));
        assert!(matches!(
            r.retrieve("rust", 0).await.unwrap_err(),
            MindmapError::Input(_)
        ));
    }

    #[tokio::test]
    async fn hits_without_stored_text_are_skipped() {
        let (r, index, _) = retriever(Arc::new(KeywordEmbedder));
        index
            .upsert(&[IndexEntry {
                id: "orphan".into(),
                vector: vec![1.0, 0.0, 0.0, 0.1],
                metadata: ChunkMetadata {
                    document_id: 99,
                    document_title: "Gone".into(),
                    chunk_index: 0,
                    text_preview: String::new(),
                },
            }])
            .await
            .unwrap();

        let retrieval = r.retrieve("rust", 5).await.unwrap();

        assert_eq!(retrieval.hits.len(), 1);
        assert!(retrieval.chunks.is_empty());
    }

    #[tokio::test]
    async fn reindex_unknown_document_is_input_error() {
        let (r, _, _) = retriever(Arc::new(KeywordEmbedder));
        assert!(matches!(
            r.reindex_document(404).await.unwrap_err(),
            MindmapError::Input(_)
        ));
    }
}
