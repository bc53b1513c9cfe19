//! The vector index seam.
//!
//! Two implementations ship with the crate: [`UpstashIndex`](crate::upstash::UpstashIndex)
//! talks to the Upstash Vector REST API, and [`LocalIndex`](crate::local::LocalIndex)
//! keeps vectors in a local SQLite file.

use std::sync::Arc;

use async_trait::async_trait;
use mindmap_core::{IndexBackend, IndexConfig, IndexEntry, IndexHit, MindmapError};

use crate::local::LocalIndex;
use crate::upstash::UpstashIndex;

/// Nearest-neighbour store keyed by chunk id.
///
/// One entry per id; upserting an existing id replaces it.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a batch of entries.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::VectorIndex`]. `failed_ids` is `None` when the
    /// backend only reports that the batch as a whole failed.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), MindmapError>;

    /// Return at most `top_k` hits ordered by descending score.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Input`] if `top_k` is zero or `vector` is
    /// empty, and [`MindmapError::VectorIndex`] on backend failure.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>, MindmapError>;

    /// Remove entries by id. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::VectorIndex`] on backend failure.
    async fn delete(&self, ids: &[String]) -> Result<(), MindmapError>;

    /// Backend name, for logs and `doctor` output.
    fn name(&self) -> &'static str;
}

/// Reject query arguments every backend treats as caller errors.
///
/// # Errors
///
/// Returns [`MindmapError::Input`] naming the bad argument.
///
/// # Examples
///
/// ```
/// use mindmap_retrieval::index::validate_query;
///
/// assert!(validate_query(&[0.1, 0.2], 5).is_ok());
/// assert!(validate_query(&[], 5).is_err());
/// assert!(validate_query(&[0.1], 0).is_err());
/// ```
pub fn validate_query(vector: &[f32], top_k: usize) -> Result<(), MindmapError> {
    if top_k == 0 {
        return Err(MindmapError::Input("top_k must be positive".into()));
    }
    if vector.is_empty() {
        return Err(MindmapError::Input("query vector is empty".into()));
    }
    Ok(())
}

/// Build the configured index backend.
///
/// # Errors
///
/// Returns [`MindmapError::Config`] if the Upstash backend lacks a URL or
/// token, or [`MindmapError::Database`] if the local index cannot be opened.
pub fn open_index(config: &IndexConfig) -> Result<Arc<dyn VectorIndex>, MindmapError> {
    match config.backend {
        IndexBackend::Upstash => Ok(Arc::new(UpstashIndex::with_config(config)?)),
        IndexBackend::Local => Ok(Arc::new(LocalIndex::open(&config.path)?)),
    }
}
