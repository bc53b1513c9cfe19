//! Core types, configuration, and error handling for the mind map pipeline.
//!
//! This crate provides the shared foundation used by all other workspace crates:
//! - [`MindmapError`]: unified error type using `thiserror`
//! - [`MindmapConfig`]: settings loaded from `.mindmap.toml` plus environment overlay
//! - Shared types: [`Document`], [`Chunk`], [`IndexEntry`], [`IndexHit`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    ChunkingConfig, EmbeddingConfig, IndexBackend, IndexConfig, IngestConfig, LlmConfig,
    MindmapConfig, RetrievalConfig, StoreConfig, MAX_NODES_RANGE, TOP_K_RANGE,
};
pub use error::MindmapError;
pub use types::{Chunk, ChunkMetadata, Document, IndexEntry, IndexHit, OutputFormat};

/// A convenience `Result` type for pipeline operations.
pub type Result<T> = std::result::Result<T, MindmapError>;
