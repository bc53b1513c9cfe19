//! Document ingestion and vector retrieval.
//!
//! Splits documents into overlapping, boundary-aware chunks, embeds them,
//! and stores them in a vector index (Upstash Vector or a local SQLite
//! file). Queries are embedded the same way and answered with the top-k
//! most similar chunks, whose text is fetched from the document store.

pub mod chunker;
pub mod docstore;
pub mod embedding;
pub mod index;
pub mod ingest;
pub mod local;
pub mod upstash;
