//! SQLite-backed vector index for offline use.
//!
//! Vectors are stored as little-endian f32 BLOBs next to their provenance
//! metadata. Queries load every vector and rank by cosine similarity computed
//! in Rust, which is fine for personal-scale corpora.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use mindmap_core::{ChunkMetadata, IndexEntry, IndexHit, MindmapError};
use rusqlite::{params, Connection};
use tracing::{debug, error};

use crate::index::{validate_query, VectorIndex};

const DIMENSIONS_KEY: &str = "embedding_dimensions";

/// Vector index stored in a local SQLite database.
///
/// # Examples
///
/// ```
/// use mindmap_retrieval::local::LocalIndex;
///
/// let index = LocalIndex::in_memory().unwrap();
/// assert_eq!(index.count().unwrap(), 0);
/// assert_eq!(index.dimensions().unwrap(), None);
/// ```
pub struct LocalIndex {
    conn: Mutex<Connection>,
}

impl LocalIndex {
    /// Open or create an index database at `path`, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Database`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, MindmapError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MindmapError::Database(format!("failed to create index directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MindmapError::Database(format!("failed to open index database: {e}")))?;

        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init_schema()?;
        Ok(index)
    }

    /// Create an in-memory index (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, MindmapError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            MindmapError::Database(format!("failed to create in-memory database: {e}"))
        })?;

        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init_schema()?;
        Ok(index)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, MindmapError> {
        self.conn
            .lock()
            .map_err(|_| MindmapError::Database("index connection lock poisoned".into()))
    }

    fn init_schema(&self) -> Result<(), MindmapError> {
        self.lock()?
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS vectors (
                    id TEXT PRIMARY KEY,
                    embedding BLOB NOT NULL,
                    document_id INTEGER NOT NULL,
                    document_title TEXT NOT NULL,
                    chunk_index INTEGER NOT NULL,
                    text_preview TEXT NOT NULL
                );
                ",
            )
            .map_err(|e| MindmapError::Database(format!("failed to create schema: {e}")))?;
        Ok(())
    }

    /// Embedding dimensions recorded by the first upsert, if any.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Database`] on query failure or corrupt metadata.
    pub fn dimensions(&self) -> Result<Option<usize>, MindmapError> {
        let conn = self.lock()?;
        read_dimensions(&conn)
    }

    /// Number of stored vectors.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Database`] on query failure.
    pub fn count(&self) -> Result<usize, MindmapError> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))
            .map_err(|e| MindmapError::Database(format!("failed to count vectors: {e}")))?;
        Ok(count as usize)
    }

    fn upsert_blocking(&self, entries: &[IndexEntry]) -> Result<(), MindmapError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| MindmapError::index_opaque(format!("failed to begin transaction: {e}")))?;

        let mut dims = read_dimensions(&tx)?;

        for entry in entries {
            if entry.vector.is_empty() {
                return Err(MindmapError::index_failed(
                    vec![entry.id.clone()],
                    "vector is empty",
                ));
            }
            match dims {
                Some(expected) if expected != entry.vector.len() => {
                    return Err(MindmapError::index_failed(
                        vec![entry.id.clone()],
                        format!(
                            "index holds {expected}-dimensional vectors, got {}",
                            entry.vector.len()
                        ),
                    ));
                }
                Some(_) => {}
                None => {
                    tx.execute(
                        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                        params![DIMENSIONS_KEY, entry.vector.len().to_string()],
                    )
                    .map_err(|e| {
                        MindmapError::index_failed(
                            vec![entry.id.clone()],
                            format!("failed to record dimensions: {e}"),
                        )
                    })?;
                    dims = Some(entry.vector.len());
                }
            }

            let m = &entry.metadata;
            tx.execute(
                "INSERT OR REPLACE INTO vectors
                 (id, embedding, document_id, document_title, chunk_index, text_preview)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.id,
                    floats_to_bytes(&entry.vector),
                    m.document_id,
                    m.document_title,
                    m.chunk_index as i64,
                    m.text_preview,
                ],
            )
            .map_err(|e| {
                MindmapError::index_failed(vec![entry.id.clone()], format!("insert failed: {e}"))
            })?;
        }

        tx.commit()
            .map_err(|e| MindmapError::index_opaque(format!("failed to commit: {e}")))?;
        Ok(())
    }

    fn delete_blocking(&self, ids: &[String]) -> Result<(), MindmapError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| MindmapError::index_opaque(format!("failed to begin transaction: {e}")))?;
        for id in ids {
            tx.execute("DELETE FROM vectors WHERE id = ?1", params![id])
                .map_err(|e| MindmapError::index_failed(vec![id.clone()], format!("delete failed: {e}")))?;
        }
        tx.commit()
            .map_err(|e| MindmapError::index_opaque(format!("failed to commit: {e}")))?;
        Ok(())
    }

    fn query_blocking(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>, MindmapError> {
        let conn = self.lock()?;
        if let Some(expected) = read_dimensions(&conn)? {
            if expected != vector.len() {
                return Err(MindmapError::index_opaque(format!(
                    "index holds {expected}-dimensional vectors, query has {}",
                    vector.len()
                )));
            }
        }
        let mut stmt = conn
            .prepare(
                "SELECT id, embedding, document_id, document_title, chunk_index, text_preview
                 FROM vectors",
            )
            .map_err(|e| MindmapError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(1)?;
                let score = cosine_similarity(vector, &bytes_to_floats(&bytes));
                let metadata = ChunkMetadata {
                    document_id: row.get(2)?,
                    document_title: row.get(3)?,
                    chunk_index: row.get::<_, i64>(4)? as usize,
                    text_preview: row.get(5)?,
                };
                Ok(IndexHit {
                    id: row.get(0)?,
                    score,
                    metadata: Some(metadata),
                })
            })
            .map_err(|e| MindmapError::Database(format!("failed to query vectors: {e}")))?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row.map_err(|e| MindmapError::Database(format!("failed to read row: {e}")))?);
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), MindmapError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.upsert_blocking(entries).inspect_err(|e| {
            error!(count = entries.len(), error = %e, "local upsert failed");
        })?;
        debug!(count = entries.len(), "upserted vectors");
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>, MindmapError> {
        validate_query(vector, top_k)?;
        let hits = self.query_blocking(vector, top_k)?;
        debug!(top_k, hits = hits.len(), "queried local index");
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<(), MindmapError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.delete_blocking(ids)?;
        debug!(count = ids.len(), "deleted vectors");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

fn read_dimensions(conn: &Connection) -> Result<Option<usize>, MindmapError> {
    let result = conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        params![DIMENSIONS_KEY],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(value) => value.parse().map(Some).map_err(|_| {
            MindmapError::Database(format!("corrupted dimension metadata in index: '{value}'"))
        }),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(MindmapError::Database(format!(
            "failed to read dimensions: {e}"
        ))),
    }
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    floats.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
