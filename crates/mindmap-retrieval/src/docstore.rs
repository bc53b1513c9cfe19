//! Persistent storage for documents and chunk texts.
//!
//! The vector index only holds vectors and short previews; full chunk text
//! lives here and is fetched by id after retrieval. The SQLite layout is
//! compatible with databases created by earlier releases, including their
//! `CURRENT_TIMESTAMP` creation times.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use mindmap_core::{Chunk, Document, MindmapError};
use rusqlite::{params, params_from_iter, Connection, Row};

/// Storage for documents and their chunks.
pub trait DocumentStore: Send + Sync {
    /// Persist a new document and return its id.
    fn create(&self, title: &str, content: &str) -> Result<i64, MindmapError>;

    /// All documents, newest first.
    fn list(&self) -> Result<Vec<Document>, MindmapError>;

    /// Look up one document.
    fn get(&self, id: i64) -> Result<Option<Document>, MindmapError>;

    /// Fetch chunks by id. Unknown ids are skipped; order is unspecified.
    fn get_chunks(&self, ids: &[String]) -> Result<Vec<Chunk>, MindmapError>;

    /// Insert a chunk, replacing any chunk with the same id.
    fn put_chunk(&self, chunk: &Chunk) -> Result<(), MindmapError>;

    /// Ids of every chunk stored for one document.
    fn chunk_ids(&self, document_id: i64) -> Result<Vec<String>, MindmapError>;

    /// Remove chunks by id. Unknown ids are ignored.
    fn delete_chunks(&self, ids: &[String]) -> Result<(), MindmapError>;
}

/// [`DocumentStore`] backed by a SQLite file.
///
/// # Examples
///
/// ```
/// use mindmap_retrieval::docstore::{DocumentStore, SqliteDocumentStore};
///
/// let store = SqliteDocumentStore::in_memory().unwrap();
/// let id = store.create("Doc A", "Some text.").unwrap();
/// assert_eq!(store.get(id).unwrap().unwrap().title, "Doc A");
/// ```
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Open or create the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Database`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, MindmapError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MindmapError::Database(format!("failed to create store directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MindmapError::Database(format!("failed to open database: {e}")))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, MindmapError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            MindmapError::Database(format!("failed to create in-memory database: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, MindmapError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id)
            );
            ",
        )
        .map_err(|e| MindmapError::Database(format!("failed to create schema: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, MindmapError> {
        self.conn
            .lock()
            .map_err(|_| MindmapError::Database("store connection lock poisoned".into()))
    }

    /// Chunks of one document in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Database`] on query failure.
    pub fn chunks_for_document(&self, document_id: i64) -> Result<Vec<Chunk>, MindmapError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, document_id, text, chunk_index FROM chunks
                 WHERE document_id = ?1 ORDER BY chunk_index",
            )
            .map_err(|e| MindmapError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![document_id], chunk_from_row)
            .map_err(|e| MindmapError::Database(format!("failed to query chunks: {e}")))?;

        let chunks = rows
            .map(|r| r.map_err(|e| MindmapError::Database(format!("failed to read row: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chunks)
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn create(&self, title: &str, content: &str) -> Result<i64, MindmapError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (title, content, created_at) VALUES (?1, ?2, ?3)",
            params![title, content, now],
        )
        .map_err(|e| MindmapError::Database(format!("failed to insert document: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    fn list(&self) -> Result<Vec<Document>, MindmapError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, content, created_at FROM documents
                 ORDER BY julianday(created_at) DESC, id DESC",
            )
            .map_err(|e| MindmapError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], document_from_row)
            .map_err(|e| MindmapError::Database(format!("failed to query documents: {e}")))?;

        let docs = rows
            .map(|r| r.map_err(|e| MindmapError::Database(format!("failed to read row: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    fn get(&self, id: i64) -> Result<Option<Document>, MindmapError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT id, title, content, created_at FROM documents WHERE id = ?1",
            params![id],
            document_from_row,
        );

        match result {
            Ok(doc) => Ok(Some(doc)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(MindmapError::Database(format!(
                "failed to get document {id}: {e}"
            ))),
        }
    }

    fn get_chunks(&self, ids: &[String]) -> Result<Vec<Chunk>, MindmapError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT id, document_id, text, chunk_index FROM chunks WHERE id IN ({placeholders})"
        );

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| MindmapError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params_from_iter(ids.iter()), chunk_from_row)
            .map_err(|e| MindmapError::Database(format!("failed to query chunks: {e}")))?;

        let chunks = rows
            .map(|r| r.map_err(|e| MindmapError::Database(format!("failed to read row: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chunks)
    }

    fn put_chunk(&self, chunk: &Chunk) -> Result<(), MindmapError> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO chunks (id, document_id, text, chunk_index)
                 VALUES (?1, ?2, ?3, ?4)",
                params![chunk.id, chunk.document_id, chunk.text, chunk.index as i64],
            )
            .map_err(|e| MindmapError::Database(format!("failed to insert chunk: {e}")))?;
        Ok(())
    }

    fn chunk_ids(&self, document_id: i64) -> Result<Vec<String>, MindmapError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id FROM chunks WHERE document_id = ?1")
            .map_err(|e| MindmapError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![document_id], |row| row.get::<_, String>(0))
            .map_err(|e| MindmapError::Database(format!("failed to query chunk ids: {e}")))?;

        let ids = rows
            .map(|r| r.map_err(|e| MindmapError::Database(format!("failed to read row: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn delete_chunks(&self, ids: &[String]) -> Result<(), MindmapError> {
        if ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        self.lock()?
            .execute(
                &format!("DELETE FROM chunks WHERE id IN ({placeholders})"),
                params_from_iter(ids.iter()),
            )
            .map_err(|e| MindmapError::Database(format!("failed to delete chunks: {e}")))?;
        Ok(())
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let raw: String = row.get(3)?;
    let created_at = parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("invalid timestamp '{raw}'").into(),
        )
    })?;

    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        created_at,
    })
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        text: row.get(2)?,
        index: row.get::<_, i64>(3)? as usize,
    })
}

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` format (UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, document_id: i64, index: usize) -> Chunk {
        Chunk {
            id: id.into(),
            document_id,
            text: format!("text of {id}"),
            index,
        }
    }

    #[test]
    fn create_assigns_increasing_ids() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let a = store.create("A", "alpha").unwrap();
        let b = store.create("B", "beta").unwrap();
        assert!(b > a);
    }

    #[test]
    fn list_is_newest_first() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        store.create("first", "1").unwrap();
        store.create("second", "2").unwrap();
        store.create("third", "3").unwrap();

        let titles: Vec<String> = store.list().unwrap().into_iter().map(|d| d.title).collect();
        assert_eq!(titles, vec!["third", "second", "first"]);
    }

    #[test]
    fn get_missing_document_is_none() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        assert!(store.get(42).unwrap().is_none());
    }

    #[test]
    fn put_chunk_replaces_on_id() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let doc = store.create("A", "alpha").unwrap();
        store.put_chunk(&chunk("c1", doc, 0)).unwrap();

        let mut updated = chunk("c1", doc, 0);
        updated.text = "new text".into();
        store.put_chunk(&updated).unwrap();

        let chunks = store.get_chunks(&["c1".into()]).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "new text");
    }

    #[test]
    fn get_chunks_skips_unknown_ids() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let doc = store.create("A", "alpha").unwrap();
        store.put_chunk(&chunk("c1", doc, 0)).unwrap();
        store.put_chunk(&chunk("c2", doc, 1)).unwrap();

        let mut found = store
            .get_chunks(&["c2".into(), "missing".into(), "c1".into()])
            .unwrap();
        found.sort_by_key(|c| c.index);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "c1");
        assert_eq!(found[1].id, "c2");
        assert!(store.get_chunks(&[]).unwrap().is_empty());
    }

    #[test]
    fn chunks_for_document_are_in_sequence() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let doc = store.create("A", "alpha").unwrap();
        let other = store.create("B", "beta").unwrap();
        store.put_chunk(&chunk("c2", doc, 1)).unwrap();
        store.put_chunk(&chunk("c1", doc, 0)).unwrap();
        store.put_chunk(&chunk("x", other, 0)).unwrap();

        let ids: Vec<String> = store
            .chunks_for_document(doc)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[test]
    fn reads_legacy_timestamps() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO documents (title, content) VALUES ('old', 'legacy row')",
                [],
            )
            .unwrap();

        let docs = store.list().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "old");
    }

    #[test]
    fn list_orders_mixed_timestamp_formats_by_instant() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        {
            let conn = store.lock().unwrap();
            conn.execute(
                "INSERT INTO documents (title, content, created_at)
                 VALUES ('legacy', 'later', '2024-05-01 10:00:00')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO documents (title, content, created_at)
                 VALUES ('rfc', 'earlier', '2024-05-01T09:00:00.000000Z')",
                [],
            )
            .unwrap();
        }

        let titles: Vec<String> = store.list().unwrap().into_iter().map(|d| d.title).collect();
        assert_eq!(titles, vec!["legacy", "rfc"]);
    }

    #[test]
    fn delete_chunks_removes_only_named_rows() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let doc = store.create("A", "alpha").unwrap();
        store.put_chunk(&chunk("c1", doc, 0)).unwrap();
        store.put_chunk(&chunk("c2", doc, 1)).unwrap();

        store.delete_chunks(&["c1".into(), "missing".into()]).unwrap();
        store.delete_chunks(&[]).unwrap();

        assert_eq!(store.chunk_ids(doc).unwrap(), vec!["c2"]);
    }

    #[test]
    fn parse_timestamp_formats() {
        assert!(parse_timestamp("2024-05-01T10:00:00.123456Z").is_some());
        assert!(parse_timestamp("2024-05-01 10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mindmap_rag.db");
        {
            let store = SqliteDocumentStore::open(&path).unwrap();
            store.create("A", "alpha").unwrap();
        }
        let store = SqliteDocumentStore::open(&path).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
