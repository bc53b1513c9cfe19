//! Boundary-aware text chunking.
//!
//! Slides a fixed-size character window across the text. Chunks that do not
//! reach the end of the text are cut back to the last sentence terminator
//! (`.`) or newline when that boundary lies past the window midpoint, so
//! chunks tend to end on whole sentences. Consecutive windows overlap by a
//! fixed number of characters.

use mindmap_core::{Chunk, ChunkingConfig, Document, MindmapError};
use sha2::{Digest, Sha256};

/// Number of leading characters of a chunk mixed into its id.
const ID_PREFIX_CHARS: usize = 50;

/// Split `text` into overlapping, trimmed, non-empty chunks.
///
/// Sizes are measured in characters, not bytes. The function is pure: the
/// same input always yields the same sequence.
///
/// The window stops once it reaches the end of the text, so no trailing chunk
/// made only of the previous chunk's overlap is emitted. A 2500-character
/// text at size 1000 with overlap 200 therefore yields 3 chunks, not 4.
///
/// # Errors
///
/// Returns [`MindmapError::Input`] if `chunk_size` is zero or `overlap` is
/// not smaller than `chunk_size`.
///
/// # Examples
///
/// ```
/// use mindmap_retrieval::chunker::chunk_text;
///
/// assert!(chunk_text("", 1000, 200).unwrap().is_empty());
/// assert_eq!(chunk_text("short", 1000, 200).unwrap(), vec!["short"]);
/// ```
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, MindmapError> {
    validate_params(chunk_size, overlap)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let chunks = chunk_spans(&chars, chunk_size, overlap)
        .into_iter()
        .filter_map(|(start, end)| {
            let raw: String = chars[start..end].iter().collect();
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect();

    Ok(chunks)
}

/// Chunk a stored document, assigning sequence indices and deterministic ids.
///
/// # Errors
///
/// Returns [`MindmapError::Input`] if the chunking parameters are invalid.
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, MindmapError> {
    let texts = chunk_text(&document.content, config.chunk_size, config.overlap)?;
    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            id: chunk_id(document.id, index, &text),
            document_id: document.id,
            text,
            index,
        })
        .collect())
}

/// Derive the stable id for a chunk.
///
/// The id is the hex SHA-256 of `"{document_id}_{index}_{prefix}"`, where
/// `prefix` is the first 50 characters of the chunk text. Two chunks that
/// collide on all three inputs share an id, and the later upsert wins.
///
/// # Examples
///
/// ```
/// use mindmap_retrieval::chunker::chunk_id;
///
/// let id = chunk_id(1, 0, "Hello world");
/// assert_eq!(id, chunk_id(1, 0, "Hello world"));
/// assert_eq!(id.len(), 64);
/// ```
pub fn chunk_id(document_id: i64, index: usize, text: &str) -> String {
    let prefix: String = text.chars().take(ID_PREFIX_CHARS).collect();
    let mut hasher = Sha256::new();
    hasher.update(format!("{document_id}_{index}_{prefix}").as_bytes());
    format!("{:x}", hasher.finalize())
}

fn validate_params(chunk_size: usize, overlap: usize) -> Result<(), MindmapError> {
    if chunk_size == 0 {
        return Err(MindmapError::Input("chunk_size must be positive".into()));
    }
    if overlap >= chunk_size {
        return Err(MindmapError::Input(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Untrimmed `[start, end)` character spans of each window.
fn chunk_spans(chars: &[char], chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let len = chars.len();
    let mut spans = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + chunk_size).min(len);

        if end < len {
            let window = &chars[start..end];
            if let Some(break_point) = window.iter().rposition(|&c| c == '.' || c == '\n') {
                if break_point > chunk_size / 2 {
                    end = start + break_point + 1;
                }
            }
        }

        spans.push((start, end));

        if end >= len {
            break;
        }

        // A shortened window plus a large overlap can point backwards.
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    spans
}
