use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored source document. Immutable once created.
///
/// # Examples
///
/// ```
/// use mindmap_core::Document;
///
/// let doc = Document {
///     id: 1,
///     title: "Doc A".into(),
///     content: "Some text.".into(),
///     created_at: chrono::Utc::now(),
/// };
/// assert_eq!(doc.preview(4), "Some...");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Store-assigned identity.
    pub id: i64,
    /// Human-readable title.
    pub title: String,
    /// Full text.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// First `max_chars` characters of the content, with an ellipsis if cut.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}

/// A contiguous span of a document's text, the unit of embedding and retrieval.
///
/// The `id` is derived deterministically from the parent document id, the
/// sequence index, and a prefix of the text, so re-ingesting unchanged text
/// produces the same ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Deterministic chunk identity.
    pub id: String,
    /// Parent document id.
    pub document_id: i64,
    /// Trimmed chunk text.
    pub text: String,
    /// Position within the parent document (0-based).
    pub index: usize,
}

/// Provenance carried alongside each vector so hits can be attributed
/// without a round trip to the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Parent document id.
    pub document_id: i64,
    /// Parent document title.
    pub document_title: String,
    /// Position within the parent document.
    pub chunk_index: usize,
    /// First 200 characters of the chunk text.
    #[serde(default)]
    pub text_preview: String,
}

/// A vector index entry: one per chunk id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Chunk id.
    pub id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Provenance metadata.
    pub metadata: ChunkMetadata,
}

/// A single hit from a vector index query.
///
/// `score` is whatever the backing index reports; callers only rely on
/// hits being ordered by it, highest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexHit {
    /// Chunk id.
    pub id: String,
    /// Similarity score.
    pub score: f64,
    /// Provenance metadata, when the index returned it.
    pub metadata: Option<ChunkMetadata>,
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use mindmap_core::OutputFormat;
///
/// let fmt: OutputFormat = "svg".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Svg);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Standalone SVG document (query subcommand only).
    Svg,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Svg => write!(f, "svg"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "svg" => Ok(OutputFormat::Svg),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("svg".parse::<OutputFormat>().unwrap(), OutputFormat::Svg);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn output_format_default_is_text() {
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
        assert_eq!(OutputFormat::Svg.to_string(), "svg");
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        let doc = Document {
            id: 1,
            title: "t".into(),
            content: "héllo wörld".into(),
            created_at: Utc::now(),
        };
        assert_eq!(doc.preview(5), "héllo...");
        assert_eq!(doc.preview(100), "héllo wörld");
    }

    #[test]
    fn metadata_tolerates_missing_preview() {
        let json = r#"{"document_id":3,"document_title":"T","chunk_index":2}"#;
        let meta: ChunkMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.document_id, 3);
        assert!(meta.text_preview.is_empty());
    }
}
