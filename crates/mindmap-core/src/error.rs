/// Errors that can occur anywhere in the ingest and query pipelines.
///
/// Each variant names the stage that failed so the CLI can render a
/// specific message. Library crates use this type directly; the binary
/// converts to a `miette` diagnostic at the boundary.
///
/// Zero retrieval hits and unusable model output are *not* errors; they are
/// reported through the query outcome instead.
///
/// # Examples
///
/// ```
/// use mindmap_core::MindmapError;
///
/// let err = MindmapError::Input("top_k must be positive".into());
/// assert!(err.to_string().contains("top_k"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum MindmapError {
    /// Malformed caller input, rejected before any network call.
    #[error("invalid input: {0}")]
    Input(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Embedding service failure (transport, auth, or malformed response).
    #[error("embedding service error: {0}")]
    Embedding(String),

    /// Vector index failure. `failed_ids` is `None` when the backing
    /// service reports an opaque batch failure.
    #[error("vector index error (ids: {}): {message}", format_ids(.failed_ids))]
    VectorIndex {
        /// Entry ids that were part of the failed request, if known.
        failed_ids: Option<Vec<String>>,
        /// Description of the failure.
        message: String,
    },

    /// Language-model service failure.
    #[error("model service error: {0}")]
    Model(String),

    /// Document store or local index database failure.
    #[error("database error: {0}")]
    Database(String),

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl MindmapError {
    /// Vector index error for an opaque failure (ids unknown).
    pub fn index_opaque(message: impl Into<String>) -> Self {
        Self::VectorIndex {
            failed_ids: None,
            message: message.into(),
        }
    }

    /// Vector index error naming the ids that failed.
    pub fn index_failed(ids: Vec<String>, message: impl Into<String>) -> Self {
        Self::VectorIndex {
            failed_ids: Some(ids),
            message: message.into(),
        }
    }

    /// Short stage name for user-facing messages.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::Config(_) | Self::Toml(_) => "configuration",
            Self::Embedding(_) => "embedding",
            Self::VectorIndex { .. } => "vector index",
            Self::Model(_) => "model",
            Self::Database(_) => "document store",
            Self::Io(_) | Self::Serialization(_) => "io",
        }
    }
}

fn format_ids(ids: &Option<Vec<String>>) -> String {
    match ids {
        Some(ids) if !ids.is_empty() => ids.join(", "),
        _ => "unknown".into(),
    }
}
