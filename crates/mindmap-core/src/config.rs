use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MindmapError;

/// Valid range for retrieval breadth (`retrieval.top_k`).
pub const TOP_K_RANGE: RangeInclusive<usize> = 5..=20;

/// Valid range for the graph size cap (`retrieval.max_nodes`).
pub const MAX_NODES_RANGE: RangeInclusive<usize> = 10..=30;

/// Top-level configuration loaded from `.mindmap.toml`.
///
/// Resolution order: CLI flags > config file > environment > defaults.
/// The struct is built once in `main` and passed by reference to every
/// component; nothing below the binary reads the environment.
///
/// # Examples
///
/// ```
/// use mindmap_core::MindmapConfig;
///
/// let config = MindmapConfig::default();
/// assert_eq!(config.retrieval.top_k, 10);
/// assert_eq!(config.chunking.chunk_size, 1000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MindmapConfig {
    /// Language-model provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Vector index backend settings.
    #[serde(default)]
    pub index: IndexConfig,
    /// Retrieval and graph size tunables.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Chunking parameters.
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Ingest behavior.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Document store location.
    #[serde(default)]
    pub store: StoreConfig,
}

impl MindmapConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Io`] if the file cannot be read, or
    /// [`MindmapError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, MindmapError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use mindmap_core::MindmapConfig;
    ///
    /// let toml = r#"
    /// [retrieval]
    /// top_k = 12
    /// "#;
    /// let config = MindmapConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.retrieval.top_k, 12);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, MindmapError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Fill unset credentials and endpoints from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Fill unset credentials and endpoints using `lookup` as the
    /// environment. Values already present in the file always win.
    ///
    /// Recognized keys: `OPENAI_API_KEY`, `OPENAI_BASE_URL`,
    /// `UPSTASH_VECTOR_URL`, `UPSTASH_VECTOR_TOKEN`, `MINDMAP_DB`.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key.get_or_insert_with(|| key.clone());
            self.embedding.api_key.get_or_insert(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url.get_or_insert_with(|| url.clone());
            self.embedding.base_url.get_or_insert(url);
        }
        if let Some(url) = lookup("UPSTASH_VECTOR_URL") {
            self.index.url.get_or_insert(url);
        }
        if let Some(token) = lookup("UPSTASH_VECTOR_TOKEN") {
            self.index.token.get_or_insert(token);
        }
        if self.store.path == default_store_path() {
            if let Some(path) = lookup("MINDMAP_DB") {
                self.store.path = PathBuf::from(path);
            }
        }
    }

    /// Check tunables against their valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Config`] naming the first invalid setting.
    pub fn validate(&self) -> Result<(), MindmapError> {
        let r = &self.retrieval;
        if !TOP_K_RANGE.contains(&r.top_k) {
            return Err(MindmapError::Config(format!(
                "retrieval.top_k must be within {}..={}, got {}",
                TOP_K_RANGE.start(),
                TOP_K_RANGE.end(),
                r.top_k
            )));
        }
        if !MAX_NODES_RANGE.contains(&r.max_nodes) {
            return Err(MindmapError::Config(format!(
                "retrieval.max_nodes must be within {}..={}, got {}",
                MAX_NODES_RANGE.start(),
                MAX_NODES_RANGE.end(),
                r.max_nodes
            )));
        }

        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(MindmapError::Config(
                "chunking.chunk_size must be positive".into(),
            ));
        }
        if c.overlap >= c.chunk_size {
            return Err(MindmapError::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                c.overlap, c.chunk_size
            )));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(MindmapError::Config(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(MindmapError::Config("llm.max_tokens must be positive".into()));
        }
        if self.ingest.embed_concurrency == 0 {
            return Err(MindmapError::Config(
                "ingest.embed_concurrency must be positive".into(),
            ));
        }

        Ok(())
    }
}

/// Language-model provider configuration.
///
/// Any OpenAI-compatible `/v1/chat/completions` endpoint works.
///
/// # Examples
///
/// ```
/// use mindmap_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o");
/// assert_eq!(config.context_char_budget, 8000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL (default: `https://api.openai.com`).
    pub base_url: Option<String>,
    /// Sampling temperature. Kept low so output stays schema-conformant.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Output length cap in tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Hard character budget applied to retrieved context before prompting.
    #[serde(default = "default_context_char_budget")]
    pub context_char_budget: usize,
    /// Ask the provider for a JSON object response format.
    #[serde(default)]
    pub json_mode: bool,
    /// HTTP timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_context_char_budget() -> usize {
    8000
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_char_budget: default_context_char_budget(),
            json_mode: false,
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Embedding provider configuration.
///
/// # Examples
///
/// ```
/// use mindmap_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.model, "text-embedding-3-small");
/// assert_eq!(config.dimensions, 1536);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// API key for the embedding provider.
    pub api_key: Option<String>,
    /// Custom base URL (default: `https://api.openai.com`).
    pub base_url: Option<String>,
    /// Expected embedding dimensions.
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_embedding_dimensions() -> usize {
    1536
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            api_key: None,
            base_url: None,
            dimensions: default_embedding_dimensions(),
        }
    }
}

/// Which vector index implementation backs retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Upstash Vector REST API.
    #[default]
    Upstash,
    /// SQLite file on local disk.
    Local,
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Backend selection (default: `"upstash"`).
    #[serde(default)]
    pub backend: IndexBackend,
    /// REST endpoint for the Upstash index.
    pub url: Option<String>,
    /// Bearer token for the Upstash index.
    pub token: Option<String>,
    /// Database path for the local backend.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".mindmap/index.db")
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            url: None,
            token: None,
            path: default_index_path(),
        }
    }
}

/// Retrieval breadth and graph size cap.
///
/// # Examples
///
/// ```
/// use mindmap_core::RetrievalConfig;
///
/// let config = RetrievalConfig::default();
/// assert_eq!(config.top_k, 10);
/// assert_eq!(config.max_nodes, 15);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks to retrieve per query (default: 10).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum nodes in the extracted mind map (default: 15).
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
}

fn default_top_k() -> usize {
    10
}

fn default_max_nodes() -> usize {
    15
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_nodes: default_max_nodes(),
        }
    }
}

/// Chunking parameters, measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size (default: 1000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters carried into the next chunk (default: 200).
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_overlap() -> usize {
    200
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

/// Ingest behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum embedding requests in flight per document (default: 4).
    #[serde(default = "default_embed_concurrency")]
    pub embed_concurrency: usize,
}

fn default_embed_concurrency() -> usize {
    4
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            embed_concurrency: default_embed_concurrency(),
        }
    }
}

/// Document store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path (default: `mindmap_rag.db`).
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("mindmap_rag.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}
