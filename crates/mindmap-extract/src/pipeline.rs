//! End-to-end question answering: retrieve context, extract a graph, then
//! lay it out and render it.
//!
//! A query with no matching chunks stops before the model is called. A
//! failed extraction is reported as [`QueryOutcome::NoGraph`] together with
//! the hits, so callers can still show the sources.

use std::sync::Arc;

use mindmap_core::{
    Chunk, Document, IndexHit, MindmapConfig, MindmapError, RetrievalConfig, MAX_NODES_RANGE,
    TOP_K_RANGE,
};
use mindmap_graph::{layout_and_render, Graph, GraphPayload, RenderScene};
use mindmap_retrieval::docstore::SqliteDocumentStore;
use mindmap_retrieval::embedding::EmbeddingClient;
use mindmap_retrieval::index::open_index;
use mindmap_retrieval::ingest::{IngestReport, Retriever};
use serde::Serialize;
use tracing::{info, warn};

use crate::extractor::{ExtractionFailure, GraphExtractor};
use crate::llm::LlmClient;

/// A rendered answer to one question.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MindMap {
    /// The question asked.
    pub question: String,
    /// Validated graph.
    pub graph: Graph,
    /// Model output as decoded, before edge pruning.
    pub raw: GraphPayload,
    /// Positioned, styled scene.
    pub scene: RenderScene,
    /// Index hits, best first.
    pub hits: Vec<IndexHit>,
    /// Chunk texts used as context, in hit order.
    pub sources: Vec<Chunk>,
}

/// What a query produced.
///
/// Only [`QueryOutcome::MindMap`] carries a graph; the other two variants
/// are expected outcomes, not errors.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// Nothing relevant was retrieved, so the model was not called.
    NoHits,
    /// Context was retrieved but no graph could be built from the reply.
    NoGraph {
        /// Why extraction failed.
        failure: ExtractionFailure,
        /// The hits whose text was sent to the model.
        hits: Vec<IndexHit>,
    },
    /// A graph was extracted and rendered.
    MindMap(Box<MindMap>),
}

/// Query orchestrator: embed, search, fetch, extract, lay out, render.
///
/// Each stage consumes the full output of the previous one. Only the
/// vector index and document store hold state across calls.
pub struct MindMapPipeline {
    retriever: Retriever,
    extractor: GraphExtractor,
    retrieval: RetrievalConfig,
}

impl MindMapPipeline {
    /// Create a pipeline from prebuilt components.
    pub fn new(retriever: Retriever, extractor: GraphExtractor, retrieval: RetrievalConfig) -> Self {
        Self {
            retriever,
            extractor,
            retrieval,
        }
    }

    /// Build every component from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Config`] for invalid tunables or missing
    /// credentials, or the store/index error if a database cannot be opened.
    pub fn from_config(config: &MindmapConfig) -> Result<Self, MindmapError> {
        config.validate()?;

        let embedder = Arc::new(EmbeddingClient::with_config(&config.embedding)?);
        let index = open_index(&config.index)?;
        let store = Arc::new(SqliteDocumentStore::open(&config.store.path)?);
        let llm = Arc::new(LlmClient::new(&config.llm)?);

        let retriever = Retriever::new(
            embedder,
            index,
            store,
            config.chunking.clone(),
            config.ingest.embed_concurrency,
        );
        let extractor = GraphExtractor::with_config(llm, &config.llm);

        Ok(Self::new(retriever, extractor, config.retrieval.clone()))
    }

    /// The retriever behind this pipeline.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Store and index a document.
    ///
    /// # Errors
    ///
    /// See [`Retriever::ingest`].
    pub async fn ingest(&self, title: &str, content: &str) -> Result<IngestReport, MindmapError> {
        self.retriever.ingest(title, content).await
    }

    /// All stored documents, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Database`] if the store cannot be read.
    pub fn documents(&self) -> Result<Vec<Document>, MindmapError> {
        self.retriever.store().list()
    }

    /// Answer `question` with the configured `top_k` and `max_nodes`.
    ///
    /// # Errors
    ///
    /// See [`MindMapPipeline::query_with`].
    pub async fn query(&self, question: &str) -> Result<QueryOutcome, MindmapError> {
        self.query_with(question, self.retrieval.top_k, self.retrieval.max_nodes)
            .await
    }

    /// Answer `question` with explicit tunables.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Input`] for a blank question or out-of-range
    /// tunables (checked before any network call), and the embedding, index
    /// or store error if retrieval fails. Model failures are reported as
    /// [`QueryOutcome::NoGraph`], not errors.
    pub async fn query_with(
        &self,
        question: &str,
        top_k: usize,
        max_nodes: usize,
    ) -> Result<QueryOutcome, MindmapError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(MindmapError::Input("question is empty".into()));
        }
        if !TOP_K_RANGE.contains(&top_k) {
            return Err(MindmapError::Input(format!(
                "top_k must be within {}..={}, got {top_k}",
                TOP_K_RANGE.start(),
                TOP_K_RANGE.end()
            )));
        }
        if !MAX_NODES_RANGE.contains(&max_nodes) {
            return Err(MindmapError::Input(format!(
                "max_nodes must be within {}..={}, got {max_nodes}",
                MAX_NODES_RANGE.start(),
                MAX_NODES_RANGE.end()
            )));
        }

        let retrieval = self.retriever.retrieve(question, top_k).await?;
        if retrieval.is_empty() {
            return Ok(QueryOutcome::NoHits);
        }
        if retrieval.chunks.is_empty() {
            warn!(hits = retrieval.hits.len(), "no stored text for any hit");
            return Ok(QueryOutcome::NoHits);
        }

        let context = retrieval.context();
        let extraction = match self.extractor.extract(question, &context, max_nodes).await {
            Ok(extraction) => extraction,
            Err(failure) => {
                warn!(%failure, "no graph could be built");
                return Ok(QueryOutcome::NoGraph {
                    failure,
                    hits: retrieval.hits,
                });
            }
        };

        let scene = layout_and_render(&extraction.graph);
        info!(
            nodes = scene.nodes.len(),
            edges = scene.edges.len(),
            sources = retrieval.chunks.len(),
            "built mind map"
        );

        Ok(QueryOutcome::MindMap(Box::new(MindMap {
            question: question.to_string(),
            graph: extraction.graph,
            raw: extraction.raw,
            scene,
            hits: retrieval.hits,
            sources: retrieval.chunks,
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use mindmap_core::ChunkingConfig;
    use mindmap_retrieval::embedding::Embedder;
    use mindmap_retrieval::local::LocalIndex;

    use super::*;
    use crate::llm::{ChatMessage, ChatModel};

    /// Embeds by counting a few topic words.
    struct TopicEmbedder;

    #[async_trait]
    impl Embedder for TopicEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, MindmapError> {
            let lower = text.to_lowercase();
            let mut v: Vec<f32> = ["rust", "memory", "python"]
                .iter()
                .map(|t| lower.matches(t).count() as f32)
                .collect();
            v.push(0.1);
            Ok(v)
        }

        fn model(&self) -> &str {
            "topic"
        }
    }

    struct ScriptedModel {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, MindmapError> {
            if let Some(user) = messages.last() {
                self.prompts.lock().unwrap().push(user.content.clone());
            }
            self.reply
                .clone()
                .ok_or_else(|| MindmapError::Model("connection refused".into()))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    const GRAPH: &str = r#"{"nodes":[{"id":"n1","label":"Rust","type":"Tool"},{"id":"n2","label":"Memory safety","type":"Concept"}],
"edges":[{"source":"n1","target":"n2","label":"provides"},{"source":"n2","target":"missing","label":"x"}]}"#;

    fn pipeline(reply: Option<&str>) -> (MindMapPipeline, Arc<ScriptedModel>) {
        let model = Arc::new(ScriptedModel {
            reply: reply.map(str::to_string),
            prompts: Mutex::new(Vec::new()),
        });
        let retriever = Retriever::new(
            Arc::new(TopicEmbedder),
            Arc::new(LocalIndex::in_memory().unwrap()),
            Arc::new(SqliteDocumentStore::in_memory().unwrap()),
            ChunkingConfig {
                chunk_size: 80,
                overlap: 10,
            },
            2,
        );
        let extractor = GraphExtractor::new(model.clone(), 8000);
        (
            MindMapPipeline::new(retriever, extractor, RetrievalConfig::default()),
            model,
        )
    }

    const DOC: &str = "Rust guarantees memory safety without a garbage collector.\n\
                       Python manages memory with reference counting.";

    #[tokio::test]
    async fn empty_index_is_no_hits_without_model_call() {
        let (p, model) = pipeline(Some(GRAPH));

        let outcome = p.query("What does Rust provide?").await.unwrap();

        assert!(matches!(outcome, QueryOutcome::NoHits));
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_builds_rendered_mind_map() {
        let (p, model) = pipeline(Some(GRAPH));
        p.ingest("Languages", DOC).await.unwrap();

        let outcome = p.query("What does Rust provide?").await.unwrap();

        let QueryOutcome::MindMap(map) = outcome else {
            panic!("expected a mind map, got {outcome:?}");
        };
        assert_eq!(map.graph.nodes().len(), 2);
        assert_eq!(map.graph.edges().len(), 1);
        assert_eq!(map.raw.edges.len(), 2);
        assert_eq!(map.scene.nodes.len(), 2);
        assert_eq!(map.scene.annotations.len(), 1);
        assert!(!map.sources.is_empty());

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("garbage collector"));
    }

    #[tokio::test]
    async fn prose_reply_is_no_graph() {
        let (p, _) = pipeline(Some("I cannot answer this."));
        p.ingest("Languages", DOC).await.unwrap();

        let outcome = p.query("What does Rust provide?").await.unwrap();

        match outcome {
            QueryOutcome::NoGraph { failure, hits } => {
                assert!(matches!(failure, ExtractionFailure::InvalidJson(_)));
                assert!(!hits.is_empty());
            }
            other => panic!("expected NoGraph, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn model_outage_is_no_graph_service_failure() {
        let (p, _) = pipeline(None);
        p.ingest("Languages", DOC).await.unwrap();

        let outcome = p.query("What does Rust provide?").await.unwrap();

        let QueryOutcome::NoGraph { failure, .. } = outcome else {
            panic!("expected NoGraph");
        };
        assert!(failure.is_service_error());
    }

    #[tokio::test]
    async fn out_of_range_tunables_are_input_errors() {
        let (p, model) = pipeline(Some(GRAPH));

        for (top_k, max_nodes) in [(0, 15), (21, 15), (10, 9), (10, 31)] {
            let err = p.query_with("q", top_k, max_nodes).await.unwrap_err();
            assert!(matches!(err, MindmapError::Input(_)), "{top_k}/{max_nodes}");
        }
        assert!(matches!(
            p.query("   ").await.unwrap_err(),
            MindmapError::Input(_)
        ));
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn documents_lists_ingested() {
        let (p, _) = pipeline(Some(GRAPH));
        p.ingest("First", DOC).await.unwrap();
        p.ingest("Second", DOC).await.unwrap();

        let titles: Vec<String> = p.documents().unwrap().into_iter().map(|d| d.title).collect();
        assert_eq!(titles, ["Second", "First"]);
    }
}
