//! Turns a question plus retrieved context into a typed [`Graph`].

use std::sync::Arc;

use mindmap_core::{LlmConfig, MindmapError};
use mindmap_graph::{Graph, GraphPayload};
use tracing::{debug, warn};

use crate::llm::{ChatMessage, ChatModel};
use crate::prompt::{build_system_prompt, build_user_prompt, parse_graph_response};

/// Why no graph could be built for a query.
///
/// This is a recoverable outcome, not a fatal error: callers show "no graph
/// could be built" along with the cause.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionFailure {
    /// The model service call itself failed.
    #[error("model service error: {0}")]
    Service(String),

    /// The model replied with nothing usable.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// The reply was not a JSON object.
    #[error("model response is not valid JSON: {0}")]
    InvalidJson(String),

    /// A required top-level key was absent.
    #[error("model response is missing `{0}`")]
    MissingField(String),

    /// A node or edge had the wrong shape.
    #[error("model response has a malformed node or edge: {0}")]
    MalformedElement(String),
}

impl ExtractionFailure {
    /// `true` when the call failed rather than the content.
    pub fn is_service_error(&self) -> bool {
        matches!(self, Self::Service(_))
    }
}

impl From<MindmapError> for ExtractionFailure {
    fn from(err: MindmapError) -> Self {
        Self::Service(err.to_string())
    }
}

/// A successful extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Validated graph with unknown-endpoint edges pruned.
    pub graph: Graph,
    /// The decoded model output before validation, for inspection.
    pub raw: GraphPayload,
}

/// Prompts a [`ChatModel`] and decodes its reply into a graph.
///
/// Makes exactly one model call per [`extract`](GraphExtractor::extract).
pub struct GraphExtractor {
    model: Arc<dyn ChatModel>,
    context_budget: usize,
}

impl GraphExtractor {
    /// Create an extractor that cuts context to `context_budget` characters.
    pub fn new(model: Arc<dyn ChatModel>, context_budget: usize) -> Self {
        Self {
            model,
            context_budget,
        }
    }

    /// Create an extractor using the budget from `config`.
    pub fn with_config(model: Arc<dyn ChatModel>, config: &LlmConfig) -> Self {
        Self::new(model, config.context_char_budget)
    }

    /// Ask the model for a graph of at most `max_nodes` nodes answering
    /// `question` from `context`.
    ///
    /// `max_nodes` is a prompt instruction; larger graphs are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionFailure::Service`] if the model call fails, and
    /// the matching content variant if the reply cannot be decoded.
    pub async fn extract(
        &self,
        question: &str,
        context: &str,
        max_nodes: usize,
    ) -> Result<Extraction, ExtractionFailure> {
        let messages = vec![
            ChatMessage::system(build_system_prompt(max_nodes)),
            ChatMessage::user(build_user_prompt(
                question,
                context,
                max_nodes,
                self.context_budget,
            )),
        ];

        let reply = self.model.chat(messages).await?;
        let raw = parse_graph_response(&reply).inspect_err(|failure| {
            warn!(model = self.model.model(), %failure, "could not decode graph");
        })?;

        let graph = Graph::from(raw.clone());
        debug!(
            nodes = graph.nodes().len(),
            edges = graph.edges().len(),
            dropped_edges = raw.edges.len() - graph.edges().len(),
            "extracted graph"
        );
        Ok(Extraction { graph, raw })
    }
}
