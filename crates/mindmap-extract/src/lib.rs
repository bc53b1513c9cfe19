//! Knowledge graph extraction and the end-to-end query pipeline.
//!
//! A chat model is prompted with retrieved context and a fixed JSON
//! schema; its answer is parsed into a [`mindmap_graph::Graph`]. The
//! [`pipeline::MindMapPipeline`] chains retrieval, extraction, layout and
//! rendering into one query call.

pub mod extractor;
pub mod llm;
pub mod pipeline;
pub mod prompt;
