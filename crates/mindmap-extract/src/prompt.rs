//! Prompt construction and response decoding for graph extraction.

use mindmap_graph::GraphPayload;

use crate::extractor::ExtractionFailure;

/// Smallest node count the model is asked for.
const MIN_NODES: usize = 5;

/// System prompt template. `{min}` and `{max}` are replaced with the node
/// count bounds.
const SYSTEM_PROMPT: &str = r#"You are a knowledge graph extraction assistant. Given a question and supporting context, extract the key entities and the relationships between them as a knowledge graph that answers the question.

Respond with a JSON object matching this schema exactly:
{
  "nodes": [
    {"id": "unique_id", "label": "Display Name", "type": "Concept|Person|Organization|Tool|Method|Dataset"}
  ],
  "edges": [
    {"source": "node_id", "target": "node_id", "label": "relationship"}
  ]
}

Rules:
- Extract between {min} and {max} of the most relevant nodes.
- Keep labels short, at most a few words.
- Use diverse, descriptive relationship labels such as "uses", "contains", "relates_to", "part_of".
- Every edge source and target must be the id of a node you declared.
- Respond ONLY with the JSON object, no prose or explanation."#;

/// Build the system prompt for a graph of at most `max_nodes` nodes.
///
/// # Examples
///
/// ```
/// use mindmap_extract::prompt::build_system_prompt;
///
/// let prompt = build_system_prompt(20);
/// assert!(prompt.contains("between 5 and 20"));
/// assert!(prompt.contains("\"nodes\""));
/// ```
pub fn build_system_prompt(max_nodes: usize) -> String {
    SYSTEM_PROMPT
        .replace("{min}", &MIN_NODES.min(max_nodes).to_string())
        .replace("{max}", &max_nodes.to_string())
}

/// Build the user message carrying the question and context.
///
/// `context` is cut to `context_budget` characters (a hard character count,
/// not tokens). The question is never truncated.
///
/// # Examples
///
/// ```
/// use mindmap_extract::prompt::build_user_prompt;
///
/// let prompt = build_user_prompt("What is Rust?", "Rust is a language.", 15, 4);
/// assert!(prompt.starts_with("Question: What is Rust?"));
/// assert!(prompt.contains("Context:\nRust\n"));
/// assert!(prompt.contains("up to 15 nodes"));
/// ```
pub fn build_user_prompt(
    question: &str,
    context: &str,
    max_nodes: usize,
    context_budget: usize,
) -> String {
    let context = truncate_chars(context, context_budget);
    format!(
        "Question: {question}\n\nContext:\n{context}\n\nExtract a knowledge graph with up to {max_nodes} nodes that answers the question."
    )
}

/// First `max_chars` characters of `text`, on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// Strip a surrounding Markdown code fence, with or without a `json` tag.
///
/// Text after the closing fence is discarded. Unfenced input is returned
/// trimmed.
///
/// # Examples
///
/// ```
/// use mindmap_extract::prompt::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
/// assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
/// ```
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    let inner = inner.trim_start();
    let inner = match inner.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &inner[4..],
        _ => inner,
    };
    inner.trim()
}

/// Decode a model reply into the graph wire schema.
///
/// Checks run in order: non-empty, valid JSON, a top-level object, both
/// `nodes` and `edges` present, then element shape.
///
/// # Errors
///
/// Returns the [`ExtractionFailure`] for the first check that fails.
///
/// # Examples
///
/// ```
/// use mindmap_extract::prompt::parse_graph_response;
///
/// let payload = parse_graph_response(r#"{"nodes":[{"id":"a"}],"edges":[]}"#).unwrap();
/// assert_eq!(payload.nodes.len(), 1);
/// assert!(parse_graph_response("I cannot answer this.").is_err());
/// ```
pub fn parse_graph_response(raw: &str) -> Result<GraphPayload, ExtractionFailure> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(ExtractionFailure::EmptyResponse);
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ExtractionFailure::InvalidJson(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| ExtractionFailure::InvalidJson("top-level value is not an object".into()))?;
    for key in ["nodes", "edges"] {
        if !object.contains_key(key) {
            return Err(ExtractionFailure::MissingField(key.into()));
        }
    }

    serde_json::from_value(value).map_err(|e| ExtractionFailure::MalformedElement(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_lower_bound_never_exceeds_max() {
        assert!(build_system_prompt(3).contains("between 3 and 3"));
        assert!(build_system_prompt(30).contains("between 5 and 30"));
    }

    #[test]
    fn system_prompt_lists_node_types() {
        let prompt = build_system_prompt(15);
        for t in ["Concept", "Person", "Organization", "Tool", "Method", "Dataset"] {
            assert!(prompt.contains(t), "missing {t}");
        }
        assert!(!prompt.contains("{min}"));
    }

    #[test]
    fn context_is_truncated_by_characters() {
        let context = "é".repeat(10);
        let prompt = build_user_prompt("q", &context, 10, 3);
        assert!(prompt.contains("Context:\nééé\n\n"));
    }

    #[test]
    fn question_is_not_truncated() {
        let question = "why ".repeat(50);
        let prompt = build_user_prompt(&question, "ctx", 10, 1);
        assert!(prompt.contains(&question));
    }

    #[test]
    fn strip_fence_without_tag() {
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
    }

    #[test]
    fn strip_fence_drops_trailing_prose() {
        let raw = "```json\n{\"nodes\":[],\"edges\":[]}\n```\nHope this helps!";
        assert_eq!(strip_code_fences(raw), "{\"nodes\":[],\"edges\":[]}");
    }

    #[test]
    fn strip_unterminated_fence() {
        assert_eq!(strip_code_fences("```JSON\n{}"), "{}");
    }

    #[test]
    fn prose_is_invalid_json() {
        let err = parse_graph_response("I cannot answer this.").unwrap_err();
        assert!(matches!(err, ExtractionFailure::InvalidJson(_)));
    }

    #[test]
    fn blank_reply_is_empty_response() {
        assert_eq!(
            parse_graph_response("```json\n```").unwrap_err(),
            ExtractionFailure::EmptyResponse
        );
    }

    #[test]
    fn array_is_not_a_graph() {
        let err = parse_graph_response("[1, 2]").unwrap_err();
        assert!(matches!(err, ExtractionFailure::InvalidJson(_)));
    }

    #[test]
    fn missing_edges_is_reported() {
        let err = parse_graph_response(r#"{"nodes":[]}"#).unwrap_err();
        assert_eq!(err, ExtractionFailure::MissingField("edges".into()));
    }

    #[test]
    fn non_string_id_is_malformed() {
        let err = parse_graph_response(r#"{"nodes":[{"id":1}],"edges":[]}"#).unwrap_err();
        assert!(matches!(err, ExtractionFailure::MalformedElement(_)));
    }

    #[test]
    fn fenced_graph_parses() {
        let raw = "```json\n{\"nodes\":[{\"id\":\"n1\",\"label\":\"Rust\",\"type\":\"Tool\"}],\"edges\":[{\"source\":\"n1\",\"target\":\"n1\",\"label\":\"self\"}]}\n```";
        let payload = parse_graph_response(raw).unwrap();
        assert_eq!(payload.nodes[0].label.as_deref(), Some("Rust"));
        assert_eq!(payload.edges.len(), 1);
    }
}
