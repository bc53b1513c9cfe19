use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Category of a mind map node.
///
/// Model output is untrusted, so unrecognized values are kept verbatim in
/// [`NodeType::Other`] instead of being rejected.
///
/// # Examples
///
/// ```
/// use mindmap_graph::NodeType;
///
/// assert_eq!(NodeType::parse("person"), NodeType::Person);
/// assert_eq!(NodeType::parse("Gene"), NodeType::Other("Gene".into()));
/// assert_eq!(NodeType::Tool.as_str(), "Tool");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    /// An idea or topic.
    #[default]
    Concept,
    /// A named individual.
    Person,
    /// A company, institution, or group.
    Organization,
    /// Software, hardware, or an instrument.
    Tool,
    /// A technique or procedure.
    Method,
    /// A corpus or data collection.
    Dataset,
    /// Anything else the model produced.
    Other(String),
}

impl NodeType {
    /// Parse a type name, case-insensitively. Blank names mean `Concept`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "concept" => Self::Concept,
            "person" => Self::Person,
            "organization" | "organisation" => Self::Organization,
            "tool" => Self::Tool,
            "method" => Self::Method,
            "dataset" => Self::Dataset,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    /// Display name used in tooltips and serialized output.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Concept => "Concept",
            Self::Person => "Person",
            Self::Organization => "Organization",
            Self::Tool => "Tool",
            Self::Method => "Method",
            Self::Dataset => "Dataset",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for NodeType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> Self {
        t.as_str().to_string()
    }
}

/// A labelled, typed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// Identifier referenced by edges.
    pub id: String,
    /// Short display label.
    pub label: String,
    /// Node category.
    #[serde(rename = "type")]
    pub node_type: NodeType,
}

/// A directed, labelled relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Relationship label; may be empty.
    pub label: String,
}

/// A validated mind map graph.
///
/// Every edge's endpoints are guaranteed to be node ids in the graph, and
/// node ids are unique. Serializes to the same `{"nodes", "edges"}` shape
/// the model is asked to produce.
///
/// # Examples
///
/// ```
/// use mindmap_graph::{Edge, Graph, Node, NodeType};
///
/// let node = |id: &str| Node {
///     id: id.into(),
///     label: id.to_uppercase(),
///     node_type: NodeType::Concept,
/// };
/// let edge = |s: &str, t: &str| Edge {
///     source: s.into(),
///     target: t.into(),
///     label: "uses".into(),
/// };
///
/// let graph = Graph::new(vec![node("a"), node("b")], vec![edge("a", "b"), edge("a", "zz")]);
/// assert_eq!(graph.edges().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Graph {
    /// Build a graph, enforcing its invariants.
    ///
    /// Duplicate node ids keep the first declaration. Edges referencing an
    /// undeclared node are dropped and logged at `debug`.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut seen = HashSet::new();
        let nodes: Vec<Node> = nodes
            .into_iter()
            .filter(|n| {
                let fresh = seen.insert(n.id.clone());
                if !fresh {
                    debug!(node = %n.id, "dropping duplicate node");
                }
                fresh
            })
            .collect();

        let edges = edges
            .into_iter()
            .filter(|e| {
                let valid = seen.contains(&e.source) && seen.contains(&e.target);
                if !valid {
                    debug!(source = %e.source, target = %e.target, "dropping edge with unknown endpoint");
                }
                valid
            })
            .collect();

        Self { nodes, edges }
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Edges in declaration order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// `true` when the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// The graph JSON schema exchanged with the model:
/// `{"nodes":[{"id","label","type"}],"edges":[{"source","target","label"}]}`.
///
/// Decoding is strict about shape (ids must be strings) and lenient about
/// optional fields; [`Graph::from`] applies the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    /// Declared nodes.
    pub nodes: Vec<WireNode>,
    /// Declared edges.
    pub edges: Vec<WireEdge>,
}

/// A node as the model wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireNode {
    /// Node id.
    pub id: String,
    /// Label; defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Type name; defaults to `Concept`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
}

/// An edge as the model wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEdge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Relationship label; defaults to empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl From<WireNode> for Node {
    fn from(wire: WireNode) -> Self {
        let label = wire
            .label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| wire.id.clone());
        Self {
            id: wire.id,
            label,
            node_type: wire
                .node_type
                .map(|t| NodeType::parse(&t))
                .unwrap_or_default(),
        }
    }
}

impl From<WireEdge> for Edge {
    fn from(wire: WireEdge) -> Self {
        Self {
            source: wire.source,
            target: wire.target,
            label: wire.label.unwrap_or_default(),
        }
    }
}

impl From<GraphPayload> for Graph {
    fn from(payload: GraphPayload) -> Self {
        Graph::new(
            payload.nodes.into_iter().map(Node::from).collect(),
            payload.edges.into_iter().map(Edge::from).collect(),
        )
    }
}
