//! Styled scene construction and SVG output.

use serde::Serialize;
use tracing::debug;

use crate::layout::{spring_layout, Layout};
use crate::model::{Graph, NodeType};

/// Scene title shown above the map.
pub const TITLE: &str = "Knowledge Mind Map";
/// Canvas background color.
pub const BACKGROUND: &str = "#1a1a2e";
/// Stroke color for edge lines.
pub const EDGE_COLOR: &str = "#888888";
/// Marker diameter in pixels.
pub const MARKER_SIZE: f64 = 25.0;
/// Color for node types outside the palette.
pub const FALLBACK_COLOR: &str = "#95A5A6";

const SVG_WIDTH: f64 = 900.0;
const SVG_HEIGHT: f64 = 700.0;
const SVG_MARGIN: f64 = 70.0;
const SVG_TITLE_SPACE: f64 = 40.0;

/// Fill color for a node type.
///
/// # Examples
///
/// ```
/// use mindmap_graph::render::node_color;
/// use mindmap_graph::NodeType;
///
/// assert_eq!(node_color(&NodeType::Concept), "#4ECDC4");
/// assert_eq!(node_color(&NodeType::Other("Gene".into())), "#95A5A6");
/// ```
pub fn node_color(node_type: &NodeType) -> &'static str {
    match node_type {
        NodeType::Concept => "#4ECDC4",
        NodeType::Person => "#FF6B6B",
        NodeType::Organization => "#45B7D1",
        NodeType::Tool => "#96CEB4",
        NodeType::Method => "#FFEAA7",
        NodeType::Dataset => "#DDA0DD",
        NodeType::Other(_) => FALLBACK_COLOR,
    }
}

/// A positioned, styled node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMarker {
    /// Node id.
    pub id: String,
    /// Layout x coordinate in `[-1, 1]`.
    pub x: f64,
    /// Layout y coordinate in `[-1, 1]`.
    pub y: f64,
    /// Visible label.
    pub label: String,
    /// Type name as shown in the tooltip.
    pub node_type: String,
    /// Hover text: label and type on two lines.
    pub tooltip: String,
    /// Fill color.
    pub color: String,
    /// Marker diameter.
    pub size: f64,
}

/// A straight line between two positioned nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeLine {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Source position.
    pub from: (f64, f64),
    /// Target position.
    pub to: (f64, f64),
}

/// A relationship label drawn at an edge midpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeAnnotation {
    /// Midpoint x.
    pub x: f64,
    /// Midpoint y.
    pub y: f64,
    /// Label text.
    pub text: String,
}

/// Everything needed to draw a mind map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderScene {
    /// Title text.
    pub title: String,
    /// Background color.
    pub background: String,
    /// Edge stroke color.
    pub edge_color: String,
    /// Node markers in graph order.
    pub nodes: Vec<NodeMarker>,
    /// Edge lines in graph order.
    pub edges: Vec<EdgeLine>,
    /// Labels for edges with a non-empty relationship.
    pub annotations: Vec<EdgeAnnotation>,
}

impl Default for RenderScene {
    fn default() -> Self {
        Self {
            title: TITLE.to_string(),
            background: BACKGROUND.to_string(),
            edge_color: EDGE_COLOR.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
            annotations: Vec::new(),
        }
    }
}

/// Lay out `graph` and build its scene. An empty graph yields an empty scene.
///
/// # Examples
///
/// ```
/// use mindmap_graph::{layout_and_render, Graph};
///
/// let scene = layout_and_render(&Graph::default());
/// assert!(scene.nodes.is_empty());
/// assert_eq!(scene.title, "Knowledge Mind Map");
/// ```
pub fn layout_and_render(graph: &Graph) -> RenderScene {
    if graph.is_empty() {
        return RenderScene::default();
    }
    render(graph, &spring_layout(graph))
}

/// Build a scene from a graph and precomputed positions.
///
/// Nodes without a position are left out, and so are edges touching them.
pub fn render(graph: &Graph, layout: &Layout) -> RenderScene {
    let mut scene = RenderScene::default();

    for node in graph.nodes() {
        let Some(&(x, y)) = layout.get(&node.id) else {
            debug!(node = %node.id, "node has no position, skipping");
            continue;
        };
        scene.nodes.push(NodeMarker {
            id: node.id.clone(),
            x,
            y,
            label: node.label.clone(),
            node_type: node.node_type.to_string(),
            tooltip: format!("{}\nType: {}", node.label, node.node_type),
            color: node_color(&node.node_type).to_string(),
            size: MARKER_SIZE,
        });
    }

    for edge in graph.edges() {
        let (Some(&from), Some(&to)) = (layout.get(&edge.source), layout.get(&edge.target)) else {
            debug!(source = %edge.source, target = %edge.target, "edge endpoint has no position, skipping");
            continue;
        };
        scene.edges.push(EdgeLine {
            source: edge.source.clone(),
            target: edge.target.clone(),
            from,
            to,
        });
        if !edge.label.is_empty() {
            scene.annotations.push(EdgeAnnotation {
                x: (from.0 + to.0) / 2.0,
                y: (from.1 + to.1) / 2.0,
                text: edge.label.clone(),
            });
        }
    }

    scene
}

impl RenderScene {
    /// Render as a standalone SVG document.
    ///
    /// Layout coordinates are mapped onto a fixed canvas with y pointing up.
    /// Tooltips become `<title>` children so browsers show them on hover.
    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        svg.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{SVG_WIDTH}\" height=\"{SVG_HEIGHT}\" viewBox=\"0 0 {SVG_WIDTH} {SVG_HEIGHT}\" font-family=\"sans-serif\">\n"
        ));
        svg.push_str(&format!(
            "  <rect width=\"100%\" height=\"100%\" fill=\"{}\"/>\n",
            escape(&self.background)
        ));
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"28\" font-size=\"16\" fill=\"white\">{}</text>\n",
            SVG_MARGIN / 2.0,
            escape(&self.title)
        ));

        svg.push_str(&format!(
            "  <g stroke=\"{}\" stroke-width=\"1.5\">\n",
            escape(&self.edge_color)
        ));
        for line in &self.edges {
            let (x1, y1) = to_canvas(line.from);
            let (x2, y2) = to_canvas(line.to);
            svg.push_str(&format!(
                "    <line x1=\"{x1:.1}\" y1=\"{y1:.1}\" x2=\"{x2:.1}\" y2=\"{y2:.1}\"/>\n"
            ));
        }
        svg.push_str("  </g>\n");

        for note in &self.annotations {
            let (x, y) = to_canvas((note.x, note.y));
            svg.push_str(&format!(
                "  <text x=\"{x:.1}\" y=\"{y:.1}\" font-size=\"8\" fill=\"#aaaaaa\" text-anchor=\"middle\">{}</text>\n",
                escape(&note.text)
            ));
        }

        for marker in &self.nodes {
            let (x, y) = to_canvas((marker.x, marker.y));
            svg.push_str(&format!(
                "  <g>\n    <title>{}</title>\n    <circle cx=\"{x:.1}\" cy=\"{y:.1}\" r=\"{:.1}\" fill=\"{}\" stroke=\"white\" stroke-width=\"2\"/>\n",
                escape(&marker.tooltip),
                marker.size / 2.0,
                escape(&marker.color)
            ));
            svg.push_str(&format!(
                "    <text x=\"{x:.1}\" y=\"{:.1}\" font-size=\"10\" fill=\"white\" text-anchor=\"middle\">{}</text>\n  </g>\n",
                y - marker.size / 2.0 - 4.0,
                escape(&marker.label)
            ));
        }

        svg.push_str("</svg>\n");
        svg
    }
}

fn to_canvas((x, y): (f64, f64)) -> (f64, f64) {
    let half_w = (SVG_WIDTH - 2.0 * SVG_MARGIN) / 2.0;
    let half_h = (SVG_HEIGHT - 2.0 * SVG_MARGIN - SVG_TITLE_SPACE) / 2.0;
    let cx = SVG_WIDTH / 2.0;
    let cy = SVG_TITLE_SPACE + SVG_MARGIN + half_h;
    (cx + x * half_w, cy - y * half_h)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
