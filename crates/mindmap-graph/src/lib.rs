//! Mind map graphs: validated model, force-directed layout, and rendering.
//!
//! A [`Graph`](model::Graph) is built from the untrusted node/edge payload a
//! language model returns; construction drops edges whose endpoints are not
//! declared nodes. [`layout`] places nodes with a seeded spring simulation
//! on petgraph, and [`render`] turns the positioned graph into a styled
//! scene that serializes to JSON or renders as a standalone SVG.

pub mod layout;
pub mod model;
pub mod render;

pub use layout::{spring_layout, Layout, LayoutParams};
pub use model::{Edge, Graph, GraphPayload, Node, NodeType, WireEdge, WireNode};
pub use render::{layout_and_render, render, EdgeAnnotation, EdgeLine, NodeMarker, RenderScene};
