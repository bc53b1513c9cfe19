//! Seeded Fruchterman-Reingold spring layout.
//!
//! All node pairs repel with force `k² / d`; nodes joined by an edge (in
//! either direction) attract with force `d² / k`. Each step moves a node at
//! most the current temperature, which cools linearly to zero. The result is
//! centred on the origin and scaled so the largest coordinate magnitude is 1.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::Graph;

/// Node positions keyed by node id, each coordinate within `[-1, 1]`.
pub type Layout = HashMap<String, (f64, f64)>;

/// Smallest distance used when computing forces, so coincident nodes still
/// push apart.
const MIN_DISTANCE: f64 = 0.01;

/// Tunables for [`spring_layout_with`].
///
/// # Examples
///
/// ```
/// use mindmap_graph::LayoutParams;
///
/// let params = LayoutParams::default();
/// assert_eq!(params.seed, 42);
/// assert_eq!(params.iterations, 50);
/// assert_eq!(params.k, 2.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    /// Optimal distance between nodes.
    pub k: f64,
    /// Simulation steps.
    pub iterations: usize,
    /// Seed for the initial random placement.
    pub seed: u64,
    /// Starting temperature (maximum displacement per step).
    pub initial_temperature: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            k: 2.0,
            iterations: 50,
            seed: 42,
            initial_temperature: 0.1,
        }
    }
}

/// Lay out `graph` with the default parameters.
///
/// Deterministic: the same graph always yields the same positions.
///
/// # Examples
///
/// ```
/// use mindmap_graph::{spring_layout, Graph, Node, NodeType};
///
/// let graph = Graph::new(
///     vec![Node { id: "solo".into(), label: "Solo".into(), node_type: NodeType::Concept }],
///     vec![],
/// );
/// let layout = spring_layout(&graph);
/// assert_eq!(layout["solo"], (0.0, 0.0));
/// ```
pub fn spring_layout(graph: &Graph) -> Layout {
    spring_layout_with(graph, &LayoutParams::default())
}

/// Lay out `graph` with explicit parameters.
pub fn spring_layout_with(graph: &Graph, params: &LayoutParams) -> Layout {
    let mut g: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for node in graph.nodes() {
        index.insert(&node.id, g.add_node(&node.id));
    }
    for edge in graph.edges() {
        if let (Some(&s), Some(&t)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
            g.add_edge(s, t, ());
        }
    }

    let positions = simulate(&g, params);

    g.node_indices()
        .map(|i| (g[i].to_string(), positions[i.index()]))
        .collect()
}

fn simulate(g: &DiGraph<&str, ()>, params: &LayoutParams) -> Vec<(f64, f64)> {
    let n = g.node_count();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut pos: Vec<(f64, f64)> = (0..n).map(|_| (rng.gen::<f64>(), rng.gen::<f64>())).collect();

    if n <= 1 {
        return vec![(0.0, 0.0); n];
    }

    let k = params.k;
    let mut temperature = params.initial_temperature;
    let cooling = params.initial_temperature / (params.iterations as f64 + 1.0);

    for _ in 0..params.iterations {
        let mut disp = vec![(0.0f64, 0.0f64); n];

        for i in 0..n {
            for j in (i + 1)..n {
                let (dx, dy) = (pos[i].0 - pos[j].0, pos[i].1 - pos[j].1);
                let dist = dx.hypot(dy).max(MIN_DISTANCE);
                let force = k * k / dist;
                let (fx, fy) = (dx / dist * force, dy / dist * force);
                disp[i].0 += fx;
                disp[i].1 += fy;
                disp[j].0 -= fx;
                disp[j].1 -= fy;
            }
        }

        for edge in g.edge_references() {
            let (s, t) = (edge.source().index(), edge.target().index());
            if s == t {
                continue;
            }
            let (dx, dy) = (pos[s].0 - pos[t].0, pos[s].1 - pos[t].1);
            let dist = dx.hypot(dy).max(MIN_DISTANCE);
            let force = dist * dist / k;
            let (fx, fy) = (dx / dist * force, dy / dist * force);
            disp[s].0 -= fx;
            disp[s].1 -= fy;
            disp[t].0 += fx;
            disp[t].1 += fy;
        }

        for (p, d) in pos.iter_mut().zip(&disp) {
            let len = d.0.hypot(d.1);
            if len > 0.0 {
                let step = len.min(temperature);
                p.0 += d.0 / len * step;
                p.1 += d.1 / len * step;
            }
        }

        temperature -= cooling;
    }

    rescale(&mut pos);
    pos
}

/// Centre on the origin and scale so the largest magnitude is 1.
fn rescale(pos: &mut [(f64, f64)]) {
    let n = pos.len() as f64;
    let (mx, my) = pos
        .iter()
        .fold((0.0, 0.0), |(ax, ay), p| (ax + p.0 / n, ay + p.1 / n));

    let mut extent: f64 = 0.0;
    for p in pos.iter_mut() {
        p.0 -= mx;
        p.1 -= my;
        extent = extent.max(p.0.abs()).max(p.1.abs());
    }

    if extent > 0.0 {
        for p in pos.iter_mut() {
            p.0 /= extent;
            p.1 /= extent;
        }
    }
}
