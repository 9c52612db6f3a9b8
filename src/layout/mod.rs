//! Node placement on a worker thread. Only the cancel flag of the active run
//! is shared with the worker.

mod force;
mod placement;
mod worker;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{GraphEdge, GraphNode, Point2D};

pub use worker::{LayoutEngine, LayoutMessage, RunId};

use force::{ForceSimulation, SimulationOutcome};
use placement::{circle_layout, grid_layout};

pub const PROGRESS_INTERVAL: usize = 10;
pub const YIELD_INTERVAL: usize = 100;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("a layout run is already in progress")]
    Busy,
    #[error("unknown layout algorithm `{0}`")]
    UnknownAlgorithm(String),
    #[error("layout worker is not running")]
    WorkerGone,
    #[error("failed to spawn layout worker")]
    Spawn(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutAlgorithm {
    ForceDirected,
    Grid,
    Circle,
}

impl LayoutAlgorithm {
    pub const ALL: [Self; 3] = [Self::ForceDirected, Self::Grid, Self::Circle];

    pub fn id(self) -> &'static str {
        match self {
            Self::ForceDirected => "force-directed",
            Self::Grid => "grid",
            Self::Circle => "circle",
        }
    }
}

impl fmt::Display for LayoutAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for LayoutAlgorithm {
    type Err = LayoutError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.id() == value)
            .ok_or_else(|| LayoutError::UnknownAlgorithm(value.to_owned()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutParams {
    pub iterations: usize,
    pub ideal_edge_length: f32,
    pub node_repulsion: f32,
    pub gravity: f32,
    pub damping: f32,
    pub algorithm: String,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            iterations: 1000,
            ideal_edge_length: 120.0,
            node_repulsion: 6000.0,
            gravity: 0.001,
            damping: 0.9,
            algorithm: LayoutAlgorithm::ForceDirected.id().to_owned(),
        }
    }
}

impl LayoutParams {
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !self.ideal_edge_length.is_finite() || self.ideal_edge_length <= 0.0 {
            self.ideal_edge_length = defaults.ideal_edge_length;
        }
        if !self.node_repulsion.is_finite() || self.node_repulsion < 0.0 {
            self.node_repulsion = defaults.node_repulsion;
        }
        if !self.gravity.is_finite() {
            self.gravity = defaults.gravity;
        }
        self.gravity = self.gravity.clamp(0.0, 0.5);
        if !self.damping.is_finite() {
            self.damping = defaults.damping;
        }
        self.damping = self.damping.clamp(0.05, 0.99);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutNode {
    pub id: String,
    pub position: Option<Point2D>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutEdge {
    pub source: String,
    pub target: String,
    pub weight: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutRequest {
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
    pub params: LayoutParams,
}

impl LayoutRequest {
    /// Builds a request from graph data. Hyperedges become a star of springs
    /// from their first present member so members settle near each other.
    pub fn from_graph(nodes: &[GraphNode], edges: &[GraphEdge], params: LayoutParams) -> Self {
        let known = nodes.iter().map(|node| node.id.as_str()).collect::<HashSet<_>>();
        Self {
            nodes: nodes
                .iter()
                .map(|node| LayoutNode {
                    id: node.id.clone(),
                    position: node.position.filter(|point| point.is_finite()),
                })
                .collect(),
            edges: layout_edges(edges, &known),
            params,
        }
    }
}

fn layout_edges(edges: &[GraphEdge], known: &HashSet<&str>) -> Vec<LayoutEdge> {
    let mut links = Vec::with_capacity(edges.len());
    for edge in edges {
        let weight = if edge.weight.is_finite() && edge.weight > 0.0 {
            edge.weight
        } else {
            1.0
        };

        if !edge.is_hyperedge() {
            if known.contains(edge.source.as_str()) && known.contains(edge.target.as_str()) {
                links.push(LayoutEdge {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    weight,
                });
            }
            continue;
        }

        let mut members = edge.members().filter(|member| known.contains(member));
        let Some(hub) = members.next() else {
            continue;
        };
        for member in members {
            links.push(LayoutEdge {
                source: hub.to_owned(),
                target: member.to_owned(),
                weight,
            });
        }
    }
    links
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutResult {
    pub positions: HashMap<String, Point2D>,
}

pub(crate) fn compute_layout(
    request: &LayoutRequest,
    cancel: &std::sync::atomic::AtomicBool,
    on_progress: impl FnMut(f32),
) -> Result<Option<LayoutResult>, LayoutError> {
    let algorithm = request.params.algorithm.parse::<LayoutAlgorithm>()?;
    let params = request.params.clone().sanitized();

    let positions = match algorithm {
        LayoutAlgorithm::ForceDirected => {
            let mut simulation = ForceSimulation::new(&request.nodes, &request.edges, &params);
            match simulation.run(params.iterations, cancel, on_progress) {
                SimulationOutcome::Completed => simulation.into_positions(),
                SimulationOutcome::Cancelled => return Ok(None),
            }
        }
        LayoutAlgorithm::Grid => grid_layout(&request.nodes, params.ideal_edge_length),
        LayoutAlgorithm::Circle => circle_layout(&request.nodes, params.ideal_edge_length * 2.0),
    };

    Ok(Some(LayoutResult { positions }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    #[test]
    fn algorithm_ids_parse() {
        for algorithm in LayoutAlgorithm::ALL {
            assert_eq!(algorithm.id().parse::<LayoutAlgorithm>().unwrap(), algorithm);
        }
        assert!(matches!(
            "spectral".parse::<LayoutAlgorithm>(),
            Err(LayoutError::UnknownAlgorithm(name)) if name == "spectral"
        ));
    }

    #[test]
    fn hyperedges_expand_into_member_star() {
        let nodes = ["a", "b", "c", "d"].map(|id| GraphNode::new(id, "concept", 1.0));
        let edges = [
            GraphEdge::hyper("h", &["a", "b", "x", "c"], 2.0),
            GraphEdge::binary("e", "c", "d", 1.0),
            GraphEdge::binary("dangling", "c", "zz", 1.0),
        ];

        let request = LayoutRequest::from_graph(&nodes, &edges, LayoutParams::default());
        let pairs = request
            .edges
            .iter()
            .map(|edge| (edge.source.as_str(), edge.target.as_str(), edge.weight))
            .collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![("a", "b", 2.0), ("a", "c", 2.0), ("c", "d", 1.0)]
        );
    }

    #[test]
    fn sanitizing_restores_broken_values() {
        let params = LayoutParams {
            ideal_edge_length: -4.0,
            damping: f32::NAN,
            gravity: 3.0,
            ..LayoutParams::default()
        }
        .sanitized();
        assert_eq!(params.ideal_edge_length, 120.0);
        assert_eq!(params.damping, 0.9);
        assert_eq!(params.gravity, 0.5);
    }

    #[test]
    fn unknown_algorithm_is_an_error_not_a_panic() {
        let request = LayoutRequest {
            nodes: vec![LayoutNode {
                id: "a".into(),
                position: None,
            }],
            edges: Vec::new(),
            params: LayoutParams {
                algorithm: "spiral".into(),
                ..LayoutParams::default()
            },
        };
        let result = compute_layout(&request, &AtomicBool::new(false), |_| {});
        assert!(matches!(result, Err(LayoutError::UnknownAlgorithm(_))));
    }
}
