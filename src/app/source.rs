use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hyperlens::interchange::import_json;
use hyperlens::model::{GraphData, GraphEdge, GraphNode, Point2D};
use tracing::debug;

const NODE_TYPES: [&str; 5] = ["person", "organization", "location", "event", "concept"];
const RELATIONS: [&str; 4] = ["works_with", "located_in", "part_of", "mentions"];

#[derive(Clone, Debug)]
pub enum GraphSource {
    Demo { nodes: usize },
    File(PathBuf),
}

impl GraphSource {
    pub fn label(&self) -> String {
        match self {
            Self::Demo { nodes } => format!("demo graph ({nodes} nodes)"),
            Self::File(path) => path.display().to_string(),
        }
    }
}

pub struct SourceGraph {
    pub data: GraphData,
    pub fixed_positions: HashMap<String, Point2D>,
}

pub fn read_source(source: &GraphSource) -> Result<SourceGraph> {
    match source {
        GraphSource::Demo { nodes } => Ok(SourceGraph {
            data: demo_graph(*nodes, 0x5eed),
            fixed_positions: HashMap::new(),
        }),
        GraphSource::File(path) => read_envelope(path),
    }
}

fn read_envelope(path: &Path) -> Result<SourceGraph> {
    let input = fs::read_to_string(path)
        .with_context(|| format!("failed to read graph file {}", path.display()))?;
    let envelope =
        import_json(&input).with_context(|| format!("invalid graph file {}", path.display()))?;

    let fixed_positions = envelope.fixed_positions();
    debug!(
        path = %path.display(),
        exported_at = ?envelope.timestamp(),
        positioned = fixed_positions.len(),
        complete_layout = envelope.covers_all_nodes(),
        styled = envelope.styles.as_ref().map_or(0, |styles| styles.len()),
        "graph envelope read"
    );
    Ok(SourceGraph {
        data: envelope.into_graph(),
        fixed_positions,
    })
}

/// Deterministic graph with clustered binary edges and a hyperedge per
/// cluster of related entities.
pub fn demo_graph(node_count: usize, seed: u32) -> GraphData {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 8) as f32 / (1u32 << 24) as f32
    };

    let nodes = (0..node_count)
        .map(|index| {
            let node_type = NODE_TYPES[index % NODE_TYPES.len()];
            let mut node = GraphNode::new(format!("e{index}"), node_type, next());
            node.label = format!("{node_type} {index}");
            node.description = format!("Generated {node_type} entity number {index}.");
            node
        })
        .collect::<Vec<_>>();

    let mut edges = Vec::new();
    for index in 1..node_count {
        let target = (next() * index as f32) as usize;
        let relation = RELATIONS[index % RELATIONS.len()];
        let mut edge = GraphEdge::binary(
            format!("r{index}"),
            format!("e{index}"),
            format!("e{target}"),
            0.2 + next() * 0.8,
        );
        edge.relation = relation.to_owned();
        edges.push(edge);
    }

    let cluster = 6;
    for start in (0..node_count.saturating_sub(3)).step_by(cluster * 3) {
        let members = (start..(start + cluster).min(node_count))
            .map(|index| format!("e{index}"))
            .collect::<Vec<_>>();
        let member_refs = members.iter().map(String::as_str).collect::<Vec<_>>();
        let mut edge = GraphEdge::hyper(format!("h{start}"), &member_refs, 0.5 + next() * 0.5);
        edge.relation = "co_occurs".to_owned();
        edges.push(edge);
    }

    GraphData { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_graph_is_deterministic_and_connected() {
        let first = demo_graph(40, 7);
        let second = demo_graph(40, 7);
        assert_eq!(first, second);
        assert_eq!(first.nodes.len(), 40);
        assert!(first.edges.iter().any(GraphEdge::is_hyperedge));

        let ids = first
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect::<std::collections::HashSet<_>>();
        assert!(first.edges.iter().all(|edge| edge.members().all(|id| ids.contains(id))));
    }

    #[test]
    fn missing_file_reports_path() {
        let error = read_source(&GraphSource::File("/nonexistent/graph.json".into()))
            .err()
            .map(|error| format!("{error:#}"))
            .unwrap_or_default();
        assert!(error.contains("/nonexistent/graph.json"));
    }
}
