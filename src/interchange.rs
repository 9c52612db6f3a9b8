//! Versioned JSON envelope for exporting and importing a graph together with
//! an optional fixed layout.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{GraphData, GraphEdge, GraphNode, Point2D};

pub const ENVELOPE_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum InterchangeError {
    #[error("invalid graph document")]
    Json(#[from] serde_json::Error),
    #[error("unsupported envelope version `{0}`")]
    UnsupportedVersion(String),
    #[error("edge `{edge}` references unknown node `{node}`")]
    DanglingEdge { edge: String, node: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    pub timestamp: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<BTreeMap<String, Point2D>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<BTreeMap<String, serde_json::Value>>,
}

impl Envelope {
    pub fn new(graph: GraphData) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_owned(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            nodes: graph.nodes,
            edges: graph.edges,
            layout: None,
            styles: None,
        }
    }

    pub fn with_layout<'a>(mut self, positions: impl IntoIterator<Item = (&'a String, &'a Point2D)>) -> Self {
        let layout = positions
            .into_iter()
            .filter(|(_, point)| point.is_finite())
            .map(|(id, point)| (id.clone(), *point))
            .collect::<BTreeMap<_, _>>();
        self.layout = Some(layout);
        self
    }

    pub fn with_styles(mut self, styles: BTreeMap<String, serde_json::Value>) -> Self {
        self.styles = Some(styles);
        self
    }

    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }

    /// Positions from the envelope's layout for nodes it contains. When every
    /// node is covered the caller can skip running a layout.
    pub fn fixed_positions(&self) -> HashMap<String, Point2D> {
        let Some(layout) = &self.layout else {
            return HashMap::new();
        };
        self.nodes
            .iter()
            .filter_map(|node| Some((node.id.clone(), *layout.get(&node.id)?)))
            .collect()
    }

    pub fn covers_all_nodes(&self) -> bool {
        !self.nodes.is_empty() && self.fixed_positions().len() == self.nodes.len()
    }

    pub fn into_graph(self) -> GraphData {
        let positions = self.fixed_positions();
        let nodes = self
            .nodes
            .into_iter()
            .map(|mut node| {
                if let Some(point) = positions.get(&node.id) {
                    node.position = Some(*point);
                }
                node
            })
            .collect();
        GraphData {
            nodes,
            edges: self.edges,
        }
    }

    fn validate(&self) -> Result<(), InterchangeError> {
        let major = self.version.split('.').next().unwrap_or_default();
        let supported = ENVELOPE_VERSION.split('.').next().unwrap_or_default();
        if major != supported {
            return Err(InterchangeError::UnsupportedVersion(self.version.clone()));
        }

        let known = self
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect::<HashSet<_>>();
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !known.contains(endpoint.as_str()) {
                    return Err(InterchangeError::DanglingEdge {
                        edge: edge.id.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

pub fn export_json(envelope: &Envelope) -> Result<String, InterchangeError> {
    Ok(serde_json::to_string_pretty(envelope)?)
}

pub fn import_json(input: &str) -> Result<Envelope, InterchangeError> {
    let envelope = serde_json::from_str::<Envelope>(input)?;
    envelope.validate()?;
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> GraphData {
        GraphData {
            nodes: vec![
                GraphNode::new("a", "person", 1.0),
                GraphNode::new("b", "person", 1.0),
                GraphNode::new("c", "place", 1.0),
            ],
            edges: vec![
                GraphEdge::binary("ab", "a", "b", 1.0),
                GraphEdge::hyper("abc", &["a", "b", "c"], 0.5),
            ],
        }
    }

    #[test]
    fn export_then_import_keeps_graph_and_layout() {
        let positions = HashMap::from([
            ("a".to_owned(), Point2D::new(1.0, 2.0)),
            ("b".to_owned(), Point2D::new(-3.0, 4.0)),
            ("c".to_owned(), Point2D::new(0.0, 9.5)),
        ]);
        let envelope = Envelope::new(graph()).with_layout(&positions);
        let json = export_json(&envelope).unwrap();

        let imported = import_json(&json).unwrap();
        assert_eq!(imported, envelope);
        assert!(imported.timestamp().is_some());
        assert!(imported.covers_all_nodes());
        assert_eq!(imported.fixed_positions(), positions);

        let graph = imported.into_graph();
        assert_eq!(graph.nodes[1].position, Some(Point2D::new(-3.0, 4.0)));
        assert!(graph.edges[1].is_hyperedge());
    }

    #[test]
    fn styles_survive_a_round_trip() {
        let styles = BTreeMap::from([
            ("a".to_owned(), serde_json::json!({"backgroundColor": "#60a5fa", "width": 40.0})),
            ("c".to_owned(), serde_json::json!({"borderWidth": 2})),
        ]);
        let envelope = Envelope::new(graph()).with_styles(styles.clone());
        let json = export_json(&envelope).unwrap();
        assert!(json.contains("\"styles\""));

        let imported = import_json(&json).unwrap();
        assert_eq!(imported.styles, Some(styles));
        assert!(imported.layout.is_none());
        assert!(!export_json(&Envelope::new(graph())).unwrap().contains("\"styles\""));
    }

    #[test]
    fn partial_layout_does_not_cover_graph() {
        let positions = HashMap::from([("a".to_owned(), Point2D::new(1.0, 2.0))]);
        let envelope = Envelope::new(graph()).with_layout(&positions);
        assert!(!envelope.covers_all_nodes());
        assert!(!Envelope::new(graph()).covers_all_nodes());
    }

    #[test]
    fn unknown_major_version_is_rejected() {
        let mut envelope = Envelope::new(graph());
        envelope.version = "2.0".into();
        let json = export_json(&envelope).unwrap();
        assert!(matches!(
            import_json(&json),
            Err(InterchangeError::UnsupportedVersion(version)) if version == "2.0"
        ));

        envelope.version = "1.3".into();
        assert!(import_json(&export_json(&envelope).unwrap()).is_ok());
    }

    #[test]
    fn dangling_edges_are_rejected() {
        let mut data = graph();
        data.edges.push(GraphEdge::binary("bad", "a", "ghost", 1.0));
        let json = export_json(&Envelope::new(data)).unwrap();
        assert!(matches!(
            import_json(&json),
            Err(InterchangeError::DanglingEdge { node, .. }) if node == "ghost"
        ));
    }

    #[test]
    fn missing_collections_fail_to_parse() {
        assert!(matches!(
            import_json(r#"{"version":"1.0","timestamp":"x","nodes":[]}"#),
            Err(InterchangeError::Json(_))
        ));
    }
}
