use std::collections::HashMap;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

use serde::{Deserialize, Serialize};

const MIN_NODE_DIAMETER: f32 = 20.0;
const MAX_NODE_DIAMETER: f32 = 60.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

impl Point2D {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.length_sq().sqrt()
    }

    pub fn length_sq(self) -> f32 {
        (self.x * self.x) + (self.y * self.y)
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    pub fn cross(self, other: Self) -> f32 {
        (self.x * other.y) - (self.y * other.x)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point2D {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point2D {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point2D {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Point2D {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f32> for Point2D {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point2D>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, weight: f32) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            node_type: node_type.into(),
            description: String::new(),
            weight,
            relevance_score: None,
            position: None,
        }
    }

    pub fn radius(&self) -> f32 {
        (MIN_NODE_DIAMETER + self.weight * 20.0).clamp(MIN_NODE_DIAMETER, MAX_NODE_DIAMETER) * 0.5
    }

    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub relation: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(rename = "entities", default)]
    pub member_entities: Vec<String>,
    #[serde(rename = "isHyperedge", default)]
    pub hyperedge_flag: bool,
}

impl GraphEdge {
    pub fn binary(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        weight: f32,
    ) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: id.into(),
            member_entities: vec![source.clone(), target.clone()],
            source,
            target,
            relation: String::new(),
            description: String::new(),
            weight,
            hyperedge_flag: false,
        }
    }

    pub fn hyper(id: impl Into<String>, members: &[&str], weight: f32) -> Self {
        let source = members.first().copied().unwrap_or_default().to_owned();
        let target = members.get(1).copied().unwrap_or_default().to_owned();
        Self {
            id: id.into(),
            source,
            target,
            relation: String::new(),
            description: String::new(),
            weight,
            member_entities: members.iter().map(|member| (*member).to_owned()).collect(),
            hyperedge_flag: true,
        }
    }

    pub fn is_hyperedge(&self) -> bool {
        self.hyperedge_flag || self.arity() >= 3
    }

    /// Member count with duplicates removed, in first-seen order.
    pub fn arity(&self) -> usize {
        self.members().count()
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.member_entities
            .iter()
            .enumerate()
            .filter(|(index, id)| !self.member_entities[..*index].contains(*id))
            .map(|(_, id)| id.as_str())
    }
}

fn default_weight() -> f32 {
    1.0
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl GraphData {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeOrigin {
    Local,
    Global,
    Both,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPath {
    pub nodes: Vec<String>,
    #[serde(default)]
    pub edges: Vec<String>,
    #[serde(default)]
    pub scores: HashMap<String, f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_types: Option<HashMap<String, NodeOrigin>>,
}

impl QueryPath {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn score(&self, id: &str) -> f32 {
        self.scores.get(id).copied().unwrap_or(0.0).clamp(0.0, 1.0)
    }

    pub fn origin(&self, id: &str) -> Option<NodeOrigin> {
        self.node_types.as_ref()?.get(id).copied()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Local,
    Global,
    #[default]
    Hybrid,
    Naive,
}

impl QueryMode {
    pub const ALL: [Self; 4] = [Self::Local, Self::Global, Self::Hybrid, Self::Naive];

    pub fn label(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
            Self::Hybrid => "hybrid",
            Self::Naive => "naive",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, mode: QueryMode) -> Self {
        Self {
            query: query.into(),
            mode,
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    60
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub answer: String,
    pub query_path: QueryPath,
    #[serde(default)]
    pub context_used: Vec<String>,
    pub execution_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyperedge_is_derived_from_distinct_members() {
        let mut edge = GraphEdge::binary("e1", "a", "b", 1.0);
        assert!(!edge.is_hyperedge());

        edge.member_entities = vec!["a".into(), "b".into(), "a".into()];
        assert_eq!(edge.arity(), 2);
        assert!(!edge.is_hyperedge());

        edge.member_entities.push("c".into());
        assert!(edge.is_hyperedge());
        assert_eq!(edge.members().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn explicit_flag_marks_hyperedge() {
        let mut edge = GraphEdge::binary("e1", "a", "b", 1.0);
        edge.hyperedge_flag = true;
        assert!(edge.is_hyperedge());
    }

    #[test]
    fn node_radius_follows_weight_bounds() {
        assert_eq!(GraphNode::new("a", "person", 0.0).radius(), 10.0);
        assert_eq!(GraphNode::new("a", "person", 1.0).radius(), 20.0);
        assert_eq!(GraphNode::new("a", "person", 9.0).radius(), 30.0);
    }

    #[test]
    fn edge_deserializes_from_wire_names() {
        let edge: GraphEdge = serde_json::from_str(
            r#"{"id":"h","source":"a","target":"b","entities":["a","b","c"],"isHyperedge":false}"#,
        )
        .unwrap();
        assert_eq!(edge.weight, 1.0);
        assert!(edge.is_hyperedge());
    }

    #[test]
    fn path_score_is_clamped() {
        let path = QueryPath {
            nodes: vec!["a".into()],
            scores: HashMap::from([("a".into(), 1.7)]),
            ..QueryPath::default()
        };
        assert_eq!(path.score("a"), 1.0);
        assert_eq!(path.score("missing"), 0.0);
    }
}
