use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::model::{GraphData, GraphEdge, GraphNode};

use super::{EdgePage, GraphDataProvider, NodePage, ProviderError};

/// In-memory provider over a fixed graph. Pages follow insertion order.
#[derive(Clone, Debug)]
pub struct StaticGraphProvider {
    data: Arc<GraphData>,
    adjacency: Arc<HashMap<String, Vec<usize>>>,
}

impl StaticGraphProvider {
    pub fn new(data: GraphData) -> Self {
        let mut adjacency: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, edge) in data.edges.iter().enumerate() {
            for member in edge_endpoints(edge) {
                adjacency.entry(member.to_owned()).or_default().push(index);
            }
        }

        Self {
            data: Arc::new(data),
            adjacency: Arc::new(adjacency),
        }
    }

    pub fn data(&self) -> &GraphData {
        &self.data
    }

    pub(crate) fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.data.nodes.iter().map(|node| node.id.as_str())
    }

    pub(crate) fn incident_edges(&self, id: &str) -> &[usize] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn edge_at(&self, index: usize) -> Option<&GraphEdge> {
        self.data.edges.get(index)
    }

    fn subgraph(&self, center_id: &str, depth: usize) -> Result<GraphData, ProviderError> {
        if !self.data.nodes.iter().any(|node| node.id == center_id) {
            return Err(ProviderError::NodeNotFound(center_id.to_owned()));
        }

        let mut reached = HashSet::from([center_id.to_owned()]);
        let mut edges = HashSet::new();
        let mut queue = VecDeque::from([(center_id.to_owned(), 0usize)]);

        while let Some((id, hops)) = queue.pop_front() {
            if hops == depth {
                continue;
            }
            for &edge_index in self.incident_edges(&id) {
                edges.insert(edge_index);
                let Some(edge) = self.edge_at(edge_index) else {
                    continue;
                };
                for member in edge_endpoints(edge) {
                    if reached.insert(member.to_owned()) {
                        queue.push_back((member.to_owned(), hops + 1));
                    }
                }
            }
        }

        let nodes = self
            .data
            .nodes
            .iter()
            .filter(|node| reached.contains(&node.id))
            .cloned()
            .collect();
        let edges = self
            .data
            .edges
            .iter()
            .enumerate()
            .filter(|(index, _)| edges.contains(index))
            .map(|(_, edge)| edge.clone())
            .collect();
        Ok(GraphData { nodes, edges })
    }
}

pub(crate) fn edge_endpoints(edge: &GraphEdge) -> impl Iterator<Item = &str> {
    let binary = edge.member_entities.is_empty();
    edge.members().chain(
        [edge.source.as_str(), edge.target.as_str()]
            .into_iter()
            .filter(move |id| binary && !id.is_empty()),
    )
}

pub(crate) fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

impl GraphDataProvider for StaticGraphProvider {
    async fn get_nodes(&self, page: NodePage) -> Result<Vec<GraphNode>, ProviderError> {
        Ok(self
            .data
            .nodes
            .iter()
            .filter(|node| {
                page.type_filter
                    .as_deref()
                    .is_none_or(|wanted| node.node_type == wanted)
            })
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn get_edges(&self, page: EdgePage) -> Result<Vec<GraphEdge>, ProviderError> {
        Ok(self
            .data
            .edges
            .iter()
            .filter(|edge| page.min_weight.is_none_or(|minimum| edge.weight >= minimum))
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn get_subgraph(&self, center_id: &str, depth: usize) -> Result<GraphData, ProviderError> {
        self.subgraph(center_id, depth)
    }

    async fn search_nodes(&self, keyword: &str, limit: usize) -> Result<Vec<GraphNode>, ProviderError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }

        let matcher = SkimMatcherV2::default();
        let mut hits = self
            .data
            .nodes
            .iter()
            .filter_map(|node| {
                let score = fuzzy_match_score(&matcher, node.display_label(), keyword)
                    .into_iter()
                    .chain(fuzzy_match_score(&matcher, &node.id, keyword))
                    .max()?;
                Some((score, node))
            })
            .collect::<Vec<_>>();
        hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(_, node)| node.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GraphData {
        let mut nodes = vec![
            GraphNode::new("alice", "person", 1.0),
            GraphNode::new("bob", "person", 0.5),
            GraphNode::new("acme", "organization", 2.0),
            GraphNode::new("paris", "location", 1.0),
            GraphNode::new("lyon", "location", 0.2),
        ];
        nodes[0].label = "Alice Martin".into();
        GraphData {
            nodes,
            edges: vec![
                GraphEdge::binary("e1", "alice", "bob", 0.9),
                GraphEdge::binary("e2", "bob", "acme", 0.3),
                GraphEdge::hyper("h1", &["acme", "paris", "lyon"], 0.7),
            ],
        }
    }

    #[tokio::test]
    async fn node_pages_respect_offset_and_filter() {
        let provider = StaticGraphProvider::new(sample());
        let page = provider
            .get_nodes(NodePage {
                limit: 2,
                offset: 1,
                type_filter: None,
            })
            .await
            .unwrap();
        assert_eq!(
            page.iter().map(|node| node.id.as_str()).collect::<Vec<_>>(),
            ["bob", "acme"]
        );

        let locations = provider
            .get_nodes(NodePage {
                limit: 10,
                offset: 0,
                type_filter: Some("location".into()),
            })
            .await
            .unwrap();
        assert_eq!(locations.len(), 2);
    }

    #[tokio::test]
    async fn edge_pages_filter_by_weight() {
        let provider = StaticGraphProvider::new(sample());
        let edges = provider
            .get_edges(EdgePage {
                limit: 10,
                offset: 0,
                min_weight: Some(0.5),
            })
            .await
            .unwrap();
        assert_eq!(
            edges.iter().map(|edge| edge.id.as_str()).collect::<Vec<_>>(),
            ["e1", "h1"]
        );
    }

    #[tokio::test]
    async fn subgraph_walks_hyperedge_members() {
        let provider = StaticGraphProvider::new(sample());
        let one_hop = provider.get_subgraph("bob", 1).await.unwrap();
        let mut ids = one_hop
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect::<Vec<_>>();
        ids.sort_unstable();
        assert_eq!(ids, ["acme", "alice", "bob"]);

        let two_hops = provider.get_subgraph("bob", 2).await.unwrap();
        assert_eq!(two_hops.nodes.len(), 5);
        assert_eq!(two_hops.edges.len(), 3);

        assert!(matches!(
            provider.get_subgraph("nobody", 1).await,
            Err(ProviderError::NodeNotFound(id)) if id == "nobody"
        ));
    }

    #[tokio::test]
    async fn search_ranks_fuzzy_hits() {
        let provider = StaticGraphProvider::new(sample());
        let hits = provider.search_nodes("alice", 5).await.unwrap();
        assert_eq!(hits.first().map(|node| node.id.as_str()), Some("alice"));
        assert!(provider.search_nodes("   ", 5).await.unwrap().is_empty());
    }
}
