use std::collections::{HashMap, HashSet};
use std::time::Instant;

use fuzzy_matcher::skim::SkimMatcherV2;
use tracing::debug;

use crate::model::{GraphData, NodeOrigin, QueryMode, QueryPath, QueryRequest, QueryResponse};

use super::memory::{edge_endpoints, fuzzy_match_score};
use super::{ProviderError, QueryProvider, StaticGraphProvider};

const NEIGHBOR_DECAY: f32 = 0.5;
const CONTEXT_LIMIT: usize = 5;

/// Query engine answering from an in-memory graph. Nodes are scored by fuzzy
/// match against the query terms; `global` and `hybrid` modes also pull in
/// one-hop neighbors of the matches.
#[derive(Clone, Debug)]
pub struct LocalQueryEngine {
    graph: StaticGraphProvider,
}

impl LocalQueryEngine {
    pub fn new(graph: StaticGraphProvider) -> Self {
        Self { graph }
    }

    pub fn from_data(data: GraphData) -> Self {
        Self::new(StaticGraphProvider::new(data))
    }

    fn direct_matches(&self, query: &str) -> HashMap<String, f32> {
        let matcher = SkimMatcherV2::default();
        let terms = query
            .split_whitespace()
            .filter(|term| term.len() > 1)
            .collect::<Vec<_>>();
        if terms.is_empty() {
            return HashMap::new();
        }

        let data = self.graph.data();
        let raw = data
            .nodes
            .iter()
            .filter_map(|node| {
                let total = terms
                    .iter()
                    .filter_map(|term| {
                        fuzzy_match_score(&matcher, node.display_label(), term)
                            .into_iter()
                            .chain(fuzzy_match_score(&matcher, &node.id, term))
                            .max()
                    })
                    .sum::<i64>();
                (total > 0).then(|| (node.id.clone(), total))
            })
            .collect::<Vec<_>>();

        let best = raw.iter().map(|(_, score)| *score).max().unwrap_or(1).max(1) as f32;
        raw.into_iter()
            .map(|(id, score)| (id, score as f32 / best))
            .collect()
    }

    fn expand_neighbors(
        &self,
        matches: &HashMap<String, f32>,
    ) -> HashMap<String, (f32, bool)> {
        let mut reached: HashMap<String, (f32, bool)> = HashMap::new();
        for (id, score) in matches {
            for &edge_index in self.graph.incident_edges(id) {
                let Some(edge) = self.graph.edge_at(edge_index) else {
                    continue;
                };
                for member in edge_endpoints(edge) {
                    if member == id {
                        continue;
                    }
                    let entry = reached.entry(member.to_owned()).or_insert((0.0, false));
                    entry.0 = entry.0.max(score * NEIGHBOR_DECAY);
                    entry.1 = true;
                }
            }
        }
        reached
    }

    fn build_path(&self, request: &QueryRequest) -> QueryPath {
        let direct = self.direct_matches(&request.query);
        let expand = matches!(request.mode, QueryMode::Global | QueryMode::Hybrid);
        let neighbors = if expand {
            self.expand_neighbors(&direct)
        } else {
            HashMap::new()
        };

        let mut scored = HashMap::<String, (f32, NodeOrigin)>::new();
        for (id, score) in &direct {
            let origin = if neighbors.contains_key(id) {
                NodeOrigin::Both
            } else {
                NodeOrigin::Local
            };
            scored.insert(id.clone(), (*score, origin));
        }
        for (id, (score, _)) in &neighbors {
            scored
                .entry(id.clone())
                .or_insert((*score, NodeOrigin::Global));
        }

        let known = self.graph.node_ids().collect::<HashSet<_>>();
        let mut ranked = scored
            .into_iter()
            .filter(|(id, _)| known.contains(id.as_str()))
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.0.total_cmp(&a.1.0).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(request.top_k.max(1));

        let members = ranked
            .iter()
            .map(|(id, _)| id.as_str())
            .collect::<HashSet<_>>();
        let edges = self
            .graph
            .data()
            .edges
            .iter()
            .filter(|edge| {
                let mut endpoints = edge_endpoints(edge).peekable();
                endpoints.peek().is_some() && endpoints.all(|id| members.contains(id))
            })
            .map(|edge| edge.id.clone())
            .collect();

        let tagged = request.mode != QueryMode::Naive;
        QueryPath {
            nodes: ranked.iter().map(|(id, _)| id.clone()).collect(),
            edges,
            scores: ranked
                .iter()
                .map(|(id, (score, _))| (id.clone(), *score))
                .collect(),
            node_types: tagged.then(|| {
                ranked
                    .iter()
                    .map(|(id, (_, origin))| (id.clone(), *origin))
                    .collect()
            }),
        }
    }
}

impl QueryProvider for LocalQueryEngine {
    async fn execute_query(&self, request: QueryRequest) -> Result<QueryResponse, ProviderError> {
        let started = Instant::now();
        let path = self.build_path(&request);

        let data = self.graph.data();
        let context_used = path
            .nodes
            .iter()
            .filter_map(|id| data.nodes.iter().find(|node| &node.id == id))
            .filter(|node| !node.description.is_empty())
            .take(CONTEXT_LIMIT)
            .map(|node| node.description.clone())
            .collect::<Vec<_>>();

        let answer = if path.is_empty() {
            format!("No entities matched \"{}\".", request.query.trim())
        } else {
            let labels = path
                .nodes
                .iter()
                .take(CONTEXT_LIMIT)
                .filter_map(|id| data.nodes.iter().find(|node| &node.id == id))
                .map(|node| node.display_label())
                .collect::<Vec<_>>();
            format!(
                "Found {} related entities ({} mode): {}",
                path.len(),
                request.mode.label(),
                labels.join(", ")
            )
        };

        debug!(
            query = %request.query,
            mode = request.mode.label(),
            nodes = path.len(),
            edges = path.edges.len(),
            "local query answered"
        );

        Ok(QueryResponse {
            answer,
            query_path: path,
            context_used,
            execution_time: started.elapsed().as_secs_f64(),
        })
    }
}
