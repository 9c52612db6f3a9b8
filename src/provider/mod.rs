//! Contracts for the data and query backends the engine consumes, plus
//! in-memory implementations used by the desktop viewer and tests.

mod memory;
mod query;

use std::future::Future;

use thiserror::Error;

use crate::model::{GraphData, GraphEdge, GraphNode, QueryRequest, QueryResponse};

pub use memory::StaticGraphProvider;
pub use query::LocalQueryEngine;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("node `{0}` not found")]
    NodeNotFound(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodePage {
    pub limit: usize,
    pub offset: usize,
    pub type_filter: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgePage {
    pub limit: usize,
    pub offset: usize,
    pub min_weight: Option<f32>,
}

pub trait GraphDataProvider: Send + Sync {
    fn get_nodes(
        &self,
        page: NodePage,
    ) -> impl Future<Output = Result<Vec<GraphNode>, ProviderError>> + Send;

    fn get_edges(
        &self,
        page: EdgePage,
    ) -> impl Future<Output = Result<Vec<GraphEdge>, ProviderError>> + Send;

    fn get_subgraph(
        &self,
        center_id: &str,
        depth: usize,
    ) -> impl Future<Output = Result<GraphData, ProviderError>> + Send;

    fn search_nodes(
        &self,
        keyword: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<GraphNode>, ProviderError>> + Send;
}

pub trait QueryProvider: Send + Sync {
    fn execute_query(
        &self,
        request: QueryRequest,
    ) -> impl Future<Output = Result<QueryResponse, ProviderError>> + Send;
}
