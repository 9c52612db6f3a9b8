use std::future::Future;
use std::sync::Arc;

use eframe::egui::Context;
use hyperlens::cache::Collection;
use hyperlens::model::{GraphData, GraphNode, QueryRequest, QueryResponse};
use hyperlens::provider::QueryProvider;
use tracing::{debug, warn};

use super::ViewModel;

const SEARCH_LIMIT: usize = 20;
const NEIGHBORHOOD_DEPTH: usize = 1;

// Keeps the source chain, e.g. "failed to fetch nodes: provider unavailable".
fn describe(error: impl Into<anyhow::Error>) -> String {
    format!("{:#}", error.into())
}

pub(in crate::app) enum TaskOutcome {
    Merged(GraphData),
    Query(QueryResponse),
    QueryFailed(String),
    Search(Vec<GraphNode>),
    Failed(String),
}

impl ViewModel {
    fn spawn_task<F>(&self, ctx: &Context, task: F)
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        let tx = self.task_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let _ = tx.send(task.await);
            ctx.request_repaint();
        });
    }

    pub(in crate::app) fn request_load_more(&self, ctx: &Context, collection: Collection) {
        let cache = Arc::clone(&self.cache);
        self.spawn_task(ctx, async move {
            match cache.load_more(collection).await {
                Ok(page) => TaskOutcome::Merged(page),
                Err(error) => TaskOutcome::Failed(describe(error)),
            }
        });
    }

    pub(in crate::app) fn request_auto_load(&self, ctx: &Context) {
        if !self.auto_load || self.cache.is_loading() {
            return;
        }
        let stats = self.culler.stats();
        let cache = Arc::clone(&self.cache);
        self.spawn_task(ctx, async move {
            match cache
                .auto_load_more(stats.visible_nodes, stats.visible_edges)
                .await
            {
                Ok(page) => TaskOutcome::Merged(page),
                Err(error) => TaskOutcome::Failed(describe(error)),
            }
        });
    }

    pub(in crate::app) fn request_first_page(&self, ctx: &Context) {
        let cache = Arc::clone(&self.cache);
        self.spawn_task(ctx, async move {
            match cache.load_initial(None).await {
                Ok(page) => TaskOutcome::Merged(page),
                Err(error) => TaskOutcome::Failed(describe(error)),
            }
        });
    }

    pub(in crate::app) fn request_neighborhood(&self, ctx: &Context, center_id: String) {
        let cache = Arc::clone(&self.cache);
        self.spawn_task(ctx, async move {
            match cache.preload_subgraph(&center_id, NEIGHBORHOOD_DEPTH).await {
                Ok(subgraph) => TaskOutcome::Merged(subgraph),
                Err(error) => TaskOutcome::Failed(describe(error)),
            }
        });
    }

    pub(in crate::app) fn request_search(&self, ctx: &Context) {
        let keyword = self.search.trim().to_owned();
        if keyword.is_empty() {
            return;
        }
        let cache = Arc::clone(&self.cache);
        self.spawn_task(ctx, async move {
            match cache.search_nodes(&keyword, SEARCH_LIMIT).await {
                Ok(hits) => TaskOutcome::Search(hits),
                Err(error) => TaskOutcome::Failed(describe(error)),
            }
        });
    }

    pub(in crate::app) fn request_query(&mut self, ctx: &Context) {
        let query = self.query_text.trim().to_owned();
        if query.is_empty() || self.query_pending {
            return;
        }
        self.query_pending = true;
        let request = QueryRequest::new(query, self.query_mode);
        let engine = Arc::clone(&self.query_engine);
        self.spawn_task(ctx, async move {
            match engine.execute_query(request).await {
                Ok(response) => TaskOutcome::Query(response),
                Err(error) => TaskOutcome::QueryFailed(describe(anyhow::Error::from(error).context("query failed"))),
            }
        });
    }

    pub(in crate::app) fn poll_tasks(&mut self) -> bool {
        let mut merged = false;
        while let Ok(outcome) = self.task_rx.try_recv() {
            match outcome {
                TaskOutcome::Merged(data) => {
                    debug!(
                        nodes = data.nodes.len(),
                        edges = data.edges.len(),
                        "background page merged"
                    );
                    merged |= !data.is_empty();
                }
                TaskOutcome::Query(response) => {
                    self.query_pending = false;
                    self.playback.load_path(response.query_path.clone());
                    self.last_step = None;
                    self.last_response = Some(response);
                    self.refresh_highlight();
                }
                TaskOutcome::QueryFailed(message) => {
                    self.query_pending = false;
                    warn!(%message, "query failed");
                    self.status = Some(message);
                }
                TaskOutcome::Search(hits) => {
                    self.search_hits = hits;
                    merged = true;
                }
                TaskOutcome::Failed(message) => {
                    warn!(%message, "background task failed");
                    self.status = Some(message);
                }
            }
        }
        if merged {
            self.graph_dirty = true;
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hyperlens::cache::CacheError;
    use hyperlens::provider::ProviderError;

    use super::*;

    #[test]
    fn failures_keep_the_provider_cause() {
        let error = CacheError::Fetch {
            collection: Collection::Nodes,
            source: Arc::new(ProviderError::Unavailable("backend offline".into())),
        };
        let message = describe(error);
        assert!(message.starts_with("failed to fetch nodes"), "{message}");
        assert!(message.ends_with("provider unavailable: backend offline"), "{message}");
    }
}
