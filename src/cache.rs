//! Paged client-side copy of the graph. Fetches are single-flight per
//! collection: late callers share the running fetch's outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{GraphData, GraphEdge, GraphNode};
use crate::provider::{EdgePage, GraphDataProvider, NodePage, ProviderError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    Nodes,
    Edges,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nodes => "nodes",
            Self::Edges => "edges",
        })
    }
}

#[derive(Clone, Debug, Error)]
pub enum CacheError {
    #[error("failed to fetch {collection}")]
    Fetch {
        collection: Collection,
        #[source]
        source: Arc<ProviderError>,
    },
    #[error("failed to fetch subgraph around `{center}`")]
    Subgraph {
        center: String,
        #[source]
        source: Arc<ProviderError>,
    },
    #[error("node search failed")]
    Search {
        #[source]
        source: Arc<ProviderError>,
    },
}

impl CacheError {
    fn fetch(collection: Collection, source: ProviderError) -> Self {
        Self::Fetch {
            collection,
            source: Arc::new(source),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub initial_limit: usize,
    pub batch_size: usize,
    pub load_threshold: f32,
    pub type_filter: Option<String>,
    pub min_weight: Option<f32>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_limit: 1000,
            batch_size: 500,
            load_threshold: 0.8,
            type_filter: None,
            min_weight: None,
        }
    }
}

/// Prefetch trigger. An empty cache always asks for more.
pub fn should_load_more(visible_count: usize, loaded_count: usize, threshold: f32) -> bool {
    if loaded_count == 0 {
        return true;
    }
    visible_count as f32 / loaded_count as f32 >= threshold
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cached_nodes: usize,
    pub cached_edges: usize,
    pub has_more_nodes: bool,
    pub has_more_edges: bool,
    pub is_loading: bool,
}

impl CacheStats {
    pub fn progress(&self, total_expected: Option<usize>) -> f32 {
        match total_expected {
            Some(total) if total > 0 => {
                (self.cached_nodes as f32 / total as f32 * 100.0).min(100.0)
            }
            _ => 0.0,
        }
    }

    pub fn status_message(&self) -> String {
        if self.is_loading {
            format!(
                "Loading more data... ({} nodes, {} edges)",
                self.cached_nodes, self.cached_edges
            )
        } else if !self.has_more_nodes && !self.has_more_edges {
            "All data loaded".to_owned()
        } else {
            "Loading graph data...".to_owned()
        }
    }
}

trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for GraphNode {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for GraphEdge {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug)]
struct Store<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
    offset: usize,
    has_more: bool,
}

impl<T> Default for Store<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            offset: 0,
            has_more: true,
        }
    }
}

impl<T: Keyed + Clone> Store<T> {
    fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&slot| &self.items[slot])
    }

    fn upsert(&mut self, item: T) {
        match self.index.get(item.key()) {
            Some(&slot) => self.items[slot] = item,
            None => self.insert_new(item),
        }
    }

    fn insert_missing(&mut self, item: T) {
        if !self.index.contains_key(item.key()) {
            self.insert_new(item);
        }
    }

    fn insert_new(&mut self, item: T) {
        self.index.insert(item.key().to_owned(), self.items.len());
        self.items.push(item);
    }

    fn apply_page(&mut self, page: &[T], requested: usize) {
        for item in page {
            self.upsert(item.clone());
        }
        self.offset += page.len();
        self.has_more = page.len() >= requested;
    }
}

#[derive(Debug, Default)]
struct CacheState {
    nodes: Store<GraphNode>,
    edges: Store<GraphEdge>,
}

#[derive(Debug, Default)]
struct Flight {
    generation: u64,
    last: Option<Result<GraphData, CacheError>>,
}

#[derive(Debug, Default)]
struct FlightSlot {
    lock: tokio::sync::Mutex<Flight>,
    generation: AtomicU64,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Incremental cache over a [`GraphDataProvider`]. Share it behind an `Arc`
/// to drive it from several tasks.
pub struct IncrementalCache<P> {
    provider: P,
    config: CacheConfig,
    state: Mutex<CacheState>,
    node_flight: FlightSlot,
    edge_flight: FlightSlot,
    in_flight: AtomicUsize,
}

impl<P: GraphDataProvider> IncrementalCache<P> {
    pub fn new(provider: P, config: CacheConfig) -> Self {
        Self {
            provider,
            config: CacheConfig {
                batch_size: config.batch_size.max(1),
                initial_limit: config.initial_limit.max(1),
                ..config
            },
            state: Mutex::new(CacheState::default()),
            node_flight: FlightSlot::default(),
            edge_flight: FlightSlot::default(),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, collection: Collection) -> &FlightSlot {
        match collection {
            Collection::Nodes => &self.node_flight,
            Collection::Edges => &self.edge_flight,
        }
    }

    /// Fetches the first page of both collections and reseeds the cache with
    /// it. On failure the cache is left as it was.
    pub async fn load_initial(&self, limit: Option<usize>) -> Result<GraphData, CacheError> {
        let limit = limit.unwrap_or(self.config.initial_limit).max(1);
        let _nodes = self.node_flight.lock.lock().await;
        let _edges = self.edge_flight.lock.lock().await;
        let _loading = InFlight::enter(&self.in_flight);

        let (nodes, edges) = tokio::try_join!(
            async {
                self.provider
                    .get_nodes(self.node_page(limit, 0))
                    .await
                    .map_err(|error| CacheError::fetch(Collection::Nodes, error))
            },
            async {
                self.provider
                    .get_edges(self.edge_page(limit, 0))
                    .await
                    .map_err(|error| CacheError::fetch(Collection::Edges, error))
            },
        )
        .inspect_err(|error| warn!(%error, "initial graph load failed"))?;

        let mut state = self.state();
        *state = CacheState::default();
        state.nodes.apply_page(&nodes, limit);
        state.edges.apply_page(&edges, limit);
        info!(
            nodes = nodes.len(),
            edges = edges.len(),
            has_more_nodes = state.nodes.has_more,
            has_more_edges = state.edges.has_more,
            "initial graph page loaded"
        );
        drop(state);

        Ok(GraphData { nodes, edges })
    }

    /// Fetches the next page of `collection`. Returns an empty result without
    /// fetching once the collection is exhausted. A caller arriving while a
    /// fetch is running shares that fetch's outcome.
    pub async fn load_more(&self, collection: Collection) -> Result<GraphData, CacheError> {
        let slot = self.slot(collection);
        let observed = slot.generation.load(Ordering::Acquire);
        let mut flight = slot.lock.lock().await;
        if flight.generation != observed {
            if let Some(last) = &flight.last {
                return last.clone();
            }
        }

        let (offset, has_more) = {
            let state = self.state();
            match collection {
                Collection::Nodes => (state.nodes.offset, state.nodes.has_more),
                Collection::Edges => (state.edges.offset, state.edges.has_more),
            }
        };
        if !has_more {
            return Ok(GraphData::default());
        }

        let batch = self.config.batch_size;
        let outcome = {
            let _loading = InFlight::enter(&self.in_flight);
            self.fetch_page(collection, batch, offset).await
        };

        match &outcome {
            Ok(page) => {
                let mut state = self.state();
                let (fetched, has_more) = match collection {
                    Collection::Nodes => {
                        state.nodes.apply_page(&page.nodes, batch);
                        (page.nodes.len(), state.nodes.has_more)
                    }
                    Collection::Edges => {
                        state.edges.apply_page(&page.edges, batch);
                        (page.edges.len(), state.edges.has_more)
                    }
                };
                debug!(%collection, offset, fetched, has_more, "page merged");
                if !has_more {
                    info!(%collection, "collection exhausted");
                }
            }
            Err(error) => warn!(%collection, offset, %error, "page fetch failed"),
        }

        flight.generation += 1;
        flight.last = Some(outcome.clone());
        slot.generation.store(flight.generation, Ordering::Release);
        outcome
    }

    async fn fetch_page(
        &self,
        collection: Collection,
        limit: usize,
        offset: usize,
    ) -> Result<GraphData, CacheError> {
        match collection {
            Collection::Nodes => self
                .provider
                .get_nodes(self.node_page(limit, offset))
                .await
                .map(|nodes| GraphData {
                    nodes,
                    edges: Vec::new(),
                }),
            Collection::Edges => self
                .provider
                .get_edges(self.edge_page(limit, offset))
                .await
                .map(|edges| GraphData {
                    nodes: Vec::new(),
                    edges,
                }),
        }
        .map_err(|error| CacheError::fetch(collection, error))
    }

    fn node_page(&self, limit: usize, offset: usize) -> NodePage {
        NodePage {
            limit,
            offset,
            type_filter: self.config.type_filter.clone(),
        }
    }

    fn edge_page(&self, limit: usize, offset: usize) -> EdgePage {
        EdgePage {
            limit,
            offset,
            min_weight: self.config.min_weight,
        }
    }

    /// Loads the next page of each collection past the load threshold.
    pub async fn auto_load_more(
        &self,
        visible_nodes: usize,
        visible_edges: usize,
    ) -> Result<GraphData, CacheError> {
        let threshold = self.config.load_threshold;
        let (need_nodes, need_edges) = {
            let state = self.state();
            (
                state.nodes.has_more
                    && should_load_more(visible_nodes, state.nodes.items.len(), threshold),
                state.edges.has_more
                    && should_load_more(visible_edges, state.edges.items.len(), threshold),
            )
        };
        if !need_nodes && !need_edges {
            return Ok(GraphData::default());
        }

        let (nodes, edges) = tokio::try_join!(
            async {
                if need_nodes {
                    self.load_more(Collection::Nodes).await
                } else {
                    Ok(GraphData::default())
                }
            },
            async {
                if need_edges {
                    self.load_more(Collection::Edges).await
                } else {
                    Ok(GraphData::default())
                }
            },
        )?;

        Ok(GraphData {
            nodes: nodes.nodes,
            edges: edges.edges,
        })
    }

    /// Merges the neighborhood of `center_id` into the cache. Items already
    /// cached are kept and offsets are left untouched.
    pub async fn preload_subgraph(
        &self,
        center_id: &str,
        depth: usize,
    ) -> Result<GraphData, CacheError> {
        let subgraph = {
            let _loading = InFlight::enter(&self.in_flight);
            self.provider.get_subgraph(center_id, depth).await
        }
        .map_err(|error| CacheError::Subgraph {
            center: center_id.to_owned(),
            source: Arc::new(error),
        })?;

        let mut state = self.state();
        for node in &subgraph.nodes {
            state.nodes.insert_missing(node.clone());
        }
        for edge in &subgraph.edges {
            state.edges.insert_missing(edge.clone());
        }
        debug!(
            center = center_id,
            depth,
            nodes = subgraph.nodes.len(),
            edges = subgraph.edges.len(),
            "subgraph preloaded"
        );
        drop(state);

        Ok(subgraph)
    }

    /// Keyword search through the provider. Hits are added to the cache
    /// without moving offsets.
    pub async fn search_nodes(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<GraphNode>, CacheError> {
        let hits = self
            .provider
            .search_nodes(keyword, limit)
            .await
            .map_err(|error| CacheError::Search {
                source: Arc::new(error),
            })?;

        let mut state = self.state();
        for node in &hits {
            state.nodes.insert_missing(node.clone());
        }
        Ok(hits)
    }

    pub fn snapshot(&self) -> GraphData {
        let state = self.state();
        GraphData {
            nodes: state.nodes.items.clone(),
            edges: state.edges.items.clone(),
        }
    }

    pub fn node(&self, id: &str) -> Option<GraphNode> {
        self.state().nodes.get(id).cloned()
    }

    pub fn edge(&self, id: &str) -> Option<GraphEdge> {
        self.state().edges.get(id).cloned()
    }

    pub fn offsets(&self) -> (usize, usize) {
        let state = self.state();
        (state.nodes.offset, state.edges.offset)
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            cached_nodes: state.nodes.items.len(),
            cached_edges: state.edges.items.len(),
            has_more_nodes: state.nodes.has_more,
            has_more_edges: state.edges.has_more,
            is_loading: self.is_loading(),
        }
    }

    pub fn clear(&self) {
        *self.state() = CacheState::default();
        debug!("graph cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use super::*;
    use crate::provider::StaticGraphProvider;

    struct SlowProvider {
        inner: StaticGraphProvider,
        delay: Duration,
        node_calls: AtomicUsize,
        edge_calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl SlowProvider {
        fn new(nodes: usize, edges: usize) -> Self {
            let data = GraphData {
                nodes: (0..nodes)
                    .map(|index| GraphNode::new(format!("n{index}"), "concept", 1.0))
                    .collect(),
                edges: (0..edges)
                    .map(|index| {
                        GraphEdge::binary(
                            format!("e{index}"),
                            format!("n{}", index % nodes.max(1)),
                            format!("n{}", (index + 1) % nodes.max(1)),
                            1.0,
                        )
                    })
                    .collect(),
            };
            Self {
                inner: StaticGraphProvider::new(data),
                delay: Duration::from_millis(50),
                node_calls: AtomicUsize::new(0),
                edge_calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }

        fn check(&self) -> Result<(), ProviderError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(ProviderError::Unavailable("backend offline".into()))
            } else {
                Ok(())
            }
        }
    }

    impl GraphDataProvider for SlowProvider {
        async fn get_nodes(&self, page: NodePage) -> Result<Vec<GraphNode>, ProviderError> {
            self.node_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.check()?;
            self.inner.get_nodes(page).await
        }

        async fn get_edges(&self, page: EdgePage) -> Result<Vec<GraphEdge>, ProviderError> {
            self.edge_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.check()?;
            self.inner.get_edges(page).await
        }

        async fn get_subgraph(
            &self,
            center_id: &str,
            depth: usize,
        ) -> Result<GraphData, ProviderError> {
            self.check()?;
            self.inner.get_subgraph(center_id, depth).await
        }

        async fn search_nodes(
            &self,
            keyword: &str,
            limit: usize,
        ) -> Result<Vec<GraphNode>, ProviderError> {
            self.inner.search_nodes(keyword, limit).await
        }
    }

    fn cache(nodes: usize, edges: usize, initial: usize, batch: usize) -> IncrementalCache<SlowProvider> {
        IncrementalCache::new(
            SlowProvider::new(nodes, edges),
            CacheConfig {
                initial_limit: initial,
                batch_size: batch,
                ..CacheConfig::default()
            },
        )
    }

    #[test]
    fn load_trigger_uses_visible_ratio() {
        assert!(should_load_more(80, 100, 0.8));
        assert!(!should_load_more(70, 100, 0.8));
        assert!(should_load_more(0, 0, 0.8));
    }

    #[tokio::test(start_paused = true)]
    async fn initial_page_seeds_offsets_and_flags() {
        let cache = cache(25, 5, 10, 10);
        let data = cache.load_initial(None).await.unwrap();
        assert_eq!(data.nodes.len(), 10);
        assert_eq!(data.edges.len(), 5);

        let stats = cache.stats();
        assert!(stats.has_more_nodes);
        assert!(!stats.has_more_edges);
        assert_eq!(cache.offsets(), (10, 5));
        assert!(cache.node("n9").is_some());
        assert!(cache.node("n10").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn full_page_never_proves_exhaustion() {
        let cache = cache(20, 0, 10, 10);
        cache.load_initial(None).await.unwrap();
        let page = cache.load_more(Collection::Nodes).await.unwrap();
        assert_eq!(page.nodes.len(), 10);
        assert!(cache.stats().has_more_nodes);

        let last = cache.load_more(Collection::Nodes).await.unwrap();
        assert!(last.nodes.is_empty());
        assert!(!cache.stats().has_more_nodes);

        let calls = cache.provider().node_calls.load(Ordering::SeqCst);
        assert!(cache.load_more(Collection::Nodes).await.unwrap().is_empty());
        assert_eq!(cache.provider().node_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_fetch() {
        let cache = cache(100, 0, 10, 10);
        cache.load_initial(None).await.unwrap();
        let before = cache.provider().node_calls.load(Ordering::SeqCst);

        let (first, second) = tokio::join!(
            cache.load_more(Collection::Nodes),
            cache.load_more(Collection::Nodes),
        );
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(cache.provider().node_calls.load(Ordering::SeqCst), before + 1);
        assert_eq!(cache.offsets().0, 20);

        cache.load_more(Collection::Nodes).await.unwrap();
        assert_eq!(cache.offsets().0, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_leaves_cache_untouched() {
        let cache = cache(100, 0, 10, 10);
        cache.load_initial(None).await.unwrap();
        let before = cache.snapshot();

        cache.provider().fail.store(true, Ordering::SeqCst);
        let error = cache.load_more(Collection::Nodes).await.unwrap_err();
        assert!(matches!(
            &error,
            CacheError::Fetch {
                collection: Collection::Nodes,
                ..
            }
        ));
        assert!(std::error::Error::source(&error).is_some());
        assert_eq!(cache.snapshot(), before);
        assert_eq!(cache.offsets().0, 10);
        assert!(!cache.is_loading());

        cache.provider().fail.store(false, Ordering::SeqCst);
        assert_eq!(cache.load_more(Collection::Nodes).await.unwrap().nodes.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_initial_load_keeps_previous_contents() {
        let cache = cache(30, 10, 10, 10);
        cache.load_initial(None).await.unwrap();
        cache.provider().fail.store(true, Ordering::SeqCst);
        assert!(cache.load_initial(Some(5)).await.is_err());
        assert_eq!(cache.stats().cached_nodes, 10);
        assert_eq!(cache.offsets(), (10, 10));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_load_only_fetches_collections_past_threshold() {
        let cache = cache(100, 100, 10, 10);
        cache.load_initial(None).await.unwrap();
        let edge_calls = cache.provider().edge_calls.load(Ordering::SeqCst);

        let loaded = cache.auto_load_more(9, 2).await.unwrap();
        assert_eq!(loaded.nodes.len(), 10);
        assert!(loaded.edges.is_empty());
        assert_eq!(cache.provider().edge_calls.load(Ordering::SeqCst), edge_calls);

        assert!(cache.auto_load_more(1, 1).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn subgraph_preload_keeps_offsets() {
        let cache = cache(50, 50, 5, 5);
        cache.load_initial(None).await.unwrap();
        let offsets = cache.offsets();

        let subgraph = cache.preload_subgraph("n30", 1).await.unwrap();
        assert!(!subgraph.nodes.is_empty());
        assert!(cache.node("n30").is_some());
        assert_eq!(cache.offsets(), offsets);

        assert!(matches!(
            cache.preload_subgraph("missing", 1).await,
            Err(CacheError::Subgraph { center, .. }) if center == "missing"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_resets_everything() {
        let cache = cache(20, 20, 10, 10);
        cache.load_initial(None).await.unwrap();
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.cached_nodes, 0);
        assert!(stats.has_more_nodes && stats.has_more_edges);
        assert_eq!(cache.offsets(), (0, 0));
        assert_eq!(stats.status_message(), "Loading graph data...");
    }
}
