use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use anyhow::{Context as _, Result};
use eframe::egui::{self, Context, Vec2};
use hyperlens::animation::{AnimationEvent, PathHighlight, PlaybackController};
use hyperlens::cache::IncrementalCache;
use hyperlens::config::Settings;
use hyperlens::culling::ViewportCuller;
use hyperlens::hull::{HullBuilder, HullPolygon, NodeFootprint};
use hyperlens::layout::LayoutEngine;
use hyperlens::model::{GraphEdge, GraphNode, Point2D, QueryMode, QueryResponse};
use hyperlens::provider::{LocalQueryEngine, StaticGraphProvider};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

mod graph;
mod render_utils;
mod source;
mod tasks;
mod ui;

pub use source::GraphSource;

use source::read_source;
use tasks::TaskOutcome;

type GraphCache = IncrementalCache<StaticGraphProvider>;

pub struct HyperlensApp {
    runtime: Runtime,
    source: GraphSource,
    settings: Settings,
    state: AppState,
    reload_rx: Option<Receiver<Result<LoadedGraph, String>>>,
}

enum AppState {
    Loading {
        rx: Receiver<Result<LoadedGraph, String>>,
    },
    Ready(Box<ViewModel>),
    Error(String),
}

struct LoadedGraph {
    cache: Arc<GraphCache>,
    query_engine: Arc<LocalQueryEngine>,
    fixed_positions: HashMap<String, Point2D>,
    total_nodes: usize,
}

struct ViewModel {
    runtime: Handle,
    settings: Settings,
    cache: Arc<GraphCache>,
    query_engine: Arc<LocalQueryEngine>,
    total_nodes: usize,
    graph: RenderGraph,
    graph_dirty: bool,
    positions: HashMap<String, Point2D>,
    layout: Option<LayoutEngine>,
    layout_progress: Option<f32>,
    relayout_pending: bool,
    culler: ViewportCuller,
    auto_load: bool,
    hull_builder: HullBuilder,
    hulls: Vec<HullPolygon>,
    hulls_dirty: bool,
    playback: PlaybackController,
    playback_events: UnboundedReceiver<AnimationEvent>,
    highlight: PathHighlight,
    last_step: Option<(String, f32)>,
    query_text: String,
    query_mode: QueryMode,
    query_pending: bool,
    last_response: Option<QueryResponse>,
    search: String,
    search_hits: Vec<GraphNode>,
    selected: Option<String>,
    dragging: Option<usize>,
    export_path: String,
    task_tx: Sender<TaskOutcome>,
    task_rx: Receiver<TaskOutcome>,
    status: Option<String>,
    pan: Vec2,
    zoom: f32,
}

/// Cached graph flattened for drawing. `edge_pairs` is parallel to `edges`
/// and holds node indices of each edge's source and target, `usize::MAX`
/// when an endpoint is not loaded yet.
#[derive(Default)]
struct RenderGraph {
    nodes: Vec<GraphNode>,
    footprints: Vec<NodeFootprint>,
    edges: Vec<GraphEdge>,
    edge_pairs: Vec<(usize, usize)>,
    index_by_id: HashMap<String, usize>,
    edge_index_by_id: HashMap<String, usize>,
}

async fn load_graph(source: GraphSource, settings: Settings) -> Result<LoadedGraph> {
    let label = source.label();
    let graph = tokio::task::spawn_blocking(move || read_source(&source))
        .await
        .context("graph reader stopped unexpectedly")??;

    let total_nodes = graph.data.nodes.len();
    let provider = StaticGraphProvider::new(graph.data);
    let query_engine = Arc::new(LocalQueryEngine::new(provider.clone()));
    let cache = Arc::new(IncrementalCache::new(provider, settings.cache));
    let first_page = cache
        .load_initial(None)
        .await
        .context("failed to load the first page")?;

    info!(
        source = %label,
        total_nodes,
        loaded_nodes = first_page.nodes.len(),
        loaded_edges = first_page.edges.len(),
        fixed_positions = graph.fixed_positions.len(),
        "graph loaded"
    );

    Ok(LoadedGraph {
        cache,
        query_engine,
        fixed_positions: graph.fixed_positions,
        total_nodes,
    })
}

impl HyperlensApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        runtime: Runtime,
        source: GraphSource,
        settings: Settings,
    ) -> Self {
        let rx = Self::spawn_load(&runtime, &cc.egui_ctx, source.clone(), settings.clone());
        Self {
            runtime,
            source,
            settings,
            state: AppState::Loading { rx },
            reload_rx: None,
        }
    }

    fn spawn_load(
        runtime: &Runtime,
        ctx: &Context,
        source: GraphSource,
        settings: Settings,
    ) -> Receiver<Result<LoadedGraph, String>> {
        let (tx, rx) = mpsc::channel();
        let ctx = ctx.clone();

        runtime.spawn(async move {
            let result = load_graph(source, settings)
                .await
                .map_err(|error| format!("{error:#}"));
            let _ = tx.send(result);
            ctx.request_repaint();
        });

        rx
    }

    fn ready(&self, loaded: LoadedGraph) -> AppState {
        AppState::Ready(Box::new(ViewModel::new(
            loaded,
            self.settings.clone(),
            self.runtime.handle().clone(),
        )))
    }
}

impl eframe::App for HyperlensApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let mut transition = None;
        let mut retry = false;
        let source_label = self.source.label();

        match &mut self.state {
            AppState::Loading { rx } => {
                match rx.try_recv() {
                    Ok(result) => transition = Some(result),
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => {
                        transition = Some(Err("Background load task stopped".to_owned()));
                    }
                }

                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading(format!("Loading {source_label}..."));
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Failed to load graph");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    retry = ui.button("Retry").clicked();
                });
            }
            AppState::Ready(model) => {
                let mut reload_requested = false;
                let is_reloading = self.reload_rx.is_some();
                model.show(ctx, &source_label, &mut reload_requested, is_reloading);

                if reload_requested && self.reload_rx.is_none() {
                    self.reload_rx = Some(Self::spawn_load(
                        &self.runtime,
                        ctx,
                        self.source.clone(),
                        self.settings.clone(),
                    ));
                }

                if let Some(rx) = self.reload_rx.take() {
                    match rx.try_recv() {
                        Ok(result) => transition = Some(result),
                        Err(TryRecvError::Empty) => self.reload_rx = Some(rx),
                        Err(TryRecvError::Disconnected) => {
                            transition = Some(Err("Background load task stopped".to_owned()));
                        }
                    }
                }
            }
        }

        if retry {
            let rx = Self::spawn_load(
                &self.runtime,
                ctx,
                self.source.clone(),
                self.settings.clone(),
            );
            self.state = AppState::Loading { rx };
            return;
        }

        if let Some(result) = transition {
            self.reload_rx = None;
            self.state = match result {
                Ok(loaded) => self.ready(loaded),
                Err(error) => AppState::Error(error),
            };
        }
    }
}
