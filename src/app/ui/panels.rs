use std::sync::mpsc;
use std::time::Duration;

use eframe::egui::{self, Align, Context, Layout, Vec2};
use hyperlens::animation::{AnimationStatus, PathHighlight, PlaybackController};
use hyperlens::config::Settings;
use hyperlens::culling::ViewportCuller;
use hyperlens::hull::HullBuilder;
use hyperlens::layout::LayoutEngine;
use hyperlens::model::QueryMode;
use tokio::runtime::Handle;
use tracing::warn;

use super::super::{LoadedGraph, RenderGraph, ViewModel};

const PLAYBACK_REPAINT: Duration = Duration::from_millis(50);

impl ViewModel {
    pub(in crate::app) fn new(loaded: LoadedGraph, settings: Settings, runtime: Handle) -> Self {
        let layout = LayoutEngine::spawn()
            .inspect_err(|error| warn!(%error, "layout worker unavailable"))
            .ok();
        let (playback, playback_events) =
            PlaybackController::new(runtime.clone(), settings.animation.speed_ms);
        let (task_tx, task_rx) = mpsc::channel();

        Self {
            culler: ViewportCuller::new(settings.culling.clone()),
            hull_builder: HullBuilder::new(settings.hull.padding),
            status: layout
                .is_none()
                .then(|| "Layout worker unavailable; positions stay fixed".to_owned()),
            runtime,
            settings,
            cache: loaded.cache,
            query_engine: loaded.query_engine,
            total_nodes: loaded.total_nodes,
            graph: RenderGraph::default(),
            graph_dirty: true,
            positions: loaded.fixed_positions,
            layout,
            layout_progress: None,
            relayout_pending: false,
            auto_load: true,
            hulls: Vec::new(),
            hulls_dirty: true,
            playback,
            playback_events,
            highlight: PathHighlight::default(),
            last_step: None,
            query_text: String::new(),
            query_mode: QueryMode::Hybrid,
            query_pending: false,
            last_response: None,
            search: String::new(),
            search_hits: Vec::new(),
            selected: None,
            dragging: None,
            export_path: "hyperlens-export.json".to_owned(),
            task_tx,
            task_rx,
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }

    fn visible_graph_text(&self) -> String {
        let stats = self.culler.stats();
        format!(
            "visible: {}/{} nodes, {}/{} edges",
            stats.visible_nodes, stats.total_nodes, stats.visible_edges, stats.total_edges
        )
    }

    pub(in crate::app) fn show(
        &mut self,
        ctx: &Context,
        source_label: &str,
        reload_requested: &mut bool,
        is_reloading: bool,
    ) {
        self.poll_tasks();
        if self.poll_layout() {
            ctx.request_repaint();
        }
        self.poll_playback();
        if self.playback.state().status == AnimationStatus::Playing {
            ctx.request_repaint_after(PLAYBACK_REPAINT);
        }
        if self.graph_dirty {
            self.rebuild_render_graph();
        }

        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("hyperlens");
                    ui.separator();
                    ui.label(format!("source: {source_label}"));
                    ui.label(format!("nodes: {}", self.graph.nodes.len()));
                    ui.label(format!("edges: {}", self.graph.edges.len()));
                    let hyperedges = self
                        .graph
                        .edges
                        .iter()
                        .filter(|edge| edge.is_hyperedge())
                        .count();
                    ui.label(format!("hyperedges: {hyperedges}"));
                    let reload_button =
                        ui.add_enabled(!is_reloading, egui::Button::new("Reload source"));
                    if reload_button.clicked() {
                        *reload_requested = true;
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        ui.label(self.visible_graph_text());
                        if let Some(progress) = self.layout_progress {
                            ui.add(
                                egui::ProgressBar::new(progress)
                                    .desired_width(120.0)
                                    .text("layout"),
                            );
                        }
                    });
                });
                if let Some(status) = self.status.clone() {
                    ui.horizontal(|ui| {
                        ui.colored_label(egui::Color32::from_rgb(248, 113, 113), status);
                        if ui.small_button("Dismiss").clicked() {
                            self.status = None;
                        }
                    });
                }
            });

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(350.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.draw_controls(ui));
            });

        egui::SidePanel::right("query")
            .resizable(true)
            .default_width(360.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.draw_query_panel(ui));
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            if is_reloading {
                ui.vertical_centered(|ui| {
                    ui.add_space(120.0);
                    ui.heading("Reloading graph...");
                    ui.add_space(8.0);
                    ui.spinner();
                });
            } else {
                self.draw_graph(ui);
            }
        });
    }
}
