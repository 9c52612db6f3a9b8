use std::fs;

use anyhow::{Context as _, Result};
use eframe::egui::{self, Ui};
use hyperlens::cache::Collection;
use hyperlens::hull::HullBuilder;
use hyperlens::interchange::{Envelope, export_json};
use hyperlens::layout::LayoutAlgorithm;
use tracing::info;

use super::super::ViewModel;
use super::super::render_utils::node_style;

impl ViewModel {
    pub(in crate::app) fn draw_controls(&mut self, ui: &mut Ui) {
        ui.heading("Graph Controls");
        ui.separator();
        ui.add_space(4.0);

        self.draw_layout_controls(ui);
        ui.separator();
        self.draw_view_controls(ui);
        ui.separator();
        self.draw_data_controls(ui);
        ui.separator();
        self.draw_search(ui);
        ui.separator();
        self.draw_export(ui);
    }

    fn draw_layout_controls(&mut self, ui: &mut Ui) {
        ui.label("Layout");
        let params = &mut self.settings.layout;
        egui::ComboBox::from_label("Algorithm")
            .selected_text(params.algorithm.clone())
            .show_ui(ui, |ui| {
                for algorithm in LayoutAlgorithm::ALL {
                    ui.selectable_value(
                        &mut params.algorithm,
                        algorithm.id().to_owned(),
                        algorithm.id(),
                    );
                }
            });

        ui.collapsing("Force tuning", |ui| {
            ui.add(egui::Slider::new(&mut params.iterations, 10..=5000).text("Iterations"))
                .on_hover_text("Simulation steps per layout run.");
            ui.add(
                egui::Slider::new(&mut params.ideal_edge_length, 20.0..=400.0)
                    .text("Ideal edge length"),
            )
            .on_hover_text("Rest length of the spring between connected nodes.");
            ui.add(
                egui::Slider::new(&mut params.node_repulsion, 100.0..=50_000.0)
                    .logarithmic(true)
                    .text("Repulsion"),
            )
            .on_hover_text("Inverse-square push between every pair of nodes.");
            ui.add(
                egui::Slider::new(&mut params.gravity, 0.0..=0.05)
                    .step_by(0.0005)
                    .text("Gravity"),
            )
            .on_hover_text("Pull of every node toward the origin.");
            ui.add(egui::Slider::new(&mut params.damping, 0.05..=0.99).text("Damping"))
                .on_hover_text("Velocity kept between steps.");
        });

        let running = self.layout_running();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(self.layout.is_some() && !running, egui::Button::new("Run layout"))
                .clicked()
            {
                self.request_layout();
            }
            if ui
                .add_enabled(running, egui::Button::new("Stop"))
                .on_hover_text("Cancel the running layout. Its results are discarded.")
                .clicked()
            {
                self.stop_layout();
            }
        });
        if let Some(progress) = self.layout_progress {
            ui.add(egui::ProgressBar::new(progress).show_percentage());
        }
    }

    fn draw_view_controls(&mut self, ui: &mut Ui) {
        ui.label("View");
        let mut culling = self.culler.config().clone();
        let mut culling_changed = ui
            .checkbox(&mut culling.enabled, "Viewport culling")
            .on_hover_text("Skip drawing elements outside the visible area when zoomed out.")
            .changed();
        ui.add_enabled_ui(culling.enabled, |ui| {
            culling_changed |= ui
                .add(egui::Slider::new(&mut culling.padding, 0.0..=500.0).text("Culling padding"))
                .changed();
            culling_changed |= ui
                .add(egui::Slider::new(&mut culling.min_zoom, 0.05..=3.0).text("Cull below zoom"))
                .on_hover_text("Culling only applies at or below this zoom level.")
                .changed();
            culling_changed |= ui
                .add(egui::Slider::new(&mut culling.throttle_ms, 0..=500).text("Throttle (ms)"))
                .changed();
        });
        if culling_changed {
            self.settings.culling = culling.clone();
            self.culler.set_config(culling);
            self.culler
                .on_elements_changed(&self.graph.footprints, &self.graph.edge_pairs);
        }

        let hull_enabled = ui
            .checkbox(&mut self.settings.hull.enabled, "Hyperedge regions")
            .on_hover_text("Shade the convex region around every hyperedge's members.")
            .changed();
        let hull_padding = ui
            .add_enabled(
                self.settings.hull.enabled,
                egui::Slider::new(&mut self.settings.hull.padding, 0.0..=80.0)
                    .text("Region padding"),
            )
            .changed();
        if hull_padding {
            self.hull_builder = HullBuilder::new(self.settings.hull.padding);
        }
        self.hulls_dirty |= hull_enabled || hull_padding;

        ui.horizontal(|ui| {
            ui.label(format!("zoom: {:.2}", self.zoom));
            if ui.small_button("Reset view").clicked() {
                self.pan = egui::Vec2::ZERO;
                self.zoom = 1.0;
            }
        });
    }

    fn draw_data_controls(&mut self, ui: &mut Ui) {
        ui.label("Data");
        let stats = self.cache.stats();
        ui.label(stats.status_message());
        ui.add(
            egui::ProgressBar::new(stats.progress(Some(self.total_nodes)) / 100.0).text(format!(
                "{} of {} nodes, {} edges",
                stats.cached_nodes, self.total_nodes, stats.cached_edges
            )),
        );

        ui.checkbox(&mut self.auto_load, "Load more while exploring")
            .on_hover_text("Fetch the next page when most cached elements are on screen.");

        let ctx = ui.ctx().clone();
        ui.horizontal_wrapped(|ui| {
            if ui
                .add_enabled(stats.has_more_nodes, egui::Button::new("More nodes"))
                .clicked()
            {
                self.request_load_more(&ctx, Collection::Nodes);
            }
            if ui
                .add_enabled(stats.has_more_edges, egui::Button::new("More edges"))
                .clicked()
            {
                self.request_load_more(&ctx, Collection::Edges);
            }
            if ui
                .button("Reload first page")
                .on_hover_text("Discard cached pages and fetch the first page again.")
                .clicked()
            {
                self.request_first_page(&ctx);
            }
        });
    }

    fn draw_search(&mut self, ui: &mut Ui) {
        ui.label("Find entity")
            .on_hover_text("Fuzzy search over all entities, including ones not loaded yet.");
        let ctx = ui.ctx().clone();
        let response = ui.text_edit_singleline(&mut self.search);
        if response.lost_focus() && ui.input(|input| input.key_pressed(egui::Key::Enter)) {
            self.request_search(&ctx);
        }

        let mut focus = None;
        for hit in &self.search_hits {
            let label = format!("{} ({})", hit.display_label(), hit.node_type);
            if ui
                .selectable_label(self.selected.as_deref() == Some(hit.id.as_str()), label)
                .clicked()
            {
                focus = Some(hit.id.clone());
            }
        }
        if let Some(id) = focus {
            self.focus_node(&id);
            self.request_neighborhood(&ctx, id.clone());
            self.selected = Some(id);
        }
    }

    fn draw_export(&mut self, ui: &mut Ui) {
        ui.label("Export");
        ui.text_edit_singleline(&mut self.export_path);
        if ui
            .button("Export graph and layout")
            .on_hover_text("Write the cached graph with current positions as a JSON envelope.")
            .clicked()
            && let Err(error) = self.export_envelope()
        {
            self.status = Some(format!("{error:#}"));
        }
    }

    fn export_envelope(&self) -> Result<()> {
        let graph = self.cache.snapshot();
        let styles = graph
            .nodes
            .iter()
            .map(|node| (node.id.clone(), node_style(node)))
            .collect();
        let envelope = Envelope::new(graph)
            .with_layout(&self.positions)
            .with_styles(styles);
        let json = export_json(&envelope).context("failed to encode graph")?;
        fs::write(&self.export_path, json)
            .with_context(|| format!("failed to write {}", self.export_path))?;
        info!(
            path = %self.export_path,
            nodes = envelope.nodes.len(),
            edges = envelope.edges.len(),
            "graph exported"
        );
        Ok(())
    }
}
