use eframe::egui::{self, Ui};
use hyperlens::animation::{
    AnimationCommand, AnimationStatus, MAX_SPEED_MS, MIN_SPEED_MS, classify,
};
use hyperlens::model::QueryMode;
use tracing::debug;

use super::super::ViewModel;

impl ViewModel {
    fn send_playback(&mut self, command: AnimationCommand) {
        match self.playback.send(command) {
            Ok(state) => {
                debug!(?command, status = ?state.status, step = state.step, "playback command");
                self.refresh_highlight();
            }
            Err(error) => self.status = Some(error.to_string()),
        }
    }

    pub(in crate::app) fn draw_query_panel(&mut self, ui: &mut Ui) {
        ui.heading("Query");
        ui.separator();

        let ctx = ui.ctx().clone();
        let response = ui.text_edit_singleline(&mut self.query_text);
        let submitted =
            response.lost_focus() && ui.input(|input| input.key_pressed(egui::Key::Enter));

        ui.horizontal_wrapped(|ui| {
            for mode in QueryMode::ALL {
                ui.selectable_value(&mut self.query_mode, mode, mode.label());
            }
        });

        let can_run = !self.query_pending && !self.query_text.trim().is_empty();
        let clicked = ui
            .add_enabled(can_run, egui::Button::new("Run query"))
            .clicked();
        if (submitted || clicked) && can_run {
            self.request_query(&ctx);
        }
        if self.query_pending {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Running query...");
            });
        }

        if let Some(response) = &self.last_response {
            ui.add_space(6.0);
            ui.label(response.answer.as_str());
            ui.small(format!("{:.1} ms", response.execution_time * 1000.0));
            if !response.context_used.is_empty() {
                ui.collapsing("Context", |ui| {
                    for context in &response.context_used {
                        ui.label(context.as_str());
                    }
                });
            }
        }

        ui.separator();
        self.draw_playback(ui);
        ui.separator();
        self.draw_path_list(ui);
        ui.separator();
        self.draw_selection(ui);
    }

    fn draw_playback(&mut self, ui: &mut Ui) {
        ui.label("Path playback");
        let state = self.playback.state();
        let path_len = self.playback.path().len();
        let has_path = self.playback.has_path();
        let playing = state.status == AnimationStatus::Playing;

        let shown = state.visible_step().map_or(0, |step| step + 1);
        ui.label(format!("{:?}: {shown}/{path_len}", state.status));
        if let Some((node_id, score)) = self.last_step.as_ref().filter(|_| state.entered) {
            let label = self
                .graph
                .index_by_id
                .get(node_id)
                .map_or(node_id.as_str(), |&index| self.graph.nodes[index].display_label());
            ui.small(format!("at {label} (score {score:.2})"));
        }

        let mut command = None;
        let mut clear = false;
        ui.horizontal_wrapped(|ui| {
            match state.status {
                AnimationStatus::Idle => {
                    if ui.add_enabled(has_path, egui::Button::new("Play")).clicked() {
                        command = Some(AnimationCommand::Play);
                    }
                }
                AnimationStatus::Playing => {
                    if ui.button("Pause").clicked() {
                        command = Some(AnimationCommand::Pause);
                    }
                }
                AnimationStatus::Paused => {
                    if ui.button("Resume").clicked() {
                        command = Some(AnimationCommand::Resume);
                    }
                }
                AnimationStatus::Completed => {}
            }
            if ui
                .add_enabled(has_path && !playing, egui::Button::new("Back"))
                .clicked()
            {
                command = Some(AnimationCommand::StepBackward);
            }
            if ui
                .add_enabled(has_path && !playing, egui::Button::new("Forward"))
                .clicked()
            {
                command = Some(AnimationCommand::StepForward);
            }
            if ui
                .add_enabled(has_path && !playing, egui::Button::new("Reset"))
                .clicked()
            {
                command = Some(AnimationCommand::Reset);
            }
            if ui
                .add_enabled(has_path, egui::Button::new("Clear"))
                .on_hover_text("Drop the query path and its highlight.")
                .clicked()
            {
                clear = true;
            }
        });

        if has_path {
            let mut step = state.step;
            let scrubbed = ui
                .add_enabled(
                    !playing,
                    egui::Slider::new(&mut step, 0..=path_len - 1).text("Step"),
                )
                .changed();
            if scrubbed {
                command = Some(AnimationCommand::Scrub(step));
            }
        }

        let mut speed = state.speed_ms;
        if ui
            .add(
                egui::Slider::new(&mut speed, MIN_SPEED_MS..=MAX_SPEED_MS)
                    .text("ms per step"),
            )
            .changed()
        {
            command = Some(AnimationCommand::SetSpeed(speed));
        }

        if clear {
            self.playback.clear_path();
            self.last_step = None;
            self.refresh_highlight();
        } else if let Some(command) = command {
            self.send_playback(command);
        }
    }

    fn draw_path_list(&mut self, ui: &mut Ui) {
        let path = self.playback.path();
        if path.is_empty() {
            ui.label("Run a query to get a path.");
            return;
        }

        let current = self.highlight.current.clone();
        let mut focus = None;
        egui::ScrollArea::vertical()
            .id_salt("query_path")
            .max_height(220.0)
            .show(ui, |ui| {
                for (position, id) in path.nodes.iter().enumerate() {
                    let label = self
                        .graph
                        .index_by_id
                        .get(id)
                        .map_or(id.as_str(), |&index| self.graph.nodes[index].display_label());
                    let text = format!(
                        "{}. {label}  {:.2} {}",
                        position + 1,
                        path.score(id),
                        classify(&path, id).label()
                    );
                    if ui
                        .selectable_label(current.as_deref() == Some(id.as_str()), text)
                        .clicked()
                    {
                        focus = Some(id.clone());
                    }
                }
            });
        if let Some(id) = focus {
            self.focus_node(&id);
            self.selected = Some(id);
        }
    }

    fn draw_selection(&mut self, ui: &mut Ui) {
        let Some(id) = self.selected.clone() else {
            ui.label("Click a node to inspect it.");
            return;
        };
        let Some(node) = self.cache.node(&id) else {
            ui.label(format!("{id} is not loaded."));
            return;
        };

        ui.label(egui::RichText::new(node.display_label()).strong());
        ui.label(format!("type: {}", node.node_type));
        ui.label(format!("weight: {:.2}", node.weight));
        if !node.description.is_empty() {
            ui.label(node.description.as_str());
        }

        let incident = self
            .graph
            .edges
            .iter()
            .filter(|edge| edge.members().any(|member| member == id))
            .collect::<Vec<_>>();
        ui.collapsing(format!("Relations ({})", incident.len()), |ui| {
            for edge in &incident {
                let kind = if edge.is_hyperedge() {
                    format!("hyperedge of {}", edge.arity())
                } else {
                    format!("{} -> {}", edge.source, edge.target)
                };
                ui.label(format!("{} ({kind})", edge.relation));
            }
        });

        let ctx = ui.ctx().clone();
        if ui
            .button("Load neighborhood")
            .on_hover_text("Fetch every entity one hop away, even outside loaded pages.")
            .clicked()
        {
            self.request_neighborhood(&ctx, id);
        }
    }
}
