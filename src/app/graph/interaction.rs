use eframe::egui::{self, Pos2, Rect, Ui};
use hyperlens::model::Point2D;

use super::super::ViewModel;
use super::super::render_utils::screen_to_world;

const MIN_ZOOM: f32 = 0.05;
const MAX_ZOOM: f32 = 6.0;

impl ViewModel {
    pub(in crate::app) fn handle_graph_zoom(
        &mut self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
    ) -> bool {
        if !response.hovered() {
            return false;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return false;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let world_before = screen_to_world(rect, self.pan, self.zoom, pointer);

        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.zoom = (self.zoom * zoom_factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.pan = pointer - rect.center() - (world_before * self.zoom);
        true
    }

    /// Primary drag that starts on a node moves that node. Returns whether
    /// positions changed.
    pub(in crate::app) fn handle_node_drag(
        &mut self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
    ) -> bool {
        if response.drag_started_by(egui::PointerButton::Primary) {
            self.dragging = ui
                .input(|input| input.pointer.press_origin())
                .and_then(|origin| self.node_at(screen_to_world(rect, self.pan, self.zoom, origin)));
        }

        let Some(index) = self.dragging else {
            return false;
        };
        if response.drag_stopped() {
            self.dragging = None;
            self.culler
                .on_elements_changed(&self.graph.footprints, &self.graph.edge_pairs);
            return false;
        }

        let delta = response.drag_delta() / self.zoom;
        if delta == egui::Vec2::ZERO {
            return false;
        }
        let (Some(node), Some(footprint)) = (
            self.graph.nodes.get(index),
            self.graph.footprints.get_mut(index),
        ) else {
            self.dragging = None;
            return false;
        };
        footprint.center += Point2D::new(delta.x, delta.y);
        self.positions.insert(node.id.clone(), footprint.center);
        self.hulls_dirty = true;
        true
    }

    fn node_at(&self, world: egui::Vec2) -> Option<usize> {
        let point = Point2D::new(world.x, world.y);
        self.graph
            .footprints
            .iter()
            .enumerate()
            .filter(|(index, _)| self.culler.flags().node(*index))
            .map(|(index, footprint)| (index, footprint.center.distance(point), footprint.radius))
            .filter(|(_, distance, radius)| distance <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _, _)| index)
    }

    pub(in crate::app) fn handle_graph_pan(&mut self, response: &egui::Response) -> bool {
        if self.dragging.is_some() {
            return false;
        }
        if response.dragged_by(egui::PointerButton::Primary)
            || response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            self.pan += response.drag_delta();
            return response.drag_delta() != egui::Vec2::ZERO;
        }
        false
    }

    pub(in crate::app) fn hovered_index(
        &self,
        ui: &Ui,
        screen_positions: &[Pos2],
        screen_radii: &[f32],
    ) -> Option<usize> {
        let pointer = ui.input(|input| input.pointer.hover_pos())?;
        (0..screen_positions.len())
            .filter(|&index| self.culler.flags().node(index))
            .filter_map(|index| {
                let distance = screen_positions[index].distance(pointer);
                (distance <= screen_radii[index]).then_some((index, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
    }

    pub(in crate::app) fn focus_node(&mut self, id: &str) {
        let Some(&index) = self.graph.index_by_id.get(id) else {
            return;
        };
        let center = self.graph.footprints[index].center;
        self.pan = -egui::vec2(center.x, center.y) * self.zoom;
    }
}
