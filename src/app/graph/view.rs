use std::time::Instant;

use eframe::egui::{self, Align2, Color32, FontId, Sense, Stroke, Ui};
use hyperlens::culling::ViewportBounds;
use hyperlens::hull::{HullPolygon, HullStyle, paint_hulls};
use hyperlens::model::Point2D;

use super::super::ViewModel;
use super::super::render_utils::{
    EguiHullPainter, PATH_COLOR, blend_color, dim_color, draw_background, type_color,
    with_opacity, world_to_screen,
};

const LABEL_ZOOM: f32 = 0.8;

fn path_hull_style() -> HullStyle {
    HullStyle {
        fill: [250, 204, 21, 46],
        stroke: [250, 204, 21, 210],
        stroke_width: 3.5,
        dash: None,
    }
}

impl ViewModel {
    fn update_culling(&mut self, ui: &Ui, rect: egui::Rect) -> bool {
        let size = Point2D::new(rect.width(), rect.height());
        let pan = Point2D::new(self.pan.x, self.pan.y);
        let now = Instant::now();

        self.culler
            .on_viewport_change(ViewportBounds::from_screen(size, pan, self.zoom), self.zoom, now);
        let recomputed = self
            .culler
            .poll(now, &self.graph.footprints, &self.graph.edge_pairs);
        if self.culler.has_pending() {
            ui.ctx().request_repaint_after(self.culler.config().throttle());
        }
        recomputed
    }

    fn hull_visible(&self, hull: &HullPolygon) -> bool {
        let Some(&edge) = self.graph.edge_index_by_id.get(&hull.edge_id) else {
            return false;
        };
        self.graph.edges[edge]
            .members()
            .filter_map(|id| self.graph.index_by_id.get(id))
            .any(|&index| self.culler.flags().node(index))
    }

    pub(in crate::app) fn draw_graph(&mut self, ui: &mut Ui) {
        if self.graph_dirty {
            self.rebuild_render_graph();
        }

        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        draw_background(&painter, rect, self.pan, self.zoom);

        let zoomed = self.handle_graph_zoom(ui, rect, &response);
        let moved = self.handle_node_drag(ui, rect, &response);
        let panned = self.handle_graph_pan(&response);
        if zoomed || moved || panned {
            ui.ctx().request_repaint();
        }
        if self.hulls_dirty {
            self.rebuild_hulls();
        }

        if self.update_culling(ui, rect) {
            self.request_auto_load(ui.ctx());
        }

        if self.graph.nodes.is_empty() {
            ui.label("No nodes loaded yet.");
            return;
        }

        let pan = self.pan;
        let zoom = self.zoom;
        let highlighting = !self.highlight.is_empty();

        let (plain_hulls, path_hulls): (Vec<_>, Vec<_>) = self
            .hulls
            .iter()
            .filter(|hull| self.hull_visible(hull))
            .cloned()
            .partition(|hull| !self.highlight.contains_edge(&hull.edge_id));
        let mut hull_painter = EguiHullPainter {
            painter: &painter,
            rect,
            pan,
            zoom,
        };
        paint_hulls(&mut hull_painter, &plain_hulls, &HullStyle::default());
        paint_hulls(&mut hull_painter, &path_hulls, &path_hull_style());

        let screen_positions = self
            .graph
            .footprints
            .iter()
            .map(|footprint| world_to_screen(rect, pan, zoom, footprint.center))
            .collect::<Vec<_>>();
        let screen_radii = self
            .graph
            .nodes
            .iter()
            .zip(&self.graph.footprints)
            .map(|(node, footprint)| {
                let multiplier = self
                    .highlight
                    .node(&node.id)
                    .map_or(1.0, |style| style.size_multiplier);
                (footprint.radius * multiplier * zoom).clamp(2.0, 60.0)
            })
            .collect::<Vec<_>>();

        let flags = self.culler.flags();
        for (index, edge) in self.graph.edges.iter().enumerate() {
            if edge.is_hyperedge() || !flags.edge(index) {
                continue;
            }
            let (source, target) = self.graph.edge_pairs[index];
            let (Some(start), Some(end)) = (screen_positions.get(source), screen_positions.get(target))
            else {
                continue;
            };

            let on_path = self.highlight.contains_edge(&edge.id);
            let stroke = if on_path {
                Stroke::new(3.0, PATH_COLOR)
            } else {
                let base = Color32::from_rgba_unmultiplied(140, 150, 165, 120);
                let color = if highlighting { dim_color(base, 0.35) } else { base };
                Stroke::new((0.6 + edge.weight.clamp(0.0, 1.0) * 1.4) * zoom.sqrt(), color)
            };
            painter.line_segment([*start, *end], stroke);
        }

        let hovered = self.hovered_index(ui, &screen_positions, &screen_radii);
        let current = self.highlight.current.as_deref();

        for (index, node) in self.graph.nodes.iter().enumerate() {
            if !flags.node(index) {
                continue;
            }
            let position = screen_positions[index];
            let radius = screen_radii[index];
            let style = self.highlight.node(&node.id);
            let base = type_color(&node.node_type);

            let fill = match style {
                Some(style) => with_opacity(blend_color(base, PATH_COLOR, 0.35), style.opacity),
                None if highlighting => dim_color(base, 0.3),
                None => base,
            };
            painter.circle_filled(position, radius, fill);

            let is_selected = self.selected.as_deref() == Some(node.id.as_str());
            if current == Some(node.id.as_str()) {
                painter.circle_stroke(position, radius + 4.0, Stroke::new(3.0, PATH_COLOR));
            } else if is_selected || hovered == Some(index) {
                painter.circle_stroke(position, radius + 2.0, Stroke::new(2.0, Color32::WHITE));
            }

            if zoom >= LABEL_ZOOM || style.is_some() || is_selected {
                painter.text(
                    position + egui::vec2(0.0, radius + 4.0),
                    Align2::CENTER_TOP,
                    node.display_label(),
                    FontId::proportional(12.0),
                    Color32::from_gray(220),
                );
            }
        }

        if let Some(index) = hovered {
            let node = &self.graph.nodes[index];
            let class = self
                .highlight
                .node(&node.id)
                .map(|style| format!("\nhighlight: {}", style.class.label()))
                .unwrap_or_default();
            response.clone().on_hover_text(format!(
                "{}\ntype: {}{class}",
                node.display_label(),
                node.node_type
            ));
        }

        if response.clicked() {
            self.selected = hovered.map(|index| self.graph.nodes[index].id.clone());
        }
    }
}
