use eframe::egui::{Color32, Painter, Pos2, Rect, Shape, Stroke, Vec2, vec2};
use hyperlens::hull::{HullPainter, HullStyle};
use hyperlens::model::{GraphNode, Point2D};
use serde_json::json;

const TYPE_PALETTE: [Color32; 8] = [
    Color32::from_rgb(96, 165, 250),
    Color32::from_rgb(52, 211, 153),
    Color32::from_rgb(251, 191, 36),
    Color32::from_rgb(244, 114, 182),
    Color32::from_rgb(167, 139, 250),
    Color32::from_rgb(45, 212, 191),
    Color32::from_rgb(248, 113, 113),
    Color32::from_rgb(163, 230, 53),
];

pub(super) const PATH_COLOR: Color32 = Color32::from_rgb(250, 204, 21);

pub(super) fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let inverse = 1.0 - amount;

    Color32::from_rgba_unmultiplied(
        ((base.r() as f32 * inverse) + (overlay.r() as f32 * amount)) as u8,
        ((base.g() as f32 * inverse) + (overlay.g() as f32 * amount)) as u8,
        ((base.b() as f32 * inverse) + (overlay.b() as f32 * amount)) as u8,
        ((base.a() as f32 * inverse) + (overlay.a() as f32 * amount)) as u8,
    )
}

pub(super) fn dim_color(color: Color32, factor: f32) -> Color32 {
    let factor = factor.clamp(0.0, 1.0);
    Color32::from_rgba_unmultiplied(
        (color.r() as f32 * factor) as u8,
        (color.g() as f32 * factor) as u8,
        (color.b() as f32 * factor) as u8,
        (color.a() as f32 * (0.45 + (factor * 0.55))) as u8,
    )
}

pub(super) fn with_opacity(color: Color32, opacity: f32) -> Color32 {
    Color32::from_rgba_unmultiplied(
        color.r(),
        color.g(),
        color.b(),
        (color.a() as f32 * opacity.clamp(0.0, 1.0)) as u8,
    )
}

pub(super) fn type_color(node_type: &str) -> Color32 {
    let hash = node_type
        .bytes()
        .fold(0u32, |hash, byte| hash.wrapping_mul(31).wrapping_add(byte as u32));
    TYPE_PALETTE[hash as usize % TYPE_PALETTE.len()]
}

/// Drawn appearance of a node, stored in exported envelopes.
pub(super) fn node_style(node: &GraphNode) -> serde_json::Value {
    let color = type_color(&node.node_type);
    json!({
        "backgroundColor": format!("#{:02x}{:02x}{:02x}", color.r(), color.g(), color.b()),
        "width": node.radius() * 2.0,
    })
}

pub(super) fn draw_background(painter: &Painter, rect: Rect, pan: Vec2, zoom: f32) {
    painter.rect_filled(rect, 0.0, Color32::from_rgb(19, 23, 29));

    let step = (56.0 * zoom.clamp(0.6, 1.8)).max(20.0);
    let origin = rect.center() + pan;
    let stroke = Stroke::new(1.0, Color32::from_rgba_unmultiplied(60, 70, 80, 70));

    let mut x = rect.left() + (origin.x - rect.left()).rem_euclid(step);
    while x < rect.right() {
        painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
        x += step;
    }

    let mut y = rect.top() + (origin.y - rect.top()).rem_euclid(step);
    while y < rect.bottom() {
        painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], stroke);
        y += step;
    }
}

pub(super) fn world_to_screen(rect: Rect, pan: Vec2, zoom: f32, world: Point2D) -> Pos2 {
    rect.center() + pan + vec2(world.x, world.y) * zoom
}

pub(super) fn screen_to_world(rect: Rect, pan: Vec2, zoom: f32, screen: Pos2) -> Vec2 {
    (screen - rect.center() - pan) / zoom
}

fn color(rgba: [u8; 4]) -> Color32 {
    Color32::from_rgba_unmultiplied(rgba[0], rgba[1], rgba[2], rgba[3])
}

pub(super) struct EguiHullPainter<'a> {
    pub painter: &'a Painter,
    pub rect: Rect,
    pub pan: Vec2,
    pub zoom: f32,
}

impl HullPainter for EguiHullPainter<'_> {
    fn paint_hull(&mut self, vertices: &[Point2D], style: &HullStyle) {
        let points = vertices
            .iter()
            .map(|vertex| world_to_screen(self.rect, self.pan, self.zoom, *vertex))
            .collect::<Vec<_>>();
        let stroke = Stroke::new(style.stroke_width, color(style.stroke));

        self.painter.add(Shape::convex_polygon(
            points.clone(),
            color(style.fill),
            Stroke::NONE,
        ));

        let mut outline = points;
        if let Some(first) = outline.first().copied() {
            outline.push(first);
        }
        match style.dash {
            Some((dash, gap)) => {
                self.painter
                    .extend(Shape::dashed_line(&outline, stroke, dash, gap));
            }
            None => {
                self.painter.add(Shape::line(outline, stroke));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_and_world_transforms_invert() {
        let rect = Rect::from_min_size(Pos2::new(10.0, 20.0), vec2(800.0, 600.0));
        let pan = vec2(-35.0, 12.5);
        let world = Point2D::new(140.0, -60.0);

        let screen = world_to_screen(rect, pan, 1.7, world);
        let back = screen_to_world(rect, pan, 1.7, screen);
        assert!((back.x - world.x).abs() < 1e-3);
        assert!((back.y - world.y).abs() < 1e-3);
    }

    #[test]
    fn type_colors_are_stable() {
        assert_eq!(type_color("person"), type_color("person"));
        assert_eq!(with_opacity(Color32::WHITE, 0.0).a(), 0);
    }

    #[test]
    fn node_style_records_color_and_size() {
        let node = GraphNode::new("a", "person", 1.0);
        let color = type_color("person");
        let style = node_style(&node);
        assert_eq!(
            style["backgroundColor"],
            format!("#{:02x}{:02x}{:02x}", color.r(), color.g(), color.b())
        );
        assert_eq!(style["width"], 40.0);
    }
}
