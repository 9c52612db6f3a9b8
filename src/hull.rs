use std::collections::HashMap;
use std::f32::consts::FRAC_PI_4;

use crate::model::{GraphEdge, Point2D};

pub const DEFAULT_HULL_PADDING: f32 = 20.0;
const PADDING_POINTS_PER_NODE: usize = 8;

#[derive(Clone, Debug, PartialEq)]
pub struct HullPolygon {
    pub edge_id: String,
    pub vertices: Vec<Point2D>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeFootprint {
    pub center: Point2D,
    pub radius: f32,
}

/// Position snapshot hulls are built against. Taken once per computation so
/// concurrent position updates cannot tear a frame.
pub type FootprintSnapshot = HashMap<String, NodeFootprint>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HullStyle {
    pub fill: [u8; 4],
    pub stroke: [u8; 4],
    pub stroke_width: f32,
    pub dash: Option<(f32, f32)>,
}

impl Default for HullStyle {
    fn default() -> Self {
        Self {
            fill: [251, 146, 60, 38],
            stroke: [249, 115, 22, 178],
            stroke_width: 3.0,
            dash: Some((10.0, 5.0)),
        }
    }
}

pub trait HullPainter {
    fn paint_hull(&mut self, vertices: &[Point2D], style: &HullStyle);
}

pub fn paint_hulls<P: HullPainter + ?Sized>(
    painter: &mut P,
    polygons: &[HullPolygon],
    style: &HullStyle,
) {
    for polygon in polygons {
        if polygon.vertices.len() >= 3 {
            painter.paint_hull(&polygon.vertices, style);
        }
    }
}

/// Counter-clockwise convex hull. Inputs with fewer than three points are
/// returned unchanged.
pub fn compute_hull(points: &[Point2D]) -> Vec<Point2D> {
    let mut sorted = Vec::with_capacity(points.len());
    let mut hull = Vec::with_capacity(points.len());
    compute_hull_into(points, &mut sorted, &mut hull);
    hull
}

fn compute_hull_into(points: &[Point2D], sorted: &mut Vec<Point2D>, hull: &mut Vec<Point2D>) {
    hull.clear();
    if points.len() < 3 {
        hull.extend_from_slice(points);
        return;
    }

    let mut pivot_index = 0;
    for (index, point) in points.iter().enumerate().skip(1) {
        let pivot = points[pivot_index];
        if point.y < pivot.y || (point.y == pivot.y && point.x < pivot.x) {
            pivot_index = index;
        }
    }
    let pivot = points[pivot_index];

    sorted.clear();
    sorted.extend(
        points
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != pivot_index)
            .map(|(_, point)| *point),
    );
    sorted.sort_by(|a, b| {
        let angle_a = (a.y - pivot.y).atan2(a.x - pivot.x);
        let angle_b = (b.y - pivot.y).atan2(b.x - pivot.x);
        angle_a
            .total_cmp(&angle_b)
            .then_with(|| pivot.distance(*a).total_cmp(&pivot.distance(*b)))
    });

    hull.push(pivot);
    for &candidate in sorted.iter() {
        while hull.len() >= 2 {
            let top = hull[hull.len() - 1];
            let below = hull[hull.len() - 2];
            if (top - below).cross(candidate - top) > 0.0 {
                break;
            }
            hull.pop();
        }
        hull.push(candidate);
    }
}

/// Reusable hull computation for hyperedge regions. Scratch buffers are kept
/// between calls so per-frame rebuilds do not reallocate.
#[derive(Debug)]
pub struct HullBuilder {
    padding: f32,
    padded: Vec<Point2D>,
    sorted: Vec<Point2D>,
    hull: Vec<Point2D>,
}

impl Default for HullBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_HULL_PADDING)
    }
}

impl HullBuilder {
    pub fn new(padding: f32) -> Self {
        Self {
            padding: padding.max(0.0),
            padded: Vec::new(),
            sorted: Vec::new(),
            hull: Vec::new(),
        }
    }

    /// Region polygon for one hyperedge, or `None` when fewer than three
    /// distinct members are present in `snapshot` or the hull degenerates.
    pub fn hyperedge_polygon(
        &mut self,
        edge: &GraphEdge,
        snapshot: &FootprintSnapshot,
    ) -> Option<HullPolygon> {
        if !edge.is_hyperedge() {
            return None;
        }

        self.padded.clear();
        let mut present = 0usize;
        for member in edge.members() {
            let Some(footprint) = snapshot.get(member) else {
                continue;
            };
            if !footprint.center.is_finite() {
                continue;
            }
            present += 1;

            let ring = footprint.radius.max(0.0) + self.padding;
            for step in 0..PADDING_POINTS_PER_NODE {
                let angle = step as f32 * FRAC_PI_4;
                self.padded.push(Point2D::new(
                    footprint.center.x + angle.cos() * ring,
                    footprint.center.y + angle.sin() * ring,
                ));
            }
        }

        if present < 3 {
            return None;
        }

        compute_hull_into(&self.padded, &mut self.sorted, &mut self.hull);
        if self.hull.len() < 3 {
            return None;
        }

        Some(HullPolygon {
            edge_id: edge.id.clone(),
            vertices: self.hull.clone(),
        })
    }

    pub fn build_all<'a>(
        &mut self,
        edges: impl IntoIterator<Item = &'a GraphEdge>,
        snapshot: &FootprintSnapshot,
    ) -> Vec<HullPolygon> {
        edges
            .into_iter()
            .filter_map(|edge| self.hyperedge_polygon(edge, snapshot))
            .collect()
    }
}
