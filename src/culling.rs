
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::hull::NodeFootprint;
use crate::model::Point2D;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewportBounds {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl ViewportBounds {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Model-space bounds of a screen of `size` whose center is offset by
    /// `pan` and scaled by `zoom`.
    pub fn from_screen(size: Point2D, pan: Point2D, zoom: f32) -> Self {
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
        let half = size * 0.5;
        let min = (Point2D::ZERO - half - pan) * (1.0 / zoom);
        let max = (half - pan) * (1.0 / zoom);
        Self::new(min.x, min.y, max.x, max.y)
    }

    pub fn expanded(self, padding: f32) -> Self {
        Self {
            x1: self.x1 - padding,
            y1: self.y1 - padding,
            x2: self.x2 + padding,
            y2: self.y2 + padding,
        }
    }

    pub fn intersects_circle(&self, center: Point2D, radius: f32) -> bool {
        !(center.x + radius < self.x1
            || center.x - radius > self.x2
            || center.y + radius < self.y1
            || center.y - radius > self.y2)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CullConfig {
    pub enabled: bool,
    pub padding: f32,
    pub min_zoom: f32,
    pub throttle_ms: u64,
}

impl Default for CullConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            padding: 100.0,
            min_zoom: 0.5,
            throttle_ms: 100,
        }
    }
}

impl CullConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

/// Per-element flags, index-aligned with the node and edge slices they were
/// computed from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisibilityFlags {
    pub nodes: Vec<bool>,
    pub edges: Vec<bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullStats {
    pub total_nodes: usize,
    pub visible_nodes: usize,
    pub total_edges: usize,
    pub visible_edges: usize,
}

impl VisibilityFlags {
    fn all_visible(nodes: usize, edges: usize) -> Self {
        Self {
            nodes: vec![true; nodes],
            edges: vec![true; edges],
        }
    }

    pub fn node(&self, index: usize) -> bool {
        self.nodes.get(index).copied().unwrap_or(false)
    }

    pub fn edge(&self, index: usize) -> bool {
        self.edges.get(index).copied().unwrap_or(false)
    }

    pub fn stats(&self) -> CullStats {
        CullStats {
            total_nodes: self.nodes.len(),
            visible_nodes: self.nodes.iter().filter(|visible| **visible).count(),
            total_edges: self.edges.len(),
            visible_edges: self.edges.iter().filter(|visible| **visible).count(),
        }
    }
}

/// Visibility of `nodes` and `edges` (endpoint indices into `nodes`). An edge
/// is visible when either endpoint is; endpoints outside `nodes` count as
/// hidden.
pub fn compute_visibility(
    viewport: &ViewportBounds,
    zoom: f32,
    nodes: &[NodeFootprint],
    edges: &[(usize, usize)],
    config: &CullConfig,
) -> VisibilityFlags {
    if !config.enabled || zoom > config.min_zoom {
        return VisibilityFlags::all_visible(nodes.len(), edges.len());
    }

    let area = viewport.expanded(config.padding);
    let node_flags = nodes
        .iter()
        .map(|node| area.intersects_circle(node.center, node.radius))
        .collect::<Vec<_>>();
    let edge_flags = edges
        .iter()
        .map(|&(source, target)| {
            node_flags.get(source).copied().unwrap_or(false)
                || node_flags.get(target).copied().unwrap_or(false)
        })
        .collect();

    VisibilityFlags {
        nodes: node_flags,
        edges: edge_flags,
    }
}

/// Throttled wrapper around [`compute_visibility`]. Time is passed in by the
/// caller so the frame loop and tests share one clock.
#[derive(Debug)]
pub struct ViewportCuller {
    config: CullConfig,
    current: Option<(ViewportBounds, f32)>,
    pending: Option<(ViewportBounds, f32)>,
    deadline: Option<Instant>,
    flags: VisibilityFlags,
    recomputations: u64,
}

impl ViewportCuller {
    pub fn new(config: CullConfig) -> Self {
        Self {
            config,
            current: None,
            pending: None,
            deadline: None,
            flags: VisibilityFlags::default(),
            recomputations: 0,
        }
    }

    pub fn config(&self) -> &CullConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CullConfig) {
        self.config = config;
    }

    pub fn flags(&self) -> &VisibilityFlags {
        &self.flags
    }

    pub fn stats(&self) -> CullStats {
        self.flags.stats()
    }

    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Records a viewport change. The first change opens a throttle window;
    /// changes inside the window replace the pending one.
    pub fn on_viewport_change(&mut self, viewport: ViewportBounds, zoom: f32, now: Instant) {
        if self.current == Some((viewport, zoom)) && self.pending.is_none() {
            return;
        }
        self.pending = Some((viewport, zoom));
        if self.deadline.is_none() {
            self.deadline = Some(now + self.config.throttle());
        }
    }

    pub fn poll(
        &mut self,
        now: Instant,
        nodes: &[NodeFootprint],
        edges: &[(usize, usize)],
    ) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        if now < deadline {
            return false;
        }

        self.deadline = None;
        let Some(view) = self.pending.take() else {
            return false;
        };
        self.current = Some(view);
        self.recompute(nodes, edges);
        true
    }

    /// Structural change: recomputes immediately against the latest viewport.
    pub fn on_elements_changed(&mut self, nodes: &[NodeFootprint], edges: &[(usize, usize)]) {
        if let Some(view) = self.pending.take() {
            self.current = Some(view);
        }
        self.deadline = None;
        self.recompute(nodes, edges);
    }

    fn recompute(&mut self, nodes: &[NodeFootprint], edges: &[(usize, usize)]) {
        self.flags = match self.current {
            Some((viewport, zoom)) => {
                compute_visibility(&viewport, zoom, nodes, edges, &self.config)
            }
            None => VisibilityFlags::all_visible(nodes.len(), edges.len()),
        };
        self.recomputations += 1;

        let stats = self.flags.stats();
        trace!(
            visible_nodes = stats.visible_nodes,
            total_nodes = stats.total_nodes,
            visible_edges = stats.visible_edges,
            total_edges = stats.total_edges,
            "viewport culling recomputed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footprint(x: f32, y: f32) -> NodeFootprint {
        NodeFootprint {
            center: Point2D::new(x, y),
            radius: 10.0,
        }
    }

    fn scene() -> (Vec<NodeFootprint>, Vec<(usize, usize)>) {
        let nodes = vec![
            footprint(0.0, 0.0),
            footprint(150.0, 0.0),
            footprint(5000.0, 0.0),
            footprint(6000.0, 6000.0),
        ];
        let edges = vec![(0, 2), (2, 3), (0, 1), (3, 99)];
        (nodes, edges)
    }

    fn viewport() -> ViewportBounds {
        ViewportBounds::new(-100.0, -100.0, 100.0, 100.0)
    }

    #[test]
    fn padding_extends_visible_area() {
        let (nodes, edges) = scene();
        let flags = compute_visibility(&viewport(), 0.3, &nodes, &edges, &CullConfig::default());
        assert_eq!(flags.nodes, vec![true, true, false, false]);
    }

    #[test]
    fn edge_with_one_visible_endpoint_stays_visible() {
        let (nodes, edges) = scene();
        let flags = compute_visibility(&viewport(), 0.3, &nodes, &edges, &CullConfig::default());
        assert_eq!(flags.edges, vec![true, false, true, false]);
        assert_eq!(
            flags.stats(),
            CullStats {
                total_nodes: 4,
                visible_nodes: 2,
                total_edges: 4,
                visible_edges: 2,
            }
        );
    }

    #[test]
    fn zoomed_in_or_disabled_shows_everything() {
        let (nodes, edges) = scene();
        let zoomed = compute_visibility(&viewport(), 0.8, &nodes, &edges, &CullConfig::default());
        assert!(zoomed.nodes.iter().chain(&zoomed.edges).all(|visible| *visible));

        let disabled = CullConfig {
            enabled: false,
            ..CullConfig::default()
        };
        let flags = compute_visibility(&viewport(), 0.1, &nodes, &edges, &disabled);
        assert_eq!(flags.stats().visible_nodes, 4);
    }

    #[test]
    fn repeated_updates_are_identical() {
        let (nodes, edges) = scene();
        let config = CullConfig::default();
        let first = compute_visibility(&viewport(), 0.25, &nodes, &edges, &config);
        let second = compute_visibility(&viewport(), 0.25, &nodes, &edges, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn screen_bounds_follow_pan_and_zoom() {
        let bounds = ViewportBounds::from_screen(Point2D::new(800.0, 600.0), Point2D::ZERO, 2.0);
        assert_eq!(bounds, ViewportBounds::new(-200.0, -150.0, 200.0, 150.0));

        let panned =
            ViewportBounds::from_screen(Point2D::new(800.0, 600.0), Point2D::new(100.0, 0.0), 1.0);
        assert_eq!(panned, ViewportBounds::new(-500.0, -300.0, 300.0, 300.0));
    }

    #[test]
    fn viewport_changes_are_coalesced_last_write_wins() {
        let (nodes, edges) = scene();
        let mut culler = ViewportCuller::new(CullConfig::default());
        let start = Instant::now();

        culler.on_viewport_change(ViewportBounds::new(4900.0, -100.0, 5100.0, 100.0), 0.3, start);
        culler.on_viewport_change(viewport(), 0.3, start + Duration::from_millis(40));
        assert!(!culler.poll(start + Duration::from_millis(99), &nodes, &edges));
        assert_eq!(culler.recomputations(), 0);

        assert!(culler.poll(start + Duration::from_millis(100), &nodes, &edges));
        assert_eq!(culler.recomputations(), 1);
        assert_eq!(culler.flags().nodes, vec![true, true, false, false]);

        assert!(!culler.poll(start + Duration::from_millis(500), &nodes, &edges));
        assert_eq!(culler.recomputations(), 1);
    }

    #[test]
    fn structural_changes_recompute_immediately() {
        let (mut nodes, edges) = scene();
        let mut culler = ViewportCuller::new(CullConfig::default());
        let start = Instant::now();
        culler.on_viewport_change(viewport(), 0.3, start);
        culler.on_elements_changed(&nodes, &edges);
        assert_eq!(culler.recomputations(), 1);
        assert!(!culler.has_pending());

        nodes.push(footprint(20.0, 20.0));
        culler.on_elements_changed(&nodes, &edges);
        assert_eq!(culler.flags().nodes, vec![true, true, false, false, true]);
    }

    #[test]
    fn unchanged_viewport_does_not_schedule_work() {
        let (nodes, edges) = scene();
        let mut culler = ViewportCuller::new(CullConfig::default());
        let start = Instant::now();
        culler.on_viewport_change(viewport(), 0.3, start);
        culler.poll(start + Duration::from_millis(100), &nodes, &edges);

        culler.on_viewport_change(viewport(), 0.3, start + Duration::from_millis(200));
        assert!(!culler.has_pending());
    }
}
