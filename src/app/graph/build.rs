use std::collections::HashMap;
use std::f32::consts::PI;

use hyperlens::animation::{AnimationEvent, AnimationStatus, playback_highlight};
use hyperlens::hull::{FootprintSnapshot, NodeFootprint};
use hyperlens::layout::{LayoutError, LayoutMessage, LayoutRequest};
use hyperlens::model::Point2D;
use tracing::{debug, info, warn};

use super::super::{RenderGraph, ViewModel};

/// Golden-angle spiral so nodes waiting for a layout do not stack up.
fn placeholder_position(index: usize) -> Point2D {
    let angle = index as f32 * PI * (3.0 - 5.0_f32.sqrt());
    let radius = 40.0 * (index as f32).sqrt();
    Point2D::new(angle.cos() * radius, angle.sin() * radius)
}

impl ViewModel {
    /// Flattens the cache snapshot for drawing. Starts a layout when nodes
    /// without a position arrived.
    pub(in crate::app) fn rebuild_render_graph(&mut self) {
        let snapshot = self.cache.snapshot();
        let mut graph = RenderGraph::default();
        let mut unplaced = 0usize;

        for (index, node) in snapshot.nodes.into_iter().enumerate() {
            let known = self.positions.get(&node.id).copied().or(node.position);
            let center = match known {
                Some(point) => {
                    self.positions.entry(node.id.clone()).or_insert(point);
                    point
                }
                None => {
                    unplaced += 1;
                    placeholder_position(index)
                }
            };
            graph.index_by_id.insert(node.id.clone(), index);
            graph.footprints.push(NodeFootprint {
                center,
                radius: node.radius(),
            });
            graph.nodes.push(node);
        }

        for (index, edge) in snapshot.edges.into_iter().enumerate() {
            let endpoint = |id: &str| graph.index_by_id.get(id).copied().unwrap_or(usize::MAX);
            graph
                .edge_pairs
                .push((endpoint(&edge.source), endpoint(&edge.target)));
            graph.edge_index_by_id.insert(edge.id.clone(), index);
            graph.edges.push(edge);
        }

        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            unplaced,
            "render graph rebuilt"
        );

        self.graph = graph;
        self.graph_dirty = false;
        self.dragging = None;
        self.hulls_dirty = true;
        self.culler
            .on_elements_changed(&self.graph.footprints, &self.graph.edge_pairs);
        self.refresh_highlight();

        if unplaced > 0 {
            self.request_layout();
        }
    }

    pub(in crate::app) fn request_layout(&mut self) {
        let nodes = self
            .graph
            .nodes
            .iter()
            .map(|node| {
                let mut node = node.clone();
                node.position = self.positions.get(&node.id).copied();
                node
            })
            .collect::<Vec<_>>();
        let request =
            LayoutRequest::from_graph(&nodes, &self.graph.edges, self.settings.layout.clone());

        let Some(engine) = self.layout.as_mut() else {
            return;
        };
        match engine.calculate(request) {
            Ok(_) => {
                self.relayout_pending = false;
                self.layout_progress = Some(0.0);
            }
            Err(LayoutError::Busy) => self.relayout_pending = true,
            Err(error) => {
                warn!(%error, "layout request rejected");
                self.status = Some(error.to_string());
            }
        }
    }

    pub(in crate::app) fn stop_layout(&mut self) {
        if let Some(engine) = self.layout.as_mut() {
            engine.stop();
        }
        self.layout_progress = None;
        self.relayout_pending = false;
    }

    pub(in crate::app) fn layout_running(&self) -> bool {
        self.layout.as_ref().is_some_and(|engine| engine.is_running())
    }

    pub(in crate::app) fn poll_layout(&mut self) -> bool {
        let Some(engine) = self.layout.as_mut() else {
            return false;
        };

        let mut completed = None;
        while let Some(message) = engine.try_recv() {
            match message {
                LayoutMessage::Progress { fraction, .. } => self.layout_progress = Some(fraction),
                LayoutMessage::Complete { result, .. } => {
                    self.layout_progress = None;
                    completed = Some(result.positions);
                }
                LayoutMessage::Error { message, .. } => {
                    self.layout_progress = None;
                    self.status = Some(format!("layout failed: {message}"));
                }
            }
        }
        let running = engine.is_running();

        if let Some(positions) = completed {
            self.apply_positions(positions);
        }
        if !running && self.relayout_pending {
            self.request_layout();
        }
        self.layout_running()
    }

    fn apply_positions(&mut self, positions: HashMap<String, Point2D>) {
        self.positions.extend(positions);
        for (node, footprint) in self.graph.nodes.iter().zip(&mut self.graph.footprints) {
            if let Some(point) = self.positions.get(&node.id) {
                footprint.center = *point;
            }
        }
        self.hulls_dirty = true;
        self.culler
            .on_elements_changed(&self.graph.footprints, &self.graph.edge_pairs);
    }

    fn footprint_snapshot(&self) -> FootprintSnapshot {
        self.graph
            .nodes
            .iter()
            .zip(&self.graph.footprints)
            .map(|(node, footprint)| (node.id.clone(), *footprint))
            .collect()
    }

    pub(in crate::app) fn rebuild_hulls(&mut self) {
        self.hulls_dirty = false;
        if !self.settings.hull.enabled {
            self.hulls.clear();
            return;
        }
        let snapshot = self.footprint_snapshot();
        self.hulls = self.hull_builder.build_all(&self.graph.edges, &snapshot);
    }

    pub(in crate::app) fn refresh_highlight(&mut self) {
        let path = self.playback.path();
        self.highlight = playback_highlight(&path, &self.graph.edges, &self.playback.state());
    }

    pub(in crate::app) fn poll_playback(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.playback_events.try_recv() {
            match event {
                AnimationEvent::Step {
                    step,
                    node_id,
                    score,
                } => {
                    debug!(step, %node_id, score, "path step revealed");
                    self.last_step = Some((node_id, score));
                }
                AnimationEvent::Completed => {
                    info!(nodes = self.playback.path().len(), "path playback finished");
                }
                AnimationEvent::Status(AnimationStatus::Idle) => self.last_step = None,
                AnimationEvent::Status(_) => {}
            }
            changed = true;
        }
        if changed {
            self.refresh_highlight();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_distinct_and_finite() {
        let points = (0..50).map(placeholder_position).collect::<Vec<_>>();
        assert!(points.iter().all(|point| point.is_finite()));
        for (index, point) in points.iter().enumerate().skip(1) {
            assert!(points[..index].iter().all(|other| other.distance(*point) > 1.0));
        }
    }
}
