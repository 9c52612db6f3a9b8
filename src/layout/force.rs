use std::collections::HashMap;
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::model::Point2D;

use super::{LayoutEdge, LayoutNode, LayoutParams, PROGRESS_INTERVAL, YIELD_INTERVAL};

const SEED_RADIUS: f32 = 100.0;
const SPRING_CONSTANT: f32 = 0.1;
const MIN_DISTANCE: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SimulationOutcome {
    Completed,
    Cancelled,
}

pub(crate) struct ForceSimulation {
    ids: Vec<String>,
    positions: Vec<Point2D>,
    velocities: Vec<Point2D>,
    links: Vec<(usize, usize, f32)>,
    ideal_edge_length: f32,
    node_repulsion: f32,
    gravity: f32,
    damping: f32,
}

impl ForceSimulation {
    pub(crate) fn new(nodes: &[LayoutNode], edges: &[LayoutEdge], params: &LayoutParams) -> Self {
        let n = nodes.len();
        let mut index_by_id = HashMap::with_capacity(n);
        let mut ids = Vec::with_capacity(n);
        let mut positions = Vec::with_capacity(n);

        for node in nodes {
            if index_by_id.contains_key(node.id.as_str()) {
                continue;
            }
            let index = ids.len();
            index_by_id.insert(node.id.as_str(), index);
            ids.push(node.id.clone());

            let seeded = node.position.filter(|point| point.is_finite());
            positions.push(seeded.unwrap_or_else(|| {
                let angle = (index as f32 / n as f32) * TAU;
                Point2D::new(angle.cos() * SEED_RADIUS, angle.sin() * SEED_RADIUS)
            }));
        }

        let links = edges
            .iter()
            .filter_map(|edge| {
                let from = *index_by_id.get(edge.source.as_str())?;
                let to = *index_by_id.get(edge.target.as_str())?;
                (from != to).then_some((from, to, edge.weight))
            })
            .collect();

        Self {
            velocities: vec![Point2D::ZERO; ids.len()],
            ids,
            positions,
            links,
            ideal_edge_length: params.ideal_edge_length,
            node_repulsion: params.node_repulsion,
            gravity: params.gravity,
            damping: params.damping,
        }
    }

    pub(crate) fn step(&mut self) {
        let n = self.positions.len();

        for i in 0..n {
            for j in (i + 1)..n {
                let (direction, distance) = separation(self.positions[i], self.positions[j], i, j);
                let force = self.node_repulsion / (distance * distance);
                self.velocities[i] -= direction * force;
                self.velocities[j] += direction * force;
            }
        }

        for &(from, to, weight) in &self.links {
            let (direction, distance) =
                separation(self.positions[from], self.positions[to], from, to);
            let force = (distance - self.ideal_edge_length) * SPRING_CONSTANT * weight;
            self.velocities[from] += direction * force;
            self.velocities[to] -= direction * force;
        }

        for (velocity, position) in self.velocities.iter_mut().zip(&self.positions) {
            *velocity -= *position * self.gravity;
        }

        for (velocity, position) in self.velocities.iter_mut().zip(self.positions.iter_mut()) {
            *velocity = *velocity * self.damping;
            *position += *velocity;
        }
    }

    /// Steps `iterations` times unless `cancel` is raised first. The flag is
    /// consulted before every iteration.
    pub(crate) fn run(
        &mut self,
        iterations: usize,
        cancel: &AtomicBool,
        mut on_progress: impl FnMut(f32),
    ) -> SimulationOutcome {
        for iteration in 0..iterations {
            if cancel.load(Ordering::Acquire) {
                return SimulationOutcome::Cancelled;
            }

            self.step();

            if iteration % PROGRESS_INTERVAL == 0 {
                on_progress(iteration as f32 / iterations as f32);
            }
            if iteration % YIELD_INTERVAL == 0 {
                std::thread::yield_now();
            }
        }

        if cancel.load(Ordering::Acquire) {
            SimulationOutcome::Cancelled
        } else {
            SimulationOutcome::Completed
        }
    }

    #[cfg(test)]
    fn position(&self, id: &str) -> Option<Point2D> {
        self.ids
            .iter()
            .position(|candidate| candidate == id)
            .map(|index| self.positions[index])
    }

    pub(crate) fn into_positions(self) -> HashMap<String, Point2D> {
        self.ids.into_iter().zip(self.positions).collect()
    }
}

/// Unit vector from `a` towards `b` and their distance, floored at
/// `MIN_DISTANCE`. Coincident points get a deterministic direction.
fn separation(a: Point2D, b: Point2D, i: usize, j: usize) -> (Point2D, f32) {
    let delta = b - a;
    let length = delta.length();
    let direction = if length > 0.0001 {
        delta * (1.0 / length)
    } else {
        let angle = ((i as f32) * 0.618_034 + (j as f32) * 0.414_214) * TAU;
        Point2D::new(angle.cos(), angle.sin())
    };
    (direction, length.max(MIN_DISTANCE))
}
