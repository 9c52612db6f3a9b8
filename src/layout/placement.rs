use std::collections::HashMap;
use std::f32::consts::TAU;

use crate::model::Point2D;

use super::LayoutNode;

pub(crate) fn grid_layout(nodes: &[LayoutNode], spacing: f32) -> HashMap<String, Point2D> {
    let columns = (nodes.len() as f32).sqrt().ceil().max(1.0) as usize;
    nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let row = index / columns;
            let column = index % columns;
            (
                node.id.clone(),
                Point2D::new(column as f32 * spacing, row as f32 * spacing),
            )
        })
        .collect()
}

pub(crate) fn circle_layout(nodes: &[LayoutNode], radius: f32) -> HashMap<String, Point2D> {
    let count = nodes.len().max(1) as f32;
    nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let angle = (index as f32 / count) * TAU;
            (
                node.id.clone(),
                Point2D::new(angle.cos() * radius, angle.sin() * radius),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(count: usize) -> Vec<LayoutNode> {
        (0..count)
            .map(|index| LayoutNode {
                id: format!("n{index}"),
                position: None,
            })
            .collect()
    }

    #[test]
    fn grid_fills_rows_of_square_root_width() {
        let positions = grid_layout(&nodes(5), 100.0);
        assert_eq!(positions["n0"], Point2D::new(0.0, 0.0));
        assert_eq!(positions["n1"], Point2D::new(100.0, 0.0));
        assert_eq!(positions["n2"], Point2D::new(200.0, 0.0));
        assert_eq!(positions["n3"], Point2D::new(0.0, 100.0));
        assert_eq!(positions["n4"], Point2D::new(100.0, 100.0));
    }

    #[test]
    fn circle_places_every_node_on_radius() {
        let positions = circle_layout(&nodes(6), 240.0);
        assert_eq!(positions.len(), 6);
        for position in positions.values() {
            assert!((position.length() - 240.0).abs() < 1e-2);
        }
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(grid_layout(&[], 10.0).is_empty());
        assert!(circle_layout(&[], 10.0).is_empty());
    }
}
