//! Edge graph construction.
//!
//! One edge per orthogonal adjacency whose two pixels are both valid in
//! the input mask, in [`Grid::adjacencies`] order. Each edge carries the
//! sum of its endpoints' reliabilities (frozen at construction) and the
//! period jump the pair implies on its own.

use crate::grid::Grid;
use crate::group::Pixels;
use crate::phase::required_jump;
use crate::types::{UnwrapError, try_with_capacity};

/// An adjacency constraint between two pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// First endpoint (row-major index).
    pub a: usize,
    /// Second endpoint (row-major index).
    pub b: usize,
    /// `reliability(a) + reliability(b)`; edges are consumed in ascending
    /// order of this key.
    pub combined_reliability: f64,
    /// Periods (`-1`, `0`, `+1`) separating `b` from `a`; see
    /// [`required_jump`].
    pub required_jump: i8,
}

/// All admissible edges of one image.
#[derive(Debug, Clone, Default)]
pub struct EdgeGraph {
    edges: Vec<Edge>,
    wrap_edges: usize,
}

impl EdgeGraph {
    /// The edges, in construction or sorted order depending on stage.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether there are no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// How many edges cross an image border.
    #[must_use]
    pub const fn wrap_edge_count(&self) -> usize {
        self.wrap_edges
    }

    pub(crate) fn edges_mut(&mut self) -> &mut [Edge] {
        &mut self.edges
    }
}

/// Build the edge graph.
///
/// # Errors
///
/// Returns [`UnwrapError::Allocation`] if the edge buffer cannot be
/// reserved. The reservation is the upper bound of two edges per pixel.
pub fn build_edges(pixels: &Pixels, grid: Grid, period: f64) -> Result<EdgeGraph, UnwrapError> {
    let mut edges = try_with_capacity(pixels.len().saturating_mul(2))?;
    let mut wrap_edges = 0;
    for adjacency in grid.adjacencies() {
        if !(pixels.is_valid_input(adjacency.a) && pixels.is_valid_input(adjacency.b)) {
            continue;
        }
        let (Some(value_a), Some(value_b), Some(rel_a), Some(rel_b)) = (
            pixels.value(adjacency.a),
            pixels.value(adjacency.b),
            pixels.reliability(adjacency.a),
            pixels.reliability(adjacency.b),
        ) else {
            continue;
        };
        edges.push(Edge {
            a: adjacency.a,
            b: adjacency.b,
            combined_reliability: rel_a + rel_b,
            required_jump: required_jump(value_a, value_b, period),
        });
        wrap_edges += usize::from(adjacency.wraps);
    }
    log::trace!("edges: {} built, {wrap_edges} across borders", edges.len());
    Ok(EdgeGraph { edges, wrap_edges })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::f64::consts::TAU;

    use super::*;
    use crate::types::{Connectivity, Dimensions, Mask, PhaseMap};

    fn graph(values: &[f64], mask: &[bool], width: usize, connectivity: Connectivity) -> EdgeGraph {
        let dims = Dimensions::new(width, values.len() / width);
        let image = PhaseMap::new(dims, values.to_vec()).unwrap();
        let mask = Mask::new(dims, mask.to_vec()).unwrap();
        let pixels = Pixels::new(&image, &mask, &mask, 3).unwrap();
        build_edges(&pixels, Grid::new(dims, connectivity), TAU).unwrap()
    }

    #[test]
    fn full_mask_edge_count() {
        let g = graph(&[0.0; 12], &[true; 12], 4, Connectivity::NONE);
        assert_eq!(g.len(), 9 + 8);
        assert_eq!(g.wrap_edge_count(), 0);

        let g = graph(&[0.0; 12], &[true; 12], 4, Connectivity::BOTH);
        assert_eq!(g.len(), 24);
        assert_eq!(g.wrap_edge_count(), 3 + 4);
    }

    #[test]
    fn invalid_pixels_drop_their_edges() {
        let mut mask = [true; 9];
        mask[4] = false;
        let g = graph(&[0.0; 9], &mask, 3, Connectivity::NONE);
        // 12 edges on a 3x3 grid, the centre touches 4.
        assert_eq!(g.len(), 8);
        assert!(g.edges().iter().all(|e| e.a != 4 && e.b != 4));
    }

    #[test]
    fn edges_carry_jump_and_combined_reliability() {
        let values = [3.0, -3.0];
        let g = graph(&values, &[true; 2], 2, Connectivity::NONE);
        let e = g.edges()[0];
        assert_eq!((e.a, e.b), (0, 1));
        assert_eq!(e.required_jump, -1);
        // Both endpoints still hold sentinels.
        assert!(e.combined_reliability >= 2.0 * crate::reliability::SENTINEL_BASE);
    }

    #[test]
    fn construction_order_is_horizontal_then_vertical() {
        let g = graph(&[0.0; 4], &[true; 4], 2, Connectivity::BOTH);
        let pairs: Vec<_> = g.edges().iter().map(|e| (e.a, e.b)).collect();
        assert_eq!(pairs, vec![(0, 1), (2, 3), (1, 0), (3, 2), (0, 2), (1, 3), (2, 0), (3, 1)]);
    }
}
