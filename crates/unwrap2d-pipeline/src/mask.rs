//! Mask handling: the extended mask and the pre-check for admissible
//! adjacencies.
//!
//! Reliability needs the full 3x3 neighbourhood of a pixel, so it only
//! runs where the *extended* mask is set: the pixel and all 8 of its
//! neighbours are valid. On a border that does not wrap the neighbourhood
//! is incomplete and the pixel is excluded; on a border that wraps, the
//! missing neighbours are taken from the opposite border. Corners need
//! both axes to wrap.
//!
//! The extended mask only gates reliability. Edge construction and
//! grouping keep using the original mask.

use crate::grid::{Grid, NEIGHBORHOOD};
use crate::types::{Mask, UnwrapError, try_filled};

/// Derive the extended mask.
///
/// # Errors
///
/// Returns [`UnwrapError::Allocation`] if the output buffer cannot be
/// reserved.
pub fn extend_mask(mask: &Mask, grid: Grid) -> Result<Mask, UnwrapError> {
    let dimensions = grid.dimensions();
    debug_assert_eq!(mask.dimensions(), dimensions);

    let mut extended = try_filled(dimensions.len(), false)?;
    for (index, slot) in extended.iter_mut().enumerate() {
        *slot = mask.is_valid(index)
            && NEIGHBORHOOD.iter().all(|&(dx, dy)| {
                grid.neighbor(index, dx, dy)
                    .is_some_and(|neighbor| mask.is_valid(neighbor))
            });
    }
    Ok(Mask::from_parts(dimensions, extended))
}

/// Whether at least one adjacency that edge construction would accept
/// exists: two orthogonally adjacent valid pixels, counting wrap-around
/// pairs on wrapping axes.
///
/// When this is `false` there is nothing to group and unwrapping is a
/// no-op.
#[must_use]
pub fn has_admissible_pair(mask: &Mask, grid: Grid) -> bool {
    grid.adjacencies()
        .any(|adj| mask.is_valid(adj.a) && mask.is_valid(adj.b))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Connectivity, Dimensions};

    fn grid(width: usize, height: usize, connectivity: Connectivity) -> Grid {
        Grid::new(Dimensions::new(width, height), connectivity)
    }

    fn full(width: usize, height: usize) -> Mask {
        Mask::all_valid(Dimensions::new(width, height)).unwrap()
    }

    fn count(mask: &Mask) -> usize {
        mask.valid_count()
    }

    #[test]
    fn full_mask_without_wrap_keeps_interior_only() {
        let extended = extend_mask(&full(5, 4), grid(5, 4, Connectivity::NONE)).unwrap();
        assert_eq!(count(&extended), 3 * 2);
        let dims = Dimensions::new(5, 4);
        for y in 0..4 {
            for x in 0..5 {
                let interior = (1..4).contains(&x) && (1..3).contains(&y);
                assert_eq!(extended.is_valid(dims.index(x, y)), interior, "({x}, {y})");
            }
        }
    }

    #[test]
    fn x_wrap_adds_left_and_right_borders() {
        let connectivity = Connectivity {
            x_wrap: true,
            y_wrap: false,
        };
        let extended = extend_mask(&full(5, 4), grid(5, 4, connectivity)).unwrap();
        // Rows 1 and 2, every column.
        assert_eq!(count(&extended), 5 * 2);
    }

    #[test]
    fn y_wrap_adds_top_and_bottom_borders() {
        let connectivity = Connectivity {
            x_wrap: false,
            y_wrap: true,
        };
        let extended = extend_mask(&full(5, 4), grid(5, 4, connectivity)).unwrap();
        // Columns 1..4, every row.
        assert_eq!(count(&extended), 3 * 4);
    }

    #[test]
    fn both_wraps_cover_every_pixel() {
        let extended = extend_mask(&full(5, 4), grid(5, 4, Connectivity::BOTH)).unwrap();
        assert_eq!(count(&extended), 20);
    }

    #[test]
    fn invalid_pixel_poisons_its_neighborhood() {
        let dims = Dimensions::new(7, 7);
        let mask = Mask::from_fn(dims, |x, y| !(x == 3 && y == 3)).unwrap();
        let extended = extend_mask(&mask, grid(7, 7, Connectivity::NONE)).unwrap();
        // Interior is 5x5 = 25, minus the 3x3 block around (3, 3).
        assert_eq!(count(&extended), 25 - 9);
        assert!(!extended.is_valid(dims.index(2, 2)));
        assert!(extended.is_valid(dims.index(1, 1)));
    }

    #[test]
    fn invalid_border_pixel_poisons_wrapped_neighbor() {
        let dims = Dimensions::new(5, 5);
        // Invalidate (4, 2); with x wrap it is a neighbour of (0, 2).
        let mask = Mask::from_fn(dims, |x, y| !(x == 4 && y == 2)).unwrap();
        let connectivity = Connectivity {
            x_wrap: true,
            y_wrap: false,
        };
        let extended = extend_mask(&mask, grid(5, 5, connectivity)).unwrap();
        assert!(!extended.is_valid(dims.index(0, 2)));
        assert!(!extended.is_valid(dims.index(0, 1)));
        assert!(extended.is_valid(dims.index(1, 2)));
        assert!(extended.is_valid(dims.index(2, 2)));
    }

    #[test]
    fn isolated_pixel_has_no_admissible_pair() {
        let dims = Dimensions::new(4, 4);
        let mask = Mask::from_fn(dims, |x, y| x == 0 && y == 0).unwrap();
        assert!(!has_admissible_pair(&mask, grid(4, 4, Connectivity::NONE)));
    }

    #[test]
    fn diagonal_pair_is_not_admissible() {
        let dims = Dimensions::new(3, 3);
        let mask = Mask::from_fn(dims, |x, y| (x, y) == (0, 0) || (x, y) == (1, 1)).unwrap();
        assert!(!has_admissible_pair(&mask, grid(3, 3, Connectivity::NONE)));
    }

    #[test]
    fn wrap_pair_counts_as_admissible() {
        let dims = Dimensions::new(4, 4);
        // (0, 0) and (3, 0) are only adjacent across the x border.
        let mask = Mask::from_fn(dims, |x, y| y == 0 && (x == 0 || x == 3)).unwrap();
        assert!(!has_admissible_pair(&mask, grid(4, 4, Connectivity::NONE)));
        let connectivity = Connectivity {
            x_wrap: true,
            y_wrap: false,
        };
        assert!(has_admissible_pair(&mask, grid(4, 4, connectivity)));
    }

    #[test]
    fn orthogonal_pair_is_admissible() {
        let dims = Dimensions::new(4, 4);
        let mask = Mask::from_fn(dims, |x, y| x == 2 && (y == 1 || y == 2)).unwrap();
        assert!(has_admissible_pair(&mask, grid(4, 4, Connectivity::NONE)));
    }
}
