//! Pixel addressing with optional wrap-around per axis.
//!
//! Every stage that looks at neighbours (mask extension, reliability,
//! edge construction, the mask pre-check) goes through [`Grid`] so the
//! border rules are defined in exactly one place: a step off the image
//! along an axis either re-enters from the opposite border (wrap enabled)
//! or has no neighbour at all.

use crate::types::{Connectivity, Dimensions};

/// Offsets of the 8-connected neighbourhood, row by row.
pub const NEIGHBORHOOD: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Image geometry plus connectivity for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    dimensions: Dimensions,
    connectivity: Connectivity,
}

/// One orthogonal adjacency between two distinct pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacency {
    /// Left or upper pixel (the last column/row for wrap adjacencies).
    pub a: usize,
    /// Right or lower pixel (the first column/row for wrap adjacencies).
    pub b: usize,
    /// Whether this adjacency crosses the image border.
    pub wraps: bool,
}

impl Grid {
    /// Create a grid. `dimensions` must be non-empty.
    #[must_use]
    pub const fn new(dimensions: Dimensions, connectivity: Connectivity) -> Self {
        Self {
            dimensions,
            connectivity,
        }
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(self) -> Dimensions {
        self.dimensions
    }

    /// Connectivity flags.
    #[must_use]
    pub const fn connectivity(self) -> Connectivity {
        self.connectivity
    }

    /// Index of the pixel one unit step `(dx, dy)` away from `index`.
    ///
    /// Returns `None` when the step leaves the image along an axis that
    /// does not wrap. Offsets must be in `-1..=1`.
    #[must_use]
    pub fn neighbor(self, index: usize, dx: isize, dy: isize) -> Option<usize> {
        debug_assert!(dx.abs() <= 1 && dy.abs() <= 1, "unit offsets only");
        let (x, y) = self.dimensions.coords(index);
        let nx = step(x, dx, self.dimensions.width, self.connectivity.x_wrap)?;
        let ny = step(y, dy, self.dimensions.height, self.connectivity.y_wrap)?;
        Some(self.dimensions.index(nx, ny))
    }

    /// Whether the pixel at `index` has all 8 neighbours inside the grid.
    #[must_use]
    pub fn has_full_neighborhood(self, index: usize) -> bool {
        NEIGHBORHOOD
            .iter()
            .all(|&(dx, dy)| self.neighbor(index, dx, dy).is_some())
    }

    /// All orthogonal adjacencies in construction order: horizontal
    /// pairs row by row, then the right-to-left border pairs (when `x`
    /// wraps), then vertical pairs, then the bottom-to-top border pairs
    /// (when `y` wraps).
    ///
    /// A 1-pixel-wide axis that wraps would pair a pixel with itself;
    /// those self-pairs are omitted.
    pub fn adjacencies(self) -> impl Iterator<Item = Adjacency> {
        let Dimensions { width, height } = self.dimensions;
        let Connectivity { x_wrap, y_wrap } = self.connectivity;

        let horizontal = (0..height).flat_map(move |y| {
            (0..width.saturating_sub(1)).map(move |x| Adjacency {
                a: y * width + x,
                b: y * width + x + 1,
                wraps: false,
            })
        });
        let horizontal_wrap = (0..height)
            .filter(move |_| x_wrap && width > 1)
            .map(move |y| Adjacency {
                a: y * width + width - 1,
                b: y * width,
                wraps: true,
            });
        let vertical = (0..height.saturating_sub(1)).flat_map(move |y| {
            (0..width).map(move |x| Adjacency {
                a: y * width + x,
                b: (y + 1) * width + x,
                wraps: false,
            })
        });
        let vertical_wrap = (0..width)
            .filter(move |_| y_wrap && height > 1)
            .map(move |x| Adjacency {
                a: (height - 1) * width + x,
                b: x,
                wraps: true,
            });

        horizontal
            .chain(horizontal_wrap)
            .chain(vertical)
            .chain(vertical_wrap)
    }
}

/// Move `pos` by `delta` along an axis of length `extent`.
fn step(pos: usize, delta: isize, extent: usize, wraps: bool) -> Option<usize> {
    match pos.checked_add_signed(delta) {
        Some(t) if t < extent => Some(t),
        Some(t) if wraps => Some(t % extent),
        None if wraps => Some(extent - 1),
        _ => None,
    }
}
