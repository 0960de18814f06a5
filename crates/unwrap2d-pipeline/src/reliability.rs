//! Per-pixel reliability from wrapped second differences.
//!
//! For each pixel with a complete 3x3 neighbourhood the score is the sum of
//! squares of four directional second differences (horizontal, vertical
//! and both diagonals), each taken through [`wrap`]. Smooth regions score
//! near zero; noise and true discontinuities score high. Lower is more
//! reliable.
//!
//! Pixels outside the extended mask keep a large per-pixel sentinel so
//! they sort after every scored pixel without colliding with each other.

use std::hash::Hasher;

use siphasher::sip::SipHasher13;

use crate::grid::Grid;
use crate::group::Pixels;
use crate::phase::wrap;

/// Lower bound of every sentinel reliability.
pub const SENTINEL_BASE: f64 = 9_999_999.0;

/// Sentinels spread over `[SENTINEL_BASE, SENTINEL_BASE + 2^31)`.
const SENTINEL_SPREAD_MASK: u64 = (1 << 31) - 1;

/// Neighbour offsets `(before, after)` for the four directions.
const DIRECTIONS: [((isize, isize), (isize, isize)); 4] = [
    ((-1, 0), (1, 0)),
    ((0, -1), (0, 1)),
    ((-1, -1), (1, 1)),
    ((1, -1), (-1, 1)),
];

/// Counts from one reliability pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReliabilityStats {
    /// Pixels that received a computed score.
    pub scored_pixels: usize,
    /// Pixels that kept their sentinel (outside the extended mask, or a
    /// non-finite score).
    pub sentinel_pixels: usize,
}

/// Deterministic tiebreak reliability for pixel `index`.
///
/// Equal `(seed, index)` pairs always give the same value.
#[must_use]
pub fn sentinel(seed: u64, index: usize) -> f64 {
    let mut hasher = SipHasher13::new_with_keys(seed, !seed);
    hasher.write_usize(index);
    #[allow(clippy::cast_precision_loss)]
    let spread = (hasher.finish() & SENTINEL_SPREAD_MASK) as f64;
    SENTINEL_BASE + spread
}

/// Score of the pixel at `index`, or `None` if part of its neighbourhood
/// is missing.
fn score(pixels: &Pixels, grid: Grid, index: usize, period: f64) -> Option<f64> {
    let center = pixels.value(index)?;
    let mut sum = 0.0;
    for ((bx, by), (ax, ay)) in DIRECTIONS {
        let before = pixels.value(grid.neighbor(index, bx, by)?)?;
        let after = pixels.value(grid.neighbor(index, ax, ay)?)?;
        let second = wrap(before - center, period) - wrap(center - after, period);
        sum = second.mul_add(second, sum);
    }
    Some(sum)
}

/// Score every pixel whose extended mask is set.
///
/// Non-finite scores (from non-finite input samples) are discarded and
/// the pixel keeps its sentinel, so sort keys stay comparable.
pub(crate) fn estimate(pixels: &mut Pixels, grid: Grid, period: f64) -> ReliabilityStats {
    let mut stats = ReliabilityStats::default();
    for index in 0..pixels.len() {
        let scored = pixels
            .is_valid_extended(index)
            .then(|| score(pixels, grid, index, period))
            .flatten()
            .filter(|s| s.is_finite());
        match scored {
            Some(reliability) => {
                pixels.set_reliability(index, reliability);
                stats.scored_pixels += 1;
            }
            None => stats.sentinel_pixels += 1,
        }
    }
    log::trace!(
        "reliability: {} scored, {} sentinel",
        stats.scored_pixels,
        stats.sentinel_pixels
    );
    stats
}
