//! Apply group increments and fill masked-out pixels.

use crate::group::Pixels;
use crate::types::{PhaseMap, UnwrapError, try_with_capacity};

/// Summary of the finalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FinalizeStats {
    /// Value assigned to masked-out pixels: the minimum corrected value
    /// over valid pixels. `None` if no valid pixel had a comparable value.
    pub fill_value: Option<f64>,
    /// Number of masked-out pixels that received `fill_value`.
    pub filled_pixels: usize,
    /// Largest corrected value over valid pixels.
    pub max_value: Option<f64>,
}

/// Build the output phase map from the grouped arena.
///
/// Each pixel becomes `value + increment * period`. Pixels outside the
/// input mask are then overwritten with the minimum over valid pixels.
///
/// # Errors
///
/// Returns [`UnwrapError::Allocation`] if the output buffer cannot be
/// reserved.
pub fn finalize(pixels: &Pixels, period: f64) -> Result<(PhaseMap, FinalizeStats), UnwrapError> {
    let mut values = try_with_capacity(pixels.len())?;
    values.extend(pixels.corrected_values(period));

    let mut stats = FinalizeStats::default();
    for (index, &value) in values.iter().enumerate() {
        if !pixels.is_valid_input(index) || value.is_nan() {
            continue;
        }
        stats.fill_value = Some(stats.fill_value.map_or(value, |min| min.min(value)));
        stats.max_value = Some(stats.max_value.map_or(value, |max| max.max(value)));
    }

    if let Some(fill) = stats.fill_value {
        for (index, value) in values.iter_mut().enumerate() {
            if !pixels.is_valid_input(index) {
                *value = fill;
                stats.filled_pixels += 1;
            }
        }
    }

    Ok((PhaseMap::from_parts(pixels.dimensions(), values), stats))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::f64::consts::TAU;

    use super::*;
    use crate::types::{Dimensions, Mask};

    fn pixels(values: &[f64], valid: &[bool]) -> Pixels {
        let dims = Dimensions::new(values.len(), 1);
        let image = PhaseMap::new(dims, values.to_vec()).unwrap();
        let mask = Mask::new(dims, valid.to_vec()).unwrap();
        Pixels::new(&image, &mask, &mask, 0).unwrap()
    }

    #[test]
    fn masked_pixels_take_the_valid_minimum() {
        let p = pixels(&[0.5, -1.0, 2.0, 0.0], &[true, true, true, false]);
        let (out, stats) = finalize(&p, TAU).unwrap();
        assert_eq!(out.values(), &[0.5, -1.0, 2.0, -1.0]);
        assert_eq!(stats.fill_value, Some(-1.0));
        assert_eq!(stats.max_value, Some(2.0));
        assert_eq!(stats.filled_pixels, 1);
    }

    #[test]
    fn all_valid_fills_nothing() {
        let p = pixels(&[0.1, 0.2], &[true, true]);
        let (out, stats) = finalize(&p, TAU).unwrap();
        assert_eq!(out.values(), &[0.1, 0.2]);
        assert_eq!(stats.filled_pixels, 0);
    }

    #[test]
    fn nan_sample_does_not_become_the_fill() {
        let p = pixels(&[f64::NAN, 1.0, 3.0], &[true, true, false]);
        let (out, stats) = finalize(&p, TAU).unwrap();
        assert_eq!(stats.fill_value, Some(1.0));
        assert!(out.values()[0].is_nan());
        assert!((out.values()[2] - 1.0).abs() < f64::EPSILON);
    }
}
