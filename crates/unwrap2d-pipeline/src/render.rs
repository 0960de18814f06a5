//! 8-bit previews of phase maps.

use image::{GrayImage, Luma};

use crate::types::{PhaseMap, UnwrapError};

/// Render a phase map as luminance, scaling its finite range linearly
/// onto `0..=255`.
///
/// A map with no spread renders mid-grey. Non-finite samples render
/// black.
///
/// # Errors
///
/// Returns [`UnwrapError::InvalidDimensions`] if an axis does not fit in
/// `u32`.
pub fn to_gray_image(map: &PhaseMap) -> Result<GrayImage, UnwrapError> {
    let dimensions = map.dimensions();
    let invalid = || UnwrapError::InvalidDimensions {
        width: dimensions.width,
        height: dimensions.height,
    };
    let width = u32::try_from(dimensions.width).map_err(|_| invalid())?;
    let height = u32::try_from(dimensions.height).map_err(|_| invalid())?;

    let (min, max) = map
        .values()
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;

    Ok(GrayImage::from_fn(width, height, |x, y| {
        let value = map.get(x as usize, y as usize).unwrap_or(f64::NAN);
        Luma([shade(value, min, span)])
    }))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn shade(value: f64, min: f64, span: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    if !(span.is_finite() && span > 0.0) {
        return 128;
    }
    ((value - min) / span * 255.0).round().clamp(0.0, 255.0) as u8
}
