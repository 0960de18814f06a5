//! Shared types for the unwrap2d pipeline.

use std::collections::TryReserveError;
use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can hand over raster
/// masks or receive previews without depending on `image` directly.
pub use image::GrayImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl Dimensions {
    /// Create a new dimensions value. Not validated.
    #[must_use]
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Total number of pixels (`width * height`).
    ///
    /// Saturates instead of overflowing; validated dimensions never
    /// reach the saturation point.
    #[must_use]
    pub const fn len(self) -> usize {
        self.width.saturating_mul(self.height)
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Row-major index of `(x, y)`.
    #[must_use]
    pub const fn index(self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Inverse of [`index`](Self::index).
    #[must_use]
    pub const fn coords(self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    /// Check that both axes are non-zero and the pixel count fits in
    /// `usize`, returning the pixel count.
    pub(crate) fn validate(self) -> Result<usize, UnwrapError> {
        if self.is_empty() {
            return Err(UnwrapError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        self.width
            .checked_mul(self.height)
            .ok_or(UnwrapError::InvalidDimensions {
                width: self.width,
                height: self.height,
            })
    }
}

/// A row-major map of phase samples.
///
/// Wrapped inputs are expected to lie in the principal range
/// `(-period/2, period/2]`. Out-of-range or non-finite samples are
/// accepted; the unwrapper never panics on them, but the result for
/// those pixels is unspecified.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseMap {
    dimensions: Dimensions,
    values: Vec<f64>,
}

impl PhaseMap {
    /// Wrap a row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::InvalidDimensions`] if either axis is zero
    /// and [`UnwrapError::LengthMismatch`] if `values.len()` differs from
    /// `width * height`.
    pub fn new(dimensions: Dimensions, values: Vec<f64>) -> Result<Self, UnwrapError> {
        let expected = dimensions.validate()?;
        if values.len() != expected {
            return Err(UnwrapError::LengthMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { dimensions, values })
    }

    /// Build a phase map by evaluating `f(x, y)` for every pixel.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::InvalidDimensions`] if either axis is zero.
    pub fn from_fn(
        dimensions: Dimensions,
        mut f: impl FnMut(usize, usize) -> f64,
    ) -> Result<Self, UnwrapError> {
        let len = dimensions.validate()?;
        let values = (0..len)
            .map(|i| {
                let (x, y) = dimensions.coords(i);
                f(x, y)
            })
            .collect();
        Ok(Self { dimensions, values })
    }

    /// Construct without validation. Callers guarantee the length.
    pub(crate) fn from_parts(dimensions: Dimensions, values: Vec<f64>) -> Self {
        debug_assert_eq!(dimensions.len(), values.len());
        Self { dimensions, values }
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// All samples in row-major order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The sample at `(x, y)`, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.dimensions.width || y >= self.dimensions.height {
            return None;
        }
        self.values.get(self.dimensions.index(x, y)).copied()
    }

    /// Consume the map and return the row-major samples.
    #[must_use]
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// A row-major validity mask: `true` marks a usable pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    dimensions: Dimensions,
    valid: Vec<bool>,
}

impl Mask {
    /// Wrap a row-major validity buffer.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::InvalidDimensions`] if either axis is zero
    /// and [`UnwrapError::LengthMismatch`] if `valid.len()` differs from
    /// `width * height`.
    pub fn new(dimensions: Dimensions, valid: Vec<bool>) -> Result<Self, UnwrapError> {
        let expected = dimensions.validate()?;
        if valid.len() != expected {
            return Err(UnwrapError::LengthMismatch {
                expected,
                actual: valid.len(),
            });
        }
        Ok(Self { dimensions, valid })
    }

    /// A mask with every pixel valid.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::InvalidDimensions`] if either axis is zero,
    /// or [`UnwrapError::Allocation`] if the buffer cannot be reserved.
    pub fn all_valid(dimensions: Dimensions) -> Result<Self, UnwrapError> {
        let len = dimensions.validate()?;
        Ok(Self {
            dimensions,
            valid: try_filled(len, true)?,
        })
    }

    /// Build a mask by evaluating `f(x, y)` for every pixel.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::InvalidDimensions`] if either axis is zero.
    pub fn from_fn(
        dimensions: Dimensions,
        mut f: impl FnMut(usize, usize) -> bool,
    ) -> Result<Self, UnwrapError> {
        let len = dimensions.validate()?;
        let valid = (0..len)
            .map(|i| {
                let (x, y) = dimensions.coords(i);
                f(x, y)
            })
            .collect();
        Ok(Self { dimensions, valid })
    }

    /// Convert an 8-bit luminance raster into a mask.
    ///
    /// Any non-zero sample is valid, so both `255`/`0` masks and
    /// `1`/`0` masks convert as expected.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::InvalidDimensions`] for an empty raster.
    pub fn from_gray_image(raster: &GrayImage) -> Result<Self, UnwrapError> {
        let dimensions = Dimensions::new(raster.width() as usize, raster.height() as usize);
        dimensions.validate()?;
        let valid = raster.as_raw().iter().map(|&v| v != 0).collect();
        Ok(Self { dimensions, valid })
    }

    pub(crate) fn from_parts(dimensions: Dimensions, valid: Vec<bool>) -> Self {
        debug_assert_eq!(dimensions.len(), valid.len());
        Self { dimensions, valid }
    }

    /// Mask dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Whether the pixel at `index` is valid. Out-of-range indices are
    /// invalid.
    #[must_use]
    pub fn is_valid(&self, index: usize) -> bool {
        self.valid.get(index).copied().unwrap_or(false)
    }

    /// Row-major validity flags.
    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.valid
    }

    /// Number of valid pixels.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }
}

/// Per-axis toroidal connectivity.
///
/// When an axis wraps, the image's opposite borders along that axis are
/// treated as adjacent (e.g. periodic frequency- or phase-encoding
/// directions in MRI).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    /// Columns `0` and `width - 1` are adjacent.
    pub x_wrap: bool,
    /// Rows `0` and `height - 1` are adjacent.
    pub y_wrap: bool,
}

impl Connectivity {
    /// No wrap-around on either axis.
    pub const NONE: Self = Self {
        x_wrap: false,
        y_wrap: false,
    };

    /// Wrap-around on both axes.
    pub const BOTH: Self = Self {
        x_wrap: true,
        y_wrap: true,
    };
}

/// Configuration for one unwrap call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnwrapConfig {
    /// Which axes wrap around.
    pub connectivity: Connectivity,

    /// Length of one full phase period. Wrapped samples live in
    /// `(-period/2, period/2]`.
    pub period: f64,

    /// Seed for the reliability tiebreak values assigned to pixels whose
    /// 3x3 neighbourhood is incomplete. Equal seeds give bit-identical
    /// results.
    pub seed: u64,
}

impl UnwrapConfig {
    /// Default phase period (`2π`).
    pub const DEFAULT_PERIOD: f64 = TAU;

    /// Default tiebreak seed.
    pub const DEFAULT_SEED: u64 = 0;

    /// Half of [`period`](Self::period): the bound of the principal range.
    #[must_use]
    pub fn half_period(&self) -> f64 {
        self.period / 2.0
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::InvalidConfig`] if `period` is not a
    /// finite positive number.
    pub fn validate(&self) -> Result<(), UnwrapError> {
        if !self.period.is_finite() || self.period <= 0.0 {
            return Err(UnwrapError::InvalidConfig(format!(
                "period must be finite and positive, got {}",
                self.period
            )));
        }
        Ok(())
    }
}

impl Default for UnwrapConfig {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::default(),
            period: Self::DEFAULT_PERIOD,
            seed: Self::DEFAULT_SEED,
        }
    }
}

/// Result of an unwrap call.
#[derive(Debug, Clone, PartialEq)]
pub struct UnwrapOutcome {
    /// The output phase map, same dimensions as the input.
    pub image: PhaseMap,

    /// `false` when the mask had no pair of adjacent valid pixels: the
    /// pipeline did not run and `image` is a verbatim copy of the input.
    pub unwrapped: bool,
}

/// Errors that can occur during unwrapping.
///
/// A mask without any admissible adjacent pair is not an error; see
/// [`UnwrapOutcome::unwrapped`].
#[derive(Debug, thiserror::Error)]
pub enum UnwrapError {
    /// Width or height is zero (or their product overflows).
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },

    /// A buffer does not hold `width * height` samples.
    #[error("buffer holds {actual} samples, expected {expected}")]
    LengthMismatch {
        /// `width * height`.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// The validity mask does not match the image dimensions.
    #[error(
        "mask is {}x{} but image is {}x{}",
        mask.width,
        mask.height,
        image.width,
        image.height
    )]
    MaskDimensionMismatch {
        /// Image dimensions.
        image: Dimensions,
        /// Mask dimensions.
        mask: Dimensions,
    },

    /// Configuration is invalid.
    #[error("invalid unwrap configuration: {0}")]
    InvalidConfig(String),

    /// A scratch buffer could not be allocated.
    #[error("failed to allocate scratch buffers: {0}")]
    Allocation(#[from] TryReserveError),
}

/// Serde-compatible proxy for `UnwrapError`.
///
/// `TryReserveError` does not implement serde and cannot be built from
/// outside `alloc`, so the `Allocation` variant stores its `Display`
/// string. A deserialized `Allocation` comes back as `InvalidConfig`
/// carrying that message.
#[derive(Serialize, Deserialize)]
enum UnwrapErrorProxy {
    InvalidDimensions { width: usize, height: usize },
    LengthMismatch { expected: usize, actual: usize },
    MaskDimensionMismatch { image: Dimensions, mask: Dimensions },
    InvalidConfig(String),
    Allocation(String),
}

impl Serialize for UnwrapError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::InvalidDimensions { width, height } => UnwrapErrorProxy::InvalidDimensions {
                width: *width,
                height: *height,
            },
            Self::LengthMismatch { expected, actual } => UnwrapErrorProxy::LengthMismatch {
                expected: *expected,
                actual: *actual,
            },
            Self::MaskDimensionMismatch { image, mask } => {
                UnwrapErrorProxy::MaskDimensionMismatch {
                    image: *image,
                    mask: *mask,
                }
            }
            Self::InvalidConfig(s) => UnwrapErrorProxy::InvalidConfig(s.clone()),
            Self::Allocation(e) => UnwrapErrorProxy::Allocation(e.to_string()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UnwrapError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = UnwrapErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            UnwrapErrorProxy::InvalidDimensions { width, height } => {
                Self::InvalidDimensions { width, height }
            }
            UnwrapErrorProxy::LengthMismatch { expected, actual } => {
                Self::LengthMismatch { expected, actual }
            }
            UnwrapErrorProxy::MaskDimensionMismatch { image, mask } => {
                Self::MaskDimensionMismatch { image, mask }
            }
            UnwrapErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            UnwrapErrorProxy::Allocation(msg) => {
                Self::InvalidConfig(format!("allocation failure: {msg}"))
            }
        })
    }
}

/// Allocate a vector of `len` copies of `value`, reporting allocation
/// failure instead of aborting.
pub(crate) fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>, UnwrapError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, value);
    Ok(buf)
}

/// Allocate an empty vector able to hold `capacity` items without
/// reallocating.
pub(crate) fn try_with_capacity<T>(capacity: usize) -> Result<Vec<T>, UnwrapError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(capacity)?;
    Ok(buf)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_index_roundtrip() {
        let dims = Dimensions::new(5, 3);
        assert_eq!(dims.len(), 15);
        assert_eq!(dims.index(4, 2), 14);
        assert_eq!(dims.coords(14), (4, 2));
        assert_eq!(dims.coords(5), (0, 1));
    }

    #[test]
    fn zero_width_is_rejected() {
        let err = PhaseMap::new(Dimensions::new(0, 4), Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            UnwrapError::InvalidDimensions {
                width: 0,
                height: 4
            }
        ));
    }

    #[test]
    fn overflowing_dimensions_are_rejected() {
        let err = Mask::all_valid(Dimensions::new(usize::MAX, 2)).unwrap_err();
        assert!(matches!(err, UnwrapError::InvalidDimensions { .. }));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = PhaseMap::new(Dimensions::new(2, 2), vec![0.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            UnwrapError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn phase_map_get_bounds() {
        let map = PhaseMap::from_fn(Dimensions::new(3, 2), |x, y| (x + 10 * y) as f64).unwrap();
        assert_eq!(map.get(2, 1), Some(12.0));
        assert_eq!(map.get(3, 0), None);
        assert_eq!(map.get(0, 2), None);
    }

    #[test]
    fn mask_from_gray_image_treats_nonzero_as_valid() {
        let raster = GrayImage::from_raw(3, 1, vec![0, 1, 255]).unwrap();
        let mask = Mask::from_gray_image(&raster).unwrap();
        assert_eq!(mask.as_slice(), &[false, true, true]);
        assert_eq!(mask.valid_count(), 2);
    }

    #[test]
    fn mask_out_of_range_index_is_invalid() {
        let mask = Mask::all_valid(Dimensions::new(2, 2)).unwrap();
        assert!(mask.is_valid(3));
        assert!(!mask.is_valid(4));
    }

    #[test]
    fn default_config_uses_two_pi() {
        let config = UnwrapConfig::default();
        assert!((config.period - TAU).abs() < f64::EPSILON);
        assert!((config.half_period() - std::f64::consts::PI).abs() < f64::EPSILON);
        assert_eq!(config.connectivity, Connectivity::NONE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_positive_period_is_invalid() {
        for period in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = UnwrapConfig {
                period,
                ..UnwrapConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(UnwrapError::InvalidConfig(_))),
                "period {period} should be rejected"
            );
        }
    }

    #[test]
    fn config_serde_roundtrip_and_defaults() {
        let config = UnwrapConfig {
            connectivity: Connectivity::BOTH,
            period: 360.0,
            seed: 7,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: UnwrapConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);

        // Missing fields fall back to defaults.
        let partial: UnwrapConfig =
            serde_json::from_str(r#"{"connectivity":{"x_wrap":true,"y_wrap":false}}"#).unwrap();
        assert!(partial.connectivity.x_wrap);
        assert!((partial.period - TAU).abs() < f64::EPSILON);
    }

    #[test]
    fn allocation_helpers_fill_and_reserve() {
        let buf = try_filled(4, 1.5_f64).unwrap();
        assert_eq!(buf, vec![1.5; 4]);
        let empty: Vec<u8> = try_with_capacity(16).unwrap();
        assert!(empty.is_empty());
        assert!(empty.capacity() >= 16);
    }

    #[test]
    fn impossible_reservation_reports_allocation_error() {
        let result: Result<Vec<u64>, _> = try_with_capacity(usize::MAX);
        assert!(matches!(result, Err(UnwrapError::Allocation(_))));
    }

    #[test]
    fn unwrap_error_serde_round_trip_mask_mismatch() {
        let err = UnwrapError::MaskDimensionMismatch {
            image: Dimensions::new(4, 4),
            mask: Dimensions::new(4, 5),
        };
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: UnwrapError = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            deserialized,
            UnwrapError::MaskDimensionMismatch { image, mask }
                if image == Dimensions::new(4, 4) && mask == Dimensions::new(4, 5)
        ));
    }

    #[test]
    fn unwrap_error_serde_allocation_keeps_message() {
        let Err(err) = try_with_capacity::<u64>(usize::MAX) else {
            unreachable!("reservation of usize::MAX elements cannot succeed");
        };
        let message = err.to_string();
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: UnwrapError = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            deserialized,
            UnwrapError::InvalidConfig(ref s) if message.ends_with(s.trim_start_matches("allocation failure: "))
        ));
    }
}
