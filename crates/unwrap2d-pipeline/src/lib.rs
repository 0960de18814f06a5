//! unwrap2d-pipeline: 2D phase unwrapping by reliability sorting along a
//! non-continuous path (sans-IO).
//!
//! Recovers a continuous phase surface from a wrapped one by adding whole
//! periods to each pixel:
//! pre-check -> extended mask -> reliability -> edges -> sort ->
//! grouping -> finalization.
//!
//! Pixel pairs are trusted in order of how smooth their neighbourhoods
//! are, and each accepted pair merges two groups of already-consistent
//! pixels. Pairs that would close a loop are ignored, so errors from noisy
//! regions do not propagate along a fixed scan path.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! buffers and returns structured data. State lives only for the duration
//! of one call; concurrent calls share nothing.

pub mod diagnostics;
pub mod edge;
pub mod finalize;
pub mod grid;
pub mod group;
pub mod mask;
pub mod phase;
pub mod pipeline;
pub mod reliability;
pub mod render;
pub mod sort;
pub mod types;

pub use diagnostics::{SystemClock, UnwrapDiagnostics, unwrap_with_diagnostics};
pub use pipeline::{Pipeline, PipelineStage, Stage};
pub use types::{
    Connectivity, Dimensions, GrayImage, Mask, PhaseMap, UnwrapConfig, UnwrapError, UnwrapOutcome,
};

/// Unwrap a phase map.
///
/// A missing mask means every pixel is valid. When the mask has no pair
/// of orthogonally adjacent valid pixels (counting wrap-around pairs),
/// nothing is unwrapped: the outcome holds a copy of the input and
/// [`UnwrapOutcome::unwrapped`] is `false`.
///
/// Masked-out pixels are filled with the minimum unwrapped value over
/// valid pixels.
///
/// # Errors
///
/// Returns [`UnwrapError::MaskDimensionMismatch`] if the mask does not
/// match the image and [`UnwrapError::InvalidConfig`] for a non-positive
/// or non-finite period; both are checked before anything is allocated.
/// Returns [`UnwrapError::Allocation`] if a scratch buffer cannot be
/// reserved.
pub fn unwrap(
    image: &PhaseMap,
    mask: Option<&Mask>,
    config: &UnwrapConfig,
) -> Result<UnwrapOutcome, UnwrapError> {
    pipeline::Pending::check(image.dimensions(), mask.map(Mask::dimensions), config)?;
    Pipeline::new(image.clone(), mask.cloned(), config.clone())?.complete()
}

/// Unwrap a raw row-major buffer with the default period (`2π`).
///
/// Convenience wrapper over [`unwrap`] for callers that hold plain
/// slices. Returns the unwrapped samples and whether unwrapping ran.
///
/// # Errors
///
/// Returns [`UnwrapError::InvalidDimensions`] for a zero axis,
/// [`UnwrapError::LengthMismatch`] if a buffer does not hold
/// `width * height` samples, and otherwise the errors of [`unwrap`].
pub fn unwrap_slice(
    values: &[f64],
    width: usize,
    height: usize,
    mask: Option<&[bool]>,
    connectivity: Connectivity,
) -> Result<(Vec<f64>, bool), UnwrapError> {
    let dimensions = Dimensions::new(width, height);
    let image = PhaseMap::new(dimensions, values.to_vec())?;
    let mask = mask
        .map(|valid| Mask::new(dimensions, valid.to_vec()))
        .transpose()?;
    let config = UnwrapConfig {
        connectivity,
        ..UnwrapConfig::default()
    };
    let outcome = Pipeline::new(image, mask, config)?.complete()?;
    Ok((outcome.image.into_values(), outcome.unwrapped))
}
