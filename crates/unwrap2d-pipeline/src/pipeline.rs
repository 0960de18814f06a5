//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::unwrap`] which runs everything in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use unwrap2d_pipeline::{Dimensions, PhaseMap, Pipeline, UnwrapConfig, UnwrapError};
//! # use unwrap2d_pipeline::pipeline::Screening;
//! # fn run() -> Result<(), UnwrapError> {
//! let image = PhaseMap::from_fn(Dimensions::new(8, 8), |x, _| 0.8 * x as f64 - 2.8)?;
//! let Screening::Ready(screened) = Pipeline::new(image, None, UnwrapConfig::default())?.screen()
//! else {
//!     return Ok(());
//! };
//! let grouped = screened
//!     .extend_mask()?
//!     .estimate_reliability()?
//!     .build_edges()?
//!     .sort_edges()
//!     .gather();
//! assert_eq!(grouped.pixels().group_count(), 1);
//!
//! let outcome = grouped.finalize()?.into_outcome();
//! assert!(outcome.unwrapped);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for stages that allocate), carrying only what later
//! stages still need. Scratch buffers are owned by the stage values, so
//! they are released on every exit path: the degenerate early return, an
//! error, or simply dropping a stage.

use crate::diagnostics::StageMetrics;
use crate::edge::{Edge, EdgeGraph};
use crate::finalize::FinalizeStats;
use crate::grid::Grid;
use crate::group::{GatherStats, Pixels};
use crate::reliability::ReliabilityStats;
use crate::types::{Dimensions, Mask, PhaseMap, UnwrapConfig, UnwrapError, UnwrapOutcome};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Inputs are validated but untouched. Call [`screen`](Self::screen) to
/// run the admissible-pair pre-check.
#[must_use = "pipeline stages are consumed by advancing — call .screen() to continue"]
pub struct Pending {
    config: UnwrapConfig,
    image: PhaseMap,
    mask: Mask,
}

impl Pending {
    /// The wrapped input.
    #[must_use]
    pub const fn image(&self) -> &PhaseMap {
        &self.image
    }

    /// The validity mask (all valid when none was supplied).
    #[must_use]
    pub const fn mask(&self) -> &Mask {
        &self.mask
    }

    /// The run configuration.
    #[must_use]
    pub const fn config(&self) -> &UnwrapConfig {
        &self.config
    }

    /// Check for at least one pair of adjacent valid pixels.
    ///
    /// Without one there is nothing to group; the result is then
    /// [`Screening::Degenerate`], which yields the input unchanged.
    pub fn screen(self) -> Screening {
        let dimensions = self.image.dimensions();
        let grid = Grid::new(dimensions, self.config.connectivity);
        let valid_pixels = self.mask.valid_count();
        if crate::mask::has_admissible_pair(&self.mask, grid) {
            log::debug!(
                "screen: {}x{} image, {valid_pixels} valid pixels",
                dimensions.width,
                dimensions.height
            );
            Screening::Ready(Screened {
                config: self.config,
                grid,
                image: self.image,
                mask: self.mask,
                valid_pixels,
            })
        } else {
            log::info!(
                "no admissible pair of adjacent valid pixels in {}x{} mask; returning input unchanged",
                dimensions.width,
                dimensions.height
            );
            Screening::Degenerate(Degenerate {
                image: self.image,
                valid_pixels,
            })
        }
    }

    pub(crate) fn check(
        image: Dimensions,
        mask: Option<Dimensions>,
        config: &UnwrapConfig,
    ) -> Result<(), UnwrapError> {
        image.validate()?;
        if let Some(mask) = mask
            && mask != image
        {
            return Err(UnwrapError::MaskDimensionMismatch { image, mask });
        }
        config.validate()
    }
}

// ───────────────────────── Stage 1: Screened ─────────────────────────

/// Outcome of [`Pending::screen`].
#[must_use]
pub enum Screening {
    /// At least one admissible pair exists; continue with
    /// [`Screened::extend_mask`].
    Ready(Screened),
    /// Nothing to unwrap; [`Degenerate::into_outcome`] returns the input.
    Degenerate(Degenerate),
}

impl Screening {
    /// Pixels valid in the input mask.
    #[must_use]
    pub const fn valid_pixels(&self) -> usize {
        match self {
            Self::Ready(s) => s.valid_pixels,
            Self::Degenerate(d) => d.valid_pixels,
        }
    }

    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        match self {
            Self::Ready(s) => s.stage_metrics(),
            Self::Degenerate(d) => d.stage_metrics(),
        }
    }

    /// Run all remaining stages.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::Allocation`] if a scratch buffer cannot be
    /// reserved.
    pub fn complete(self) -> Result<UnwrapOutcome, UnwrapError> {
        match self {
            Self::Ready(s) => s.complete(),
            Self::Degenerate(d) => d.complete(),
        }
    }
}

/// Pipeline state after a successful pre-check.
#[must_use = "pipeline stages are consumed by advancing — call .extend_mask() to continue"]
pub struct Screened {
    config: UnwrapConfig,
    grid: Grid,
    image: PhaseMap,
    mask: Mask,
    valid_pixels: usize,
}

impl Screened {
    /// The validity mask.
    #[must_use]
    pub const fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Derive the extended mask and advance to [`MaskExtended`].
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::Allocation`] if the extended mask cannot be
    /// reserved.
    pub fn extend_mask(self) -> Result<MaskExtended, UnwrapError> {
        let extended = crate::mask::extend_mask(&self.mask, self.grid)?;
        log::debug!(
            "extend mask: {} -> {} pixels",
            self.valid_pixels,
            extended.valid_count()
        );
        Ok(MaskExtended {
            config: self.config,
            grid: self.grid,
            image: self.image,
            mask: self.mask,
            extended,
            valid_pixels: self.valid_pixels,
        })
    }

    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        let dimensions = self.grid.dimensions();
        StageMetrics::Screen {
            width: dimensions.width,
            height: dimensions.height,
            valid_pixels: self.valid_pixels,
            admissible: true,
        }
    }
}

/// Terminal state when the mask has no admissible pair.
#[must_use = "call .into_outcome() to extract the UnwrapOutcome"]
pub struct Degenerate {
    image: PhaseMap,
    valid_pixels: usize,
}

impl Degenerate {
    /// The input, returned unchanged.
    #[must_use]
    pub const fn image(&self) -> &PhaseMap {
        &self.image
    }

    /// The input with [`UnwrapOutcome::unwrapped`] set to `false`.
    #[must_use]
    pub fn into_outcome(self) -> UnwrapOutcome {
        UnwrapOutcome {
            image: self.image,
            unwrapped: false,
        }
    }

    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        let dimensions = self.image.dimensions();
        StageMetrics::Screen {
            width: dimensions.width,
            height: dimensions.height,
            valid_pixels: self.valid_pixels,
            admissible: false,
        }
    }
}

// ───────────────────────── Stage 2: MaskExtended ─────────────────────

/// Pipeline state after deriving the extended mask.
#[must_use = "pipeline stages are consumed by advancing — call .estimate_reliability() to continue"]
pub struct MaskExtended {
    config: UnwrapConfig,
    grid: Grid,
    image: PhaseMap,
    mask: Mask,
    extended: Mask,
    valid_pixels: usize,
}

impl MaskExtended {
    /// Pixels whose full 3x3 neighbourhood is valid.
    #[must_use]
    pub const fn extended(&self) -> &Mask {
        &self.extended
    }

    /// Build the pixel arena, score reliability and advance to
    /// [`ReliabilityEstimated`].
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::Allocation`] if the pixel arena cannot be
    /// reserved.
    pub fn estimate_reliability(self) -> Result<ReliabilityEstimated, UnwrapError> {
        let mut pixels = Pixels::new(&self.image, &self.mask, &self.extended, self.config.seed)?;
        let stats = crate::reliability::estimate(&mut pixels, self.grid, self.config.period);
        log::debug!(
            "reliability: {} scored, {} sentinel",
            stats.scored_pixels,
            stats.sentinel_pixels
        );
        Ok(ReliabilityEstimated {
            config: self.config,
            grid: self.grid,
            pixels,
            stats,
        })
    }

    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        let connectivity = self.grid.connectivity();
        StageMetrics::ExtendMask {
            valid_pixels: self.valid_pixels,
            extended_pixels: self.extended.valid_count(),
            x_wrap: connectivity.x_wrap,
            y_wrap: connectivity.y_wrap,
        }
    }
}

// ───────────────────────── Stage 3: ReliabilityEstimated ─────────────

/// Pipeline state after reliability scoring.
#[must_use = "pipeline stages are consumed by advancing — call .build_edges() to continue"]
pub struct ReliabilityEstimated {
    config: UnwrapConfig,
    grid: Grid,
    pixels: Pixels,
    stats: ReliabilityStats,
}

impl ReliabilityEstimated {
    /// The scored pixel arena.
    #[must_use]
    pub const fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    /// Build edges and advance to [`EdgesBuilt`].
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::Allocation`] if the edge buffer cannot be
    /// reserved.
    pub fn build_edges(self) -> Result<EdgesBuilt, UnwrapError> {
        let graph = crate::edge::build_edges(&self.pixels, self.grid, self.config.period)?;
        log::debug!(
            "edges: {} built ({} wrap)",
            graph.len(),
            graph.wrap_edge_count()
        );
        Ok(EdgesBuilt {
            config: self.config,
            pixels: self.pixels,
            graph,
        })
    }

    pub(crate) const fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Reliability {
            scored_pixels: self.stats.scored_pixels,
            sentinel_pixels: self.stats.sentinel_pixels,
        }
    }
}

// ───────────────────────── Stage 4: EdgesBuilt ───────────────────────

/// Pipeline state after edge construction.
#[must_use = "pipeline stages are consumed by advancing — call .sort_edges() to continue"]
pub struct EdgesBuilt {
    config: UnwrapConfig,
    pixels: Pixels,
    graph: EdgeGraph,
}

impl EdgesBuilt {
    /// The edges in construction order.
    #[must_use]
    pub const fn graph(&self) -> &EdgeGraph {
        &self.graph
    }

    /// Sort edges by combined reliability and advance to [`EdgesSorted`].
    pub fn sort_edges(mut self) -> EdgesSorted {
        crate::sort::sort_edges(self.graph.edges_mut());
        log::trace!("sort: {} edges", self.graph.len());
        EdgesSorted {
            config: self.config,
            pixels: self.pixels,
            graph: self.graph,
        }
    }

    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::EdgeGraph {
            edge_count: self.graph.len(),
            wrap_edge_count: self.graph.wrap_edge_count(),
        }
    }
}

// ───────────────────────── Stage 5: EdgesSorted ──────────────────────

/// Pipeline state after sorting.
#[must_use = "pipeline stages are consumed by advancing — call .gather() to continue"]
pub struct EdgesSorted {
    config: UnwrapConfig,
    pixels: Pixels,
    graph: EdgeGraph,
}

impl EdgesSorted {
    /// The edges in ascending combined-reliability order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        self.graph.edges()
    }

    /// Group pixels along the sorted edges and advance to [`Grouped`].
    /// The edge list is released.
    pub fn gather(mut self) -> Grouped {
        let stats = self.pixels.gather(self.graph.edges());
        let group_count = self.pixels.group_count();
        log::debug!(
            "gather: {} accepted, {} cycle edges, {group_count} groups",
            stats.accepted_edges,
            stats.cycle_edges
        );
        Grouped {
            config: self.config,
            pixels: self.pixels,
            stats,
            group_count,
        }
    }

    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        let edges = self.graph.edges();
        StageMetrics::Sort {
            edge_count: edges.len(),
            min_reliability: edges.first().map_or(0.0, |e| e.combined_reliability),
            max_reliability: edges.last().map_or(0.0, |e| e.combined_reliability),
        }
    }
}

// ───────────────────────── Stage 6: Grouped ──────────────────────────

/// Pipeline state after grouping.
#[must_use = "pipeline stages are consumed by advancing — call .finalize() to continue"]
pub struct Grouped {
    config: UnwrapConfig,
    pixels: Pixels,
    stats: GatherStats,
    group_count: usize,
}

impl Grouped {
    /// The grouped pixel arena, for group inspection.
    #[must_use]
    pub const fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    /// Counts from the grouping pass.
    #[must_use]
    pub const fn stats(&self) -> &GatherStats {
        &self.stats
    }

    /// Apply increments, fill masked-out pixels and advance to
    /// [`Finalized`].
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::Allocation`] if the output buffer cannot be
    /// reserved.
    pub fn finalize(self) -> Result<Finalized, UnwrapError> {
        let (image, stats) = crate::finalize::finalize(&self.pixels, self.config.period)?;
        log::debug!(
            "finalize: filled {} masked pixels with {:?}",
            stats.filled_pixels,
            stats.fill_value
        );
        Ok(Finalized { image, stats })
    }

    pub(crate) const fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Gather {
            accepted_edges: self.stats.accepted_edges,
            cycle_edges: self.stats.cycle_edges,
            singleton_joins: self.stats.singleton_joins,
            group_merges: self.stats.group_merges,
            relabelled_pixels: self.stats.relabelled_pixels,
            group_count: self.group_count,
        }
    }
}

// ───────────────────────── Stage 7: Finalized ────────────────────────

/// Final pipeline state holding the unwrapped image.
#[must_use = "call .into_outcome() to extract the UnwrapOutcome"]
pub struct Finalized {
    image: PhaseMap,
    stats: FinalizeStats,
}

impl Finalized {
    /// The unwrapped image.
    #[must_use]
    pub const fn image(&self) -> &PhaseMap {
        &self.image
    }

    /// Fill value and counts from finalization.
    #[must_use]
    pub const fn stats(&self) -> &FinalizeStats {
        &self.stats
    }

    /// Extract the outcome.
    #[must_use]
    pub fn into_outcome(self) -> UnwrapOutcome {
        UnwrapOutcome {
            image: self.image,
            unwrapped: true,
        }
    }

    pub(crate) const fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Finalize {
            fill_value: self.stats.fill_value,
            filled_pixels: self.stats.filled_pixels,
            max_value: self.stats.max_value,
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Number of distinct stage indices. [`Screened`] and [`Degenerate`] are
/// alternative outcomes that share index `1`.
pub const STAGE_COUNT: usize = 8;

/// The output produced by a single pipeline stage.
///
/// Each variant borrows the data that the corresponding stage computed.
#[must_use]
pub enum StageOutput<'a> {
    /// Validated inputs.
    Input {
        /// The wrapped image.
        image: &'a PhaseMap,
        /// The validity mask.
        mask: &'a Mask,
    },
    /// Pre-check passed.
    Screened {
        /// The validity mask.
        mask: &'a Mask,
        /// Pixels valid in the mask.
        valid_pixels: usize,
    },
    /// Pre-check failed; the input is the result.
    Degenerate {
        /// The unchanged input.
        image: &'a PhaseMap,
    },
    /// Extended mask.
    MaskExtended {
        /// Pixels with a full valid neighbourhood.
        extended: &'a Mask,
    },
    /// Scored pixel arena.
    ReliabilityEstimated {
        /// The arena.
        pixels: &'a Pixels,
    },
    /// Edges in construction order.
    EdgesBuilt {
        /// The edges.
        edges: &'a [Edge],
    },
    /// Edges in ascending reliability order.
    EdgesSorted {
        /// The edges.
        edges: &'a [Edge],
    },
    /// Grouped pixel arena.
    Grouped {
        /// The arena.
        pixels: &'a Pixels,
    },
    /// Unwrapped image.
    Finalized {
        /// The output.
        image: &'a PhaseMap,
    },
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// # Loop pattern
///
/// ```rust
/// # use unwrap2d_pipeline::{Dimensions, PhaseMap, Pipeline, UnwrapConfig, UnwrapError};
/// # use unwrap2d_pipeline::pipeline::{Advance, Stage};
/// # fn run() -> Result<(), UnwrapError> {
/// let image = PhaseMap::from_fn(Dimensions::new(6, 6), |x, y| 0.4 * (x + y) as f64 - 2.0)?;
/// let mut stage: Stage = Pipeline::new(image, None, UnwrapConfig::default())?.into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let outcome = stage.complete()?;
/// assert!(outcome.unwrapped);
/// # Ok(())
/// # }
/// ```
pub trait PipelineStage: Sized {
    /// Human-readable name of this stage (e.g. `"input"`, `"gather"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for Pending through `7` for
    /// Finalized).
    const INDEX: usize;

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Stage-specific metrics for diagnostics.
    ///
    /// Returns `None` for [`Pending`], which has not done any work yet.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(stage))` on success and `Ok(None)` at a final
    /// stage.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::Allocation`] if a scratch buffer cannot be
    /// reserved.
    fn next(self) -> Result<Option<Stage>, UnwrapError>;

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::Allocation`] if a scratch buffer cannot be
    /// reserved.
    fn complete(self) -> Result<UnwrapOutcome, UnwrapError>;
}

impl PipelineStage for Pending {
    const NAME: &str = "input";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Input {
            image: &self.image,
            mask: &self.mask,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Result<Option<Stage>, UnwrapError> {
        Ok(Some(self.screen().into()))
    }

    fn complete(self) -> Result<UnwrapOutcome, UnwrapError> {
        self.screen().complete()
    }
}

impl PipelineStage for Screened {
    const NAME: &str = "screen";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Screened {
            mask: &self.mask,
            valid_pixels: self.valid_pixels,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, UnwrapError> {
        Ok(Some(Stage::MaskExtended(self.extend_mask()?)))
    }

    fn complete(self) -> Result<UnwrapOutcome, UnwrapError> {
        self.extend_mask()?.complete()
    }
}

impl PipelineStage for Degenerate {
    const NAME: &str = "degenerate";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Degenerate { image: &self.image }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, UnwrapError> {
        Ok(None)
    }

    fn complete(self) -> Result<UnwrapOutcome, UnwrapError> {
        Ok(self.into_outcome())
    }
}

impl PipelineStage for MaskExtended {
    const NAME: &str = "extend_mask";
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::MaskExtended {
            extended: &self.extended,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, UnwrapError> {
        Ok(Some(Stage::ReliabilityEstimated(
            self.estimate_reliability()?,
        )))
    }

    fn complete(self) -> Result<UnwrapOutcome, UnwrapError> {
        self.estimate_reliability()?.complete()
    }
}

impl PipelineStage for ReliabilityEstimated {
    const NAME: &str = "reliability";
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::ReliabilityEstimated {
            pixels: &self.pixels,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, UnwrapError> {
        Ok(Some(Stage::EdgesBuilt(self.build_edges()?)))
    }

    fn complete(self) -> Result<UnwrapOutcome, UnwrapError> {
        self.build_edges()?.complete()
    }
}

impl PipelineStage for EdgesBuilt {
    const NAME: &str = "edges";
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::EdgesBuilt {
            edges: self.graph.edges(),
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, UnwrapError> {
        Ok(Some(Stage::EdgesSorted(self.sort_edges())))
    }

    fn complete(self) -> Result<UnwrapOutcome, UnwrapError> {
        self.sort_edges().complete()
    }
}

impl PipelineStage for EdgesSorted {
    const NAME: &str = "sort";
    const INDEX: usize = 5;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::EdgesSorted {
            edges: self.graph.edges(),
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, UnwrapError> {
        Ok(Some(Stage::Grouped(self.gather())))
    }

    fn complete(self) -> Result<UnwrapOutcome, UnwrapError> {
        self.gather().complete()
    }
}

impl PipelineStage for Grouped {
    const NAME: &str = "gather";
    const INDEX: usize = 6;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Grouped {
            pixels: &self.pixels,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, UnwrapError> {
        Ok(Some(Stage::Finalized(self.finalize()?)))
    }

    fn complete(self) -> Result<UnwrapOutcome, UnwrapError> {
        self.finalize()?.complete()
    }
}

impl PipelineStage for Finalized {
    const NAME: &str = "finalize";
    const INDEX: usize = 7;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Finalized { image: &self.image }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, UnwrapError> {
        Ok(None)
    }

    fn complete(self) -> Result<UnwrapOutcome, UnwrapError> {
        Ok(self.into_outcome())
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Screened`].
    Screened(Screened),
    /// See [`Degenerate`].
    Degenerate(Degenerate),
    /// See [`MaskExtended`].
    MaskExtended(MaskExtended),
    /// See [`ReliabilityEstimated`].
    ReliabilityEstimated(ReliabilityEstimated),
    /// See [`EdgesBuilt`].
    EdgesBuilt(EdgesBuilt),
    /// See [`EdgesSorted`].
    EdgesSorted(EdgesSorted),
    /// See [`Grouped`].
    Grouped(Grouped),
    /// See [`Finalized`].
    Finalized(Finalized),
}

/// Compile-time guard: adding a [`Stage`] variant makes this match
/// non-exhaustive until it is listed here and [`STAGE_COUNT`] is checked.
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Screened(_)
        | Stage::Degenerate(_)
        | Stage::MaskExtended(_)
        | Stage::ReliabilityEstimated(_)
        | Stage::EdgesBuilt(_)
        | Stage::EdgesSorted(_)
        | Stage::Grouped(_)
        | Stage::Finalized(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the
/// completed final stage returned unchanged.
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this next stage.
    Next(Stage),
    /// The pipeline was already at a final stage; returned unchanged.
    Complete(Stage),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Screened(s) => s.$method($($arg),*),
            Self::Degenerate(s) => s.$method($($arg),*),
            Self::MaskExtended(s) => s.$method($($arg),*),
            Self::ReliabilityEstimated(s) => s.$method($($arg),*),
            Self::EdgesBuilt(s) => s.$method($($arg),*),
            Self::EdgesSorted(s) => s.$method($($arg),*),
            Self::Grouped(s) => s.$method($($arg),*),
            Self::Finalized(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Human-readable name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Stage-specific metrics; `None` for `Pending`.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at a final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Finalized(_) | Self::Degenerate(_))
    }

    /// Advance to the next stage.
    ///
    /// Returns `Ok(None)` if already complete (the final value is
    /// consumed).
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError`] if a fallible stage transition fails.
    pub fn next(self) -> Result<Option<Self>, UnwrapError> {
        delegate!(self, next)
    }

    /// Advance to the next stage, returning `self` unchanged if already
    /// complete.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError`] if a fallible stage transition fails.
    pub fn advance(self) -> Result<Advance, UnwrapError> {
        if self.is_complete() {
            return Ok(Advance::Complete(self));
        }
        // Non-complete stages always return Ok(Some(_)) from next().
        #[allow(clippy::unreachable)]
        let next = self
            .next()?
            .unwrap_or_else(|| unreachable!("non-complete stage returned None from next()"));
        Ok(Advance::Next(next))
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError`] if any remaining fallible stage fails.
    pub fn complete(self) -> Result<UnwrapOutcome, UnwrapError> {
        delegate!(self, complete)
    }
}

// The macro needs `.name()` and `.index()` on `&self`; associated consts
// are not reachable as `self.NAME`.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

impl From<Pending> for Stage {
    fn from(s: Pending) -> Self {
        Self::Pending(s)
    }
}

impl From<Screening> for Stage {
    fn from(s: Screening) -> Self {
        match s {
            Screening::Ready(s) => Self::Screened(s),
            Screening::Degenerate(d) => Self::Degenerate(d),
        }
    }
}

impl From<Screened> for Stage {
    fn from(s: Screened) -> Self {
        Self::Screened(s)
    }
}

impl From<Degenerate> for Stage {
    fn from(s: Degenerate) -> Self {
        Self::Degenerate(s)
    }
}

impl From<MaskExtended> for Stage {
    fn from(s: MaskExtended) -> Self {
        Self::MaskExtended(s)
    }
}

impl From<ReliabilityEstimated> for Stage {
    fn from(s: ReliabilityEstimated) -> Self {
        Self::ReliabilityEstimated(s)
    }
}

impl From<EdgesBuilt> for Stage {
    fn from(s: EdgesBuilt) -> Self {
        Self::EdgesBuilt(s)
    }
}

impl From<EdgesSorted> for Stage {
    fn from(s: EdgesSorted) -> Self {
        Self::EdgesSorted(s)
    }
}

impl From<Grouped> for Stage {
    fn from(s: Grouped) -> Self {
        Self::Grouped(s)
    }
}

impl From<Finalized> for Stage {
    fn from(s: Finalized) -> Self {
        Self::Finalized(s)
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental unwrap pipeline.
///
/// Created via [`Pipeline::new`], which validates and stores the inputs
/// without doing any processing. Each stage method consumes the current
/// state and returns the next, making it a compile-time error to skip
/// stages or call them out of order.
pub struct Pipeline;

impl Pipeline {
    /// Validate inputs and create a pipeline. A missing mask means every
    /// pixel is valid.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError::MaskDimensionMismatch`] if the mask does not
    /// match the image, [`UnwrapError::InvalidConfig`] for a bad period,
    /// and [`UnwrapError::Allocation`] if the default mask cannot be
    /// reserved.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        image: PhaseMap,
        mask: Option<Mask>,
        config: UnwrapConfig,
    ) -> Result<Pending, UnwrapError> {
        let dimensions = image.dimensions();
        Pending::check(dimensions, mask.as_ref().map(Mask::dimensions), &config)?;
        let mask = match mask {
            Some(mask) => mask,
            None => Mask::all_valid(dimensions)?,
        };
        Ok(Pending {
            config,
            image,
            mask,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::f64::consts::TAU;

    use super::*;
    use crate::phase::rewrap;
    use crate::types::Connectivity;

    fn surface(width: usize, height: usize) -> PhaseMap {
        PhaseMap::from_fn(Dimensions::new(width, height), |x, y| {
            rewrap(0.7 * x as f64 - 0.45 * y as f64, TAU)
        })
        .unwrap()
    }

    fn pending(width: usize, height: usize) -> Pending {
        Pipeline::new(surface(width, height), None, UnwrapConfig::default()).unwrap()
    }

    fn screened(width: usize, height: usize) -> Screened {
        match pending(width, height).screen() {
            Screening::Ready(s) => s,
            Screening::Degenerate(_) => unreachable!("full mask is admissible"),
        }
    }

    // ─────────── Typed API tests ─────────────────────────────────

    #[test]
    fn pending_exposes_inputs() {
        let p = pending(5, 4);
        assert_eq!(p.image().dimensions(), Dimensions::new(5, 4));
        assert_eq!(p.mask().valid_count(), 20);
        assert!((p.config().period - TAU).abs() < f64::EPSILON);
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let mask = Mask::all_valid(Dimensions::new(4, 4)).unwrap();
        let result = Pipeline::new(surface(5, 4), Some(mask), UnwrapConfig::default());
        assert!(matches!(
            result,
            Err(UnwrapError::MaskDimensionMismatch { .. })
        ));
    }

    #[test]
    fn invalid_period_is_rejected() {
        let config = UnwrapConfig {
            period: 0.0,
            ..UnwrapConfig::default()
        };
        let result = Pipeline::new(surface(3, 3), None, config);
        assert!(matches!(result, Err(UnwrapError::InvalidConfig(_))));
    }

    #[test]
    fn degenerate_mask_returns_input() {
        let image = surface(4, 4);
        let mask = Mask::from_fn(image.dimensions(), |x, y| x == 0 && y == 0).unwrap();
        let screening = Pipeline::new(image.clone(), Some(mask), UnwrapConfig::default())
            .unwrap()
            .screen();
        assert_eq!(screening.valid_pixels(), 1);
        let Screening::Degenerate(degenerate) = screening else {
            unreachable!("isolated pixel has no admissible pair");
        };
        assert_eq!(degenerate.image(), &image);
        let outcome = degenerate.into_outcome();
        assert!(!outcome.unwrapped);
        assert_eq!(outcome.image, image);
    }

    #[test]
    fn extended_mask_is_interior() {
        let extended = screened(6, 5).extend_mask().unwrap();
        assert_eq!(extended.extended().valid_count(), 4 * 3);
    }

    #[test]
    fn wrap_connectivity_flows_to_metrics() {
        let config = UnwrapConfig {
            connectivity: Connectivity::BOTH,
            ..UnwrapConfig::default()
        };
        let Screening::Ready(s) = Pipeline::new(surface(4, 4), None, config).unwrap().screen()
        else {
            unreachable!("full mask is admissible");
        };
        let extended = s.extend_mask().unwrap();
        assert_eq!(
            extended.metrics(),
            Some(StageMetrics::ExtendMask {
                valid_pixels: 16,
                extended_pixels: 16,
                x_wrap: true,
                y_wrap: true,
            })
        );
    }

    #[test]
    fn sorted_edges_are_ascending() {
        let sorted = screened(9, 7)
            .extend_mask()
            .unwrap()
            .estimate_reliability()
            .unwrap()
            .build_edges()
            .unwrap()
            .sort_edges();
        assert_eq!(sorted.edges().len(), 8 * 7 + 9 * 6);
        assert!(sorted
            .edges()
            .windows(2)
            .all(|w| w[0].combined_reliability <= w[1].combined_reliability));
    }

    #[test]
    fn grouped_exposes_single_group() {
        let grouped = screened(6, 6)
            .extend_mask()
            .unwrap()
            .estimate_reliability()
            .unwrap()
            .build_edges()
            .unwrap()
            .sort_edges()
            .gather();
        assert_eq!(grouped.pixels().group_count(), 1);
        assert_eq!(grouped.stats().accepted_edges, 35);
        let head = grouped.pixels().heads().next().unwrap();
        assert_eq!(grouped.pixels().group_size(head), Some(36));
    }

    #[test]
    fn finalized_exposes_image_and_stats() {
        let image = surface(5, 5);
        let mask = Mask::from_fn(image.dimensions(), |x, _| x < 4).unwrap();
        let Screening::Ready(s) = Pipeline::new(image, Some(mask), UnwrapConfig::default())
            .unwrap()
            .screen()
        else {
            unreachable!("mask has adjacent valid pixels");
        };
        let finalized = s
            .extend_mask()
            .unwrap()
            .estimate_reliability()
            .unwrap()
            .build_edges()
            .unwrap()
            .sort_edges()
            .gather()
            .finalize()
            .unwrap();
        assert_eq!(finalized.stats().filled_pixels, 5);
        assert_eq!(finalized.image().dimensions(), Dimensions::new(5, 5));
        let fill = finalized.stats().fill_value.unwrap();
        let outcome = finalized.into_outcome();
        assert!(outcome.unwrapped);
        assert!((outcome.image.get(4, 2).unwrap() - fill).abs() < f64::EPSILON);
    }

    // ─────────── Dynamic API tests ───────────────────────────────

    #[test]
    fn stage_loop_visits_every_index() {
        let mut stage: Stage = pending(6, 6).into();
        let mut indices = vec![stage.index()];
        let mut names = vec![stage.name()];
        loop {
            match stage.advance().unwrap() {
                Advance::Next(next) => {
                    indices.push(next.index());
                    names.push(next.name());
                    assert!(next.metrics().is_some());
                    stage = next;
                }
                Advance::Complete(done) => {
                    stage = done;
                    break;
                }
            }
        }
        assert_eq!(indices, (0..STAGE_COUNT).collect::<Vec<_>>());
        assert_eq!(names.first(), Some(&"input"));
        assert_eq!(names.last(), Some(&"finalize"));
        assert!(matches!(stage.output(), StageOutput::Finalized { .. }));
        assert!(stage.complete().unwrap().unwrapped);
    }

    #[test]
    fn stage_loop_stops_at_degenerate() {
        let image = surface(3, 3);
        let mask = Mask::from_fn(image.dimensions(), |x, y| (x + y) % 2 == 0).unwrap();
        let stage: Stage = Pipeline::new(image, Some(mask), UnwrapConfig::default())
            .unwrap()
            .into();
        let Advance::Next(screened) = stage.advance().unwrap() else {
            unreachable!("pending is never complete");
        };
        assert_eq!(screened.name(), "degenerate");
        assert!(screened.is_complete());
        assert!(matches!(screened.advance().unwrap(), Advance::Complete(_)));
    }

    #[test]
    fn pending_has_no_metrics() {
        let stage: Stage = pending(3, 3).into();
        assert!(stage.metrics().is_none());
        assert!(matches!(stage.output(), StageOutput::Input { .. }));
    }

    #[test]
    fn typed_and_dynamic_agree() {
        let typed = pending(7, 5).complete().unwrap();
        let dynamic = Stage::from(pending(7, 5)).complete().unwrap();
        assert_eq!(typed, dynamic);
    }
}
