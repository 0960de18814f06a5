//! Unwrap diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation for tuning and for
//! studying how noise and masks affect the grouping. Every call to
//! [`unwrap_with_diagnostics`] collects them alongside the outcome.
//!
//! Timestamps come from a caller-supplied [`Clock`]; [`SystemClock`] uses
//! the `web-time` crate, which maps to `performance.now()` on WASM and
//! `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{Pipeline, Screening};
use crate::types::{Mask, PhaseMap, UnwrapConfig, UnwrapError, UnwrapOutcome};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> Self::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single unwrap call.
///
/// Stages after screening are `None` when the mask had no admissible
/// pair and the pipeline stopped early.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnwrapDiagnostics {
    /// Input validation and the admissible-pair pre-check.
    pub screen: StageDiagnostics,
    /// Extended mask derivation.
    pub extend_mask: Option<StageDiagnostics>,
    /// Pixel arena setup and reliability scoring.
    pub reliability: Option<StageDiagnostics>,
    /// Edge construction.
    pub edge_graph: Option<StageDiagnostics>,
    /// Edge sort.
    pub sort: Option<StageDiagnostics>,
    /// Grouping.
    pub gather: Option<StageDiagnostics>,
    /// Increment application and mask fill.
    pub finalize: Option<StageDiagnostics>,
    /// Total wall-clock duration of the call (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary across all stages.
    pub summary: UnwrapSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Pre-check metrics.
    Screen {
        /// Image width in pixels.
        width: usize,
        /// Image height in pixels.
        height: usize,
        /// Pixels valid in the input mask.
        valid_pixels: usize,
        /// Whether at least one admissible adjacent pair exists.
        admissible: bool,
    },
    /// Mask extension metrics.
    ExtendMask {
        /// Pixels valid in the input mask.
        valid_pixels: usize,
        /// Pixels valid in the extended mask.
        extended_pixels: usize,
        /// Horizontal wrap enabled.
        x_wrap: bool,
        /// Vertical wrap enabled.
        y_wrap: bool,
    },
    /// Reliability metrics.
    Reliability {
        /// Pixels with a computed score.
        scored_pixels: usize,
        /// Pixels left at their sentinel.
        sentinel_pixels: usize,
    },
    /// Edge construction metrics.
    EdgeGraph {
        /// Total edges.
        edge_count: usize,
        /// Edges crossing an image border.
        wrap_edge_count: usize,
    },
    /// Sort metrics.
    Sort {
        /// Edges sorted.
        edge_count: usize,
        /// Smallest combined reliability (0 when there are no edges).
        min_reliability: f64,
        /// Largest combined reliability (0 when there are no edges).
        max_reliability: f64,
    },
    /// Grouping metrics.
    Gather {
        /// Edges that joined two groups.
        accepted_edges: usize,
        /// Edges skipped as cycles.
        cycle_edges: usize,
        /// Lone pixels spliced onto a group.
        singleton_joins: usize,
        /// Multi-pixel group merges.
        group_merges: usize,
        /// Head rewrites performed by merges.
        relabelled_pixels: usize,
        /// Groups left, including lone pixels.
        group_count: usize,
    },
    /// Finalization metrics.
    Finalize {
        /// Value written to masked-out pixels.
        fill_value: Option<f64>,
        /// Masked-out pixels filled.
        filled_pixels: usize,
        /// Largest corrected value over valid pixels.
        max_value: Option<f64>,
    },
}

/// High-level summary for the whole call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnwrapSummary {
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
    /// Total pixel count.
    pub pixel_count: usize,
    /// Pixels valid in the input mask.
    pub valid_pixels: usize,
    /// Whether the pipeline ran past the pre-check.
    pub unwrapped: bool,
    /// Groups after grouping, when the pipeline ran.
    pub group_count: Option<usize>,
}

impl UnwrapDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Unwrap Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels, {} valid)",
            self.summary.width,
            self.summary.height,
            self.summary.pixel_count,
            self.summary.valid_pixels,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        let mut stages = vec![("Screen", &self.screen)];
        for (name, stage) in [
            ("Extend Mask", &self.extend_mask),
            ("Reliability", &self.reliability),
            ("Edge Graph", &self.edge_graph),
            ("Sort", &self.sort),
            ("Gather", &self.gather),
            ("Finalize", &self.finalize),
        ] {
            if let Some(diag) = stage {
                stages.push((name, diag));
            }
        }

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        match self.summary.group_count {
            Some(groups) if self.summary.unwrapped => {
                lines.push(format!("Unwrapped: yes  |  Groups: {groups}"));
            }
            _ => lines.push("Unwrapped: no (no admissible pair, input copied)".to_string()),
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Screen {
            width,
            height,
            valid_pixels,
            admissible,
        } => format!("{width}x{height} valid={valid_pixels} admissible={admissible}"),
        StageMetrics::ExtendMask {
            valid_pixels,
            extended_pixels,
            x_wrap,
            y_wrap,
        } => format!("{valid_pixels}->{extended_pixels} px (x_wrap={x_wrap} y_wrap={y_wrap})"),
        StageMetrics::Reliability {
            scored_pixels,
            sentinel_pixels,
        } => format!("scored={scored_pixels} sentinel={sentinel_pixels}"),
        StageMetrics::EdgeGraph {
            edge_count,
            wrap_edge_count,
        } => format!("{edge_count} edges ({wrap_edge_count} wrap)"),
        StageMetrics::Sort {
            edge_count,
            min_reliability,
            max_reliability,
        } => format!("{edge_count} edges, key {min_reliability:.3e}..{max_reliability:.3e}"),
        StageMetrics::Gather {
            accepted_edges,
            cycle_edges,
            singleton_joins,
            group_merges,
            relabelled_pixels,
            group_count,
        } => format!(
            "accepted={accepted_edges} cycles={cycle_edges} joins={singleton_joins} merges={group_merges} relabelled={relabelled_pixels} groups={group_count}",
        ),
        StageMetrics::Finalize {
            fill_value,
            filled_pixels,
            max_value,
        } => format!(
            "fill={} filled={filled_pixels} max={}",
            format_optional(*fill_value),
            format_optional(*max_value),
        ),
    }
}

/// Run the unwrap pipeline, timing every stage with `clock`.
///
/// Produces the same outcome as [`crate::unwrap`].
///
/// # Errors
///
/// Same as [`crate::unwrap`].
pub fn unwrap_with_diagnostics<C: Clock>(
    image: &PhaseMap,
    mask: Option<&Mask>,
    config: &UnwrapConfig,
    clock: &C,
) -> Result<(UnwrapOutcome, UnwrapDiagnostics), UnwrapError> {
    let total_start = clock.now();

    let start = clock.now();
    let screening = Pipeline::new(image.clone(), mask.cloned(), config.clone())?.screen();
    let screen = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: screening.stage_metrics(),
    };

    let dimensions = image.dimensions();
    let mut summary = UnwrapSummary {
        width: dimensions.width,
        height: dimensions.height,
        pixel_count: dimensions.len(),
        valid_pixels: screening.valid_pixels(),
        unwrapped: false,
        group_count: None,
    };

    let screened = match screening {
        Screening::Ready(screened) => screened,
        Screening::Degenerate(degenerate) => {
            let outcome = degenerate.into_outcome();
            let diagnostics = UnwrapDiagnostics {
                screen,
                extend_mask: None,
                reliability: None,
                edge_graph: None,
                sort: None,
                gather: None,
                finalize: None,
                total_duration: clock.elapsed(&total_start),
                summary,
            };
            return Ok((outcome, diagnostics));
        }
    };

    let start = clock.now();
    let extended = screened.extend_mask()?;
    let extend_mask = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: extended.stage_metrics(),
    };

    let start = clock.now();
    let estimated = extended.estimate_reliability()?;
    let reliability = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: estimated.stage_metrics(),
    };

    let start = clock.now();
    let built = estimated.build_edges()?;
    let edge_graph = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: built.stage_metrics(),
    };

    let start = clock.now();
    let sorted = built.sort_edges();
    let sort = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: sorted.stage_metrics(),
    };

    let start = clock.now();
    let grouped = sorted.gather();
    let gather = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: grouped.stage_metrics(),
    };
    summary.group_count = Some(grouped.pixels().group_count());

    let start = clock.now();
    let finalized = grouped.finalize()?;
    let finalize = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: finalized.stage_metrics(),
    };

    let outcome = finalized.into_outcome();
    summary.unwrapped = outcome.unwrapped;

    let diagnostics = UnwrapDiagnostics {
        screen,
        extend_mask: Some(extend_mask),
        reliability: Some(reliability),
        edge_graph: Some(edge_graph),
        sort: Some(sort),
        gather: Some(gather),
        finalize: Some(finalize),
        total_duration: clock.elapsed(&total_start),
        summary,
    };
    Ok((outcome, diagnostics))
}
