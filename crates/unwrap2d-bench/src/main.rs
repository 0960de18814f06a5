//! unwrap2d-bench: CLI tool for measuring unwrap accuracy and per-stage
//! timings on synthetic phase surfaces.
//!
//! Builds a quadratic "disk" phase surface, wraps it, and unwraps it with
//! configurable connectivity, printing detailed per-stage diagnostics.
//! Useful for:
//!
//! - Checking that a noiseless surface is recovered exactly
//! - Seeing how residual error grows with phase noise
//! - Measuring per-stage durations to identify bottlenecks
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin unwrap2d-bench -- [OPTIONS]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::f64::consts::TAU;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use unwrap2d_pipeline::diagnostics::{Clock, UnwrapDiagnostics};
use unwrap2d_pipeline::{Connectivity, Dimensions, Mask, PhaseMap, UnwrapConfig, UnwrapError};

/// Accuracy and timing harness for unwrap2d.
///
/// Unwraps a wrapped quadratic disk surface, first noiseless with a mask,
/// then across a sweep of noise amplitudes without one.
#[derive(Parser)]
#[command(name = "unwrap2d-bench", version)]
struct Cli {
    /// Side length of the square test surface in pixels.
    #[arg(long, default_value_t = 64, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(4..))]
    size: usize,

    /// Number of phase periods between the disk centre and its rim.
    #[arg(long, default_value_t = 6.0)]
    cycles: f64,

    /// Trials per noise amplitude in the sweep.
    #[arg(long, default_value_t = 100, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    iters: usize,

    /// Treat the left and right edges as adjacent.
    #[arg(long)]
    x_wrap: bool,

    /// Treat the top and bottom edges as adjacent.
    #[arg(long)]
    y_wrap: bool,

    /// Seed for reliability tiebreaks.
    #[arg(long, default_value_t = UnwrapConfig::DEFAULT_SEED)]
    seed: u64,

    /// Seed for the noise generator.
    #[arg(long, default_value_t = 0)]
    noise_seed: u64,

    /// Length of one phase period.
    #[arg(long, default_value_t = UnwrapConfig::DEFAULT_PERIOD)]
    period: f64,

    /// Number of noiseless runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full unwrap config as a JSON string.
    ///
    /// When provided, `--x-wrap`, `--y-wrap`, `--seed` and `--period` are
    /// ignored. The JSON must be a valid `UnwrapConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Write the noiseless unwrap as an 8-bit PNG preview.
    #[arg(long)]
    png: Option<PathBuf>,

    /// Skip the noise sweep.
    #[arg(long)]
    no_sweep: bool,
}

/// Build an [`UnwrapConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<UnwrapConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        UnwrapConfig {
            connectivity: Connectivity {
                x_wrap: cli.x_wrap,
                y_wrap: cli.y_wrap,
            },
            period: cli.period,
            seed: cli.seed,
        }
    };
    config
        .validate()
        .map_err(|e| format!("Invalid config: {e}"))?;
    Ok(config)
}

/// A synthetic surface with its wrapped rendition and the disk mask.
struct Surface {
    truth: PhaseMap,
    wrapped: PhaseMap,
    mask: Mask,
}

/// Quadratic bowl `r² · cycles · period / R²` with `R = size/2 - 1`,
/// centred between the middle pixels and masked to `r < R`.
fn disk_surface(size: usize, cycles: f64, period: f64) -> Result<Surface, UnwrapError> {
    let dimensions = Dimensions::new(size, size);
    #[allow(clippy::cast_precision_loss)]
    let (center, radius) = ((size as f64 - 1.0) / 2.0, (size / 2) as f64 - 1.0);
    #[allow(clippy::cast_precision_loss)]
    let r2 = move |x: usize, y: usize| (x as f64 - center).powi(2) + (y as f64 - center).powi(2);

    let truth = PhaseMap::from_fn(dimensions, |x, y| {
        r2(x, y) * cycles * period / (radius * radius)
    })?;
    let wrapped = PhaseMap::from_fn(dimensions, |x, y| {
        truth
            .get(x, y)
            .map_or(0.0, |v| unwrap2d_pipeline::phase::rewrap(v, period))
    })?;
    let mask = Mask::from_fn(dimensions, |x, y| r2(x, y) < radius * radius)?;
    Ok(Surface {
        truth,
        wrapped,
        mask,
    })
}

/// Population variance of `a - b` over the valid pixels of `mask`.
#[allow(clippy::cast_precision_loss)]
fn masked_variance(a: &PhaseMap, b: &PhaseMap, mask: &Mask) -> f64 {
    let diffs: Vec<f64> = a
        .values()
        .iter()
        .zip(b.values())
        .enumerate()
        .filter(|&(i, _)| mask.is_valid(i))
        .map(|(_, (x, y))| x - y)
        .collect();
    population_variance(&diffs)
}

#[allow(clippy::cast_precision_loss)]
fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// 16 amplitudes log-spaced over `[1e-3, 4]`, then 100.
fn noise_amplitudes() -> Vec<f64> {
    let (lo, hi) = (1e-3_f64.log10(), 4.0_f64.log10());
    (0..16)
        .map(|i| 10f64.powf(lo + (hi - lo) * f64::from(i) / 15.0))
        .chain(std::iter::once(100.0))
        .collect()
}

/// Residual statistics for one noise amplitude.
struct SweepRow {
    amplitude: f64,
    mean: f64,
    std: f64,
}

/// Add Gaussian noise with one random global phase to the wrapped
/// surface, zero it outside the disk and unwrap without a mask.
fn run_sweep(
    surface: &Surface,
    config: &UnwrapConfig,
    iters: usize,
    rng: &mut StdRng,
) -> Result<Vec<SweepRow>, String> {
    let to_radians = TAU / config.period;
    let dimensions = surface.wrapped.dimensions();
    let mut rows = Vec::new();

    for amplitude in noise_amplitudes() {
        let normal =
            Normal::new(0.0, amplitude).map_err(|e| format!("Bad noise amplitude: {e}"))?;
        let mut residuals = Vec::with_capacity(iters);

        for _ in 0..iters {
            let global = rng.random_range(0.0..TAU);
            let (sin_g, cos_g) = global.sin_cos();
            let noisy: Vec<f64> = surface
                .wrapped
                .values()
                .iter()
                .enumerate()
                .map(|(i, &phase)| {
                    if !surface.mask.is_valid(i) {
                        return 0.0;
                    }
                    let n = rng.sample(normal);
                    let (sin_p, cos_p) = (phase * to_radians).sin_cos();
                    n.mul_add(sin_g, sin_p).atan2(n.mul_add(cos_g, cos_p)) / to_radians
                })
                .collect();
            let noisy = PhaseMap::new(dimensions, noisy).map_err(|e| e.to_string())?;
            let outcome = unwrap2d_pipeline::unwrap(&noisy, None, config)
                .map_err(|e| format!("Pipeline error: {e}"))?;
            residuals.push(masked_variance(
                &surface.truth,
                &outcome.image,
                &surface.mask,
            ));
        }

        #[allow(clippy::cast_precision_loss)]
        let mean = residuals.iter().sum::<f64>() / residuals.len() as f64;
        let std = population_variance(&residuals).sqrt();
        log::debug!("noise {amplitude:.4}: {iters} trials, mean residual {mean:.3e}");
        rows.push(SweepRow {
            amplitude,
            mean,
            std,
        });
    }
    Ok(rows)
}

fn print_sweep(rows: &[SweepRow], truth_variance: f64, json: bool) -> Result<(), String> {
    if json {
        let rows: Vec<_> = rows
            .iter()
            .map(|r| serde_json::json!({ "amplitude": r.amplitude, "mean": r.mean, "std": r.std }))
            .collect();
        let doc = serde_json::json!({ "noise_sweep": rows, "truth_variance": truth_variance });
        let text = serde_json::to_string_pretty(&doc)
            .map_err(|e| format!("Error serializing sweep: {e}"))?;
        println!("{text}");
        return Ok(());
    }

    println!();
    println!("<< WITH NOISE, UNIFORM PHASE, GAUSSIAN AMPLITUDE");
    println!("{:>8} {:>22} {:>12}", "noise", "unwrapped-start", "actual var");
    for row in rows {
        println!(
            "{:>8.3} {:>11.2e} +/- {:<7.2e} {:>12.2}",
            row.amplitude, row.mean, row.std, truth_variance
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _logger = match flexi_logger::Logger::try_with_env_or_str("info")
        .and_then(|logger| logger.log_to_stderr().start())
    {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error starting logger: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let surface = match disk_surface(cli.size, cli.cycles, config.period) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error building surface: {e}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Surface: {0}x{0} disk, {1} cycles ({2} masked pixels)",
        cli.size,
        cli.cycles,
        surface.mask.valid_count(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match unwrap2d_pipeline::unwrap_with_diagnostics(
            &surface.wrapped,
            Some(&surface.mask),
            &config,
            &StdClock,
        ) {
            Ok((outcome, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Accuracy and preview on the first run only.
                if run == 0 {
                    if !cli.json {
                        println!("<< NOISELESS");
                        println!(
                            "Wrapped-start difference: {:9.3e}",
                            masked_variance(&surface.truth, &surface.wrapped, &surface.mask),
                        );
                        println!(
                            "Unwrapped-start difference: {:9.3e}",
                            masked_variance(&surface.truth, &outcome.image, &surface.mask),
                        );
                    }
                    if let Some(ref png_path) = cli.png {
                        write_png(&outcome.image, png_path);
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    if !cli.no_sweep {
        let mut rng = StdRng::seed_from_u64(cli.noise_seed);
        let truth_variance = population_variance(
            &surface
                .truth
                .values()
                .iter()
                .enumerate()
                .filter(|&(i, _)| surface.mask.is_valid(i))
                .map(|(_, &v)| v)
                .collect::<Vec<_>>(),
        );
        let result = run_sweep(&surface, &config, cli.iters, &mut rng)
            .and_then(|rows| print_sweep(&rows, truth_variance, cli.json));
        if let Err(msg) = result {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

/// Render `image` and write it to `path`, reporting the outcome on stderr.
fn write_png(image: &PhaseMap, path: &std::path::Path) {
    let preview = match unwrap2d_pipeline::render::to_gray_image(image) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error rendering preview: {e}");
            return;
        }
    };
    match preview.save(path) {
        Ok(()) => eprintln!("PNG written to {}", path.display()),
        Err(e) => eprintln!("Error writing PNG to {}: {e}", path.display()),
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&UnwrapDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[UnwrapDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Screen", |d| Some(d.screen.duration)),
        ("Extend Mask", |d| d.extend_mask.as_ref().map(|s| s.duration)),
        ("Reliability", |d| d.reliability.as_ref().map(|s| s.duration)),
        ("Edge Graph", |d| d.edge_graph.as_ref().map(|s| s.duration)),
        ("Sort", |d| d.sort.as_ref().map(|s| s.duration)),
        ("Gather", |d| d.gather.as_ref().map(|s| s.duration)),
        ("Finalize", |d| d.finalize.as_ref().map(|s| s.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn amplitudes_span_sweep_range() {
        let amps = noise_amplitudes();
        assert_eq!(amps.len(), 17);
        assert!((amps[0] - 1e-3).abs() < 1e-12);
        assert!((amps[15] - 4.0).abs() < 1e-9);
        assert!((amps[16] - 100.0).abs() < f64::EPSILON);
        assert!(amps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn noiseless_disk_has_zero_residual() {
        let surface = disk_surface(32, 3.0, TAU).unwrap();
        let outcome = unwrap2d_pipeline::unwrap(
            &surface.wrapped,
            Some(&surface.mask),
            &UnwrapConfig::default(),
        )
        .unwrap();
        assert!(masked_variance(&surface.truth, &outcome.image, &surface.mask) < 1e-18);
        assert!(masked_variance(&surface.truth, &surface.wrapped, &surface.mask) > 1.0);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "unwrap2d-bench",
            "--x-wrap",
            "--config-json",
            r#"{"period": 360.0}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert!((config.period - 360.0).abs() < f64::EPSILON);
        assert!(!config.connectivity.x_wrap);
    }

    #[test]
    fn bad_period_is_rejected() {
        let cli = Cli::parse_from(["unwrap2d-bench", "--period=-1"]);
        assert!(config_from_cli(&cli).is_err());
    }
}
