//! Principal-range arithmetic on phase values.

/// Fold a phase difference back into the principal range by adding or
/// subtracting at most one period.
///
/// Differences of two wrapped samples are at most one period away from
/// the principal range, so a single correction suffices there. Larger
/// inputs are only partially folded.
#[inline]
#[must_use]
pub fn wrap(value: f64, period: f64) -> f64 {
    let half = period / 2.0;
    if value > half {
        value - period
    } else if value < -half {
        value + period
    } else {
        value
    }
}

/// Number of periods (`-1`, `0` or `+1`) separating two neighbouring
/// wrapped samples.
///
/// Returns `-1` when `a - b` exceeds half a period, `+1` when it is below
/// minus half a period, else `0`. Moving from `a` to `b`, the unwrapped
/// value of `b` is `b - jump * period` relative to `a`.
#[inline]
#[must_use]
pub fn required_jump(a: f64, b: f64, period: f64) -> i8 {
    let half = period / 2.0;
    let difference = a - b;
    if difference > half {
        -1
    } else if difference < -half {
        1
    } else {
        0
    }
}

/// Fully fold any finite value into `[-period/2, period/2]`.
///
/// Used to synthesise wrapped inputs from continuous surfaces.
#[must_use]
pub fn rewrap(value: f64, period: f64) -> f64 {
    value - period * (value / period).round()
}

#[cfg(test)]
mod tests {
    use std::f64::consts::{PI, TAU};

    use super::*;

    #[test]
    fn wrap_passes_principal_values_through() {
        assert!((wrap(0.5, TAU) - 0.5).abs() < 1e-12);
        assert!((wrap(PI, TAU) - PI).abs() < 1e-12);
        assert!((wrap(-PI, TAU) + PI).abs() < 1e-12);
    }

    #[test]
    fn wrap_folds_one_period() {
        assert!((wrap(PI + 0.25, TAU) - (0.25 - PI)).abs() < 1e-12);
        assert!((wrap(-PI - 0.25, TAU) - (PI - 0.25)).abs() < 1e-12);
    }

    #[test]
    fn wrap_respects_custom_period() {
        assert!((wrap(200.0, 360.0) + 160.0).abs() < 1e-12);
        assert!((wrap(-190.0, 360.0) - 170.0).abs() < 1e-12);
    }

    #[test]
    fn jump_sign_convention() {
        // a far above b: b sits one period too low.
        assert_eq!(required_jump(3.0, -3.0, TAU), -1);
        // a far below b: b sits one period too high.
        assert_eq!(required_jump(-3.0, 3.0, TAU), 1);
        assert_eq!(required_jump(1.0, -1.0, TAU), 0);
    }

    #[test]
    fn jump_reconstructs_neighbor() {
        let a = 3.0;
        let b = 3.5 - TAU;
        let jump = required_jump(a, b, TAU);
        let unwrapped_b = f64::from(jump).mul_add(-TAU, b);
        assert!((unwrapped_b - 3.5).abs() < 1e-12);
    }

    #[test]
    fn jump_of_nan_is_zero() {
        assert_eq!(required_jump(f64::NAN, 1.0, TAU), 0);
    }

    #[test]
    fn rewrap_lands_in_principal_range() {
        for k in -20..=20 {
            let v = f64::from(k).mul_add(0.7, 0.1);
            let w = rewrap(v, TAU);
            assert!((-PI..=PI).contains(&w), "{v} -> {w}");
            let turns = (v - w) / TAU;
            assert!((turns - turns.round()).abs() < 1e-9);
        }
    }
}
