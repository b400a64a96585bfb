//! Sample statistics and the interval comparator.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Two-tailed 95% critical values of Student's t, indexed by degrees of
/// freedom 1..=100.
const T_TABLE: [f64; 100] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, // 1-10
    2.201, 2.179, 2.160, 2.145, 2.131, 2.120, 2.110, 2.101, 2.093, 2.086, // 11-20
    2.080, 2.074, 2.069, 2.064, 2.060, 2.056, 2.052, 2.048, 2.045, 2.042, // 21-30
    2.040, 2.037, 2.035, 2.032, 2.030, 2.028, 2.026, 2.024, 2.023, 2.021, // 31-40
    2.020, 2.018, 2.017, 2.015, 2.014, 2.013, 2.012, 2.011, 2.010, 2.009, // 41-50
    2.008, 2.007, 2.006, 2.005, 2.004, 2.003, 2.002, 2.002, 2.001, 2.000, // 51-60
    2.000, 1.999, 1.998, 1.998, 1.997, 1.997, 1.996, 1.995, 1.995, 1.994, // 61-70
    1.994, 1.993, 1.993, 1.993, 1.992, 1.992, 1.991, 1.991, 1.990, 1.990, // 71-80
    1.990, 1.989, 1.989, 1.989, 1.988, 1.988, 1.988, 1.987, 1.987, 1.987, // 81-90
    1.986, 1.986, 1.986, 1.986, 1.985, 1.985, 1.985, 1.984, 1.984, 1.984, // 91-100
];

/// Critical value used for degrees of freedom outside the table.
pub const T_INFINITY: f64 = 1.960;

/// Critical value for `df` degrees of freedom.
pub fn t_critical(df: usize) -> f64 {
    match df {
        1..=100 => T_TABLE[df - 1],
        _ => T_INFINITY,
    }
}

/// Summary of a sample of `hz` values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub size: usize,
    pub mean: f64,
    /// Sample standard deviation.
    pub sd: f64,
    /// Standard error of the mean.
    pub sem: f64,
    /// Margin of error at 95% confidence.
    pub moe: f64,
    /// Relative margin of error, percent of the mean.
    pub rme: f64,
}

impl Statistics {
    pub fn from_sample(sample: &[f64]) -> Self {
        let size = sample.len();
        let n = size as f64;
        let mean = nan_to_zero(sample.iter().sum::<f64>() / n);
        let variance = nan_to_zero(
            sample.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0),
        );
        let sd = nan_to_zero(variance.sqrt());
        let sem = nan_to_zero(sd / n.sqrt());
        let moe = sem * t_critical(size.saturating_sub(1));
        let rme = nan_to_zero(moe / mean * 100.0);

        Self {
            size,
            mean,
            sd,
            sem,
            moe,
            rme,
        }
    }
}

#[inline]
fn nan_to_zero(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x
    }
}

/// Order two estimates by their confidence intervals.
///
/// Overlapping intervals are `Equal`; otherwise the interval with the higher
/// lower bound wins.
pub fn compare_intervals(a_hz: f64, a_moe: f64, b_hz: f64, b_moe: f64) -> Ordering {
    let (a_low, a_high) = (a_hz - a_moe, a_hz + a_moe);
    let (b_low, b_high) = (b_hz - b_moe, b_hz + b_moe);

    if a_low <= b_high && a_high >= b_low {
        Ordering::Equal
    } else if a_low > b_low {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

/// Decision taken after a sampling clone completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Finalize,
    /// Keep sampling, queueing this many extra clones.
    Continue { enqueue: usize },
}

/// Continue while the margin is above 1% and there is budget, a wildly
/// unstable sample, a calibration in progress, or clones already queued.
pub(crate) fn verdict(
    stats: &Statistics,
    elapsed: f64,
    max_elapsed: f64,
    calibrating: bool,
    queued: usize,
) -> Verdict {
    let keep_going =
        elapsed < max_elapsed || stats.rme > 50.0 || calibrating || queued > 0;

    if stats.rme > 1.0 && keep_going {
        let enqueue = match queued {
            0 if stats.rme > 50.0 => stats.size * 3,
            0 => 1,
            _ => 0,
        };
        Verdict::Continue { enqueue }
    } else {
        Verdict::Finalize
    }
}
