//! Benchmark result types.

use crate::benchmark::Benchmark;
use crate::error::Result;
use crate::stats::compare_intervals;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

/// Result of a single benchmark measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchResult {
    /// Full name including suite: "suite/benchmark"
    pub name: String,
    /// Operations per second
    pub hz: f64,
    /// Margin of error at 95% confidence, in ops/sec
    pub moe: f64,
    /// Relative margin of error, percent
    pub rme: f64,
    pub sd: f64,
    pub sem: f64,
    /// Calls per cycle of the last cycle
    pub count: u64,
    /// Cycles measured
    pub cycles: u64,
    /// Completed samples
    pub sample_size: usize,
    /// Seconds per operation
    pub period: f64,
    /// Wall time of the run, seconds
    pub elapsed: f64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unclockable: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub aborted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Custom tags
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

impl BenchResult {
    /// Snapshot a finished benchmark under `name`.
    pub fn from_benchmark(name: impl Into<String>, bench: &Benchmark) -> Self {
        let stats = bench.stats();
        Self {
            name: name.into(),
            hz: bench.hz(),
            moe: stats.moe,
            rme: stats.rme,
            sd: stats.sd,
            sem: stats.sem,
            count: bench.count(),
            cycles: bench.cycles(),
            sample_size: stats.size,
            period: bench.times().period,
            elapsed: bench.times().elapsed,
            unclockable: bench.is_unclockable(),
            aborted: bench.is_aborted(),
            error: bench.error().map(|e| e.to_string()),
            tags: HashMap::new(),
        }
    }

    /// A result with usable statistics.
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && !self.aborted
    }

    fn is_comparable(&self) -> bool {
        self.is_ok() && !self.unclockable
    }

    /// Time per operation.
    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f64(self.period).unwrap_or_default()
    }

    /// Order by confidence interval; overlapping intervals are `Equal`.
    pub fn order(&self, other: &BenchResult) -> Ordering {
        compare_intervals(self.hz, self.moe, other.hz, other.moe)
    }

    /// Compare against a baseline result.
    ///
    /// Returns the slowdown ratio: `baseline.hz / self.hz`.
    /// - `< 1.0` means faster (improvement)
    /// - `> 1.0` means slower (regression)
    pub fn compare(&self, baseline: &BenchResult) -> f64 {
        baseline.hz / self.hz
    }

    /// Check if this result is a regression against baseline.
    ///
    /// A result is a regression if it's more than `threshold` slower and
    /// the confidence intervals do not overlap.
    pub fn is_regression(&self, baseline: &BenchResult, threshold: f64) -> bool {
        self.compare(baseline) > 1.0 + threshold && self.order(baseline) == Ordering::Less
    }
}

/// Results for an entire benchmark suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    /// Suite name
    pub suite: String,
    /// Individual benchmark results
    pub results: Vec<BenchResult>,
    /// Total suite duration
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Timestamp when suite started
    pub started_at: String,
    /// Git commit hash (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_sha: Option<String>,
    /// Custom metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl SuiteResult {
    /// Load a suite result from JSON file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write this suite as pretty JSON.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Compare this suite against a baseline.
    ///
    /// Returns a map of benchmark name to slowdown ratio.
    pub fn compare(&self, baseline: &SuiteResult) -> HashMap<String, f64> {
        let baseline_map: HashMap<_, _> = baseline.results.iter().map(|r| (&r.name, r)).collect();

        self.results
            .iter()
            .filter_map(|r| {
                baseline_map
                    .get(&r.name)
                    .map(|b| (r.name.clone(), r.compare(b)))
            })
            .collect()
    }

    /// Find regressions compared to baseline.
    ///
    /// Failed, aborted or unclockable results on either side are skipped.
    pub fn find_regressions(
        &self,
        baseline: &SuiteResult,
        threshold: f64,
    ) -> Vec<(&BenchResult, f64)> {
        let baseline_map: HashMap<_, _> = baseline.results.iter().map(|r| (&r.name, r)).collect();

        self.results
            .iter()
            .filter(|r| r.is_comparable())
            .filter_map(|r| {
                baseline_map.get(&r.name).and_then(|b| {
                    (b.is_comparable() && r.is_regression(b, threshold)).then(|| (r, r.compare(b)))
                })
            })
            .collect()
    }

    /// Results that ended in an error.
    pub fn failures(&self) -> impl Iterator<Item = &BenchResult> {
        self.results.iter().filter(|r| r.error.is_some())
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_nanos().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u128::deserialize(d)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}
