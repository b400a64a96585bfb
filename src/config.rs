//! Configuration for benchmarks and the suite runner.

use std::path::PathBuf;
use std::time::Duration;

/// Per-benchmark options.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchOptions {
    /// Calls per cycle for the first cycle of a run.
    pub init_run_count: u64,
    /// Pause between steps in async mode.
    pub cycle_delay: Duration,
    /// Sampling budget; exceeded budgets still continue while the margin of
    /// error is above 50%.
    pub max_time_elapsed: Duration,
    /// Run asynchronously when driven by the suite runner.
    pub default_async: bool,
    /// Calibration whose overhead is subtracted from looped cycles.
    pub calibration_index: usize,
    /// Minimum cycle time; derived from the clock resolution when unset.
    pub min_time: Option<Duration>,
    /// Allow straight-line unrolled execution of the payload.
    pub unroll: bool,
    /// Largest unrolled plan, in payload calls, before switching to a
    /// hybrid loop.
    pub unroll_limit: u64,
    /// Upper bound on completed sampling clones.
    pub max_sample_size: usize,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            init_run_count: 5,
            cycle_delay: Duration::from_millis(200),
            max_time_elapsed: Duration::from_secs(8),
            default_async: false,
            calibration_index: 0,
            min_time: None,
            unroll: true,
            unroll_limit: 2048,
            max_sample_size: 5000,
        }
    }
}

impl BenchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from environment variables.
    ///
    /// Supported variables:
    /// - `BENCH_INIT_COUNT`: calls in the first cycle (default: 5)
    /// - `BENCH_CYCLE_DELAY_MS`: async step delay (default: 200)
    /// - `BENCH_MAX_TIME_SECS`: sampling budget, fractional (default: 8)
    /// - `BENCH_ASYNC`: run asynchronously (default: false)
    /// - `BENCH_CALIBRATION_INDEX`: calibration to subtract (default: 0)
    /// - `BENCH_MIN_TIME_SECS`: minimum cycle time, fractional
    /// - `BENCH_UNROLL`: allow unrolled execution (default: true)
    pub fn from_env() -> Self {
        let mut opts = Self::default();

        if let Some(n) = env_parse::<u64>("BENCH_INIT_COUNT") {
            if n > 0 {
                opts.init_run_count = n;
            }
        }
        if let Some(ms) = env_parse::<u64>("BENCH_CYCLE_DELAY_MS") {
            opts.cycle_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<f64>("BENCH_MAX_TIME_SECS") {
            if let Ok(d) = Duration::try_from_secs_f64(secs) {
                opts.max_time_elapsed = d;
            }
        }
        if let Ok(v) = std::env::var("BENCH_ASYNC") {
            opts.default_async = env_flag(&v);
        }
        if let Some(i) = env_parse("BENCH_CALIBRATION_INDEX") {
            opts.calibration_index = i;
        }
        if let Some(secs) = env_parse::<f64>("BENCH_MIN_TIME_SECS") {
            opts.min_time = Duration::try_from_secs_f64(secs).ok();
        }
        if let Ok(v) = std::env::var("BENCH_UNROLL") {
            opts.unroll = env_flag(&v);
        }

        opts
    }

    pub fn init_run_count(mut self, n: u64) -> Self {
        self.init_run_count = n.max(1);
        self
    }

    pub fn cycle_delay(mut self, delay: Duration) -> Self {
        self.cycle_delay = delay;
        self
    }

    pub fn max_time(mut self, budget: Duration) -> Self {
        self.max_time_elapsed = budget;
        self
    }

    pub fn default_async(mut self, v: bool) -> Self {
        self.default_async = v;
        self
    }

    pub fn calibration_index(mut self, index: usize) -> Self {
        self.calibration_index = index;
        self
    }

    pub fn min_time(mut self, time: Duration) -> Self {
        self.min_time = Some(time);
        self
    }

    /// Disable unrolling; every cycle goes through the plain counted loop.
    pub fn unroll(mut self, v: bool) -> Self {
        self.unroll = v;
        self
    }

    pub fn unroll_limit(mut self, calls: u64) -> Self {
        self.unroll_limit = calls.max(1);
        self
    }

    pub fn max_sample_size(mut self, n: usize) -> Self {
        self.max_sample_size = n.max(1);
        self
    }
}

/// Configuration for the benchmark runner.
#[derive(Debug, Clone)]
pub struct BenchRunnerConfig {
    /// Output directory for JSON results.
    pub output_dir: PathBuf,
    /// Print results to stdout.
    pub verbose: bool,
    /// Filter benchmarks by name substring.
    pub filter: Option<String>,
    /// Git SHA to include in results (for regression tracking).
    pub git_sha: Option<String>,
    /// Options applied to every benchmark the runner creates.
    pub options: BenchOptions,
}

impl Default for BenchRunnerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("target/bench"),
            verbose: true,
            filter: None,
            git_sha: None,
            options: BenchOptions::default(),
        }
    }
}

impl BenchRunnerConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from environment variables.
    ///
    /// Supported variables, besides those read by [`BenchOptions::from_env`]:
    /// - `BENCH_VERBOSE`: verbose output (default: true)
    /// - `BENCH_OUTPUT_DIR`: output directory
    /// - `BENCH_FILTER`: filter benchmarks by name
    /// - `BENCH_GIT_SHA`: git commit hash
    pub fn from_env() -> Self {
        let mut cfg = Self {
            options: BenchOptions::from_env(),
            ..Self::default()
        };

        if let Ok(v) = std::env::var("BENCH_VERBOSE") {
            cfg.verbose = env_flag(&v);
        }
        if let Ok(v) = std::env::var("BENCH_OUTPUT_DIR") {
            cfg.output_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("BENCH_FILTER") {
            cfg.filter = Some(v);
        }
        if let Ok(v) = std::env::var("BENCH_GIT_SHA") {
            cfg.git_sha = Some(v);
        }

        // Try to detect git SHA if not set
        if cfg.git_sha.is_none() {
            cfg.git_sha = detect_git_sha();
        }

        cfg
    }

    /// Set the output directory.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    /// Set verbose output.
    pub fn verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }

    /// Set filter pattern.
    pub fn filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    /// Clear filter pattern.
    pub fn no_filter(mut self) -> Self {
        self.filter = None;
        self
    }

    /// Set git SHA.
    pub fn git_sha(mut self, sha: impl Into<String>) -> Self {
        self.git_sha = Some(sha.into());
        self
    }

    /// Replace the per-benchmark options.
    pub fn options(mut self, options: BenchOptions) -> Self {
        self.options = options;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(v: &str) -> bool {
    v != "0" && !v.eq_ignore_ascii_case("false")
}

fn detect_git_sha() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|o| {
            if o.status.success() {
                String::from_utf8(o.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_use_defaults_when_env_not_set() {
        let cfg = BenchRunnerConfig::default();
        assert!(cfg.verbose);
        assert_eq!(cfg.output_dir, PathBuf::from("target/bench"));

        let opts = cfg.options;
        assert_eq!(opts.init_run_count, 5);
        assert_eq!(opts.cycle_delay, Duration::from_millis(200));
        assert_eq!(opts.max_time_elapsed, Duration::from_secs(8));
        assert!(!opts.default_async);
        assert_eq!(opts.calibration_index, 0);
        assert!(opts.unroll);
    }

    #[test]
    fn should_build_config_with_builder() {
        let cfg = BenchRunnerConfig::new()
            .verbose(false)
            .filter("my_bench")
            .options(BenchOptions::new().max_time(Duration::from_millis(50)));

        assert!(!cfg.verbose);
        assert_eq!(cfg.filter, Some("my_bench".to_string()));
        assert_eq!(cfg.options.max_time_elapsed, Duration::from_millis(50));
    }

    #[test]
    fn should_clamp_counts_when_builder_given_zero() {
        let opts = BenchOptions::new()
            .init_run_count(0)
            .unroll_limit(0)
            .max_sample_size(0);
        assert_eq!(opts.init_run_count, 1);
        assert_eq!(opts.unroll_limit, 1);
        assert_eq!(opts.max_sample_size, 1);
    }

    #[test]
    fn should_treat_zero_and_false_as_off() {
        assert!(!env_flag("0"));
        assert!(!env_flag("FALSE"));
        assert!(env_flag("1"));
        assert!(env_flag("yes"));
    }
}
