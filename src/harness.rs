//! Test harness for auto-discovered benchmarks.
//!
//! ## Architecture
//!
//! When you use `#[bench_test]` and `bench_main!()`, this is what happens:
//!
//! 1. `#[bench_test]` registers each payload function in a distributed slice via linkme
//! 2. `bench_main!()` generates a main() that calls `bench_binary_main()`
//! 3. `bench_binary_main()` parses CLI args and calls `run_with_options()`
//! 4. `run_with_options()` queues matching benchmarks on one runner and drains them
//!
//! Each bench binary is self-contained and handles its own argument parsing,
//! so `cargo bench` works with `harness = false` targets.

use crate::payload::Payload;
use crate::result::{BenchResult, SuiteResult};
use crate::{BenchRunner, BenchRunnerConfig, Benchmark};
use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// A registered benchmark entry.
#[doc(hidden)]
pub struct BenchmarkEntry {
    /// Benchmark name (function name or custom)
    pub name: &'static str,
    /// Builds the payload wrapping the annotated function
    pub payload: fn() -> Arc<dyn Payload>,
    /// Whether this benchmark is ignored by default
    pub ignored: bool,
    /// Module path where the benchmark is defined
    pub module_path: &'static str,
}

/// Distributed slice collecting all registered benchmarks.
#[doc(hidden)]
#[linkme::distributed_slice]
pub static BENCHMARKS: [BenchmarkEntry];

/// Command-line arguments for bench binaries generated by `bench_main!()`.
#[derive(Debug, Parser)]
#[command(about = "Run the benchmarks registered in this binary")]
struct BenchBinaryArgs {
    /// Substring filter, as passed by `cargo bench -- <filter>`
    filter: Option<String>,

    /// Filter benchmarks by glob pattern
    #[arg(long)]
    workload: Option<String>,

    /// Include ignored benchmarks
    #[arg(long)]
    include_ignored: bool,

    /// List benchmarks without running
    #[arg(long)]
    list: bool,

    /// Quiet mode
    #[arg(short, long)]
    quiet: bool,

    /// Output directory for JSON results
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Baseline JSON for regression comparison
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Regression threshold
    #[arg(long, default_value_t = 0.05)]
    threshold: f64,

    /// Sampling budget per benchmark, in seconds
    #[arg(long)]
    max_time: Option<f64>,

    /// Run benchmarks cooperatively, pausing between cycles
    #[arg(long = "async")]
    run_async: bool,

    /// Passed by `cargo bench`
    #[arg(long, hide = true)]
    bench: bool,
}

/// Main entry point for bench binaries generated by `bench_main!()`.
///
/// Exit codes:
/// - 0: all benchmarks completed
/// - 1: a benchmark failed or regressed against the baseline
/// - 2: bad arguments or unreadable baseline
pub fn bench_binary_main() {
    let args = BenchBinaryArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    match run_from_args(args) {
        Ok(summary) if summary.is_success() => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run_from_args(args: BenchBinaryArgs) -> anyhow::Result<RunSummary> {
    if args.list {
        let benchmarks = list_benchmarks();
        if benchmarks.is_empty() {
            println!("No benchmarks registered.");
            println!("Add #[bench_test] to your benchmark functions.");
        } else {
            println!("Registered benchmarks ({}):", benchmarks.len());
            for name in benchmarks {
                println!("  {}", name);
            }
        }
        return Ok(RunSummary::default());
    }

    let mut opts = BenchRunnerOptions::new()
        .verbose(!args.quiet)
        .include_ignored(args.include_ignored)
        .threshold(args.threshold)
        .run_async(args.run_async);

    // A bare filter from `cargo bench -- foo` behaves like a substring workload
    if let Some(pattern) = args.workload.or(args.filter) {
        opts = opts.workload(pattern);
    }
    if let Some(dir) = args.output_dir {
        opts = opts.output_dir(dir);
    }
    if let Some(baseline) = args.baseline {
        opts = opts.baseline(baseline);
    }
    if let Some(secs) = args.max_time {
        let budget = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid --max-time {}", secs))?;
        opts = opts.max_time(budget);
    }

    run_with_options(opts)
}

/// Options for running discovered benchmarks.
#[derive(Debug, Clone, Default)]
pub struct BenchRunnerOptions {
    /// Filter benchmarks by glob pattern
    pub workload: Option<String>,
    /// Include ignored benchmarks
    pub include_ignored: bool,
    /// Verbose output
    pub verbose: bool,
    /// Output directory for JSON results
    pub output_dir: Option<PathBuf>,
    /// Baseline file for comparison
    pub baseline: Option<PathBuf>,
    /// Regression threshold (e.g., 0.05 for 5%)
    pub threshold: f64,
    /// Sampling budget override
    pub max_time: Option<Duration>,
    /// Drive benchmarks through the async runner
    pub run_async: bool,
}

impl BenchRunnerOptions {
    pub fn new() -> Self {
        Self {
            threshold: 0.05,
            verbose: true,
            ..Default::default()
        }
    }

    pub fn workload(mut self, pattern: impl Into<String>) -> Self {
        self.workload = Some(pattern.into());
        self
    }

    pub fn include_ignored(mut self, v: bool) -> Self {
        self.include_ignored = v;
        self
    }

    pub fn verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    pub fn baseline(mut self, path: impl Into<PathBuf>) -> Self {
        self.baseline = Some(path.into());
        self
    }

    pub fn threshold(mut self, t: f64) -> Self {
        self.threshold = t;
        self
    }

    pub fn max_time(mut self, budget: Duration) -> Self {
        self.max_time = Some(budget);
        self
    }

    pub fn run_async(mut self, v: bool) -> Self {
        self.run_async = v;
        self
    }

    fn selects(&self, entry: &BenchmarkEntry) -> bool {
        if entry.ignored && !self.include_ignored {
            return false;
        }
        match &self.workload {
            Some(pattern) => {
                matches_glob(entry.name, pattern) || matches_glob(entry.module_path, pattern)
            }
            None => true,
        }
    }
}

/// Outcome of a harness run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub results: Vec<BenchResult>,
    /// Results slower than the baseline, with their slowdown ratio
    pub regressions: Vec<(BenchResult, f64)>,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = &BenchResult> {
        self.results.iter().filter(|r| r.error.is_some())
    }

    pub fn is_success(&self) -> bool {
        self.regressions.is_empty() && self.failures().next().is_none()
    }
}

/// Run all registered benchmarks with default options, without parsing the
/// command line.
pub fn run_registered_benchmarks() -> anyhow::Result<RunSummary> {
    run_with_options(BenchRunnerOptions::new())
}

/// Get the benchmark suite name from the executable name.
fn get_suite_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().to_string()))
        .map(|name| suite_name_from_stem(&name))
        .unwrap_or_else(|| "bench".to_string())
}

/// Strip cargo's `-<16 hex>` hash suffix and restore hyphens.
fn suite_name_from_stem(stem: &str) -> String {
    let clean = match stem.rsplit_once('-') {
        Some((base, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            base
        }
        _ => stem,
    };
    clean.replace('_', "-")
}

/// Run all registered benchmarks with custom options.
pub fn run_with_options(opts: BenchRunnerOptions) -> anyhow::Result<RunSummary> {
    let selected: Vec<&BenchmarkEntry> = BENCHMARKS.iter().filter(|b| opts.selects(b)).collect();

    if selected.is_empty() {
        if opts.workload.is_some() {
            eprintln!("No benchmarks matched the workload pattern");
        } else {
            eprintln!("No benchmarks registered. Add #[bench_test] to your benchmark functions.");
        }
        return Ok(RunSummary::default());
    }

    // Fail before measuring anything if the baseline is unusable
    let baseline = opts
        .baseline
        .as_ref()
        .map(|path| {
            SuiteResult::load(path)
                .with_context(|| format!("failed to load baseline {}", path.display()))
        })
        .transpose()?;

    let mut config = BenchRunnerConfig::from_env();
    config.verbose = opts.verbose;
    if let Some(dir) = &opts.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(budget) = opts.max_time {
        config.options.max_time_elapsed = budget;
    }
    if opts.run_async {
        config.options.default_async = true;
    }

    let suite_name = get_suite_name();
    debug!(suite = %suite_name, benchmarks = selected.len(), "running registered benchmarks");
    let mut runner = BenchRunner::with_config(&suite_name, config);

    for entry in &selected {
        let name = format!("{}::{}", entry.module_path, entry.name);
        let options = runner.config().options.clone();
        runner.queue(Benchmark::from_payload(name, (entry.payload)(), options));
    }
    runner.run_queued();

    let (results, regressions) = match &baseline {
        Some(baseline) => runner.finish_against(baseline, opts.threshold),
        None => (runner.finish(), Vec::new()),
    };

    if !regressions.is_empty() {
        eprintln!("\n❌ {} regression(s) detected!", regressions.len());
        for (result, ratio) in &regressions {
            let pct = (ratio - 1.0) * 100.0;
            eprintln!("  {} is {:.1}% slower", result.name, pct);
        }
    }

    let summary = RunSummary {
        results,
        regressions,
    };
    for failed in summary.failures() {
        eprintln!(
            "  {} failed: {}",
            failed.name,
            failed.error.as_deref().unwrap_or_default()
        );
    }
    Ok(summary)
}

/// Simple glob matching supporting `*`; without wildcards, a substring match.
fn matches_glob(text: &str, pattern: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();

    if !pattern.contains('*') {
        return text.contains(&pattern);
    }

    // All parts must appear in order; anchored unless the pattern starts or
    // ends with `*`
    let parts: Vec<&str> = pattern.split('*').collect();
    let last = parts.len() - 1;
    let mut remaining = text.as_str();

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match remaining.strip_prefix(part) {
                Some(rest) => remaining = rest,
                None => return false,
            }
        } else if i == last {
            return remaining.ends_with(part);
        } else {
            match remaining.find(part) {
                Some(pos) => remaining = &remaining[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

/// Get a list of all registered benchmark names.
///
/// Useful for tooling and IDE integration.
pub fn list_benchmarks() -> Vec<&'static str> {
    BENCHMARKS.iter().map(|b| b.name).collect()
}

/// Get count of registered benchmarks.
pub fn benchmark_count() -> usize {
    BENCHMARKS.len()
}
