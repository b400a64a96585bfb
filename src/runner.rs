//! The suite runner.

use crate::benchmark::Benchmark;
use crate::config::BenchRunnerConfig;
use crate::context::Context;
use crate::payload::IntoOutcome;
use crate::report::{ConsoleReporter, JsonReporter, Reporter};
use crate::result::{BenchResult, SuiteResult};
use std::collections::{HashMap, VecDeque};
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Runs benchmarks against one measurement context and reports results.
///
/// # Example
///
/// ```rust,no_run
/// use cntryl_bench::BenchRunner;
///
/// let mut runner = BenchRunner::new("my_suite");
///
/// runner.run("sum_1000", || {
///     let mut acc = 0u64;
///     for i in 0..1000 {
///         acc = acc.wrapping_add(i);
///     }
///     std::hint::black_box(acc);
/// });
///
/// let results = runner.finish();
/// ```
pub struct BenchRunner {
    suite: String,
    config: BenchRunnerConfig,
    ctx: Context,
    results: Vec<BenchResult>,
    queue: VecDeque<Benchmark>,
    suite_start: Instant,
    reporters: Vec<Box<dyn Reporter>>,
    metadata: HashMap<String, String>,
    #[cfg(feature = "async")]
    runtime: Option<tokio::runtime::Runtime>,
}

impl BenchRunner {
    /// Create a new runner with default config from environment.
    pub fn new(suite: &str) -> Self {
        Self::with_config(suite, BenchRunnerConfig::from_env())
    }

    /// Create a new runner with explicit config.
    pub fn with_config(suite: &str, config: BenchRunnerConfig) -> Self {
        Self::with_context(suite, config, Context::new())
    }

    /// Create a runner measuring through an existing context.
    pub fn with_context(suite: &str, config: BenchRunnerConfig, ctx: Context) -> Self {
        // Default reporters: console (when verbose) + JSON
        let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();
        if config.verbose {
            reporters.push(Box::new(ConsoleReporter::new()));
        }
        reporters.push(Box::new(JsonReporter::new(config.output_dir.clone())));

        let runner = Self {
            suite: suite.to_string(),
            config,
            ctx,
            results: Vec::new(),
            queue: VecDeque::new(),
            suite_start: Instant::now(),
            reporters,
            metadata: HashMap::new(),
            #[cfg(feature = "async")]
            runtime: None,
        };

        for r in &runner.reporters {
            r.suite_start(&runner.suite, &runner.config);
        }

        runner
    }

    /// Add custom metadata to the suite results.
    pub fn metadata(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace reporters with a custom set.
    pub fn reporters(&mut self, reporters: Vec<Box<dyn Reporter>>) -> &mut Self {
        self.reporters = reporters;
        self
    }

    /// Add an additional reporter.
    pub fn add_reporter(&mut self, reporter: Box<dyn Reporter>) -> &mut Self {
        self.reporters.push(reporter);
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn config(&self) -> &BenchRunnerConfig {
        &self.config
    }

    /// Results recorded so far.
    pub fn results(&self) -> &[BenchResult] {
        &self.results
    }

    fn should_run(&self, name: &str) -> bool {
        match &self.config.filter {
            Some(f) => name.contains(f.as_str()),
            None => true,
        }
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}/{}", self.suite, name)
    }

    /// Measure a payload now, with the runner's benchmark options.
    pub fn run<F, R>(&mut self, name: &str, f: F) -> Option<&BenchResult>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoOutcome + 'static,
    {
        if !self.should_run(name) {
            return None;
        }
        let bench = Benchmark::with_options(name, f, self.config.options.clone());
        self.measure(bench)
    }

    /// Measure a prepared benchmark now.
    pub fn bench(&mut self, bench: Benchmark) -> Option<&BenchResult> {
        if !self.should_run(bench.name()) {
            return None;
        }
        self.measure(bench)
    }

    fn measure(&mut self, mut bench: Benchmark) -> Option<&BenchResult> {
        for r in &self.reporters {
            r.bench_start(bench.name());
        }

        if bench.options().default_async {
            self.run_blocking(&mut bench);
        } else {
            bench.run(&mut self.ctx);
        }

        Some(self.record(&bench))
    }

    fn record(&mut self, bench: &Benchmark) -> &BenchResult {
        let result = BenchResult::from_benchmark(self.full_name(bench.name()), bench);
        for r in &self.reporters {
            r.bench_end(&result);
        }
        self.results.push(result);
        &self.results[self.results.len() - 1]
    }

    #[cfg(feature = "async")]
    fn run_blocking(&mut self, bench: &mut Benchmark) {
        if tokio::runtime::Handle::try_current().is_ok() {
            warn!(
                name = bench.name(),
                "already inside an async runtime, running synchronously; use run_queued_async"
            );
            bench.run(&mut self.ctx);
            return;
        }
        if self.runtime.is_none() {
            match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(rt) => self.runtime = Some(rt),
                Err(e) => warn!(error = %e, "failed to start async runtime, running synchronously"),
            }
        }
        match &self.runtime {
            Some(rt) => rt.block_on(bench.run_async(&mut self.ctx)),
            None => bench.run(&mut self.ctx),
        }
    }

    #[cfg(not(feature = "async"))]
    fn run_blocking(&mut self, bench: &mut Benchmark) {
        debug!(name = bench.name(), "async feature disabled, running synchronously");
        bench.run(&mut self.ctx);
    }

    /// Add a benchmark to the worklist.
    pub fn queue(&mut self, bench: Benchmark) -> &mut Self {
        if self.should_run(bench.name()) {
            self.queue.push_back(bench);
        }
        self
    }

    /// Benchmarks still waiting in the worklist.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Drain the worklist in order, one benchmark at a time.
    pub fn run_queued(&mut self) -> usize {
        self.run_queued_with(|_| ControlFlow::Continue(()))
    }

    /// Drain the worklist, consulting `between` after each benchmark.
    /// A `Break` stops the drain and leaves the rest queued.
    pub fn run_queued_with<F>(&mut self, mut between: F) -> usize
    where
        F: FnMut(&BenchResult) -> ControlFlow<()>,
    {
        let mut ran = 0;
        while let Some(bench) = self.queue.pop_front() {
            ran += 1;
            let Some(result) = self.measure(bench) else {
                continue;
            };
            if between(result).is_break() {
                debug!(remaining = self.queue.len(), "worklist stopped early");
                break;
            }
        }
        ran
    }

    /// Drain the worklist cooperatively; each benchmark yields to the
    /// runtime between steps.
    #[cfg(feature = "async")]
    pub async fn run_queued_async<F>(&mut self, mut between: F) -> usize
    where
        F: FnMut(&BenchResult) -> ControlFlow<()>,
    {
        let mut ran = 0;
        while let Some(mut bench) = self.queue.pop_front() {
            ran += 1;
            for r in &self.reporters {
                r.bench_start(bench.name());
            }
            bench.run_async(&mut self.ctx).await;
            let result = self.record(&bench);
            if between(result).is_break() {
                debug!(remaining = self.queue.len(), "worklist stopped early");
                break;
            }
        }
        ran
    }

    /// Run multiple related benchmarks as a group.
    ///
    /// Groups are just for organization/reporting.
    pub fn group<F>(&mut self, group_name: &str, f: F)
    where
        F: FnOnce(&mut BenchGroup<'_>),
    {
        let mut group = BenchGroup {
            runner: self,
            prefix: group_name.to_string(),
        };
        f(&mut group);
    }

    /// Finish the suite and return results.
    ///
    /// This writes JSON output and prints summary.
    pub fn finish(self) -> Vec<BenchResult> {
        let total_duration = self.suite_start.elapsed();

        let suite_result = SuiteResult {
            suite: self.suite.clone(),
            results: self.results.clone(),
            total_duration,
            started_at: chrono_timestamp(),
            git_sha: self.config.git_sha.clone(),
            metadata: self.metadata,
        };

        for r in &self.reporters {
            r.suite_end(&suite_result);
        }

        self.results
    }

    /// Finish and compare against a baseline file.
    ///
    /// Returns both results and any regressions found. An unreadable
    /// baseline is logged and yields no regressions.
    pub fn finish_with_baseline(
        self,
        baseline_path: impl AsRef<std::path::Path>,
        threshold: f64,
    ) -> (Vec<BenchResult>, Vec<(BenchResult, f64)>) {
        match SuiteResult::load(&baseline_path) {
            Ok(baseline) => self.finish_against(&baseline, threshold),
            Err(e) => {
                warn!(
                    path = %baseline_path.as_ref().display(),
                    error = %e,
                    "baseline not loaded, skipping comparison"
                );
                (self.finish(), Vec::new())
            }
        }
    }

    /// Finish and compare against an already loaded baseline.
    pub fn finish_against(
        self,
        baseline: &SuiteResult,
        threshold: f64,
    ) -> (Vec<BenchResult>, Vec<(BenchResult, f64)>) {
        let results = self.finish();
        let current = SuiteResult {
            suite: String::new(),
            results,
            total_duration: Duration::ZERO,
            started_at: String::new(),
            git_sha: None,
            metadata: HashMap::new(),
        };
        let regressions: Vec<(BenchResult, f64)> = current
            .find_regressions(baseline, threshold)
            .into_iter()
            .map(|(r, ratio)| (r.clone(), ratio))
            .collect();
        (current.results, regressions)
    }
}

/// A benchmark group for organizing related benchmarks.
pub struct BenchGroup<'a> {
    runner: &'a mut BenchRunner,
    prefix: String,
}

impl<'a> BenchGroup<'a> {
    /// Run a benchmark within this group.
    pub fn run<F, R>(&mut self, name: &str, f: F)
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoOutcome + 'static,
    {
        let full_name = format!("{}/{}", self.prefix, name);
        self.runner.run(&full_name, f);
    }
}

fn chrono_timestamp() -> String {
    // Unix milliseconds; unique enough for file names and JSON values
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", duration.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::BenchOptions;

    fn quiet_runner(config: BenchRunnerConfig) -> (ManualClock, BenchRunner) {
        let clock = ManualClock::new(Duration::from_micros(1));
        let config = config.verbose(false);
        let mut runner = BenchRunner::with_context("test", config, Context::with_clock(clock.clone()));
        runner.reporters(vec![]); // Disable reporters for test
        (clock, runner)
    }

    fn costing(clock: &ManualClock, cost: Duration) -> impl Fn() + Send + Sync + 'static {
        let clock = clock.clone();
        move || clock.advance(cost)
    }

    #[test]
    fn should_run_benchmark_when_no_filter() {
        let (clock, mut runner) = quiet_runner(BenchRunnerConfig::new());

        let hz = runner
            .run("bench1", costing(&clock, Duration::from_micros(10)))
            .map(|r| r.hz);
        assert!(hz.is_some_and(|hz| (hz - 1e5).abs() / 1e5 < 1e-6));

        let results = runner.finish();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "test/bench1");
    }

    #[test]
    fn should_filter_benchmarks_when_filter_set() {
        let (clock, mut runner) = quiet_runner(BenchRunnerConfig::new().filter("keep"));

        runner.run("keep_this", costing(&clock, Duration::from_micros(10)));
        assert!(runner
            .run("skip_this", costing(&clock, Duration::from_micros(10)))
            .is_none());

        let results = runner.finish();
        assert_eq!(results.len(), 1);
        assert!(results[0].name.contains("keep"));
    }

    #[test]
    fn should_prefix_group_name_when_grouped() {
        let (clock, mut runner) = quiet_runner(BenchRunnerConfig::new());

        runner.group("codec", |g| {
            g.run("encode", costing(&clock, Duration::from_micros(5)));
        });

        let results = runner.finish();
        assert_eq!(results[0].name, "test/codec/encode");
    }

    #[test]
    fn should_stop_worklist_when_between_callback_breaks() {
        let (clock, mut runner) = quiet_runner(BenchRunnerConfig::new());
        for name in ["a", "b", "c"] {
            runner.queue(Benchmark::new(name, costing(&clock, Duration::from_micros(20))));
        }

        let ran = runner.run_queued_with(|r| {
            if r.name.ends_with("/b") {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        assert_eq!(ran, 2);
        assert_eq!(runner.queued(), 1);
        assert_eq!(runner.run_queued(), 1);
        assert_eq!(runner.results().len(), 3);
    }

    #[test]
    fn should_run_through_runtime_when_default_async() {
        let options = BenchOptions::new()
            .default_async(true)
            .cycle_delay(Duration::from_millis(1));
        let (clock, mut runner) = quiet_runner(BenchRunnerConfig::new().options(options));

        let result = runner
            .run("async", costing(&clock, Duration::from_micros(50)))
            .cloned();

        let result = result.expect("benchmark should run");
        assert!(result.is_ok());
        assert!((result.hz - 2e4).abs() / 2e4 < 1e-6);
    }
}
