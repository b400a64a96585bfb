//! Pluggable reporters for benchmark output.

use crate::config::BenchRunnerConfig;
use crate::result::{BenchResult, SuiteResult};
use std::cmp::Ordering;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Trait for benchmark result reporters.
pub trait Reporter: Send + Sync {
    /// Called when a suite starts.
    fn suite_start(&self, _suite: &str, _config: &BenchRunnerConfig) {}

    /// Called when a benchmark starts.
    fn bench_start(&self, _name: &str) {}

    /// Called when a benchmark completes.
    fn bench_end(&self, _result: &BenchResult) {}

    /// Called when a suite completes.
    fn suite_end(&self, _result: &SuiteResult) {}
}

/// Console reporter that prints results to stderr.
pub struct ConsoleReporter {
    show_details: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            show_details: false,
        }
    }

    /// Also print deviation, cycles and time per operation.
    pub fn show_details(mut self, show: bool) -> Self {
        self.show_details = show;
        self
    }

    /// Group digits with commas; two decimals below 100 ops/sec.
    fn format_hz(hz: f64) -> String {
        let fixed = if hz < 100.0 {
            format!("{:.2}", hz)
        } else {
            format!("{:.0}", hz)
        };
        let (int, frac) = match fixed.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (fixed.as_str(), None),
        };

        let digits = int.len();
        let mut grouped = String::with_capacity(digits + digits / 3 + 3);
        for (i, ch) in int.chars().enumerate() {
            if i > 0 && (digits - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        if let Some(frac) = frac {
            grouped.push('.');
            grouped.push_str(frac);
        }
        grouped
    }

    fn format_period(secs: f64) -> String {
        if secs >= 1.0 {
            format!("{:.2}s", secs)
        } else if secs >= 1e-3 {
            format!("{:.2}ms", secs * 1e3)
        } else if secs >= 1e-6 {
            format!("{:.2}µs", secs * 1e6)
        } else {
            format!("{:.2}ns", secs * 1e9)
        }
    }

    fn format_line(result: &BenchResult) -> String {
        if let Some(err) = &result.error {
            return format!("error: {}", err);
        }
        if result.aborted {
            return "aborted".to_string();
        }
        if result.unclockable {
            return "unclockable (too fast to measure)".to_string();
        }
        format!(
            "x {} ops/sec \u{b1}{:.2}% ({} run{} sampled)",
            Self::format_hz(result.hz),
            result.rme,
            result.sample_size,
            if result.sample_size == 1 { "" } else { "s" }
        )
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn suite_start(&self, suite: &str, config: &BenchRunnerConfig) {
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("  Benchmark Suite: {}", suite);
        eprintln!(
            "  Budget: {:.1}s per benchmark, {}",
            config.options.max_time_elapsed.as_secs_f64(),
            if config.options.default_async { "async" } else { "sync" }
        );
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    fn bench_start(&self, name: &str) {
        eprint!("  {} ... ", name);
        std::io::stderr().flush().ok();
    }

    fn bench_end(&self, result: &BenchResult) {
        eprintln!("{}", Self::format_line(result));

        if self.show_details && result.is_ok() && !result.unclockable {
            eprintln!(
                "      {}/op, sd {:.2}, {} cycles, {:.2}s",
                Self::format_period(result.period),
                result.sd,
                result.cycles,
                result.elapsed
            );
        }
    }

    fn suite_end(&self, result: &SuiteResult) {
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!(
            "  Completed {} benchmarks in {:.2}s",
            result.results.len(),
            result.total_duration.as_secs_f64()
        );
        if let Some(name) = fastest(&result.results) {
            eprintln!("  Fastest: {}", name);
        }
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}

/// Names of the results no other result beats, joined with " and ".
fn fastest(results: &[BenchResult]) -> Option<String> {
    let usable: Vec<_> = results
        .iter()
        .filter(|r| r.is_ok() && !r.unclockable)
        .collect();
    if usable.len() < 2 {
        return None;
    }
    let winners: Vec<&str> = usable
        .iter()
        .filter(|r| usable.iter().all(|o| r.order(o) != Ordering::Less))
        .map(|r| r.name.as_str())
        .collect();
    (!winners.is_empty()).then(|| winners.join(" and "))
}

/// JSON reporter that writes results to a file.
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl Reporter for JsonReporter {
    fn suite_end(&self, result: &SuiteResult) {
        if let Err(e) = write_json_results(&self.output_dir, result) {
            warn!(error = %e, "failed to write JSON results");
        }
    }
}

fn write_json_results(output_dir: &Path, result: &SuiteResult) -> crate::error::Result<()> {
    std::fs::create_dir_all(output_dir)?;

    let filename = format!("{}.json", result.suite.replace('/', "_"));
    let path = output_dir.join(&filename);
    result.save(&path)?;
    info!(path = %path.display(), "results written");

    Ok(())
}

/// Combines multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

impl Reporter for MultiReporter {
    fn suite_start(&self, suite: &str, config: &BenchRunnerConfig) {
        for r in &self.reporters {
            r.suite_start(suite, config);
        }
    }

    fn bench_start(&self, name: &str) {
        for r in &self.reporters {
            r.bench_start(name);
        }
    }

    fn bench_end(&self, result: &BenchResult) {
        for r in &self.reporters {
            r.bench_end(result);
        }
    }

    fn suite_end(&self, result: &SuiteResult) {
        for r in &self.reporters {
            r.suite_end(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn result(name: &str, hz: f64, moe: f64) -> BenchResult {
        BenchResult {
            name: name.to_string(),
            hz,
            moe,
            rme: 1.0,
            sd: 0.0,
            sem: 0.0,
            count: 1,
            cycles: 1,
            sample_size: 5,
            period: 1.0 / hz,
            elapsed: 0.1,
            unclockable: false,
            aborted: false,
            error: None,
            tags: HashMap::new(),
        }
    }

    #[test]
    fn should_group_digits_when_formatting_hz() {
        assert_eq!(ConsoleReporter::format_hz(1_234_567.4), "1,234,567");
        assert_eq!(ConsoleReporter::format_hz(999.6), "1,000");
        assert_eq!(ConsoleReporter::format_hz(42.126), "42.13");
        assert_eq!(ConsoleReporter::format_hz(0.0), "0.00");
    }

    #[test]
    fn should_format_period_in_appropriate_units() {
        assert!(ConsoleReporter::format_period(2.0).ends_with("s"));
        assert!(ConsoleReporter::format_period(0.5).contains("ms"));
        assert!(ConsoleReporter::format_period(1e-4).contains("µs"));
        assert!(ConsoleReporter::format_period(1e-8).contains("ns"));
    }

    #[test]
    fn should_print_error_instead_of_stats_when_failed() {
        let mut r = result("bad", 0.0, 0.0);
        r.error = Some("boom".to_string());
        assert_eq!(ConsoleReporter::format_line(&r), "error: boom");
        assert!(ConsoleReporter::format_line(&result("ok", 1e6, 1.0)).starts_with("x 1,000,000 ops/sec"));
    }

    #[test]
    fn should_name_all_winners_when_tied() {
        let results = vec![
            result("a", 1000.0, 50.0),
            result("b", 1010.0, 50.0),
            result("c", 10.0, 1.0),
        ];
        assert_eq!(fastest(&results).as_deref(), Some("a and b"));
    }

    #[test]
    fn should_write_suite_json_when_suite_ends() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = JsonReporter::new(dir.path());
        let suite = SuiteResult {
            suite: "group/suite".to_string(),
            results: vec![result("a", 1000.0, 1.0)],
            total_duration: Duration::from_millis(5),
            started_at: "0".to_string(),
            git_sha: None,
            metadata: HashMap::new(),
        };

        reporter.suite_end(&suite);
        let loaded = SuiteResult::load(dir.path().join("group_suite.json")).unwrap();
        assert_eq!(loaded.results[0].name, "a");
    }
}
