use cntryl_bench::{
    BenchOptions, BenchRunner, BenchRunnerConfig, Benchmark, Context, EventKind, ManualClock,
    INIT_SAMPLE_SIZE,
};
use std::cmp::Ordering;
use std::hint::black_box;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

fn manual(resolution: Duration) -> (ManualClock, Context) {
    let clock = ManualClock::new(resolution);
    let ctx = Context::with_clock(clock.clone());
    (clock, ctx)
}

fn costing(clock: &ManualClock, cost: Duration) -> impl Fn() + Send + Sync + 'static {
    let clock = clock.clone();
    move || clock.advance(cost)
}

fn counter(bench: &mut Benchmark, kind: EventKind) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    bench.observe(kind, move |_: &Benchmark| {
        h.fetch_add(1, AtomicOrdering::Relaxed);
    });
    hits
}

#[test]
fn should_rank_faster_payload_greater() {
    let (clock, mut ctx) = manual(Duration::from_nanos(100));
    let mut fast = Benchmark::new("fast", costing(&clock, Duration::from_micros(1)));
    let mut slow = Benchmark::new("slow", costing(&clock, Duration::from_micros(100)));

    fast.run(&mut ctx);
    slow.run(&mut ctx);

    assert!((fast.hz() - 1e6).abs() / 1e6 < 1e-6);
    assert!((slow.hz() - 1e4).abs() / 1e4 < 1e-6);
    assert_eq!(fast.compare(&slow), Ordering::Greater);
    assert_eq!(slow.compare(&fast), Ordering::Less);
}

#[test]
fn should_sample_initial_clones_when_measurements_are_stable() {
    let (clock, mut ctx) = manual(Duration::from_nanos(100));
    let mut bench = Benchmark::new("steady", costing(&clock, Duration::from_micros(3)));
    let completes = counter(&mut bench, EventKind::Complete);

    bench.run(&mut ctx);

    assert!(!bench.is_running());
    assert_eq!(bench.stats().size, INIT_SAMPLE_SIZE);
    assert!(bench.rme() < 1e-6);
    assert!(bench.cycles() >= INIT_SAMPLE_SIZE as u64);
    assert_eq!(completes.load(AtomicOrdering::Relaxed), 1);
    assert!(bench.times().elapsed > 0.0);
}

#[test]
fn should_compare_equal_when_clone_measures_same_payload() {
    const SEED: u64 = 0x2545_f491_4f6c_dd1d;
    let (clock, mut ctx) = manual(Duration::from_nanos(100));
    let seed = Arc::new(AtomicU64::new(SEED));
    let (c, s) = (clock.clone(), seed.clone());
    // Deterministic jitter: each call costs 1, 2 or 3µs.
    let payload = move || {
        let x = s
            .fetch_add(1, AtomicOrdering::Relaxed)
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        c.advance(Duration::from_micros(1 + (x >> 33) % 3));
    };
    // Five calls always clear the minimum, so every cycle has the same count.
    let options = BenchOptions::default()
        .max_time(Duration::from_secs(1))
        .min_time(Duration::from_micros(4));
    let mut a = Benchmark::with_options("jitter", payload, options);
    let mut b = a.clone();

    a.run(&mut ctx);
    seed.store(SEED, AtomicOrdering::Relaxed);
    b.run(&mut ctx);

    assert!(a.moe() > 0.0);
    assert!(a.stats().size > INIT_SAMPLE_SIZE);
    assert_eq!(a.compare(&b), Ordering::Equal);
}

#[test]
fn should_not_widen_margin_when_budget_grows() {
    const SEED: u64 = 0x9e37_79b9_7f4a_7c15;
    let run_with = |budget: Duration| {
        let (clock, mut ctx) = manual(Duration::from_nanos(100));
        let seed = Arc::new(AtomicU64::new(SEED));
        let payload = move || {
            let x = seed
                .fetch_add(1, AtomicOrdering::Relaxed)
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            clock.advance(Duration::from_micros(1 + (x >> 33) % 3));
        };
        let options = BenchOptions::default()
            .max_time(budget)
            .min_time(Duration::from_micros(4));
        let mut bench = Benchmark::with_options("budget", payload, options);
        bench.run(&mut ctx);
        bench
    };

    let short = run_with(Duration::ZERO);
    let long = run_with(Duration::from_secs(1));

    assert!(short.error().is_none() && long.error().is_none());
    assert!(long.stats().size >= short.stats().size);
    assert!(long.rme() <= short.rme(), "{} > {}", long.rme(), short.rme());
    assert!(long.rme() <= 1.0);
}

#[test]
fn should_report_zero_hz_when_payload_is_unclockable() {
    let (_, mut ctx) = manual(Duration::from_micros(1));
    let mut bench = Benchmark::new("free", || {});

    bench.run(&mut ctx);

    assert!(bench.is_unclockable());
    assert!(!bench.is_running());
    assert!(bench.error().is_none());
    assert_eq!(bench.hz(), 0.0);
    assert_eq!(bench.stats().mean, 0.0);
    assert!(bench.rme().is_finite());
    // Session flags do not leak into the next run.
    assert!(!ctx.is_unclockable(bench.payload().id()));
}

#[test]
fn should_finish_with_error_when_payload_always_fails() {
    let (_, mut ctx) = manual(Duration::from_nanos(100));
    let mut bench = Benchmark::new("boom", || -> Result<(), String> { Err("boom".into()) });
    let errors = counter(&mut bench, EventKind::Error);
    let completes = counter(&mut bench, EventKind::Complete);

    bench.run(&mut ctx);

    assert_eq!(bench.error().map(|e| e.to_string()), Some("boom".to_string()));
    assert!(!bench.is_running());
    assert_eq!(bench.hz(), 0.0);
    assert_eq!(errors.load(AtomicOrdering::Relaxed), 1);
    assert_eq!(completes.load(AtomicOrdering::Relaxed), 1);
}

#[test]
fn should_capture_panic_as_error() {
    let (_, mut ctx) = manual(Duration::from_nanos(100));
    let mut bench = Benchmark::new("panics", || -> () { panic!("payload exploded") });

    bench.run(&mut ctx);

    let message = bench.error().map(|e| e.to_string()).unwrap_or_default();
    assert!(message.contains("payload exploded"), "got {message}");
    assert!(!bench.is_running());
}

#[test]
fn should_measure_summation_on_system_clock() {
    let mut ctx = Context::new();
    let options = BenchOptions::default().max_time(Duration::from_millis(50));
    let mut bench = Benchmark::with_options(
        "sum",
        || {
            let mut acc = 0u64;
            for i in 0..1000u64 {
                acc = acc.wrapping_add(black_box(i));
            }
            black_box(acc);
        },
        options,
    );

    bench.run(&mut ctx);

    assert!(bench.error().is_none());
    assert!(!bench.is_running());
    assert!(bench.hz() > 0.0);
    assert!(bench.rme() >= 0.0);
    assert!(bench.stats().size >= INIT_SAMPLE_SIZE);
}

#[test]
fn should_never_go_negative_when_subtracting_loop_overhead() {
    let mut ctx = Context::new();
    let options = BenchOptions::default()
        .unroll(false)
        .max_time(Duration::from_millis(50));
    let mut bench = Benchmark::with_options("empty", || {}, options);
    let cycles = Arc::new(AtomicUsize::new(0));
    let negative = Arc::new(AtomicUsize::new(0));
    let (c, n) = (cycles.clone(), negative.clone());
    bench.observe(EventKind::Cycle, move |b: &Benchmark| {
        c.fetch_add(1, AtomicOrdering::Relaxed);
        if b.times().cycle < 0.0 || b.hz() < 0.0 {
            n.fetch_add(1, AtomicOrdering::Relaxed);
        }
    });

    bench.run(&mut ctx);

    assert!(ctx.is_calibrated());
    assert!(bench.error().is_none());
    assert!(bench.hz() >= 0.0);
    assert!(cycles.load(AtomicOrdering::Relaxed) > 0);
    assert_eq!(negative.load(AtomicOrdering::Relaxed), 0);
}

#[test]
fn should_calibrate_before_timing_looped_payload() {
    let (clock, mut ctx) = manual(Duration::from_nanos(100));
    let options = BenchOptions::default().unroll(false);
    let mut bench = Benchmark::with_options("looped", costing(&clock, Duration::from_micros(2)), options);

    bench.run(&mut ctx);

    assert!(ctx.is_calibrated());
    assert!(bench.error().is_none());
    assert!((bench.hz() - 5e5).abs() / 5e5 < 1e-6);
}

#[test]
fn should_abort_once_when_cycle_listener_breaks() {
    let (clock, mut ctx) = manual(Duration::from_nanos(100));
    let mut bench = Benchmark::new("veto", costing(&clock, Duration::from_micros(1)));
    bench.on(EventKind::Cycle, |_: &Benchmark| ControlFlow::Break(()));
    let aborts = counter(&mut bench, EventKind::Abort);
    let completes = counter(&mut bench, EventKind::Complete);

    bench.run(&mut ctx);
    assert!(bench.is_aborted());
    assert!(!bench.is_running());
    assert_eq!(bench.hz(), 0.0);

    bench.abort();
    assert_eq!(aborts.load(AtomicOrdering::Relaxed), 1);
    assert_eq!(completes.load(AtomicOrdering::Relaxed), 1);
}

#[test]
fn should_emit_reset_only_when_state_changed() {
    let (clock, mut ctx) = manual(Duration::from_nanos(100));
    let mut bench = Benchmark::new("reset", costing(&clock, Duration::from_micros(1)));
    let resets = counter(&mut bench, EventKind::Reset);

    bench.reset();
    assert_eq!(resets.load(AtomicOrdering::Relaxed), 0);

    bench.run(&mut ctx);
    let before = resets.load(AtomicOrdering::Relaxed);
    bench.reset();
    bench.reset();
    assert_eq!(resets.load(AtomicOrdering::Relaxed), before + 1);
    assert_eq!(bench.hz(), 0.0);
    assert_eq!(bench.stats().size, 0);
}

#[test]
fn should_rerun_from_scratch_when_run_twice() {
    let (clock, mut ctx) = manual(Duration::from_nanos(100));
    let mut bench = Benchmark::new("twice", costing(&clock, Duration::from_micros(4)));
    let starts = counter(&mut bench, EventKind::Start);

    bench.run(&mut ctx);
    let first = bench.hz();
    bench.run(&mut ctx);

    assert_eq!(starts.load(AtomicOrdering::Relaxed), 2);
    assert!((bench.hz() - first).abs() / first < 1e-6);
    assert!(!bench.is_aborted());
}

#[test]
fn should_keep_options_when_cloned() {
    let options = BenchOptions::default()
        .max_time(Duration::from_millis(250))
        .unroll_limit(64)
        .calibration_index(0);
    let bench = Benchmark::with_options("orig", || {}, options.clone());

    let clone = bench.clone();
    assert_eq!(clone.options(), &options);
    assert!(!clone.is_running());
    assert_eq!(clone.cycles(), 0);
}

#[test]
fn should_write_suite_report_when_runner_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let (clock, ctx) = manual(Duration::from_nanos(100));
    let config = BenchRunnerConfig::new()
        .verbose(false)
        .output_dir(dir.path());
    let mut runner = BenchRunner::with_context("report", config, ctx);

    runner.run("one", costing(&clock, Duration::from_micros(10)));
    runner.run("two", costing(&clock, Duration::from_micros(20)));
    let results = runner.finish();

    assert_eq!(results.len(), 2);
    let saved = cntryl_bench::SuiteResult::load(dir.path().join("report.json")).unwrap();
    assert_eq!(saved.results.len(), 2);
    assert_eq!(saved.results[1].name, "report/two");
    assert_eq!(saved.results[0].order(&saved.results[1]), Ordering::Greater);
}

#[test]
fn should_flag_regression_against_slower_baseline_file() {
    let dir = tempfile::tempdir().unwrap();
    let baseline_path = dir.path().join("baseline.json");

    let (clock, ctx) = manual(Duration::from_nanos(100));
    let config = BenchRunnerConfig::new().verbose(false).output_dir(dir.path());
    let mut runner = BenchRunner::with_context("base", config, ctx);
    runner.run("op", costing(&clock, Duration::from_micros(10)));
    let baseline = runner.finish();
    cntryl_bench::SuiteResult {
        suite: "base".to_string(),
        results: baseline,
        total_duration: Duration::ZERO,
        started_at: "0".to_string(),
        git_sha: None,
        metadata: Default::default(),
    }
    .save(&baseline_path)
    .unwrap();

    let (clock, ctx) = manual(Duration::from_nanos(100));
    let config = BenchRunnerConfig::new().verbose(false).output_dir(dir.path());
    let mut runner = BenchRunner::with_context("base", config, ctx);
    runner.run("op", costing(&clock, Duration::from_micros(20)));
    let (_, regressions) = runner.finish_with_baseline(&baseline_path, 0.05);

    assert_eq!(regressions.len(), 1);
    assert!((regressions[0].1 - 2.0).abs() < 1e-6);
}

#[cfg(feature = "async")]
mod cooperative {
    use super::*;

    #[tokio::test]
    async fn should_measure_when_run_async() {
        let (clock, mut ctx) = manual(Duration::from_nanos(100));
        let options = BenchOptions::default().cycle_delay(Duration::from_millis(1));
        let mut bench =
            Benchmark::with_options("async", costing(&clock, Duration::from_micros(5)), options);

        bench.run_async(&mut ctx).await;

        assert!(!bench.is_running());
        assert!((bench.hz() - 2e5).abs() / 2e5 < 1e-6);
    }

    #[tokio::test]
    async fn should_wake_from_cycle_delay_when_aborted() {
        let (clock, mut ctx) = manual(Duration::from_nanos(100));
        let options = BenchOptions::default().cycle_delay(Duration::from_secs(60));
        let mut bench =
            Benchmark::with_options("sleepy", costing(&clock, Duration::from_micros(5)), options);
        let handle = bench.abort_handle();

        let run = async {
            bench.run_async(&mut ctx).await;
        };
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.abort();
        };
        tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(run, cancel) })
            .await
            .expect("abort should interrupt the cycle delay");

        assert!(bench.is_aborted());
        assert!(!bench.is_running());
    }

    #[tokio::test]
    async fn should_drain_worklist_when_run_queued_async() {
        let (clock, ctx) = manual(Duration::from_nanos(100));
        let options = BenchOptions::default().cycle_delay(Duration::from_millis(1));
        let config = BenchRunnerConfig::new().verbose(false).options(options.clone());
        let mut runner = BenchRunner::with_context("async_suite", config, ctx);
        runner.reporters(vec![]);
        runner.queue(Benchmark::with_options(
            "a",
            costing(&clock, Duration::from_micros(5)),
            options.clone(),
        ));
        runner.queue(Benchmark::with_options(
            "b",
            costing(&clock, Duration::from_micros(10)),
            options,
        ));

        let ran = runner.run_queued_async(|_| ControlFlow::Continue(())).await;

        assert_eq!(ran, 2);
        let results = runner.finish();
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(results[0].order(&results[1]), Ordering::Greater);
    }
}
