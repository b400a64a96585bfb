//! # cntryl-bench
//!
//! An adaptive statistical micro-benchmark engine.
//!
//! Each benchmark grows its per-cycle call count until a cycle takes long
//! enough to be measured with 1% quantization error, then repeatedly samples
//! that measurement through clones until the relative margin of error is
//! below 1% or the time budget runs out. Payloads that exit early or must run
//! in a counted loop are calibrated against an empty payload and the loop
//! overhead is subtracted.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cntryl_bench::{Benchmark, Context};
//!
//! let mut ctx = Context::new();
//! let mut bench = Benchmark::new("sum", || {
//!     let mut acc = 0u64;
//!     for i in 0..100 {
//!         acc = acc.wrapping_add(i);
//!     }
//!     std::hint::black_box(acc);
//! });
//!
//! bench.run(&mut ctx);
//! println!("{}", bench);
//! ```
//!
//! Suites go through [`BenchRunner`], which writes JSON results and compares
//! them against a baseline. Bench binaries can register payloads with
//! `#[bench_test]` and end with `bench_main!()`.
//!
//! ## Features
//!
//! - **`async`** (default): cooperative runs on tokio, pausing
//!   `cycle_delay` between steps

mod benchmark;
mod calibration;
mod clock;
mod config;
mod context;
mod error;
mod events;
mod harness;
mod payload;
mod plan;
mod report;
mod result;
mod run;
mod runner;
mod session;
mod stats;

pub use benchmark::{Benchmark, Kind, Times};
pub use clock::{min_time_for, Clock, ManualClock, MonotonicClock};
pub use config::{BenchOptions, BenchRunnerConfig};
pub use context::{Context, CycleResult};
pub use error::{BenchError, PayloadError, Result};
pub use events::{EventKind, Listener, ListenerId};
pub use harness::{
    bench_binary_main, benchmark_count, list_benchmarks, run_registered_benchmarks,
    run_with_options, BenchRunnerOptions, RunSummary,
};
pub use payload::{BlockRun, FnPayload, IntoOutcome, Outcome, Payload, PayloadId, PayloadRef};
pub use plan::Strategy;
pub use report::{ConsoleReporter, JsonReporter, MultiReporter, Reporter};
pub use result::{BenchResult, SuiteResult};
pub use run::{AbortHandle, MAX_RUN_COUNT};
pub use runner::{BenchGroup, BenchRunner};
pub use session::INIT_SAMPLE_SIZE;
pub use stats::{compare_intervals, t_critical, Statistics, T_INFINITY};

pub use cntryl_bench_macros::{bench_main, bench_test};

#[doc(hidden)]
pub mod __private {
    pub use crate::harness::{BenchmarkEntry, BENCHMARKS};
    pub use crate::payload::{FnPayload, Payload};
    pub use linkme;
    pub use std::sync::Arc;
}
