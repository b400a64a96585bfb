//! The benchmark data model.

use crate::config::BenchOptions;
use crate::error::PayloadError;
use crate::events::{EventBus, EventKind};
use crate::payload::{IntoOutcome, Payload, PayloadRef};
use crate::run::{AbortHandle, Phase};
use crate::stats::{compare_intervals, Statistics};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

static NEXT_BENCH_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_BENCH_ID.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Timing block, in seconds on the context clock.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Times {
    /// Corrected time of the last cycle.
    pub cycle: f64,
    /// Wall time of the whole run.
    pub elapsed: f64,
    /// Seconds per operation.
    pub period: f64,
    pub start: f64,
    pub stop: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Primary,
    /// Measures the counted-loop overhead on an empty payload.
    Calibration,
}

/// `Halted` marks an abort in progress; it is never observable after
/// `abort` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum RunFlag {
    #[default]
    Idle,
    Running,
    Halted,
}

/// Everything `reset` restores.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunState {
    pub(crate) count: u64,
    pub(crate) cycles: u64,
    pub(crate) running: RunFlag,
    pub(crate) aborted: bool,
    pub(crate) error: Option<PayloadError>,
    pub(crate) hz: f64,
    pub(crate) stats: Statistics,
    pub(crate) unclockable: bool,
    pub(crate) times: Times,
}

impl RunState {
    fn is_pristine(&self) -> bool {
        self.count == 0
            && self.cycles == 0
            && self.running == RunFlag::Idle
            && !self.aborted
            && self.error.is_none()
            && self.hz == 0.0
            && self.stats == Statistics::default()
            && !self.unclockable
            && self.times == Times::default()
    }
}

pub struct Benchmark {
    id: u64,
    name: String,
    pub(crate) payload: PayloadRef,
    pub(crate) options: BenchOptions,
    kind: Kind,
    /// Sampling clone driven by a primary's session.
    pub(crate) computing: bool,
    /// Calls per cycle the next run starts with; adapts as cycles grow.
    pub(crate) init_run_count: u64,
    /// Cycles fully measured in the current run.
    pub(crate) finished_cycles: u64,
    pub(crate) state: RunState,
    pub(crate) phase: Phase,
    pub(crate) events: EventBus,
    pub(crate) signal: AbortHandle,
}

impl Benchmark {
    pub fn new<F, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoOutcome + 'static,
    {
        Self::with_options(name, f, BenchOptions::default())
    }

    pub fn with_options<F, R>(name: impl Into<String>, f: F, options: BenchOptions) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoOutcome + 'static,
    {
        Self::build(name.into(), PayloadRef::from_fn(f), options, Kind::Primary)
    }

    /// Benchmark a custom [`Payload`] implementation.
    pub fn from_payload(
        name: impl Into<String>,
        payload: Arc<dyn Payload>,
        options: BenchOptions,
    ) -> Self {
        Self::build(name.into(), PayloadRef::new(payload), options, Kind::Primary)
    }

    pub(crate) fn calibration() -> Self {
        Self::build(
            "calibration".to_string(),
            PayloadRef::noop(),
            BenchOptions::default().unroll(false),
            Kind::Calibration,
        )
    }

    fn build(name: String, payload: PayloadRef, options: BenchOptions, kind: Kind) -> Self {
        Self {
            id: next_id(),
            name,
            payload,
            init_run_count: options.init_run_count.max(1),
            options,
            kind,
            computing: false,
            finished_cycles: 0,
            state: RunState::default(),
            phase: Phase::Idle,
            events: EventBus::new(),
            signal: AbortHandle::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &BenchOptions {
        &self.options
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn payload(&self) -> &PayloadRef {
        &self.payload
    }

    /// Calls per cycle of the last cycle.
    pub fn count(&self) -> u64 {
        self.state.count
    }

    pub fn cycles(&self) -> u64 {
        self.state.cycles
    }

    pub fn is_running(&self) -> bool {
        self.state.running == RunFlag::Running
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted
    }

    pub fn error(&self) -> Option<&PayloadError> {
        self.state.error.as_ref()
    }

    /// Operations per second.
    pub fn hz(&self) -> f64 {
        self.state.hz
    }

    pub fn moe(&self) -> f64 {
        self.state.stats.moe
    }

    pub fn rme(&self) -> f64 {
        self.state.stats.rme
    }

    pub fn sd(&self) -> f64 {
        self.state.stats.sd
    }

    pub fn sem(&self) -> f64 {
        self.state.stats.sem
    }

    pub fn stats(&self) -> &Statistics {
        &self.state.stats
    }

    pub fn times(&self) -> &Times {
        &self.state.times
    }

    /// The payload was too fast for the clock to resolve.
    pub fn is_unclockable(&self) -> bool {
        self.state.unclockable
    }

    /// Handle that aborts this benchmark at its next suspension point.
    pub fn abort_handle(&self) -> AbortHandle {
        self.signal.clone()
    }

    /// Order by confidence interval; overlapping intervals are `Equal`.
    pub fn compare(&self, other: &Benchmark) -> Ordering {
        compare_intervals(self.hz(), self.moe(), other.hz(), other.moe())
    }

    /// Stop a running benchmark. No-op otherwise.
    pub fn abort(&mut self) {
        if self.state.running != RunFlag::Running {
            return;
        }
        self.state.running = RunFlag::Halted;
        self.reset();
        self.state.aborted = true;
        self.emit(EventKind::Abort);
    }

    /// Restore run state and statistics; emits `reset` only when something
    /// changed. Aborts first when running.
    pub fn reset(&mut self) {
        if self.state.running == RunFlag::Running {
            self.abort();
            self.state.aborted = false;
            return;
        }
        if self.state.is_pristine() {
            return;
        }
        self.state = RunState::default();
        self.emit(EventKind::Reset);
    }
}

/// Shares payload and options; state is fresh and listeners are not copied.
impl Clone for Benchmark {
    fn clone(&self) -> Self {
        Self {
            id: next_id(),
            name: self.name.clone(),
            payload: self.payload.clone(),
            options: self.options.clone(),
            kind: self.kind,
            computing: false,
            init_run_count: self.init_run_count,
            finished_cycles: 0,
            state: RunState::default(),
            phase: Phase::Idle,
            events: EventBus::new(),
            signal: AbortHandle::new(),
        }
    }
}

impl fmt::Debug for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Benchmark")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("hz", &self.state.hz)
            .field("rme", &self.state.stats.rme)
            .field("cycles", &self.state.cycles)
            .field("running", &self.is_running())
            .field("aborted", &self.state.aborted)
            .field("error", &self.state.error)
            .finish()
    }
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(err) = &self.state.error {
            return write!(f, "{}: {}", self.name, err);
        }
        write!(
            f,
            "{} x {:.2} ops/sec \u{b1}{:.2}% ({} runs sampled)",
            self.name, self.state.hz, self.state.stats.rme, self.state.stats.size
        )
    }
}
