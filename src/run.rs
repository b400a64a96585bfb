//! Run state machine.
//!
//! A run is a sequence of steps. Each step does a bounded amount of work (one
//! timed cycle, one calibration step, or one session decision) and reports
//! whether more steps follow. The synchronous driver loops over steps; the
//! async driver sleeps `cycle_delay` between them and wakes early on abort.

use crate::benchmark::{Benchmark, Kind, RunFlag};
use crate::calibration::CalibrationStep;
use crate::context::{Context, CycleResult};
use crate::error::PayloadError;
use crate::events::EventKind;
use crate::plan::Strategy;
use crate::session::Session;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Next count for clocked-zero cycles, indexed by cycle number.
/// A divisor of 0 yields an infinite count, i.e. unclockable.
fn cycle_divisor(cycles: u64) -> Option<f64> {
    match cycles {
        1 => Some(4096.0),
        2 => Some(512.0),
        3 => Some(64.0),
        4 => Some(8.0),
        5 => Some(0.0),
        _ => None,
    }
}

/// Counts above this are treated as unmeasurable.
pub const MAX_RUN_COUNT: f64 = 1e12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Yield,
    Done,
}

pub(crate) enum Phase {
    Idle,
    /// A primary collecting samples through clones.
    Sampling(Box<Session>),
    /// A clone between cycles; holds a clocked result while calibration
    /// catches up.
    Cycling { pending: Option<CycleResult> },
}

#[derive(Debug, Default)]
struct Signal {
    requested: AtomicBool,
    #[cfg(feature = "async")]
    notify: tokio::sync::Notify,
}

/// Cooperative cancellation token for a running benchmark.
///
/// Cloneable and usable from any thread; the benchmark aborts at its next
/// suspension point.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    inner: Arc<Signal>,
}

impl AbortHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        #[cfg(feature = "async")]
        self.inner.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.inner.requested.swap(false, Ordering::SeqCst)
    }

    #[cfg(feature = "async")]
    async fn requested(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}

impl Benchmark {
    /// Run to completion on the calling thread.
    pub fn run(&mut self, ctx: &mut Context) {
        self.begin(ctx);
        while self.step(ctx) == Step::Yield {}
    }

    /// Run to completion, sleeping `cycle_delay` between steps.
    #[cfg(feature = "async")]
    pub async fn run_async(&mut self, ctx: &mut Context) {
        let delay = self.options().cycle_delay;
        let signal = self.abort_handle();
        self.begin(ctx);
        while self.step(ctx) == Step::Yield {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = signal.requested() => {}
            }
        }
    }

    pub(crate) fn begin(&mut self, ctx: &mut Context) {
        self.phase = Phase::Idle;
        self.state.running = RunFlag::Idle;
        self.reset();
        self.signal.take();
        self.finished_cycles = 0;

        self.state.running = RunFlag::Running;
        self.state.count = self.init_run_count;
        self.state.times.start = ctx.now();
        self.emit(EventKind::Start);

        self.phase = if self.computing {
            Phase::Cycling { pending: None }
        } else {
            Phase::Sampling(Box::new(Session::new(self, ctx)))
        };
    }

    /// Advance by one step.
    pub(crate) fn step(&mut self, ctx: &mut Context) -> Step {
        if self.signal.take() {
            self.abort();
        }
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => Step::Done,
            Phase::Sampling(mut session) => {
                let step = session.step(self, ctx);
                if step == Step::Yield {
                    self.phase = Phase::Sampling(session);
                }
                step
            }
            Phase::Cycling { pending } => self.step_cycle(pending, ctx),
        }
    }

    fn complete(&mut self) -> Step {
        self.emit(EventKind::Complete);
        Step::Done
    }

    pub(crate) fn fail(&mut self, err: PayloadError) {
        self.abort();
        self.state.error = Some(err);
        self.emit(EventKind::Error);
    }

    fn needs_calibration(&self, ctx: &Context) -> bool {
        self.kind() != Kind::Calibration
            && matches!(
                ctx.strategy(self.payload.id()),
                Some(Strategy::Hybrid | Strategy::Looped)
            )
            && !ctx.is_calibrated()
    }

    fn step_cycle(&mut self, pending: Option<CycleResult>, ctx: &mut Context) -> Step {
        if !self.is_running() {
            return self.complete();
        }

        let result = match pending {
            Some(result) => result,
            None => {
                self.state.cycles += 1;
                let count = self.state.count;
                let clocked = ctx.clock_cycle(&self.payload, count, &self.options);
                match clocked {
                    Ok(result) if !self.needs_calibration(ctx) => {
                        return self.finish_cycle(result, ctx);
                    }
                    Ok(result) => result,
                    Err(err) => {
                        self.fail(err);
                        return self.complete();
                    }
                }
            }
        };

        match ctx.step_calibration() {
            CalibrationStep::Pending => {
                self.phase = Phase::Cycling {
                    pending: Some(result),
                };
                Step::Yield
            }
            CalibrationStep::Aborted => {
                warn!(name = self.name(), "calibration aborted");
                self.abort();
                self.complete()
            }
            CalibrationStep::Ready => self.finish_cycle(result, ctx),
        }
    }

    /// Correct the cycle for overhead, derive `hz`, pick the next count.
    fn finish_cycle(&mut self, result: CycleResult, ctx: &mut Context) -> Step {
        let id = self.payload.id();
        let count = self.state.count as f64;
        let min_time = self
            .options()
            .min_time
            .map_or_else(|| ctx.min_time(), |t| t.as_secs_f64());

        let overhead = match self.kind() {
            Kind::Calibration => 0.0,
            Kind::Primary => {
                ctx.calibration_period(self.options().calibration_index, ctx.strategy(id))
            }
        };
        let mut clocked = (result.time - overhead * result.looped as f64).max(0.0);
        self.state.times.cycle = clocked;

        // Within 10% of the resolution the reading is noise.
        let res = ctx.resolution();
        if clocked.min(res) / clocked.max(res) > 0.9 {
            clocked = 0.0;
        }

        let period = clocked / count;
        self.state.times.period = period;
        self.state.hz = 1.0 / period;
        self.init_run_count = self.state.count;

        let mut next = count;
        let mut more = !ctx.is_unclockable(id) && clocked < min_time;
        if more {
            if clocked == 0.0 {
                if let Some(divisor) = cycle_divisor(self.state.cycles) {
                    next = (4e6 / divisor).floor();
                }
            }
            if next <= count {
                next += ((min_time - clocked) / period).ceil();
            }
            if !next.is_finite() || next > MAX_RUN_COUNT {
                warn!(name = self.name(), "payload too fast to clock, giving up");
                ctx.mark_unclockable(id);
                more = false;
            }
        }
        if !more {
            self.state.running = RunFlag::Idle;
        }
        self.finished_cycles += 1;

        trace!(
            name = self.name(),
            cycle = self.state.cycles,
            count = self.state.count,
            clocked,
            next,
            "cycle"
        );

        if !self.emit(EventKind::Cycle) {
            self.abort();
        }
        if self.is_running() {
            self.state.count = next as u64;
            self.phase = Phase::Cycling { pending: None };
            Step::Yield
        } else {
            self.complete()
        }
    }
}
