//! Sampling session of a primary benchmark.
//!
//! The primary never times anything itself. It runs a queue of clones one
//! after another; every completed clone contributes its `hz` to the sample.
//! After each clone the session decides whether the margin of error is good
//! enough, whether more clones are needed, or whether the payload changed
//! execution strategy and the sample must start over.

use crate::benchmark::{Benchmark, Kind, RunFlag};
use crate::context::Context;
use crate::events::EventKind;
use crate::plan::Strategy;
use crate::run::Step;
use crate::stats::{self, Statistics, Verdict};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Clones queued when a session starts or restarts.
pub const INIT_SAMPLE_SIZE: usize = 5;

pub(crate) struct Session {
    queue: VecDeque<Benchmark>,
    current: Option<Benchmark>,
    sample: Vec<f64>,
    /// Strategy the sample was taken under.
    strategy: Option<Strategy>,
    calibrated: bool,
    calibrating: bool,
    last_finite_hz: f64,
    init_run_count: u64,
    init_strategy: Option<Strategy>,
    init_unclockable: bool,
}

impl Session {
    pub(crate) fn new(host: &mut Benchmark, ctx: &mut Context) -> Self {
        let id = host.payload.id();
        let mut session = Self {
            queue: VecDeque::new(),
            current: None,
            sample: Vec::new(),
            strategy: ctx.strategy(id),
            calibrated: ctx.is_calibrated(),
            calibrating: host.kind() == Kind::Calibration,
            last_finite_hz: 0.0,
            init_run_count: host.init_run_count,
            init_strategy: ctx.strategy(id),
            init_unclockable: ctx.is_unclockable(id),
        };
        session.restart(host, ctx);
        session
    }

    pub(crate) fn step(&mut self, host: &mut Benchmark, ctx: &mut Context) -> Step {
        if !host.is_running() {
            return self.finish(host, ctx);
        }

        let mut clone = match self.current.take() {
            Some(clone) => clone,
            None => match self.queue.pop_front() {
                Some(mut clone) => {
                    self.start_clone(host, &mut clone, ctx);
                    clone
                }
                None => return self.finish(host, ctx),
            },
        };

        let measured = clone.finished_cycles;
        let step = clone.step(ctx);
        self.observe(host, &clone, measured);

        match step {
            Step::Yield => {
                self.current = Some(clone);
                Step::Yield
            }
            Step::Done => self.clone_complete(host, clone, ctx),
        }
    }

    fn start_clone(&mut self, host: &mut Benchmark, clone: &mut Benchmark, ctx: &mut Context) {
        // Time spent calibrating does not count against the budget.
        if !self.calibrating && !self.calibrated && ctx.is_calibrated() {
            self.calibrated = true;
            host.state.times.start = ctx.now();
        }
        clone.init_run_count = host.init_run_count;
        clone.begin(ctx);
    }

    /// Mirror a clone's progress on the host.
    fn observe(&mut self, host: &mut Benchmark, clone: &Benchmark, measured: u64) {
        if !host.is_running() {
            return;
        }
        if clone.finished_cycles > measured {
            host.state.count = clone.count();
            host.state.cycles += 1;
            host.state.hz = clone.hz();
            host.state.times.period = clone.times().period;
            if clone.hz().is_finite() {
                self.last_finite_hz = clone.hz();
            }
            if !host.emit(EventKind::Cycle) {
                host.abort();
            }
        } else if let Some(err) = clone.error() {
            host.fail(err.clone());
        }
    }

    fn clone_complete(&mut self, host: &mut Benchmark, clone: Benchmark, ctx: &mut Context) -> Step {
        let id = host.payload.id();
        host.init_run_count = clone.init_run_count;
        if self.strategy.is_none() {
            self.strategy = ctx.strategy(id);
        }

        if clone.is_aborted() && clone.error().is_none() && host.is_running() {
            debug!(name = host.name(), "sampling clone aborted, aborting benchmark");
            host.abort();
        }
        let unclockable = ctx.is_unclockable(id);
        if unclockable {
            self.queue.clear();
        }
        if !host.is_running() {
            return self.finish(host, ctx);
        }

        let strategy = ctx.strategy(id);
        if strategy != self.strategy {
            debug!(
                name = host.name(),
                from = ?self.strategy,
                to = ?strategy,
                "execution strategy changed, restarting sample"
            );
            self.strategy = strategy;
            host.state.times.start = ctx.now();
            self.restart(host, ctx);
            return Step::Yield;
        }

        self.sample.push(clone.hz());
        if !self.queue.is_empty() && self.sample.len() <= INIT_SAMPLE_SIZE {
            return Step::Yield;
        }

        let stats = Statistics::from_sample(&self.sample);
        let elapsed = ctx.now() - host.state.times.start;
        let verdict = if unclockable || self.sample.len() >= host.options.max_sample_size {
            Verdict::Finalize
        } else {
            stats::verdict(
                &stats,
                elapsed,
                host.options.max_time_elapsed.as_secs_f64(),
                self.calibrating,
                self.queue.len(),
            )
        };

        match verdict {
            Verdict::Continue { enqueue } => {
                if enqueue > 0 {
                    debug!(
                        name = host.name(),
                        rme = stats.rme,
                        samples = stats.size,
                        enqueue,
                        "margin of error too wide, sampling more"
                    );
                }
                self.enqueue(host, enqueue);
                Step::Yield
            }
            Verdict::Finalize => {
                self.finalize(host, &stats, &clone, ctx);
                self.finish(host, ctx)
            }
        }
    }

    fn finalize(&self, host: &mut Benchmark, stats: &Statistics, last: &Benchmark, ctx: &Context) {
        let now = ctx.now();
        let state = &mut host.state;
        state.stats = *stats;
        state.count = last.count();
        state.running = RunFlag::Idle;
        state.times.stop = now;
        state.times.elapsed = now - state.times.start;

        if ctx.is_unclockable(host.payload.id()) {
            state.unclockable = true;
            state.hz = 0.0;
            state.stats.mean = 0.0;
            state.times.period = 0.0;
            state.times.cycle = 0.0;
        } else if self.sample.iter().all(|hz| hz.is_finite()) {
            state.hz = stats.mean;
            state.times.period = if stats.mean > 0.0 { 1.0 / stats.mean } else { 0.0 };
            state.times.cycle = state.times.period * state.count as f64;
        } else {
            state.hz = self.last_finite_hz;
            state.stats.mean = state.hz;
            state.times.period = if state.hz > 0.0 { 1.0 / state.hz } else { 0.0 };
        }

        info!(
            name = host.name(),
            hz = host.hz(),
            rme = host.rme(),
            samples = stats.size,
            "benchmark complete"
        );
    }

    /// Tear the session down and emit `complete`.
    fn finish(&mut self, host: &mut Benchmark, ctx: &mut Context) -> Step {
        let id = host.payload.id();
        if let Some(mut clone) = self.current.take() {
            clone.abort();
        }
        if host.is_aborted() && host.kind() != Kind::Calibration {
            ctx.abort_calibrations();
        }
        if host.is_running() {
            host.state.running = RunFlag::Idle;
        }

        self.queue.clear();
        self.sample.clear();
        ctx.restore_payload(id, self.init_strategy, self.init_unclockable);
        host.init_run_count = self.init_run_count;

        host.emit(EventKind::Complete);
        Step::Done
    }

    fn restart(&mut self, host: &mut Benchmark, ctx: &mut Context) {
        host.state.cycles = 0;
        host.init_run_count = self.init_run_count;
        self.queue.clear();
        self.sample.clear();
        self.current = None;
        ctx.clear_compiled(host.payload.id());
        self.enqueue(host, INIT_SAMPLE_SIZE);
    }

    fn enqueue(&mut self, host: &Benchmark, n: usize) {
        let room = host
            .options
            .max_sample_size
            .saturating_sub(self.sample.len() + self.queue.len());
        for _ in 0..n.min(room) {
            let mut clone = host.clone();
            clone.computing = true;
            self.queue.push_back(clone);
        }
    }
}
