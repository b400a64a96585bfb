//! Measurement context shared by every benchmark run through it.
//!
//! Holds the clock, the derived minimum cycle time, per-payload execution
//! state (strategy, unclockable flag, compiled plan cache) and the
//! calibration benchmarks. Drivers borrow it mutably for the whole run, so
//! benchmarks never share it concurrently.

use crate::calibration::Calibrations;
use crate::clock::{min_time_for, Clock, MonotonicClock};
use crate::config::BenchOptions;
use crate::error::PayloadError;
use crate::payload::{PayloadId, PayloadRef};
use crate::plan::{self, PayloadState, Strategy};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one timed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CycleResult {
    /// Seconds spent executing the cycle.
    pub time: f64,
    /// Counted-loop iterations performed.
    pub looped: u64,
}

pub struct Context {
    clock: Arc<dyn Clock>,
    resolution: f64,
    min_time: f64,
    payloads: HashMap<PayloadId, PayloadState>,
    pub(crate) calibrations: Calibrations,
}

impl Context {
    /// Context on the monotonic system clock.
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::new())
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self::with_shared_clock(Arc::new(clock))
    }

    pub fn with_shared_clock(clock: Arc<dyn Clock>) -> Self {
        let resolution = clock.resolution();
        debug!(resolution_ns = resolution.as_nanos() as u64, "measurement context created");
        Self {
            resolution: resolution.as_secs_f64(),
            min_time: min_time_for(resolution),
            clock,
            payloads: HashMap::new(),
            calibrations: Calibrations::standard(),
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    /// Current clock reading in seconds.
    pub fn now(&self) -> f64 {
        self.clock.now().as_secs_f64()
    }

    /// Clock resolution in seconds.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Shortest cycle, in seconds, for a 1% quantization error.
    pub fn min_time(&self) -> f64 {
        self.min_time
    }

    /// True once every calibration benchmark completed at least one cycle.
    pub fn is_calibrated(&self) -> bool {
        self.calibrations.is_calibrated()
    }

    /// Discard calibration results so the next looped payload recalibrates.
    pub fn reset_calibration(&mut self) {
        self.calibrations.reset();
    }

    /// Execution strategy recorded for a payload, if probed.
    pub fn strategy(&self, id: PayloadId) -> Option<Strategy> {
        self.payloads.get(&id).and_then(|s| s.strategy)
    }

    pub fn is_unclockable(&self, id: PayloadId) -> bool {
        self.payloads.get(&id).is_some_and(|s| s.unclockable)
    }

    /// Drop the cached plan of a payload.
    pub fn clear_compiled(&mut self, id: PayloadId) {
        if let Some(state) = self.payloads.get_mut(&id) {
            state.compiled = None;
        }
    }

    pub(crate) fn mark_unclockable(&mut self, id: PayloadId) {
        let state = self.payloads.entry(id).or_default();
        state.unclockable = true;
        state.compiled = None;
    }

    /// Put the session-scoped flags of a payload back. An early-exit
    /// downgrade is permanent.
    pub(crate) fn restore_payload(
        &mut self,
        id: PayloadId,
        strategy: Option<Strategy>,
        unclockable: bool,
    ) {
        let state = self.payloads.entry(id).or_default();
        if !state.escaped {
            state.strategy = strategy;
        }
        state.unclockable = unclockable;
        state.compiled = None;
    }

    /// Overhead period to subtract per counted-loop iteration.
    pub(crate) fn calibration_period(&self, index: usize, strategy: Option<Strategy>) -> f64 {
        let index = if index > 0 {
            index
        } else if strategy != Some(Strategy::Unrolled) {
            0
        } else {
            return 0.0;
        };
        match self.calibrations.period(index) {
            Some(period) => period,
            None => {
                warn!(index, "no calibration benchmark at index, overhead not subtracted");
                0.0
            }
        }
    }

    /// Execute and time one cycle of `count` calls.
    pub(crate) fn clock_cycle(
        &mut self,
        payload: &PayloadRef,
        count: u64,
        options: &BenchOptions,
    ) -> Result<CycleResult, PayloadError> {
        let state = self.payloads.entry(payload.id()).or_default();
        if state.unclockable {
            return Ok(CycleResult::default());
        }
        if !options.unroll {
            state.strategy = Some(Strategy::Looped);
        }
        if state.strategy.is_none() {
            let probed = plan::probe(payload.get())?;
            if probed == Strategy::Looped {
                debug!(payload = ?payload.id(), "payload exits early, using counted loop");
                state.escaped = true;
            }
            state.strategy = Some(probed);
        }

        let compiled = plan::compile(state, count, options.unroll_limit);
        let timed = plan::execute(payload.get(), &compiled, &*self.clock)?;
        if !timed.escaped {
            return Ok(CycleResult {
                time: timed.seconds,
                looped: compiled.looped(),
            });
        }

        debug!(payload = ?payload.id(), "payload escaped unrolled block, downgrading to counted loop");
        state.downgrade();
        let looped = plan::compile(state, count, options.unroll_limit);
        let timed = plan::execute(payload.get(), &looped, &*self.clock)?;
        Ok(CycleResult {
            time: timed.seconds,
            looped: looped.looped(),
        })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
