//! Calibration benchmarks: the overhead of the plain counted loop, measured
//! on an empty payload and subtracted from looped cycles.

use crate::benchmark::Benchmark;
use crate::context::Context;
use crate::run::{Phase, Step};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CalibrationStep {
    /// More steps are needed.
    Pending,
    Ready,
    Aborted,
}

pub(crate) struct Calibrations {
    benches: Vec<Benchmark>,
}

impl Calibrations {
    pub(crate) fn standard() -> Self {
        Self {
            benches: vec![Benchmark::calibration()],
        }
    }

    pub(crate) fn is_calibrated(&self) -> bool {
        self.benches.iter().all(|b| b.cycles() > 0)
    }

    pub(crate) fn period(&self, index: usize) -> Option<f64> {
        self.benches.get(index).map(|b| b.times().period)
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::standard();
    }

    /// Abort calibrations that are mid-run and drop their sessions.
    pub(crate) fn abort_running(&mut self) {
        for bench in self.benches.iter_mut().filter(|b| b.is_running()) {
            debug!(name = bench.name(), "aborting in-flight calibration");
            bench.abort();
            bench.phase = Phase::Idle;
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, index: usize) -> Option<&Benchmark> {
        self.benches.get(index)
    }
}

impl Context {
    /// Advance the calibration set by one step.
    pub(crate) fn step_calibration(&mut self) -> CalibrationStep {
        let mut benches = std::mem::take(&mut self.calibrations.benches);
        let step = loop {
            let Some(cal) = benches
                .iter_mut()
                .find(|b| b.is_running() || b.cycles() == 0)
            else {
                break CalibrationStep::Ready;
            };

            if !cal.is_running() {
                info!(name = cal.name(), "calibrating loop overhead");
                cal.begin(self);
            }
            match cal.step(self) {
                Step::Yield => break CalibrationStep::Pending,
                Step::Done if cal.is_aborted() || cal.cycles() == 0 => {
                    break CalibrationStep::Aborted
                }
                Step::Done => {
                    debug!(
                        name = cal.name(),
                        period = cal.times().period,
                        "calibration complete"
                    );
                }
            }
        };
        self.calibrations.benches = benches;
        step
    }

    /// Abort in-flight calibrations.
    pub(crate) fn abort_calibrations(&mut self) {
        self.calibrations.abort_running();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    #[test]
    fn should_start_uncalibrated() {
        let cals = Calibrations::standard();
        assert!(!cals.is_calibrated());
        assert_eq!(cals.period(0), Some(0.0));
        assert_eq!(cals.period(1), None);
    }

    #[test]
    fn should_calibrate_when_stepped_to_completion() {
        let mut ctx = Context::with_clock(ManualClock::new(Duration::from_nanos(100)));
        let mut steps = 0;
        while ctx.step_calibration() == CalibrationStep::Pending {
            steps += 1;
            assert!(steps < 10_000, "calibration did not converge");
        }

        assert!(ctx.is_calibrated());
        let cal = ctx.calibrations.get(0).unwrap();
        assert!(!cal.is_running());
        // A frozen clock cannot resolve the empty loop.
        assert!(cal.is_unclockable());
        assert!(ctx.calibration_period(0, None) >= 0.0);
    }

    #[test]
    fn should_recalibrate_when_reset() {
        let mut ctx = Context::with_clock(ManualClock::new(Duration::from_nanos(100)));
        while ctx.step_calibration() == CalibrationStep::Pending {}
        assert!(ctx.is_calibrated());

        ctx.reset_calibration();
        assert!(!ctx.is_calibrated());
    }
}
