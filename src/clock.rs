//! Clock capability used to time cycles.
//!
//! The engine only needs a monotonic reading and the smallest interval the
//! source can resolve. The resolution drives `MIN_TIME`, the shortest cycle
//! whose quantization error stays under 1%.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic time source with a known minimum resolution.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;

    /// Smallest non-zero difference between two readings.
    fn resolution(&self) -> Duration;
}

/// Number of spin probes used to estimate resolution (minimum is kept).
const RESOLUTION_PROBES: usize = 16;

/// `std::time::Instant` with a probed resolution.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    resolution: Duration,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            resolution: probe_resolution(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline(always)]
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn resolution(&self) -> Duration {
        self.resolution
    }
}

/// Spin until the clock ticks, several times, and keep the smallest step.
fn probe_resolution() -> Duration {
    (0..RESOLUTION_PROBES)
        .map(|_| {
            let start = Instant::now();
            loop {
                let step = start.elapsed();
                if step > Duration::ZERO {
                    break step;
                }
            }
        })
        .min()
        .unwrap_or(Duration::from_nanos(1))
}

/// A clock that only moves when told to.
///
/// Payloads can advance it to simulate a known per-call cost, which makes
/// the sampling protocol fully deterministic in tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
    resolution: Duration,
}

impl ManualClock {
    pub fn new(resolution: Duration) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(0)),
            resolution,
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }

    fn resolution(&self) -> Duration {
        self.resolution
    }
}

/// Shortest cycle (seconds) that keeps the clock's quantization error at 1%.
///
/// Values above 0.7s are rounded up to one decimal.
pub fn min_time_for(resolution: Duration) -> f64 {
    let time = resolution.as_secs_f64() / 2.0 / 0.01;
    if time > 0.7 {
        ((time + 1e-3) * 10.0).round() / 10.0
    } else {
        time
    }
}
