//! Loop amortization: turning "call the payload `count` times" into a timed
//! execution plan.
//!
//! Fast payloads are dominated by loop and dispatch overhead, so the planner
//! prefers straight-line blocks of monomorphized calls. Plans are cached per
//! payload and extended incrementally as the count grows. Counts beyond the
//! unroll limit use a hybrid of a counted outer loop over an unrolled body.
//! Payloads that cannot be unrolled go through a plain counted loop whose
//! overhead the calibration benchmarks measure.

use crate::clock::Clock;
use crate::error::PayloadError;
use crate::payload::{BlockRun, Outcome, Payload};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};

/// How a payload's cycles are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Unrolled,
    Hybrid,
    Looped,
}

/// Block widths, widest first.
const BLOCK_WIDTHS: [u32; 7] = [64, 32, 16, 8, 4, 2, 1];

/// Append blocks summing to `count` calls.
fn decompose(count: u64, out: &mut Vec<u32>) {
    let mut rest = count;
    for width in BLOCK_WIDTHS {
        while rest >= u64::from(width) {
            out.push(width);
            rest -= u64::from(width);
        }
    }
}

fn calls(blocks: &[u32]) -> u64 {
    blocks.iter().map(|&w| u64::from(w)).sum()
}

/// Cached straight-line body for a payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledBody {
    pub(crate) count: u64,
    pub(crate) blocks: Vec<u32>,
}

/// Per-payload execution state, shared by every benchmark of the payload.
#[derive(Debug, Clone, Default)]
pub(crate) struct PayloadState {
    /// `None` until the payload has been probed.
    pub(crate) strategy: Option<Strategy>,
    pub(crate) unclockable: bool,
    /// Set once the payload escaped an unrolled block; never cleared.
    pub(crate) escaped: bool,
    pub(crate) compiled: Option<CompiledBody>,
}

impl PayloadState {
    pub(crate) fn downgrade(&mut self) {
        self.strategy = Some(Strategy::Looped);
        self.escaped = true;
        self.compiled = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExecutionPlan {
    Unrolled {
        blocks: Vec<u32>,
    },
    Hybrid {
        rounds: u64,
        body: Vec<u32>,
        tail: Vec<u32>,
    },
    Looped {
        count: u64,
    },
}

impl ExecutionPlan {
    /// Counted-loop iterations whose overhead calibration accounts for.
    pub(crate) fn looped(&self) -> u64 {
        match self {
            Self::Unrolled { .. } => 0,
            Self::Hybrid { rounds, .. } => *rounds,
            Self::Looped { count } => *count,
        }
    }

    #[cfg(test)]
    fn calls(&self) -> u64 {
        match self {
            Self::Unrolled { blocks } => calls(blocks),
            Self::Hybrid { rounds, body, tail } => rounds * calls(body) + calls(tail),
            Self::Looped { count } => *count,
        }
    }
}

/// Build the plan for `count` calls, updating the payload's cache.
pub(crate) fn compile(state: &mut PayloadState, count: u64, limit: u64) -> ExecutionPlan {
    if state.strategy == Some(Strategy::Looped) {
        return ExecutionPlan::Looped { count };
    }
    let limit = limit.max(1);

    if let Some(body) = &state.compiled {
        if body.count == count {
            return ExecutionPlan::Unrolled {
                blocks: body.blocks.clone(),
            };
        }
    }

    if count <= limit {
        let mut blocks = Vec::new();
        match &state.compiled {
            Some(last) if last.count > 0 && last.count < count => {
                let repeat = count / last.count;
                for _ in 0..repeat {
                    blocks.extend_from_slice(&last.blocks);
                }
                decompose(count - repeat * last.count, &mut blocks);
            }
            _ => decompose(count, &mut blocks),
        }
        state.compiled = Some(CompiledBody {
            count,
            blocks: blocks.clone(),
        });
        return ExecutionPlan::Unrolled { blocks };
    }

    state.strategy = Some(Strategy::Hybrid);

    // Grow the body from the cached plan towards 75% of the limit.
    let most = (limit * 3 / 4).max(1);
    let mut body = match &state.compiled {
        Some(last) if last.count > 0 && last.count <= most => {
            let mut body = Vec::new();
            for _ in 0..most / last.count {
                body.extend_from_slice(&last.blocks);
            }
            body
        }
        _ => Vec::new(),
    };
    let filled = calls(&body);
    decompose(most - filled, &mut body);

    let per_round = calls(&body);
    let rounds = count / per_round;
    let mut tail = Vec::new();
    decompose(count - rounds * per_round, &mut tail);

    ExecutionPlan::Hybrid { rounds, body, tail }
}

/// Measured outcome of executing a plan.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timed {
    pub(crate) seconds: f64,
    pub(crate) escaped: bool,
}

fn run_blocks(payload: &dyn Payload, blocks: &[u32]) -> Result<BlockRun, PayloadError> {
    for &width in blocks {
        if payload.call_block(width)? == BlockRun::Escaped {
            return Ok(BlockRun::Escaped);
        }
    }
    Ok(BlockRun::Completed)
}

/// Execute a plan between two clock readings. Panics become errors.
pub(crate) fn execute(
    payload: &dyn Payload,
    plan: &ExecutionPlan,
    clock: &dyn Clock,
) -> Result<Timed, PayloadError> {
    let timed = || -> Result<Timed, PayloadError> {
        let start = clock.now();
        let ran = match plan {
            ExecutionPlan::Unrolled { blocks } => run_blocks(payload, blocks)?,
            ExecutionPlan::Hybrid { rounds, body, tail } => {
                let mut ran = BlockRun::Completed;
                for _ in 0..*rounds {
                    ran = run_blocks(payload, body)?;
                    if ran == BlockRun::Escaped {
                        break;
                    }
                }
                if ran == BlockRun::Completed {
                    ran = run_blocks(payload, tail)?;
                }
                ran
            }
            ExecutionPlan::Looped { count } => {
                for _ in 0..*count {
                    if let Outcome::Failed(err) = payload.call() {
                        return Err(err);
                    }
                }
                BlockRun::Completed
            }
        };
        let stop = clock.now();

        Ok(Timed {
            seconds: stop.saturating_sub(start).as_secs_f64(),
            escaped: ran == BlockRun::Escaped,
        })
    };

    match panic::catch_unwind(AssertUnwindSafe(timed)) {
        Ok(result) => result,
        Err(panic) => Err(PayloadError::from_panic(panic)),
    }
}

/// Probe a payload of unknown strategy with a single unrolled call.
pub(crate) fn probe(payload: &dyn Payload) -> Result<Strategy, PayloadError> {
    match panic::catch_unwind(AssertUnwindSafe(|| payload.call_block(1))) {
        Ok(Ok(BlockRun::Completed)) => Ok(Strategy::Unrolled),
        Ok(Ok(BlockRun::Escaped)) => Ok(Strategy::Looped),
        Ok(Err(err)) => Err(err),
        Err(panic) => Err(PayloadError::from_panic(panic)),
    }
}
