//! The unit of work under measurement.
//!
//! A payload is invoked either as one straight-line block of repeated calls
//! (monomorphized, no per-call dispatch) or one dynamic call at a time. A
//! payload may end a block early by returning [`Outcome::Done`]; the engine
//! then permanently falls back to per-call loops for it.

use crate::error::PayloadError;
use std::error::Error as StdError;
use std::fmt;
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What a single invocation reported.
#[derive(Debug, Clone)]
pub enum Outcome {
    Continue,
    /// Stop the surrounding block; the invocation itself still counts.
    Done,
    Failed(PayloadError),
}

/// Conversion from a payload's return value.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for () {
    #[inline(always)]
    fn into_outcome(self) -> Outcome {
        Outcome::Continue
    }
}

impl IntoOutcome for Outcome {
    #[inline(always)]
    fn into_outcome(self) -> Outcome {
        self
    }
}

impl IntoOutcome for ControlFlow<()> {
    #[inline(always)]
    fn into_outcome(self) -> Outcome {
        match self {
            ControlFlow::Continue(()) => Outcome::Continue,
            ControlFlow::Break(()) => Outcome::Done,
        }
    }
}

impl<E> IntoOutcome for Result<(), E>
where
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    #[inline(always)]
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(()) => Outcome::Continue,
            Err(err) => Outcome::Failed(PayloadError::failed(err)),
        }
    }
}

/// How a block of calls ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRun {
    Completed,
    Escaped,
}

/// Work that can be measured.
pub trait Payload: Send + Sync {
    /// Invoke once.
    fn call(&self) -> Outcome;

    /// Invoke `width` times back to back.
    ///
    /// Implementations should expand this into straight-line code for the
    /// block widths the planner uses (powers of two up to 64).
    fn call_block(&self, width: u32) -> Result<BlockRun, PayloadError> {
        for _ in 0..width {
            match self.call() {
                Outcome::Continue => {}
                Outcome::Done => return Ok(BlockRun::Escaped),
                Outcome::Failed(err) => return Err(err),
            }
        }
        Ok(BlockRun::Completed)
    }
}

macro_rules! call_once {
    ($f:ident) => {
        match $f().into_outcome() {
            Outcome::Continue => {}
            Outcome::Done => return Ok(BlockRun::Escaped),
            Outcome::Failed(err) => return Err(err),
        }
    };
}

macro_rules! unroll_2 {
    ($f:ident) => {
        call_once!($f);
        call_once!($f);
    };
}

macro_rules! unroll_4 {
    ($f:ident) => {
        unroll_2!($f);
        unroll_2!($f);
    };
}

macro_rules! unroll_8 {
    ($f:ident) => {
        unroll_4!($f);
        unroll_4!($f);
    };
}

macro_rules! unroll_16 {
    ($f:ident) => {
        unroll_8!($f);
        unroll_8!($f);
    };
}

macro_rules! unroll_32 {
    ($f:ident) => {
        unroll_16!($f);
        unroll_16!($f);
    };
}

macro_rules! unroll_64 {
    ($f:ident) => {
        unroll_32!($f);
        unroll_32!($f);
    };
}

/// A closure payload.
pub struct FnPayload<F, R> {
    f: F,
    _ret: PhantomData<fn() -> R>,
}

impl<F, R> FnPayload<F, R> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _ret: PhantomData,
        }
    }
}

impl<F, R> Payload for FnPayload<F, R>
where
    F: Fn() -> R + Send + Sync,
    R: IntoOutcome,
{
    #[inline(always)]
    fn call(&self) -> Outcome {
        (self.f)().into_outcome()
    }

    fn call_block(&self, width: u32) -> Result<BlockRun, PayloadError> {
        let f = &self.f;
        match width {
            64 => {
                unroll_64!(f);
            }
            32 => {
                unroll_32!(f);
            }
            16 => {
                unroll_16!(f);
            }
            8 => {
                unroll_8!(f);
            }
            4 => {
                unroll_4!(f);
            }
            2 => {
                unroll_2!(f);
            }
            _ => {
                for _ in 0..width {
                    call_once!(f);
                }
            }
        }
        Ok(BlockRun::Completed)
    }
}

/// The empty payload used for calibration.
pub(crate) struct Noop;

impl Payload for Noop {
    #[inline(always)]
    fn call(&self) -> Outcome {
        Outcome::Continue
    }
}

static NEXT_PAYLOAD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a payload; clones of a benchmark share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadId(u64);

/// Shared handle to a payload and its identity.
#[derive(Clone)]
pub struct PayloadRef {
    id: PayloadId,
    inner: Arc<dyn Payload>,
}

impl PayloadRef {
    pub fn new(payload: Arc<dyn Payload>) -> Self {
        Self {
            id: PayloadId(NEXT_PAYLOAD_ID.fetch_add(1, Ordering::Relaxed)),
            inner: payload,
        }
    }

    pub fn from_fn<F, R>(f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoOutcome + 'static,
    {
        Self::new(Arc::new(FnPayload::new(f)))
    }

    pub(crate) fn noop() -> Self {
        Self::new(Arc::new(Noop))
    }

    pub fn id(&self) -> PayloadId {
        self.id
    }

    pub(crate) fn get(&self) -> &dyn Payload {
        &*self.inner
    }
}

impl fmt::Debug for PayloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PayloadRef").field(&self.id.0).finish()
    }
}
