//! Error types.

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BenchError>;

/// Failure raised by the work under measurement.
///
/// Stored on the benchmark that observed it; `run` never returns it.
#[derive(Error, Debug, Clone)]
pub enum PayloadError {
    #[error("{0}")]
    Failed(Arc<dyn StdError + Send + Sync>),

    #[error("payload panicked: {0}")]
    Panicked(String),
}

impl PayloadError {
    pub fn failed<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::Failed(Arc::from(err.into()))
    }

    pub(crate) fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = panic.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panicked(message)
    }
}

/// Errors from the reporting and baseline surface.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_keep_message_when_wrapping_str() {
        let err = PayloadError::failed("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn should_extract_message_when_panic_carries_string() {
        let panic = std::panic::catch_unwind(|| panic!("bad {}", 42)).unwrap_err();
        let err = PayloadError::from_panic(panic);
        assert_eq!(err.to_string(), "payload panicked: bad 42");
    }
}
