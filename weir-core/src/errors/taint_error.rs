//! Taint engine errors.

use crate::types::Finding;

use super::error_code::{self, WeirErrorCode};

/// Errors raised by a taint run.
///
/// `TaintedInput` is the domain finding itself: under the fail-fast policy
/// the first reachable sink aborts the run with this variant, carrying the
/// full source-to-sink path. Boxed because findings are large relative to
/// the other variants.
#[derive(Debug, thiserror::Error)]
pub enum TaintError {
    #[error("{0}")]
    TaintedInput(Box<Finding>),

    #[error("Analysis cancelled")]
    Cancelled,
}

impl WeirErrorCode for TaintError {
    fn error_code(&self) -> &'static str {
        match self {
            TaintError::TaintedInput(_) => error_code::TAINTED_INPUT,
            TaintError::Cancelled => error_code::CANCELLED,
        }
    }
}
