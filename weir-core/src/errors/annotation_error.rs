//! Taint annotation parsing errors.

use super::error_code::{self, WeirErrorCode};

/// Errors from parsing taint directives out of declaration annotations.
#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("Unknown taint directive: {0}")]
    UnknownDirective(String),

    #[error("Unknown taint category: {0}")]
    UnknownCategory(String),

    #[error("Directive {directive} expects a $-prefixed parameter, got {got}")]
    ExpectedParameter { directive: String, got: String },

    #[error("Directive {directive} is missing its {what}")]
    MissingArgument {
        directive: String,
        what: &'static str,
    },
}

impl WeirErrorCode for AnnotationError {
    fn error_code(&self) -> &'static str {
        error_code::ANNOTATION_ERROR
    }
}
