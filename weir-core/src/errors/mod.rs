//! Error handling for Weir.
//! One error enum per subsystem, `thiserror` only, zero `anyhow`.

pub mod annotation_error;
pub mod config_error;
pub mod error_code;
pub mod taint_error;

pub use annotation_error::AnnotationError;
pub use config_error::ConfigError;
pub use error_code::WeirErrorCode;
pub use taint_error::TaintError;
