//! Core building blocks shared across the Weir workspace: interned
//! identifiers, finding types, error enums, configuration, cancellation,
//! and tracing setup.

pub mod config;
pub mod constants;
pub mod errors;
pub mod tracing;
pub mod traits;
pub mod types;

pub use config::{AnalyzerConfig, FindingPolicy, TaintConfig};
pub use errors::{AnnotationError, ConfigError, TaintError, WeirErrorCode};
pub use traits::{Cancellable, CancellationToken};
pub use types::{Finding, PathStep, SourceLocation};
