//! Configuration system for Weir.
//! TOML-based, 3-layer resolution: env > project file > defaults.

pub mod analyzer_config;

pub use analyzer_config::{AnalyzerConfig, FindingPolicy, TaintConfig};
