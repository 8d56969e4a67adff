//! Workspace-wide default limits.

/// Maximum node count along one backward search branch before it is abandoned.
pub const DEFAULT_MAX_PATH_DEPTH: usize = 40;

/// Maximum nesting of per-call-site specialization before a call degrades to
/// the shared subgraph.
pub const DEFAULT_MAX_SPECIALIZATION_DEPTH: usize = 10;

/// Config file name looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "weir.toml";
