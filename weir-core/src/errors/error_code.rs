//! Stable error codes for embedding hosts and log aggregation.

/// Trait mapping every error enum to a structured code string.
pub trait WeirErrorCode {
    /// Returns the stable error code (e.g., "TAINTED_INPUT").
    fn error_code(&self) -> &'static str;

    /// Returns the formatted string `[ERROR_CODE] message`.
    fn coded_string(&self) -> String
    where
        Self: std::fmt::Display,
    {
        format!("[{}] {}", self.error_code(), self)
    }
}

// Error code constants.
pub const TAINTED_INPUT: &str = "TAINTED_INPUT";
pub const CANCELLED: &str = "CANCELLED";
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
pub const ANNOTATION_ERROR: &str = "ANNOTATION_ERROR";
