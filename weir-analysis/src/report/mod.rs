//! Finding reporters.
//!
//! Each reporter renders the check phase's findings into one output
//! format: terminal lines, structured JSON, or SARIF 2.1.0 for code
//! scanning integrations.

pub mod json;
pub mod sarif;
pub mod text;

pub use json::JsonReporter;
pub use sarif::SarifReporter;
pub use text::TextReporter;

use weir_core::Finding;

/// Renders findings into one complete output document.
pub trait Reporter {
    /// Short format name, usable as a flag value.
    fn name(&self) -> &'static str;

    fn generate(&self, findings: &[Finding]) -> Result<String, String>;
}

/// Look up a reporter by its format name.
pub fn reporter_for(name: &str) -> Option<Box<dyn Reporter>> {
    match name {
        "text" => Some(Box::new(TextReporter)),
        "json" => Some(Box::new(JsonReporter)),
        "sarif" => Some(Box::new(SarifReporter::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_lookup() {
        assert_eq!(reporter_for("text").unwrap().name(), "text");
        assert_eq!(reporter_for("json").unwrap().name(), "json");
        assert_eq!(reporter_for("sarif").unwrap().name(), "sarif");
        assert!(reporter_for("xml").is_none());
    }
}
