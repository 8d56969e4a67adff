//! Taint findings and the diagnostic message contract.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::location::SourceLocation;

/// One hop of a source-to-sink path, in source-first order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    /// Diagnostic label: `$_GET`, `$name`, `concat`, `Class::method`,
    /// `Class::method#2`.
    pub label: String,
    pub location: SourceLocation,
}

impl PathStep {
    pub fn new(label: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            label: label.into(),
            location,
        }
    }
}

/// A tainted-input finding: an untrusted source reaches a sensitive sink.
///
/// `Display` renders the exact line consumed by diagnostic reporters:
///
/// ```text
/// TaintedInput - file:line:col - Detected tainted sql in path: $_GET (file:4:41) -> ... -> PDO::exec#1 (file:17:36)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Offending category in its annotation spelling (`sql`, `html`, ...).
    pub category: String,
    /// Location of the sink occurrence that was reached.
    pub sink_location: SourceLocation,
    /// Full path, source first, sink last.
    pub path: Vec<PathStep>,
}

impl Finding {
    /// Render the diagnostic line.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TaintedInput - {} - Detected tainted {} in path: ",
            self.sink_location, self.category
        )?;
        for (i, step) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{} ({})", step.label, step.location)?;
        }
        Ok(())
    }
}
