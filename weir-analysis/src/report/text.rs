//! Text reporter: the message-contract line per finding, nothing else.

use weir_core::Finding;

use super::Reporter;

pub struct TextReporter;

impl Reporter for TextReporter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn generate(&self, findings: &[Finding]) -> Result<String, String> {
        let mut output = String::new();
        for finding in findings {
            output.push_str(&finding.message());
            output.push('\n');
        }
        Ok(output)
    }
}
