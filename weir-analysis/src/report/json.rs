//! JSON reporter for machine-readable output.

use serde_json::json;
use weir_core::Finding;

use super::Reporter;

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn generate(&self, findings: &[Finding]) -> Result<String, String> {
        let rendered: Vec<serde_json::Value> = findings
            .iter()
            .map(|finding| {
                json!({
                    "category": finding.category,
                    "sink": {
                        "file": finding.sink_location.file,
                        "line": finding.sink_location.line,
                        "column": finding.sink_location.column,
                    },
                    "message": finding.message(),
                    "path": finding.path.iter().map(|step| json!({
                        "label": step.label,
                        "file": step.location.file,
                        "line": step.location.line,
                        "column": step.location.column,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();

        let output = json!({
            "finding_count": findings.len(),
            "findings": rendered,
        });

        serde_json::to_string_pretty(&output).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_core::types::SourceLocation;
    use weir_core::PathStep;

    #[test]
    fn test_structure_round_trips() {
        let finding = Finding {
            category: "html".to_string(),
            sink_location: SourceLocation::new("a.php", 3, 6),
            path: vec![
                PathStep::new("$_GET", SourceLocation::new("a.php", 2, 9)),
                PathStep::new("echo#1", SourceLocation::new("a.php", 3, 6)),
            ],
        };
        let output = JsonReporter.generate(&[finding]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["finding_count"], 1);
        assert_eq!(value["findings"][0]["category"], "html");
        assert_eq!(value["findings"][0]["path"][0]["label"], "$_GET");
        assert_eq!(value["findings"][0]["sink"]["line"], 3);
    }
}
