//! SARIF 2.1.0 reporter with code flows for GitHub Code Scanning.
//!
//! Each finding becomes one result whose `codeFlows` replays the
//! source-to-sink path step by step, so scanning UIs can walk the flow.

use serde_json::{json, Value};
use weir_core::types::SourceLocation;
use weir_core::{Finding, PathStep};

use super::Reporter;

const RULE_ID: &str = "TaintedInput";

/// SARIF 2.1.0 reporter.
pub struct SarifReporter {
    pub tool_name: String,
    pub tool_version: String,
}

impl SarifReporter {
    pub fn new() -> Self {
        Self {
            tool_name: "weir".to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn build_results(&self, findings: &[Finding]) -> Vec<Value> {
        findings
            .iter()
            .map(|finding| {
                json!({
                    "ruleId": RULE_ID,
                    "level": "error",
                    "message": {
                        "text": finding.message()
                    },
                    "locations": [{
                        "physicalLocation": {
                            "artifactLocation": {
                                "uri": finding.sink_location.file,
                                "uriBaseId": "%SRCROOT%"
                            },
                            "region": build_region(&finding.sink_location)
                        }
                    }],
                    "codeFlows": [{
                        "threadFlows": [{
                            "locations": finding
                                .path
                                .iter()
                                .map(thread_flow_location)
                                .collect::<Vec<_>>()
                        }]
                    }],
                    "properties": {
                        "taintCategory": finding.category
                    }
                })
            })
            .collect()
    }

    fn build_rules(&self) -> Vec<Value> {
        vec![json!({
            "id": RULE_ID,
            "shortDescription": {
                "text": "Tainted input reaches a sensitive sink"
            },
            "defaultConfiguration": {
                "level": "error"
            },
            "properties": {
                "tags": ["security", "taint"]
            }
        })]
    }
}

impl Default for SarifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for SarifReporter {
    fn name(&self) -> &'static str {
        "sarif"
    }

    fn generate(&self, findings: &[Finding]) -> Result<String, String> {
        let sarif = json!({
            "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/main/sarif-2.1/schema/sarif-schema-2.1.0.json",
            "version": "2.1.0",
            "runs": [{
                "tool": {
                    "driver": {
                        "name": self.tool_name,
                        "version": self.tool_version,
                        "rules": self.build_rules()
                    }
                },
                "results": self.build_results(findings)
            }]
        });

        serde_json::to_string_pretty(&sarif).map_err(|e| e.to_string())
    }
}

fn build_region(location: &SourceLocation) -> Value {
    json!({
        "startLine": location.line.max(1),
        "startColumn": location.column.max(1)
    })
}

fn thread_flow_location(step: &PathStep) -> Value {
    json!({
        "location": {
            "physicalLocation": {
                "artifactLocation": {
                    "uri": step.location.file,
                    "uriBaseId": "%SRCROOT%"
                },
                "region": build_region(&step.location)
            },
            "message": {
                "text": step.label
            }
        }
    })
}
