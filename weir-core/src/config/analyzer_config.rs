//! Analyzer configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_MAX_PATH_DEPTH, DEFAULT_MAX_SPECIALIZATION_DEPTH,
};
use crate::errors::ConfigError;

/// What to do once a sink is proven reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FindingPolicy {
    /// Abort the run on the first finding.
    #[default]
    FailFast,
    /// Gather every finding program-wide before reporting.
    Collect,
}

/// Configuration for the taint subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TaintConfig {
    /// Whether taint tracking runs at all. Default: false.
    pub track_tainted_input: Option<bool>,
    /// Finding policy. Default: fail-fast.
    pub finding_policy: Option<FindingPolicy>,
    /// Maximum nodes along one backward search branch. Default: 40.
    pub max_path_depth: Option<usize>,
    /// Maximum specialization nesting. Default: 10.
    pub max_specialization_depth: Option<usize>,
    /// Optional TOML overlay file with extra sources/sinks/sanitizers.
    pub overlay: Option<PathBuf>,
}

impl TaintConfig {
    /// Returns whether tracking is enabled, defaulting to false.
    pub fn effective_track_tainted_input(&self) -> bool {
        self.track_tainted_input.unwrap_or(false)
    }

    /// Returns the effective finding policy, defaulting to fail-fast.
    pub fn effective_finding_policy(&self) -> FindingPolicy {
        self.finding_policy.unwrap_or_default()
    }

    /// Returns the effective path depth limit, defaulting to 40.
    pub fn effective_max_path_depth(&self) -> usize {
        self.max_path_depth.unwrap_or(DEFAULT_MAX_PATH_DEPTH)
    }

    /// Returns the effective specialization depth limit, defaulting to 10.
    pub fn effective_max_specialization_depth(&self) -> usize {
        self.max_specialization_depth
            .unwrap_or(DEFAULT_MAX_SPECIALIZATION_DEPTH)
    }
}

/// Top-level analyzer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub taint: TaintConfig,
}

impl AnalyzerConfig {
    /// Load configuration for a project root: defaults, then `weir.toml`
    /// if present, then `WEIR_*` environment overrides.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a specific TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `WEIR_*` environment overrides on top of the loaded values.
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("WEIR_TRACK_TAINTED_INPUT") {
            self.taint.track_tainted_input = Some(parse_bool("WEIR_TRACK_TAINTED_INPUT", &value)?);
        }
        if let Ok(value) = std::env::var("WEIR_FINDING_POLICY") {
            self.taint.finding_policy = Some(match value.as_str() {
                "fail-fast" => FindingPolicy::FailFast,
                "collect" => FindingPolicy::Collect,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "WEIR_FINDING_POLICY".to_string(),
                        value,
                    })
                }
            });
        }
        if let Ok(value) = std::env::var("WEIR_MAX_PATH_DEPTH") {
            let depth = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "WEIR_MAX_PATH_DEPTH".to_string(),
                value: value.clone(),
            })?;
            self.taint.max_path_depth = Some(depth);
        }
        if let Ok(value) = std::env::var("WEIR_MAX_SPECIALIZATION_DEPTH") {
            let depth = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "WEIR_MAX_SPECIALIZATION_DEPTH".to_string(),
                value: value.clone(),
            })?;
            self.taint.max_specialization_depth = Some(depth);
        }
        if let Ok(value) = std::env::var("WEIR_OVERLAY") {
            self.taint.overlay = Some(PathBuf::from(value));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert!(!config.taint.effective_track_tainted_input());
        assert_eq!(
            config.taint.effective_finding_policy(),
            FindingPolicy::FailFast
        );
        assert_eq!(config.taint.effective_max_path_depth(), 40);
        assert_eq!(config.taint.effective_max_specialization_depth(), 10);
    }

    #[test]
    fn test_parse_toml() {
        let config: AnalyzerConfig = toml::from_str(
            r#"
            [taint]
            track_tainted_input = true
            finding_policy = "collect"
            max_path_depth = 12
            "#,
        )
        .unwrap();
        assert!(config.taint.effective_track_tainted_input());
        assert_eq!(
            config.taint.effective_finding_policy(),
            FindingPolicy::Collect
        );
        assert_eq!(config.taint.effective_max_path_depth(), 12);
        assert_eq!(config.taint.effective_max_specialization_depth(), 10);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("weir.toml"),
            "[taint]\ntrack_tainted_input = true\n",
        )
        .unwrap();
        let config = AnalyzerConfig::load(dir.path()).unwrap();
        assert!(config.taint.effective_track_tainted_input());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalyzerConfig::load(dir.path()).unwrap();
        assert!(!config.taint.effective_track_tainted_input());
    }

    #[test]
    fn test_env_overrides_apply_over_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("weir.toml"),
            "[taint]\nmax_specialization_depth = 3\n",
        )
        .unwrap();
        std::env::set_var("WEIR_MAX_SPECIALIZATION_DEPTH", "7");
        std::env::set_var("WEIR_OVERLAY", "custom-overlay.toml");
        let config = AnalyzerConfig::load(dir.path());
        std::env::remove_var("WEIR_MAX_SPECIALIZATION_DEPTH");
        std::env::remove_var("WEIR_OVERLAY");
        let config = config.unwrap();
        assert_eq!(config.taint.effective_max_specialization_depth(), 7);
        assert_eq!(
            config.taint.overlay.as_deref(),
            Some(Path::new("custom-overlay.toml"))
        );
    }
}
