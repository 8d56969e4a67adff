//! TOML overlay files extending the built-in tables.
//!
//! ```toml
//! specialize = ["App\\Str::take"]
//!
//! [[sources]]
//! name = "$_ENV"
//!
//! [[sinks]]
//! routine = "Redis::rawCommand"
//! param = 1
//! categories = ["custom:redis"]
//!
//! [[sanitizers]]
//! routine = "App\\Esc::sql"
//! removes = ["sql"]
//! ```

use std::path::Path;

use serde::Deserialize;
use weir_core::errors::ConfigError;

use crate::categories::CategorySet;

#[derive(Debug, Clone, Deserialize)]
pub struct OverlaySource {
    pub name: String,
    /// Omitted means every built-in category.
    pub categories: Option<CategorySet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlaySink {
    pub routine: String,
    /// 1-based parameter position.
    pub param: u32,
    pub categories: CategorySet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlaySanitizer {
    pub routine: String,
    pub removes: CategorySet,
}

/// A parsed overlay document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OverlayFile {
    pub sources: Vec<OverlaySource>,
    pub sinks: Vec<OverlaySink>,
    pub sanitizers: Vec<OverlaySanitizer>,
    pub specialize: Vec<String>,
}

impl OverlayFile {
    /// Load an overlay from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::TaintCategory;

    #[test]
    fn test_parse_overlay() {
        let overlay: OverlayFile = toml::from_str(
            r#"
            specialize = ["Str::take"]

            [[sources]]
            name = "$_ENV"

            [[sinks]]
            routine = "Redis::rawCommand"
            param = 1
            categories = ["custom:redis"]

            [[sanitizers]]
            routine = "Esc::sql"
            removes = ["sql"]
            "#,
        )
        .unwrap();
        assert_eq!(overlay.sources.len(), 1);
        assert!(overlay.sources[0].categories.is_none());
        assert_eq!(overlay.sinks[0].param, 1);
        assert!(overlay.sinks[0]
            .categories
            .contains(&TaintCategory::Custom("redis".into())));
        assert!(overlay.sanitizers[0].removes.contains(&TaintCategory::Sql));
        assert_eq!(overlay.specialize, ["Str::take"]);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = OverlayFile::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
