//! Taint categories and category sets.
//!
//! Categories are the currency of the whole engine: sources inject them,
//! edges add or remove them, sinks declare which ones they must never
//! receive. The annotation spelling (`sql`, `file-include`,
//! `custom:<name>`) is the wire format for docblock directives, overlay
//! files, and findings.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use weir_core::types::SmallVec4;

/// A named class of sensitive context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaintCategory {
    Sql,
    Html,
    Shell,
    Eval,
    FileInclude,
    Header,
    Unserialize,
    /// User-defined category, spelled `custom:<name>`.
    Custom(Box<str>),
}

impl TaintCategory {
    /// All built-in categories, the default initial set for sources.
    pub fn all_builtin() -> [TaintCategory; 7] {
        [
            TaintCategory::Sql,
            TaintCategory::Html,
            TaintCategory::Shell,
            TaintCategory::Eval,
            TaintCategory::FileInclude,
            TaintCategory::Header,
            TaintCategory::Unserialize,
        ]
    }

    /// The annotation spelling for built-in categories.
    fn builtin_name(&self) -> Option<&'static str> {
        match self {
            TaintCategory::Sql => Some("sql"),
            TaintCategory::Html => Some("html"),
            TaintCategory::Shell => Some("shell"),
            TaintCategory::Eval => Some("eval"),
            TaintCategory::FileInclude => Some("file-include"),
            TaintCategory::Header => Some("header"),
            TaintCategory::Unserialize => Some("unserialize"),
            TaintCategory::Custom(_) => None,
        }
    }
}

impl fmt::Display for TaintCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaintCategory::Custom(name) => write!(f, "custom:{name}"),
            other => f.write_str(other.builtin_name().unwrap_or("unknown")),
        }
    }
}

impl FromStr for TaintCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql" => Ok(TaintCategory::Sql),
            "html" => Ok(TaintCategory::Html),
            "shell" => Ok(TaintCategory::Shell),
            "eval" => Ok(TaintCategory::Eval),
            "file-include" => Ok(TaintCategory::FileInclude),
            "header" => Ok(TaintCategory::Header),
            "unserialize" => Ok(TaintCategory::Unserialize),
            other => match other.strip_prefix("custom:") {
                Some(name) if !name.is_empty() => Ok(TaintCategory::Custom(name.into())),
                _ => Err(format!("unknown taint category: {other}")),
            },
        }
    }
}

impl Serialize for TaintCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaintCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// An unordered set of unique categories.
///
/// Stored sorted so iteration order (and the category a finding names when
/// several survive) is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CategorySet {
    items: SmallVec4<TaintCategory>,
}

impl CategorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set of all built-in categories.
    pub fn all_builtin() -> Self {
        Self {
            items: TaintCategory::all_builtin().into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, category: &TaintCategory) -> bool {
        self.items.binary_search(category).is_ok()
    }

    pub fn insert(&mut self, category: TaintCategory) {
        if let Err(pos) = self.items.binary_search(&category) {
            self.items.insert(pos, category);
        }
    }

    /// Union the other set into this one.
    pub fn union_with(&mut self, other: &CategorySet) {
        for category in &other.items {
            self.insert(category.clone());
        }
    }

    /// The categories in `self` that are not in `other`.
    pub fn difference(&self, other: &CategorySet) -> CategorySet {
        CategorySet {
            items: self
                .items
                .iter()
                .filter(|c| !other.contains(c))
                .cloned()
                .collect(),
        }
    }

    /// Whether the two sets share at least one category.
    pub fn intersects(&self, other: &CategorySet) -> bool {
        self.items.iter().any(|c| other.contains(c))
    }

    /// The first shared category in sorted order, if any.
    pub fn first_common(&self, other: &CategorySet) -> Option<&TaintCategory> {
        self.items.iter().find(|c| other.contains(c))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaintCategory> {
        self.items.iter()
    }
}

impl FromIterator<TaintCategory> for CategorySet {
    fn from_iter<I: IntoIterator<Item = TaintCategory>>(iter: I) -> Self {
        let mut set = CategorySet::new();
        for category in iter {
            set.insert(category);
        }
        set
    }
}

impl Serialize for CategorySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.items)
    }
}

impl<'de> Deserialize<'de> for CategorySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<TaintCategory>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}
