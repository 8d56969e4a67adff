//! The source/sink/sanitizer classifier.
//!
//! Immutable built-in tables merged with the annotation overlay collected
//! during declaration registration and with optional project overlay
//! files. The registry is owned by the session and threaded through the
//! Integration Hook; there is no ambient global.

pub mod builtins;
pub mod overlay;

use weir_core::types::{FxHashMap, FxHashSet, SmallVec4};

use crate::annotations::TaintContract;
use crate::categories::{CategorySet, TaintCategory};

pub use overlay::{OverlayFile, OverlaySanitizer, OverlaySink, OverlaySource};

/// Merged classifier tables.
#[derive(Debug, Clone, Default)]
pub struct TaintRegistry {
    sources: FxHashMap<String, CategorySet>,
    /// Per routine: (1-based position, sensitive categories), sorted by
    /// position so occurrence registration is deterministic.
    sinks: FxHashMap<String, SmallVec4<(u32, CategorySet)>>,
    sanitizers: FxHashMap<String, CategorySet>,
    specialized: FxHashSet<String>,
    /// Per routine: asserted-untainted parameter and categories (empty
    /// means all known categories).
    asserts: FxHashMap<String, (String, CategorySet)>,
}

impl TaintRegistry {
    /// Empty registry, for tests that want full control.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in tables.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let all = CategorySet::all_builtin();
        for name in builtins::BUILTIN_SOURCES {
            registry.add_source(name, all.clone());
        }
        for (routine, param, category) in builtins::builtin_sinks() {
            registry.add_sink(routine, param, [category].into_iter().collect());
        }
        for (routine, category) in builtins::builtin_sanitizers() {
            registry.add_sanitizer(routine, [category].into_iter().collect());
        }
        for routine in builtins::BUILTIN_SPECIALIZED {
            registry.specialized.insert((*routine).to_string());
        }
        registry
    }

    pub fn add_source(&mut self, name: &str, categories: CategorySet) {
        self.sources
            .entry(name.to_string())
            .or_default()
            .union_with(&categories);
    }

    pub fn add_sink(&mut self, routine: &str, param: u32, categories: CategorySet) {
        let params = self.sinks.entry(routine.to_string()).or_default();
        match params.iter_mut().find(|(pos, _)| *pos == param) {
            Some((_, existing)) => existing.union_with(&categories),
            None => {
                let at = params.partition_point(|(pos, _)| *pos < param);
                params.insert(at, (param, categories));
            }
        }
    }

    pub fn add_sanitizer(&mut self, routine: &str, removes: CategorySet) {
        self.sanitizers
            .entry(routine.to_string())
            .or_default()
            .union_with(&removes);
    }

    pub fn add_specialized(&mut self, routine: &str) {
        self.specialized.insert(routine.to_string());
    }

    /// Merge a project overlay file.
    pub fn merge_overlay(&mut self, overlay: &OverlayFile) {
        for source in &overlay.sources {
            let categories = source
                .categories
                .clone()
                .unwrap_or_else(CategorySet::all_builtin);
            self.add_source(&source.name, categories);
        }
        for sink in &overlay.sinks {
            self.add_sink(&sink.routine, sink.param, sink.categories.clone());
        }
        for sanitizer in &overlay.sanitizers {
            self.add_sanitizer(&sanitizer.routine, sanitizer.removes.clone());
        }
        for routine in &overlay.specialize {
            self.specialized.insert(routine.clone());
        }
    }

    /// Attach a declaration's contract. `params` lists the routine's
    /// parameter names (`$name`, declaration order) so name-addressed
    /// directives resolve to positions.
    pub fn declare(&mut self, routine: &str, contract: &TaintContract, params: &[&str]) {
        for (param_name, categories) in &contract.sink_params {
            if let Some(pos) = params.iter().position(|p| p == param_name) {
                self.add_sink(routine, pos as u32 + 1, categories.clone());
            }
        }
        if !contract.removed.is_empty() {
            self.add_sanitizer(routine, contract.removed.clone());
        }
        if contract.is_specializable() {
            self.specialized.insert(routine.to_string());
        }
        if let Some((var, categories)) = &contract.assert_untainted {
            self.asserts
                .insert(routine.to_string(), (var.clone(), categories.clone()));
        }
    }

    pub fn source_taints(&self, name: &str) -> Option<&CategorySet> {
        self.sources.get(name)
    }

    /// Sink parameters of a routine, sorted by position.
    pub fn sink_params(&self, routine: &str) -> &[(u32, CategorySet)] {
        self.sinks.get(routine).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn sanitizer_removes(&self, routine: &str) -> Option<&CategorySet> {
        self.sanitizers.get(routine)
    }

    pub fn is_specialized(&self, routine: &str) -> bool {
        self.specialized.contains(routine)
    }

    pub fn assert_param(&self, routine: &str) -> Option<&(String, CategorySet)> {
        self.asserts.get(routine)
    }

    /// Every category the registry knows: the built-ins plus any custom
    /// category mentioned by a source, sink, or sanitizer entry.
    pub fn universe(&self) -> CategorySet {
        let mut universe = CategorySet::all_builtin();
        let customs = self
            .sources
            .values()
            .chain(self.sanitizers.values())
            .chain(self.sinks.values().flat_map(|params| params.iter().map(|(_, c)| c)))
            .flat_map(|set| set.iter())
            .filter(|c| matches!(c, TaintCategory::Custom(_)));
        for category in customs {
            universe.insert(category.clone());
        }
        universe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::TaintContract;

    #[test]
    fn test_builtins_cover_known_tables() {
        let registry = TaintRegistry::with_builtins();
        assert!(registry.source_taints("$_GET").is_some());
        assert!(registry.source_taints("$undeclared").is_none());
        let params = registry.sink_params("PDO::exec");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].0, 1);
        assert!(params[0].1.contains(&TaintCategory::Sql));
        assert!(registry
            .sanitizer_removes("htmlentities")
            .is_some_and(|c| c.contains(&TaintCategory::Html)));
        assert!(registry.is_specialized("print_r"));
        assert!(!registry.is_specialized("str_replace"));
    }

    #[test]
    fn test_declare_resolves_param_names() {
        let mut registry = TaintRegistry::new();
        let contract = TaintContract::from_directives(["taint-sink sql $sql"]).unwrap();
        registry.declare("PDOWrapper::exec", &contract, &["$pdo", "$sql"]);
        let params = registry.sink_params("PDOWrapper::exec");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].0, 2);
    }

    #[test]
    fn test_declare_sanitizer_and_specialize() {
        let mut registry = TaintRegistry::new();
        let contract = TaintContract::from_directives(["taint-remove html", "pure"]).unwrap();
        registry.declare("Str::clean", &contract, &["$s"]);
        assert!(registry
            .sanitizer_removes("Str::clean")
            .is_some_and(|c| c.contains(&TaintCategory::Html)));
        assert!(registry.is_specialized("Str::clean"));
    }

    #[test]
    fn test_universe_includes_customs() {
        let mut registry = TaintRegistry::with_builtins();
        registry.add_sink(
            "Redis::rawCommand",
            1,
            [TaintCategory::Custom("redis".into())].into_iter().collect(),
        );
        let universe = registry.universe();
        assert_eq!(universe.len(), 8);
        assert!(universe.contains(&TaintCategory::Custom("redis".into())));
    }

    #[test]
    fn test_sink_params_sorted_by_position() {
        let mut registry = TaintRegistry::new();
        registry.add_sink("f", 3, CategorySet::all_builtin());
        registry.add_sink("f", 1, CategorySet::all_builtin());
        let positions: Vec<u32> = registry.sink_params("f").iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, [1, 3]);
    }
}
