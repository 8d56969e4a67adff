//! One analyzer run's taint state.
//!
//! The session owns the hook behind a mutex (file analysis workers share
//! it), carries the run toggle, and drives the check phase once the build
//! is sealed. With the toggle off every operation is a no-op that hands
//! back detached references, so callers never branch on configuration.

use std::sync::{Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;
use tracing::info;
use weir_core::types::SourceLocation;
use weir_core::{
    AnalyzerConfig, Cancellable, CancellationToken, ConfigError, Finding, FindingPolicy,
    TaintError,
};

use crate::annotations::TaintContract;
use crate::categories::CategorySet;
use crate::finder::PathFinder;
use crate::flow::{FlowGraphStats, NodeRef};
use crate::hook::{CallArg, TaintHook};
use crate::registry::{OverlayFile, TaintRegistry};

#[derive(Debug)]
pub struct TaintSession {
    hook: Mutex<TaintHook>,
    enabled: bool,
    policy: FindingPolicy,
    max_path_depth: usize,
    cancel: CancellationToken,
}

impl TaintSession {
    /// Build a session from configuration: builtin tables, plus the
    /// overlay file when one is configured.
    pub fn new(config: &AnalyzerConfig) -> Result<Self, ConfigError> {
        let mut registry = TaintRegistry::with_builtins();
        if let Some(path) = &config.taint.overlay {
            let overlay = OverlayFile::load(path)?;
            registry.merge_overlay(&overlay);
        }
        Ok(Self::with_registry(registry, config))
    }

    /// Build a session over an explicit registry.
    pub fn with_registry(registry: TaintRegistry, config: &AnalyzerConfig) -> Self {
        let taint = &config.taint;
        Self {
            hook: Mutex::new(TaintHook::new(
                registry,
                taint.effective_max_specialization_depth(),
            )),
            enabled: taint.effective_track_tainted_input(),
            policy: taint.effective_finding_policy(),
            max_path_depth: taint.effective_max_path_depth(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn finding_policy(&self) -> FindingPolicy {
        self.policy
    }

    /// A clone of the session's cancellation token, for wiring into
    /// whatever drives the run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn locked(&self) -> MutexGuard<'_, TaintHook> {
        self.hook.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ----- build surface, delegated under the lock.

    pub fn declare_routine(&self, routine: &str, contract: &TaintContract, params: &[&str]) {
        if !self.enabled {
            return;
        }
        self.locked().declare_routine(routine, contract, params);
    }

    /// Enter a routine body. Bodies are scoped to the calling worker: the
    /// same worker must issue the body's operations and `exit_body`, while
    /// other workers' operations keep landing in the shared graph.
    pub fn enter_body(&self, routine: &str) {
        if !self.enabled {
            return;
        }
        self.locked().enter_body(routine);
    }

    pub fn exit_body(&self) {
        if !self.enabled {
            return;
        }
        self.locked().exit_body();
    }

    pub fn param_node(&self, routine: &str, pos: u32, loc: SourceLocation) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().param_node(routine, pos, loc)
    }

    pub fn note_source_read(&self, name: &str, loc: SourceLocation) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().note_source_read(name, loc)
    }

    pub fn note_assignment(
        &self,
        var: &str,
        loc: SourceLocation,
        rhs: Option<NodeRef>,
        removed: Option<&CategorySet>,
    ) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().note_assignment(var, loc, rhs, removed)
    }

    pub fn note_concat(&self, loc: SourceLocation, operands: &[Option<NodeRef>]) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().note_concat(loc, operands)
    }

    pub fn note_cast(&self, value: Option<NodeRef>, loc: SourceLocation) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().note_cast(value, loc)
    }

    pub fn note_join(
        &self,
        var: &str,
        loc: SourceLocation,
        branches: &[Option<NodeRef>],
    ) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().note_join(var, loc, branches)
    }

    pub fn note_call(&self, targets: &[&str], args: &[CallArg], loc: SourceLocation) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().note_call(targets, args, loc)
    }

    pub fn note_return(&self, routine: &str, value: Option<NodeRef>, loc: SourceLocation) {
        if !self.enabled {
            return;
        }
        self.locked().note_return(routine, value, loc);
    }

    pub fn note_container_write(
        &self,
        container: NodeRef,
        key: Option<&str>,
        value: Option<NodeRef>,
        loc: SourceLocation,
    ) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().note_container_write(container, key, value, loc)
    }

    pub fn note_container_read(
        &self,
        container: NodeRef,
        key: Option<&str>,
        loc: SourceLocation,
    ) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().note_container_read(container, key, loc)
    }

    pub fn note_property_write(
        &self,
        property: &str,
        value: Option<NodeRef>,
        loc: SourceLocation,
    ) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().note_property_write(property, value, loc)
    }

    pub fn note_property_read(&self, property: &str, loc: SourceLocation) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().note_property_read(property, loc)
    }

    pub fn note_sink_use(&self, target: &str, pos: u32, arg: Option<NodeRef>, loc: SourceLocation) {
        if !self.enabled {
            return;
        }
        self.locked().note_sink_use(target, pos, arg, loc);
    }

    pub fn note_sanitizer_applied(
        &self,
        value: Option<NodeRef>,
        loc: SourceLocation,
        removed: &CategorySet,
    ) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked().note_sanitizer_applied(value, loc, removed)
    }

    pub fn note_assert_untainted(
        &self,
        var: &str,
        loc: SourceLocation,
        value: Option<NodeRef>,
        categories: Option<&CategorySet>,
    ) -> NodeRef {
        if !self.enabled {
            return NodeRef::Detached;
        }
        self.locked()
            .note_assert_untainted(var, loc, value, categories)
    }

    /// The validator contract declared for a routine, if any: the asserted
    /// parameter name and categories. The visitor queries this after each
    /// call so it can rebind the argument variable through
    /// `note_assert_untainted`.
    pub fn assert_param(&self, routine: &str) -> Option<(String, CategorySet)> {
        if !self.enabled {
            return None;
        }
        self.locked().registry().assert_param(routine).cloned()
    }

    /// Seal the graph ahead of `check`. Optional; `check` seals on its
    /// own when the caller has not.
    pub fn seal(&self) -> Option<FlowGraphStats> {
        if !self.enabled {
            return None;
        }
        Some(self.locked().seal())
    }

    pub fn sink_count(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        self.locked().sink_occurrences().len()
    }

    /// Run the check phase: seal, then search every sink occurrence.
    ///
    /// Under fail-fast the first reachable sink in registration order
    /// surfaces as `TaintError::TaintedInput`; under collect all findings
    /// come back in registration order. A disabled session reports
    /// nothing.
    pub fn check(&self) -> Result<Vec<Finding>, TaintError> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let mut hook = self.locked();
        hook.seal();
        let hook = &*hook;
        let finder = PathFinder::new(hook.graph(), self.max_path_depth);
        let sinks = hook.sink_occurrences();
        info!(
            sinks = sinks.len(),
            policy = ?self.policy,
            "checking sink reachability"
        );
        match self.policy {
            FindingPolicy::FailFast => {
                let first = sinks.par_iter().find_map_first(|occurrence| {
                    match finder.find(occurrence, &self.cancel) {
                        Ok(Some(finding)) => Some(Ok(finding)),
                        Ok(None) => None,
                        Err(error) => Some(Err(error)),
                    }
                });
                match first {
                    Some(Ok(finding)) => Err(TaintError::TaintedInput(Box::new(finding))),
                    Some(Err(error)) => Err(error),
                    None => Ok(Vec::new()),
                }
            }
            FindingPolicy::Collect => {
                let findings = sinks
                    .par_iter()
                    .map(|occurrence| finder.find(occurrence, &self.cancel))
                    .collect::<Result<Vec<Option<Finding>>, TaintError>>()?;
                Ok(findings.into_iter().flatten().collect())
            }
        }
    }
}
