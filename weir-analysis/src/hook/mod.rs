//! The Integration Hook: the narrow surface the type-checking visitor
//! drives while walking the program.
//!
//! Every operation is an infallible, idempotent addition to the flow
//! graph. The visitor owns resolution: dispatch targets arrive as concrete
//! routine chains, annotations arrive as parsed contracts, and malformed
//! input never reaches this boundary.
//!
//! Ordering contract: declarations (with their contracts) are registered
//! before any body is analyzed; bodies and call sites may then arrive in
//! any order. `seal` is the barrier that settles everything deferred:
//! fragment instantiations whose body never arrived, conservative
//! pass-through for routines with no analyzed body, and container reads
//! registered before later writes.
//!
//! Fragment recording is scoped to the worker thread that entered the
//! body: a body runs start to finish on one worker, so only that stream's
//! operations land in the fragment, and concurrent workers keep writing
//! the shared graph undisturbed.

use std::thread::{self, ThreadId};

use petgraph::graph::NodeIndex;
use tracing::{debug, trace};
use weir_core::types::{FxHashMap, FxHashSet, KeyInterner, RoutineId, SourceLocation};

use crate::annotations::TaintContract;
use crate::categories::CategorySet;
use crate::flow::{FlowEdge, FlowGraph, FlowGraphStats, NodeKind, NodeRef};
use crate::registry::TaintRegistry;
use crate::specialize::{BodyEvent, PendingCall, SpecializationEngine, SpecializationKey};

/// One argument of a call: its data-flow node (absent for literals) and
/// the argument expression's position.
#[derive(Debug, Clone)]
pub struct CallArg {
    pub value: Option<NodeRef>,
    pub location: SourceLocation,
}

impl CallArg {
    pub fn new(value: Option<NodeRef>, location: SourceLocation) -> Self {
        Self { value, location }
    }
}

/// A registered sink occurrence: the search starts here.
#[derive(Debug, Clone)]
pub struct SinkOccurrence {
    pub node: NodeIndex,
    pub sensitive: CategorySet,
    pub location: SourceLocation,
}

#[derive(Debug)]
struct CalledRoutine {
    id: RoutineId,
    name: String,
    arity: u32,
}

#[derive(Debug)]
struct UnknownRead {
    container: NodeIndex,
    read: NodeIndex,
    linked: usize,
}

/// Graph-building state behind the session lock.
#[derive(Debug)]
pub struct TaintHook {
    graph: FlowGraph,
    registry: TaintRegistry,
    engine: SpecializationEngine,
    routines: KeyInterner,
    sinks: Vec<SinkOccurrence>,
    bodies_seen: FxHashSet<RoutineId>,
    called: Vec<CalledRoutine>,
    called_index: FxHashMap<RoutineId, usize>,
    container_children: FxHashMap<NodeIndex, Vec<NodeIndex>>,
    read_aliases: FxHashMap<NodeIndex, NodeIndex>,
    unknown_reads: Vec<UnknownRead>,
    max_specialization_depth: usize,
    sealed: bool,
}

impl TaintHook {
    pub fn new(registry: TaintRegistry, max_specialization_depth: usize) -> Self {
        Self {
            graph: FlowGraph::new(),
            registry,
            engine: SpecializationEngine::new(),
            routines: KeyInterner::new(),
            sinks: Vec::new(),
            bodies_seen: FxHashSet::default(),
            called: Vec::new(),
            called_index: FxHashMap::default(),
            container_children: FxHashMap::default(),
            read_aliases: FxHashMap::default(),
            unknown_reads: Vec::new(),
            max_specialization_depth,
            sealed: false,
        }
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn registry(&self) -> &TaintRegistry {
        &self.registry
    }

    pub fn sink_occurrences(&self) -> &[SinkOccurrence] {
        &self.sinks
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Attach a declaration's parsed taint contract.
    pub fn declare_routine(&mut self, routine: &str, contract: &TaintContract, params: &[&str]) {
        debug!(routine, "declare routine contract");
        self.registry.declare(routine, contract, params);
    }

    /// Enter a routine body on the calling worker's stream. Starts
    /// fragment recording when the routine is specializable.
    pub fn enter_body(&mut self, routine: &str) {
        let id = self.routine_id(routine);
        self.bodies_seen.insert(id);
        if self.registry.is_specialized(routine) {
            debug!(routine, "recording specializable body");
            self.engine.begin_recording(worker_id(), id, routine);
        }
    }

    /// Leave the calling worker's current body. Completing a specializable
    /// body replays it for every call site already waiting on it.
    pub fn exit_body(&mut self) {
        if let Some((id, name)) = self.engine.finish_recording(worker_id()) {
            let pending = self.engine.drain_pending_for(id);
            debug!(routine = %name, waiting = pending.len(), "fragment complete");
            for p in pending {
                self.instantiate(id, &name, &p.site, p.depth);
            }
        }
    }

    /// The node for reading a formal parameter inside its routine's body.
    pub fn param_node(&mut self, routine: &str, pos: u32, loc: SourceLocation) -> NodeRef {
        if self.engine.is_recording(worker_id()) {
            return NodeRef::Param(pos);
        }
        let key = format!("{routine}#{pos}");
        let label = key.clone();
        let (ix, _) = self.graph.intern(&key, NodeKind::CallArgument, &label, loc);
        NodeRef::Graph(ix)
    }

    /// A read of an untrusted-input container. The node is shared even
    /// inside fragments: the source itself is tainted at every site.
    pub fn note_source_read(&mut self, name: &str, loc: SourceLocation) -> NodeRef {
        let initial = self
            .registry
            .source_taints(name)
            .cloned()
            .unwrap_or_default();
        let key = format!("{name}-{loc}");
        let ix = self.graph.intern_source(&key, name, loc, &initial);
        NodeRef::Graph(ix)
    }

    /// An assignment to a variable, with an optional inline `taint-remove`.
    pub fn note_assignment(
        &mut self,
        var: &str,
        loc: SourceLocation,
        rhs: Option<NodeRef>,
        removed: Option<&CategorySet>,
    ) -> NodeRef {
        if let Some(rec) = self.engine.recording(worker_id()) {
            return rec.push_producing(BodyEvent::Assign {
                var: var.to_string(),
                loc,
                rhs,
                removed: removed.cloned(),
            });
        }
        let rhs = resolve_shared(rhs);
        NodeRef::Graph(self.apply_assign(var, loc, rhs, removed, None))
    }

    /// String concatenation: the result carries the union of all operands.
    pub fn note_concat(&mut self, loc: SourceLocation, operands: &[Option<NodeRef>]) -> NodeRef {
        if let Some(rec) = self.engine.recording(worker_id()) {
            return rec.push_producing(BodyEvent::Concat {
                loc,
                operands: operands.iter().copied().collect(),
            });
        }
        let operands: Vec<Option<NodeIndex>> =
            operands.iter().map(|r| resolve_shared(*r)).collect();
        NodeRef::Graph(self.apply_concat(loc, &operands, None))
    }

    /// Casts are taint-transparent: the value flows through unchanged.
    pub fn note_cast(&mut self, value: Option<NodeRef>, _loc: SourceLocation) -> NodeRef {
        value.unwrap_or(NodeRef::Detached)
    }

    /// Post-branch join: one edge per branch value, nothing dropped.
    pub fn note_join(
        &mut self,
        var: &str,
        loc: SourceLocation,
        branches: &[Option<NodeRef>],
    ) -> NodeRef {
        if let Some(rec) = self.engine.recording(worker_id()) {
            return rec.push_producing(BodyEvent::Join {
                var: var.to_string(),
                loc,
                branches: branches.iter().copied().collect(),
            });
        }
        let branches: Vec<Option<NodeIndex>> =
            branches.iter().map(|r| resolve_shared(*r)).collect();
        NodeRef::Graph(self.apply_join(var, loc, &branches, None))
    }

    /// A resolved call. `targets` is the dispatch chain the resolver
    /// supplies, first the name the call was made through, last the
    /// implementation that owns the body; a direct call is a single-element
    /// chain. Links arguments to parameters (hop by hop across the chain),
    /// registers sink occurrences, applies declared sanitization, and
    /// specializes when the callee asks for it. Returns the call result.
    pub fn note_call(
        &mut self,
        targets: &[&str],
        args: &[CallArg],
        loc: SourceLocation,
    ) -> NodeRef {
        if let Some(rec) = self.engine.recording(worker_id()) {
            return rec.push_producing(BodyEvent::Call {
                targets: targets.iter().map(|t| (*t).to_string()).collect(),
                args: args.iter().cloned().collect(),
                loc,
            });
        }
        let args: Vec<(Option<NodeIndex>, SourceLocation)> = args
            .iter()
            .map(|a| (resolve_shared(a.value), a.location.clone()))
            .collect();
        NodeRef::Graph(self.apply_call(targets, &args, loc, None, 0))
    }

    /// A `return` statement's value flowing into its routine's return node.
    pub fn note_return(&mut self, routine: &str, value: Option<NodeRef>, loc: SourceLocation) {
        if let Some(rec) = self.engine.recording(worker_id()) {
            rec.push(BodyEvent::Return { value, loc });
            return;
        }
        let value = resolve_shared(value);
        self.apply_return(routine, value, loc, None);
    }

    /// A write into a container at a key (`None` = append/unknown key).
    /// Returns the content node so nested literals can chain.
    pub fn note_container_write(
        &mut self,
        container: NodeRef,
        key: Option<&str>,
        value: Option<NodeRef>,
        loc: SourceLocation,
    ) -> NodeRef {
        if let Some(rec) = self.engine.recording(worker_id()) {
            return rec.push_producing(BodyEvent::ContainerWrite {
                container,
                key: key.map(str::to_string),
                value,
                loc,
            });
        }
        let container = resolve_shared(Some(container));
        let value = resolve_shared(value);
        match container {
            Some(c) => match self.apply_container_write(c, key, value, loc) {
                Some(ix) => NodeRef::Graph(ix),
                None => NodeRef::Detached,
            },
            None => NodeRef::Detached,
        }
    }

    /// A read from a container at a key (`None` = unknown key). The read
    /// sees the specific key's content and the generic any-key content.
    pub fn note_container_read(
        &mut self,
        container: NodeRef,
        key: Option<&str>,
        loc: SourceLocation,
    ) -> NodeRef {
        if let Some(rec) = self.engine.recording(worker_id()) {
            return rec.push_producing(BodyEvent::ContainerRead {
                container,
                key: key.map(str::to_string),
                loc,
            });
        }
        let container = resolve_shared(Some(container));
        match container {
            Some(c) => match self.apply_container_read(c, key, loc) {
                Some(ix) => NodeRef::Graph(ix),
                None => NodeRef::Detached,
            },
            None => NodeRef::Detached,
        }
    }

    /// A property write. `property` is the resolved backing member
    /// (`Class::$prop`), the same node direct, magic, and mixin access all
    /// share.
    pub fn note_property_write(
        &mut self,
        property: &str,
        value: Option<NodeRef>,
        loc: SourceLocation,
    ) -> NodeRef {
        let (prop, _) = self
            .graph
            .intern(property, NodeKind::Property, property, loc.clone());
        if let Some(rec) = self.engine.recording(worker_id()) {
            rec.push(BodyEvent::PropertyWrite {
                property: property.to_string(),
                value,
                loc,
            });
            return NodeRef::Graph(prop);
        }
        if let Some(value) = resolve_shared(value) {
            self.graph.add_edge(value, prop, FlowEdge::plain());
        }
        NodeRef::Graph(prop)
    }

    /// A property read; returns the shared property content node.
    pub fn note_property_read(&mut self, property: &str, loc: SourceLocation) -> NodeRef {
        let (prop, _) = self.graph.intern(property, NodeKind::Property, property, loc);
        NodeRef::Graph(prop)
    }

    /// An explicit sink occurrence for language constructs that are not
    /// calls (`echo`, `eval`, `include`). Unrecognized targets are a no-op.
    pub fn note_sink_use(
        &mut self,
        target: &str,
        pos: u32,
        arg: Option<NodeRef>,
        loc: SourceLocation,
    ) {
        if let Some(rec) = self.engine.recording(worker_id()) {
            rec.push(BodyEvent::SinkUse {
                target: target.to_string(),
                pos,
                arg,
                loc,
            });
            return;
        }
        let arg = resolve_shared(arg);
        self.apply_sink(target, pos, arg, loc, None);
    }

    /// An in-line sanitization: the result node drops `removed`.
    pub fn note_sanitizer_applied(
        &mut self,
        value: Option<NodeRef>,
        loc: SourceLocation,
        removed: &CategorySet,
    ) -> NodeRef {
        if let Some(rec) = self.engine.recording(worker_id()) {
            return rec.push_producing(BodyEvent::Sanitize {
                value,
                loc,
                removed: removed.clone(),
            });
        }
        let value = resolve_shared(value);
        NodeRef::Graph(self.apply_sanitize(value, loc, removed.clone(), None))
    }

    /// Manual suppression: rebinds `var` to a fresh node whose incoming
    /// edge removes the asserted categories (every known category when the
    /// directive names none). Removal is downstream-only; other paths to
    /// the same sink are unaffected.
    pub fn note_assert_untainted(
        &mut self,
        var: &str,
        loc: SourceLocation,
        value: Option<NodeRef>,
        categories: Option<&CategorySet>,
    ) -> NodeRef {
        let removed = match categories {
            Some(set) if !set.is_empty() => set.clone(),
            _ => self.registry.universe(),
        };
        if let Some(rec) = self.engine.recording(worker_id()) {
            return rec.push_producing(BodyEvent::AssertUntainted {
                var: var.to_string(),
                loc,
                value,
                removed,
            });
        }
        let value = resolve_shared(value);
        NodeRef::Graph(self.apply_assert(var, loc, value, removed, None))
    }

    /// Seal the graph: settle pending specializations, wire conservative
    /// pass-through for body-less routines, finish straggling container
    /// links, and hand back build statistics. Idempotent.
    pub fn seal(&mut self) -> FlowGraphStats {
        if self.sealed {
            return self.graph.stats();
        }
        self.sealed = true;

        // Specializable calls whose body never arrived: replay the fragment
        // if one exists after all, otherwise wire per-site pass-through.
        // Annotated removals were already applied at the call result.
        for p in self.engine.drain_pending() {
            if self.engine.fragment(p.routine).is_some() {
                self.instantiate(p.routine, &p.routine_name, &p.site, p.depth);
                continue;
            }
            let key = SpecializationKey {
                routine: p.routine,
                site: p.site.as_str().into(),
            };
            if !self.engine.mark_instantiated(key) {
                continue;
            }
            let ret_key = format!("{}@{}", p.routine_name, p.site);
            if let Some(ret) = self.graph.lookup(&ret_key) {
                for pos in 1..=p.arity {
                    let param_key = format!("{}#{}@{}", p.routine_name, pos, p.site);
                    if let Some(param) = self.graph.lookup(&param_key) {
                        self.graph.add_edge(param, ret, FlowEdge::plain());
                    }
                }
            }
        }

        // Conservative default: a called routine with no analyzed body is
        // taint-preserving pass-through, never a sanitizer. A recorded
        // fragment leaves the shared subgraph just as empty, so beyond-cap
        // shared links get the same treatment.
        for i in 0..self.called.len() {
            let (id, name, arity) = {
                let c = &self.called[i];
                (c.id, c.name.clone(), c.arity)
            };
            if self.bodies_seen.contains(&id) && self.engine.fragment(id).is_none() {
                continue;
            }
            if let Some(ret) = self.graph.lookup(&name) {
                for pos in 1..=arity {
                    if let Some(param) = self.graph.lookup(&format!("{name}#{pos}")) {
                        self.graph.add_edge(param, ret, FlowEdge::plain());
                    }
                }
            }
        }

        // Container reads at unknown keys see writes registered after them.
        for i in 0..self.unknown_reads.len() {
            let (container, read, linked) = {
                let u = &self.unknown_reads[i];
                (u.container, u.read, u.linked)
            };
            let children: Vec<NodeIndex> = self
                .container_children
                .get(&container)
                .map(|c| c[linked..].to_vec())
                .unwrap_or_default();
            for child in children {
                self.graph.add_edge(child, read, FlowEdge::plain());
            }
            self.unknown_reads[i].linked = self
                .container_children
                .get(&container)
                .map_or(0, Vec::len);
        }

        let stats = self.graph.stats();
        tracing::info!(
            nodes = stats.node_count,
            edges = stats.edge_count,
            sources = stats.source_count,
            sinks = self.sinks.len(),
            specializations = self.engine.instantiated_count(),
            "taint graph sealed"
        );
        stats
    }

    fn routine_id(&self, routine: &str) -> RoutineId {
        RoutineId::from(self.routines.intern(routine))
    }

    // ----- apply helpers: shared by the direct path and fragment replay.

    fn apply_assign(
        &mut self,
        var: &str,
        loc: SourceLocation,
        rhs: Option<NodeIndex>,
        removed: Option<&CategorySet>,
        site: Option<&str>,
    ) -> NodeIndex {
        let key = suffixed(&format!("{var}-{loc}"), site);
        let (ix, _) = self.graph.intern(&key, NodeKind::VariableUse, var, loc);
        if let Some(rhs) = rhs {
            let edge = match removed {
                Some(removed) => FlowEdge::removing(removed.clone()),
                None => FlowEdge::plain(),
            };
            self.graph.add_edge(rhs, ix, edge);
        }
        ix
    }

    fn apply_concat(
        &mut self,
        loc: SourceLocation,
        operands: &[Option<NodeIndex>],
        site: Option<&str>,
    ) -> NodeIndex {
        let key = suffixed(&format!("concat-{loc}"), site);
        let (ix, _) = self.graph.intern(&key, NodeKind::VariableUse, "concat", loc);
        for operand in operands.iter().flatten() {
            self.graph.add_edge(*operand, ix, FlowEdge::plain());
        }
        ix
    }

    fn apply_join(
        &mut self,
        var: &str,
        loc: SourceLocation,
        branches: &[Option<NodeIndex>],
        site: Option<&str>,
    ) -> NodeIndex {
        let key = suffixed(&format!("{var}-{loc}"), site);
        let (ix, _) = self.graph.intern(&key, NodeKind::VariableUse, var, loc);
        for branch in branches.iter().flatten() {
            self.graph.add_edge(*branch, ix, FlowEdge::plain());
        }
        ix
    }

    fn apply_return(
        &mut self,
        routine: &str,
        value: Option<NodeIndex>,
        loc: SourceLocation,
        site: Option<&str>,
    ) {
        let key = suffixed(routine, site);
        let kind = match site {
            Some(_) => NodeKind::SpecializationInstance,
            None => NodeKind::CallReturn,
        };
        let (ret, _) = self.graph.intern(&key, kind, routine, loc);
        if let Some(value) = value {
            self.graph.add_edge(value, ret, FlowEdge::plain());
        }
    }

    fn apply_container_write(
        &mut self,
        container: NodeIndex,
        key: Option<&str>,
        value: Option<NodeIndex>,
        loc: SourceLocation,
    ) -> Option<NodeIndex> {
        let base = self.container_base(container);
        let content = self.content_node(base, key, loc)?;
        if let Some(value) = value {
            self.graph.add_edge(value, content, FlowEdge::plain());
        }
        Some(content)
    }

    fn apply_container_read(
        &mut self,
        container: NodeIndex,
        key: Option<&str>,
        loc: SourceLocation,
    ) -> Option<NodeIndex> {
        let base = self.container_base(container);
        let base_key = self.graph.key_of(base)?.to_string();
        let base_label = self.graph.node(base)?.label.clone();
        match key {
            Some(k) => {
                let specific = self.content_node(base, Some(k), loc.clone())?;
                let generic = self.content_node(base, None, loc.clone())?;
                let read_key = format!("fetch-{base_key}[{k}]-{loc}");
                let label = format!("{base_label}[{k}]");
                let (read, _) =
                    self.graph
                        .intern(&read_key, NodeKind::ArrayElement, &label, loc);
                self.graph.add_edge(specific, read, FlowEdge::plain());
                self.graph.add_edge(generic, read, FlowEdge::plain());
                self.read_aliases.insert(read, specific);
                Some(read)
            }
            None => {
                let generic = self.content_node(base, None, loc.clone())?;
                let read_key = format!("fetch-{base_key}[*]-{loc}");
                let label = format!("{base_label}[*]");
                let (read, _) =
                    self.graph
                        .intern(&read_key, NodeKind::ArrayElement, &label, loc);
                self.graph.add_edge(generic, read, FlowEdge::plain());
                let children: Vec<NodeIndex> = self
                    .container_children
                    .get(&base)
                    .cloned()
                    .unwrap_or_default();
                for child in &children {
                    self.graph.add_edge(*child, read, FlowEdge::plain());
                }
                self.unknown_reads.push(UnknownRead {
                    container: base,
                    read,
                    linked: children.len(),
                });
                self.read_aliases.insert(read, generic);
                Some(read)
            }
        }
    }

    /// Chained reads and writes address content through the node the
    /// previous fetch aliased, not the fetch expression itself.
    fn container_base(&self, container: NodeIndex) -> NodeIndex {
        self.read_aliases
            .get(&container)
            .copied()
            .unwrap_or(container)
    }

    fn content_node(
        &mut self,
        base: NodeIndex,
        key: Option<&str>,
        loc: SourceLocation,
    ) -> Option<NodeIndex> {
        let base_key = self.graph.key_of(base)?.to_string();
        let base_label = self.graph.node(base)?.label.clone();
        let slot = key.unwrap_or("*");
        let content_key = format!("{base_key}[{slot}]");
        let label = format!("{base_label}[{slot}]");
        let (content, created) =
            self.graph
                .intern(&content_key, NodeKind::ArrayElement, &label, loc);
        if created && key.is_some() {
            self.container_children.entry(base).or_default().push(content);
        }
        Some(content)
    }

    fn apply_sanitize(
        &mut self,
        value: Option<NodeIndex>,
        loc: SourceLocation,
        removed: CategorySet,
        site: Option<&str>,
    ) -> NodeIndex {
        let key = suffixed(&format!("sanitize-{loc}"), site);
        let (ix, _) = self
            .graph
            .intern(&key, NodeKind::VariableUse, "sanitize", loc);
        if let Some(value) = value {
            self.graph.add_edge(value, ix, FlowEdge::removing(removed));
        }
        ix
    }

    fn apply_assert(
        &mut self,
        var: &str,
        loc: SourceLocation,
        value: Option<NodeIndex>,
        removed: CategorySet,
        site: Option<&str>,
    ) -> NodeIndex {
        let key = suffixed(&format!("{var}-{loc}"), site);
        let (ix, _) = self.graph.intern(&key, NodeKind::VariableUse, var, loc);
        if let Some(value) = value {
            self.graph.add_edge(value, ix, FlowEdge::removing(removed));
        }
        ix
    }

    fn apply_sink(
        &mut self,
        target: &str,
        pos: u32,
        arg: Option<NodeIndex>,
        loc: SourceLocation,
        site: Option<&str>,
    ) {
        let sensitive = match self
            .registry
            .sink_params(target)
            .iter()
            .find(|(p, _)| *p == pos)
        {
            Some((_, categories)) => categories.clone(),
            None => return,
        };
        self.register_sink(target, pos, sensitive, arg, loc, site);
    }

    fn register_sink(
        &mut self,
        target: &str,
        pos: u32,
        sensitive: CategorySet,
        arg: Option<NodeIndex>,
        loc: SourceLocation,
        site: Option<&str>,
    ) {
        let key = suffixed(&format!("{target}#{pos}-{loc}"), site);
        let label = format!("{target}#{pos}");
        let (node, _) = self
            .graph
            .intern(&key, NodeKind::SinkArgument, &label, loc.clone());
        if let Some(arg) = arg {
            self.graph.add_edge(arg, node, FlowEdge::plain());
        }
        trace!(target, pos, %loc, "sink occurrence");
        self.sinks.push(SinkOccurrence {
            node,
            sensitive,
            location: loc,
        });
    }

    fn apply_call(
        &mut self,
        targets: &[&str],
        args: &[(Option<NodeIndex>, SourceLocation)],
        loc: SourceLocation,
        site: Option<&str>,
        depth: usize,
    ) -> NodeIndex {
        if targets.is_empty() {
            let key = suffixed(&format!("call-{loc}"), site);
            let (result, _) = self.graph.intern(&key, NodeKind::CallResult, "call", loc);
            return result;
        }
        // Gather classifier facts first; the registry and graph are
        // disjoint fields but helper calls below take `&mut self`.
        let mut sink_specs: Vec<(String, u32, CategorySet)> = Vec::new();
        let mut removed_total = CategorySet::new();
        let mut specialized = false;
        for target in targets {
            for (pos, categories) in self.registry.sink_params(target) {
                sink_specs.push(((*target).to_string(), *pos, categories.clone()));
            }
            if let Some(removes) = self.registry.sanitizer_removes(target) {
                removed_total.union_with(removes);
            }
            if self.registry.is_specialized(target) {
                specialized = true;
            }
        }

        for (target, pos, sensitive) in sink_specs {
            let Some(i) = (pos as usize).checked_sub(1) else {
                continue;
            };
            if let Some((arg, arg_loc)) = args.get(i) {
                self.register_sink(&target, pos, sensitive, *arg, arg_loc.clone(), site);
            }
        }

        let ret = if specialized && depth < self.max_specialization_depth {
            self.link_specialized(targets[0], args, &loc, site, depth)
        } else {
            self.link_shared(targets, args, &loc)
        };

        if removed_total.is_empty() {
            ret
        } else {
            let key = suffixed(&format!("call-{loc}"), site);
            let (result, _) = self
                .graph
                .intern(&key, NodeKind::CallResult, targets[0], loc);
            self.graph
                .add_edge(ret, result, FlowEdge::removing(removed_total));
            result
        }
    }

    /// One shared subgraph for all call sites: arguments feed the chain of
    /// parameter nodes (dispatch hops in resolver order), the chain of
    /// return nodes feeds back to the name the call was made through.
    fn link_shared(
        &mut self,
        targets: &[&str],
        args: &[(Option<NodeIndex>, SourceLocation)],
        loc: &SourceLocation,
    ) -> NodeIndex {
        for target in targets {
            let id = self.routine_id(target);
            let arity = args.len() as u32;
            match self.called_index.get(&id) {
                Some(&i) => {
                    if self.called[i].arity < arity {
                        self.called[i].arity = arity;
                    }
                }
                None => {
                    self.called_index.insert(id, self.called.len());
                    self.called.push(CalledRoutine {
                        id,
                        name: (*target).to_string(),
                        arity,
                    });
                }
            }
        }

        for (i, (arg, arg_loc)) in args.iter().enumerate() {
            let pos = i + 1;
            let mut prev = *arg;
            for target in targets {
                let key = format!("{target}#{pos}");
                let (param, _) =
                    self.graph
                        .intern(&key, NodeKind::CallArgument, &key, arg_loc.clone());
                if let Some(prev) = prev {
                    self.graph.add_edge(prev, param, FlowEdge::plain());
                }
                prev = Some(param);
            }
        }

        let mut returns = Vec::with_capacity(targets.len());
        for target in targets {
            let (ret, _) =
                self.graph
                    .intern(target, NodeKind::CallReturn, target, loc.clone());
            returns.push(ret);
        }
        for i in (1..returns.len()).rev() {
            self.graph
                .add_edge(returns[i], returns[i - 1], FlowEdge::plain());
        }
        returns[0]
    }

    /// Per-call-site boundary nodes plus fragment instantiation (now, or
    /// deferred until the body arrives).
    fn link_specialized(
        &mut self,
        routine: &str,
        args: &[(Option<NodeIndex>, SourceLocation)],
        loc: &SourceLocation,
        site: Option<&str>,
        depth: usize,
    ) -> NodeIndex {
        let instance_site = match site {
            Some(outer) => format!("{loc}@{outer}"),
            None => loc.to_string(),
        };
        for (i, (arg, arg_loc)) in args.iter().enumerate() {
            let pos = i + 1;
            let key = format!("{routine}#{pos}@{instance_site}");
            let label = format!("{routine}#{pos}");
            let (param, _) = self.graph.intern(
                &key,
                NodeKind::SpecializationInstance,
                &label,
                arg_loc.clone(),
            );
            if let Some(arg) = arg {
                self.graph.add_edge(*arg, param, FlowEdge::plain());
            }
        }
        let ret_key = format!("{routine}@{instance_site}");
        let (ret, _) = self.graph.intern(
            &ret_key,
            NodeKind::SpecializationInstance,
            routine,
            loc.clone(),
        );

        let id = self.routine_id(routine);
        if self.engine.fragment(id).is_some() {
            self.instantiate(id, routine, &instance_site, depth);
        } else {
            self.engine.push_pending(PendingCall {
                routine: id,
                routine_name: routine.to_string(),
                site: instance_site,
                arity: args.len() as u32,
                depth,
            });
        }
        ret
    }

    /// Replay a fragment's events at one call site.
    fn instantiate(&mut self, id: RoutineId, routine: &str, site: &str, depth: usize) {
        let key = SpecializationKey {
            routine: id,
            site: site.into(),
        };
        if !self.engine.mark_instantiated(key) {
            return;
        }
        let events = match self.engine.fragment(id) {
            Some(events) => events.clone(),
            None => return,
        };
        debug!(routine, site, "instantiating fragment");
        let mut slots: Vec<Option<NodeIndex>> = Vec::new();
        for event in events {
            match event {
                BodyEvent::Assign {
                    var,
                    loc,
                    rhs,
                    removed,
                } => {
                    let rhs = self.resolve_replay(routine, site, &slots, rhs);
                    let ix = self.apply_assign(&var, loc, rhs, removed.as_ref(), Some(site));
                    slots.push(Some(ix));
                }
                BodyEvent::Concat { loc, operands } => {
                    let operands: Vec<Option<NodeIndex>> = operands
                        .into_iter()
                        .map(|r| self.resolve_replay(routine, site, &slots, r))
                        .collect();
                    let ix = self.apply_concat(loc, &operands, Some(site));
                    slots.push(Some(ix));
                }
                BodyEvent::Join { var, loc, branches } => {
                    let branches: Vec<Option<NodeIndex>> = branches
                        .into_iter()
                        .map(|r| self.resolve_replay(routine, site, &slots, r))
                        .collect();
                    let ix = self.apply_join(&var, loc, &branches, Some(site));
                    slots.push(Some(ix));
                }
                BodyEvent::ContainerWrite {
                    container,
                    key,
                    value,
                    loc,
                } => {
                    let container =
                        self.resolve_replay(routine, site, &slots, Some(container));
                    let value = self.resolve_replay(routine, site, &slots, value);
                    let ix = container.and_then(|c| {
                        self.apply_container_write(c, key.as_deref(), value, loc)
                    });
                    slots.push(ix);
                }
                BodyEvent::ContainerRead {
                    container,
                    key,
                    loc,
                } => {
                    let container =
                        self.resolve_replay(routine, site, &slots, Some(container));
                    let ix = container
                        .and_then(|c| self.apply_container_read(c, key.as_deref(), loc));
                    slots.push(ix);
                }
                BodyEvent::PropertyWrite {
                    property,
                    value,
                    loc,
                } => {
                    let value = self.resolve_replay(routine, site, &slots, value);
                    let (prop, _) =
                        self.graph
                            .intern(&property, NodeKind::Property, &property, loc);
                    if let Some(value) = value {
                        self.graph.add_edge(value, prop, FlowEdge::plain());
                    }
                }
                BodyEvent::Call { targets, args, loc } => {
                    let target_refs: Vec<&str> = targets.iter().map(String::as_str).collect();
                    let args: Vec<(Option<NodeIndex>, SourceLocation)> = args
                        .into_iter()
                        .map(|a| {
                            (
                                self.resolve_replay(routine, site, &slots, a.value),
                                a.location,
                            )
                        })
                        .collect();
                    let ix = self.apply_call(&target_refs, &args, loc, Some(site), depth + 1);
                    slots.push(Some(ix));
                }
                BodyEvent::SinkUse {
                    target,
                    pos,
                    arg,
                    loc,
                } => {
                    let arg = self.resolve_replay(routine, site, &slots, arg);
                    self.apply_sink(&target, pos, arg, loc, Some(site));
                }
                BodyEvent::Sanitize {
                    value,
                    loc,
                    removed,
                } => {
                    let value = self.resolve_replay(routine, site, &slots, value);
                    let ix = self.apply_sanitize(value, loc, removed, Some(site));
                    slots.push(Some(ix));
                }
                BodyEvent::AssertUntainted {
                    var,
                    loc,
                    value,
                    removed,
                } => {
                    let value = self.resolve_replay(routine, site, &slots, value);
                    let ix = self.apply_assert(&var, loc, value, removed, Some(site));
                    slots.push(Some(ix));
                }
                BodyEvent::Return { value, loc } => {
                    let value = self.resolve_replay(routine, site, &slots, value);
                    self.apply_return(routine, value, loc, Some(site));
                }
            }
        }
    }

    fn resolve_replay(
        &mut self,
        routine: &str,
        site: &str,
        slots: &[Option<NodeIndex>],
        r: Option<NodeRef>,
    ) -> Option<NodeIndex> {
        match r? {
            NodeRef::Graph(ix) => Some(ix),
            NodeRef::Slot(i) => slots.get(i as usize).copied().flatten(),
            NodeRef::Param(pos) => {
                let key = format!("{routine}#{pos}@{site}");
                let label = format!("{routine}#{pos}");
                let (ix, _) = self.graph.intern(
                    &key,
                    NodeKind::SpecializationInstance,
                    &label,
                    parse_site(site),
                );
                Some(ix)
            }
            NodeRef::Detached => None,
        }
    }
}

/// Resolve a hook-surface reference outside any fragment context.
fn resolve_shared(r: Option<NodeRef>) -> Option<NodeIndex> {
    match r? {
        NodeRef::Graph(ix) => Some(ix),
        NodeRef::Slot(_) | NodeRef::Param(_) => {
            debug!("fragment-local reference used outside its body; ignored");
            None
        }
        NodeRef::Detached => None,
    }
}

/// The calling worker's stream identity for recording scope.
fn worker_id() -> ThreadId {
    thread::current().id()
}

fn suffixed(base: &str, site: Option<&str>) -> String {
    match site {
        Some(site) => format!("{base}@{site}"),
        None => base.to_string(),
    }
}

/// Recover a location from the first segment of a site key
/// (`file:line:col[@...]`). Fallback for nodes first interned during
/// replay rather than at a call boundary.
fn parse_site(site: &str) -> SourceLocation {
    let first = site.split('@').next().unwrap_or(site);
    let mut parts = first.rsplitn(3, ':');
    let column = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let line = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let file = parts.next().unwrap_or("").to_string();
    SourceLocation { file, line, column }
}
