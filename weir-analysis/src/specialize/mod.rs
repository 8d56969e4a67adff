//! Per-call-site specialization state.
//!
//! While the visitor walks a specializable routine's body, the hook
//! records its operations as a fragment of replayable events over
//! fragment-local slots instead of writing shared graph nodes. Each call
//! site then instantiates the fragment with every local key suffixed by
//! the site, so one site's taint never contaminates another's. Call sites
//! seen before the body park a `PendingCall`; the fragment's arrival (or
//! the seal barrier) settles them.
//!
//! Recordings are keyed per worker thread. A body is visited start to
//! finish by one file worker, so only that worker's hook calls belong to
//! the fragment; another worker's interleaved operations keep writing the
//! shared graph and are never swallowed into a fragment they are not part
//! of.

use std::thread::ThreadId;

use weir_core::types::{FxHashMap, FxHashSet, RoutineId, SmallVec4, SourceLocation};

use crate::categories::CategorySet;
use crate::flow::NodeRef;
use crate::hook::CallArg;

/// (routine, call site) pair naming one specialization instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecializationKey {
    pub routine: RoutineId,
    /// `file:line:col` of the call, with `@outer-site` suffixes when the
    /// call itself sits inside another instantiated fragment.
    pub site: Box<str>,
}

/// One recorded hook operation inside a specializable body.
///
/// Operand references are raw `NodeRef`s: `Graph` for shared nodes
/// (sources, properties), `Slot`/`Param` for fragment-local ones.
#[derive(Debug, Clone)]
pub enum BodyEvent {
    Assign {
        var: String,
        loc: SourceLocation,
        rhs: Option<NodeRef>,
        removed: Option<CategorySet>,
    },
    Concat {
        loc: SourceLocation,
        operands: SmallVec4<Option<NodeRef>>,
    },
    Join {
        var: String,
        loc: SourceLocation,
        branches: SmallVec4<Option<NodeRef>>,
    },
    ContainerWrite {
        container: NodeRef,
        key: Option<String>,
        value: Option<NodeRef>,
        loc: SourceLocation,
    },
    ContainerRead {
        container: NodeRef,
        key: Option<String>,
        loc: SourceLocation,
    },
    PropertyWrite {
        property: String,
        value: Option<NodeRef>,
        loc: SourceLocation,
    },
    Call {
        targets: SmallVec4<String>,
        args: SmallVec4<CallArg>,
        loc: SourceLocation,
    },
    SinkUse {
        target: String,
        pos: u32,
        arg: Option<NodeRef>,
        loc: SourceLocation,
    },
    Sanitize {
        value: Option<NodeRef>,
        loc: SourceLocation,
        removed: CategorySet,
    },
    AssertUntainted {
        var: String,
        loc: SourceLocation,
        value: Option<NodeRef>,
        removed: CategorySet,
    },
    Return {
        value: Option<NodeRef>,
        loc: SourceLocation,
    },
}

impl BodyEvent {
    /// Whether replaying this event materializes a node the recording
    /// handed out a slot for. Replay must assign slots in exactly the
    /// recording's order.
    pub fn produces_slot(&self) -> bool {
        matches!(
            self,
            BodyEvent::Assign { .. }
                | BodyEvent::Concat { .. }
                | BodyEvent::Join { .. }
                | BodyEvent::ContainerWrite { .. }
                | BodyEvent::ContainerRead { .. }
                | BodyEvent::Call { .. }
                | BodyEvent::Sanitize { .. }
                | BodyEvent::AssertUntainted { .. }
        )
    }
}

/// An in-progress fragment recording.
#[derive(Debug)]
pub struct Recording {
    pub routine: RoutineId,
    pub routine_name: String,
    pub events: Vec<BodyEvent>,
    next_slot: u32,
}

impl Recording {
    fn new(routine: RoutineId, routine_name: String) -> Self {
        Self {
            routine,
            routine_name,
            events: Vec::new(),
            next_slot: 0,
        }
    }

    /// Record an event that hands out a fragment-local slot.
    pub fn push_producing(&mut self, event: BodyEvent) -> NodeRef {
        debug_assert!(event.produces_slot());
        self.events.push(event);
        let slot = self.next_slot;
        self.next_slot += 1;
        NodeRef::Slot(slot)
    }

    /// Record an event with no slot of its own.
    pub fn push(&mut self, event: BodyEvent) {
        debug_assert!(!event.produces_slot());
        self.events.push(event);
    }
}

/// A call site waiting for its routine's fragment.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub routine: RoutineId,
    pub routine_name: String,
    pub site: String,
    /// Number of arguments the call supplied; bounds the default boundary
    /// wiring if the body never arrives.
    pub arity: u32,
    /// Specialization nesting of the calling context.
    pub depth: usize,
}

/// Bookkeeping for fragment recording and instantiation.
#[derive(Debug, Default)]
pub struct SpecializationEngine {
    fragments: FxHashMap<RoutineId, Vec<BodyEvent>>,
    recordings: FxHashMap<ThreadId, Recording>,
    pending: Vec<PendingCall>,
    instantiated: FxHashSet<SpecializationKey>,
}

impl SpecializationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin recording a specializable routine's body on one worker's
    /// stream. No-op if that worker is already recording (bodies do not
    /// nest within a stream).
    pub fn begin_recording(&mut self, worker: ThreadId, routine: RoutineId, routine_name: &str) {
        self.recordings
            .entry(worker)
            .or_insert_with(|| Recording::new(routine, routine_name.to_string()));
    }

    pub fn recording(&mut self, worker: ThreadId) -> Option<&mut Recording> {
        self.recordings.get_mut(&worker)
    }

    pub fn is_recording(&self, worker: ThreadId) -> bool {
        self.recordings.contains_key(&worker)
    }

    /// Finish one worker's active recording and store its fragment.
    pub fn finish_recording(&mut self, worker: ThreadId) -> Option<(RoutineId, String)> {
        let recording = self.recordings.remove(&worker)?;
        let id = recording.routine;
        let name = recording.routine_name;
        self.fragments.insert(id, recording.events);
        Some((id, name))
    }

    pub fn fragment(&self, routine: RoutineId) -> Option<&Vec<BodyEvent>> {
        self.fragments.get(&routine)
    }

    /// Mark an instance as materialized; false if it already was.
    pub fn mark_instantiated(&mut self, key: SpecializationKey) -> bool {
        self.instantiated.insert(key)
    }

    pub fn push_pending(&mut self, pending: PendingCall) {
        self.pending.push(pending);
    }

    /// Drain pending calls for one routine (after its fragment arrived).
    pub fn drain_pending_for(&mut self, routine: RoutineId) -> Vec<PendingCall> {
        let mut drained = Vec::new();
        self.pending.retain(|p| {
            if p.routine == routine {
                drained.push(p.clone());
                false
            } else {
                true
            }
        });
        drained
    }

    /// Drain every remaining pending call (seal barrier).
    pub fn drain_pending(&mut self) -> Vec<PendingCall> {
        std::mem::take(&mut self.pending)
    }

    pub fn instantiated_count(&self) -> usize {
        self.instantiated.len()
    }
}
