//! Data-flow node model.

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use weir_core::types::{NodeKeyId, SourceLocation};

use crate::categories::CategorySet;

/// Semantic kind of a data-flow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A read of an untrusted-input container (`$_GET`, ...).
    SourceLiteral,
    /// A local variable use, concat, or other expression-level node.
    VariableUse,
    /// A routine's formal parameter (`Class::method#2`).
    CallArgument,
    /// A routine's shared return node (`Class::method`).
    CallReturn,
    /// A call-expression result distinct from the callee's return node.
    CallResult,
    /// Class-level property content (`Class::$prop`).
    Property,
    /// Container content at one key (`{container}[0]`) or any key
    /// (`{container}[*]`).
    ArrayElement,
    /// A per-call-site instance of a specializable routine's node.
    SpecializationInstance,
    /// The guarded argument of one sink occurrence.
    SinkArgument,
}

/// Node weight stored in the flow graph.
#[derive(Debug, Clone)]
pub struct TaintNode {
    /// Interned identity key.
    pub key: NodeKeyId,
    pub kind: NodeKind,
    /// Diagnostic label (`$_GET`, `$userId`, `concat`, `A::deleteUser#2`).
    pub label: String,
    /// Position recorded when the node was first interned.
    pub location: SourceLocation,
    /// Taint injected at this node; non-empty only for sources.
    pub initial: CategorySet,
}

/// Handle returned by every Integration Hook operation.
///
/// Inside a specializable routine's body the hook records events instead of
/// writing shared nodes, so handles are fragment-relative there; everywhere
/// else they name a graph node directly. `Detached` is what a disabled
/// session hands out: it resolves to nothing and keeps the hook surface
/// infallible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    /// A node in the shared graph.
    Graph(NodeIndex),
    /// A fragment-local slot, valid only while its body is being recorded.
    Slot(u32),
    /// A fragment-local formal parameter, 1-based.
    Param(u32),
    /// No node; produced when tracking is disabled.
    Detached,
}
