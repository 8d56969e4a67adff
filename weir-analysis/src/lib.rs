//! Taint tracking for untrusted program input.
//!
//! The type-checking visitor drives the [`hook`] surface while it walks
//! the program, building one interprocedural data-flow graph; after the
//! walk the [`session`] seals the graph and searches backward from every
//! sensitive sink for a reachable source. Sources inject taint
//! categories, sanitizers strip them edge by edge, and any path that
//! still carries a demanded category when it reaches a source becomes a
//! [`weir_core::Finding`].

pub mod annotations;
pub mod categories;
pub mod finder;
pub mod flow;
pub mod hook;
pub mod registry;
pub mod report;
pub mod session;
pub mod specialize;

pub use annotations::{parse_directive, Directive, TaintContract};
pub use categories::{CategorySet, TaintCategory};
pub use finder::PathFinder;
pub use flow::{FlowEdge, FlowGraph, FlowGraphStats, NodeKind, NodeRef, TaintNode};
pub use hook::{CallArg, SinkOccurrence, TaintHook};
pub use registry::{OverlayFile, TaintRegistry};
pub use report::{reporter_for, JsonReporter, Reporter, SarifReporter, TextReporter};
pub use session::TaintSession;
pub use specialize::SpecializationKey;
