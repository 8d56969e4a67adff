//! The program-wide data-flow multigraph.
//!
//! Nodes are interned by stable identity key so the visitor can register
//! them in any order; edges carry the category algebra (added/removed sets)
//! that the backward search applies hop by hop.

pub mod graph;
pub mod node;

pub use graph::{FlowEdge, FlowGraph, FlowGraphStats};
pub use node::{NodeKind, NodeRef, TaintNode};
