//! Backward demand-driven search from sink occurrences to sources.
//!
//! Each sink occurrence starts a depth-first walk against edge direction,
//! carrying the set of categories the sink is sensitive to. Crossing an
//! edge subtracts what the edge sanitizes; a walk whose demand empties is
//! abandoned. A node whose injected categories intersect the remaining
//! demand ends the walk with a finding.
//!
//! Determinism: predecessors are visited in edge registration order, so
//! the first path reported for a sink depends only on the order the build
//! phase registered nodes and edges, never on hash iteration or thread
//! interleaving. Searches share nothing and run one sink at a time, which
//! is what lets the session fan them out across a thread pool.

use petgraph::graph::NodeIndex;
use tracing::trace;
use weir_core::types::FxHashSet;
use weir_core::{Cancellable, CancellationToken, Finding, PathStep, TaintError};

use crate::categories::{CategorySet, TaintCategory};
use crate::flow::FlowGraph;
use crate::hook::SinkOccurrence;

/// One walk state: a node reached with a remaining demand. `path` runs
/// sink-first; `found` marks a frame whose crossing edge already satisfied
/// the demand.
struct Frame {
    node: NodeIndex,
    demand: CategorySet,
    path: Vec<NodeIndex>,
    found: Option<TaintCategory>,
}

/// Read-only searcher over a sealed graph.
pub struct PathFinder<'a> {
    graph: &'a FlowGraph,
    max_depth: usize,
}

impl<'a> PathFinder<'a> {
    pub fn new(graph: &'a FlowGraph, max_depth: usize) -> Self {
        Self { graph, max_depth }
    }

    /// Search backward from one sink occurrence. Returns the first
    /// demand-satisfying path in visit order, if any.
    pub fn find(
        &self,
        sink: &SinkOccurrence,
        cancel: &CancellationToken,
    ) -> Result<Option<Finding>, TaintError> {
        if sink.sensitive.is_empty() {
            return Ok(None);
        }
        trace!(sink = %sink.location, "searching sink occurrence");

        // Visited is keyed on (node, demand): reaching a node again with a
        // differently-sanitized demand is a distinct state, not a revisit.
        let mut visited: FxHashSet<(NodeIndex, CategorySet)> = FxHashSet::default();
        visited.insert((sink.node, sink.sensitive.clone()));
        let mut stack = vec![Frame {
            node: sink.node,
            demand: sink.sensitive.clone(),
            path: vec![sink.node],
            found: None,
        }];

        while let Some(frame) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(TaintError::Cancelled);
            }
            if let Some(category) = frame.found {
                return Ok(Some(self.build_finding(sink, &category, &frame.path)));
            }
            let Some(node) = self.graph.node(frame.node) else {
                continue;
            };
            if let Some(category) = node.initial.first_common(&frame.demand) {
                return Ok(Some(self.build_finding(sink, category, &frame.path)));
            }
            if frame.path.len() >= self.max_depth {
                trace!(depth = frame.path.len(), "abandoning walk at depth cap");
                continue;
            }

            // Collect forward, push reversed: pops then follow edge
            // registration order.
            let mut successors: Vec<Frame> = Vec::new();
            for (edge, origin) in self.graph.neighbors_backward(frame.node) {
                if let Some(category) = edge.added.first_common(&frame.demand) {
                    let mut path = frame.path.clone();
                    path.push(origin);
                    successors.push(Frame {
                        node: origin,
                        demand: frame.demand.clone(),
                        path,
                        found: Some(category.clone()),
                    });
                    continue;
                }
                let remaining = frame.demand.difference(&edge.removed);
                if remaining.is_empty() {
                    continue;
                }
                if !visited.insert((origin, remaining.clone())) {
                    continue;
                }
                let mut path = frame.path.clone();
                path.push(origin);
                successors.push(Frame {
                    node: origin,
                    demand: remaining,
                    path,
                    found: None,
                });
            }
            for successor in successors.into_iter().rev() {
                stack.push(successor);
            }
        }
        Ok(None)
    }

    /// Render the walked path source-first into a finding.
    fn build_finding(
        &self,
        sink: &SinkOccurrence,
        category: &TaintCategory,
        path: &[NodeIndex],
    ) -> Finding {
        let steps: Vec<PathStep> = path
            .iter()
            .rev()
            .filter_map(|&index| {
                self.graph
                    .node(index)
                    .map(|node| PathStep::new(node.label.clone(), node.location.clone()))
            })
            .collect();
        Finding {
            category: category.to_string(),
            sink_location: sink.location.clone(),
            path: steps,
        }
    }
}
