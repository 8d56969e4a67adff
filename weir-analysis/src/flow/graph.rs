//! Flow graph: a stable directed multigraph with identity-keyed interning.

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::Directed;
use serde::Serialize;
use weir_core::types::{FxHashMap, KeyInterner, NodeKeyId, SmallVec8, SourceLocation};

use crate::categories::CategorySet;

use super::node::{NodeKind, TaintNode};

/// Edge weight: categories injected or stripped while crossing.
#[derive(Debug, Clone, Default)]
pub struct FlowEdge {
    pub added: CategorySet,
    pub removed: CategorySet,
}

impl FlowEdge {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn removing(removed: CategorySet) -> Self {
        Self {
            added: CategorySet::new(),
            removed,
        }
    }
}

/// Counters reported when the graph is sealed.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FlowGraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub source_count: usize,
}

/// The program-wide data-flow multigraph.
///
/// Wraps a `StableGraph` with an interned-key index so node creation is
/// idempotent and order-independent: interning an existing key returns the
/// existing node untouched (first registration wins for metadata, which
/// pins diagnostic locations to the first site that mentioned the node).
///
/// Backward adjacency is kept in insertion order in a side table because
/// the search contract requires edges visited in registration order, and
/// `petgraph` iterates incoming edges newest-first.
#[derive(Debug)]
pub struct FlowGraph {
    graph: StableGraph<TaintNode, FlowEdge, Directed>,
    interner: KeyInterner,
    node_index: FxHashMap<NodeKeyId, NodeIndex>,
    incoming: FxHashMap<NodeIndex, SmallVec8<(NodeIndex, EdgeIndex)>>,
    source_count: usize,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self {
            graph: StableGraph::new(),
            interner: KeyInterner::new(),
            node_index: FxHashMap::default(),
            incoming: FxHashMap::default(),
            source_count: 0,
        }
    }

    /// Intern a node by identity key. Returns the node index and whether
    /// this call created it.
    pub fn intern(
        &mut self,
        key: &str,
        kind: NodeKind,
        label: &str,
        location: SourceLocation,
    ) -> (NodeIndex, bool) {
        let key_id = NodeKeyId::from(self.interner.intern(key));
        if let Some(&existing) = self.node_index.get(&key_id) {
            return (existing, false);
        }
        let index = self.graph.add_node(TaintNode {
            key: key_id,
            kind,
            label: label.to_string(),
            location,
            initial: CategorySet::new(),
        });
        self.node_index.insert(key_id, index);
        (index, true)
    }

    /// Intern a source node, unioning `initial` into its injected set.
    pub fn intern_source(
        &mut self,
        key: &str,
        label: &str,
        location: SourceLocation,
        initial: &CategorySet,
    ) -> NodeIndex {
        let (index, created) = self.intern(key, NodeKind::SourceLiteral, label, location);
        if created && !initial.is_empty() {
            self.source_count += 1;
        }
        if let Some(node) = self.graph.node_weight_mut(index) {
            node.initial.union_with(initial);
        }
        index
    }

    /// Add a directed edge. Duplicates are tolerated, not collapsed.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: FlowEdge) {
        let edge_index = self.graph.add_edge(from, to, edge);
        self.incoming.entry(to).or_default().push((from, edge_index));
    }

    /// Incoming edges of `node` in registration order.
    pub fn neighbors_backward(
        &self,
        node: NodeIndex,
    ) -> impl Iterator<Item = (&FlowEdge, NodeIndex)> + '_ {
        self.incoming
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|&(from, edge)| self.graph.edge_weight(edge).map(|weight| (weight, from)))
    }

    pub fn node(&self, index: NodeIndex) -> Option<&TaintNode> {
        self.graph.node_weight(index)
    }

    /// Look up a node by its identity key without creating it.
    pub fn lookup(&self, key: &str) -> Option<NodeIndex> {
        let spur = self.interner.get(key)?;
        self.node_index.get(&NodeKeyId::from(spur)).copied()
    }

    /// Resolve a node's identity key back to its string form.
    pub fn key_of(&self, index: NodeIndex) -> Option<&str> {
        let node = self.graph.node_weight(index)?;
        Some(self.interner.resolve(&node.key.inner()))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn stats(&self) -> FlowGraphStats {
        FlowGraphStats {
            node_count: self.graph.node_count(),
            edge_count: self.graph.edge_count(),
            source_count: self.source_count,
        }
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}
