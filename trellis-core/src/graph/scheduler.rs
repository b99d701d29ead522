//! Update Scheduler
//!
//! The scheduler owns the dependency graph and decides which nodes are
//! affected by a change. It never runs user code: recomputation is pulled
//! lazily by readers, and effects are handed back to the runtime to run.
//!
//! # Algorithm
//!
//! 1. When a source node changes, mark its direct dependents as "dirty".
//! 2. Propagate "maybe dirty" to their dependents, recursively, stopping at
//!    nodes that are already stale (their dependents were marked when they
//!    went stale).
//! 3. Collect every effect reached so the runtime can queue it.
//!
//! A maybe-dirty node later compares the versions it recorded for each
//! dependency with the current ones and recomputes only if something moved.
//! This "push-pull" approach minimizes unnecessary recomputation, and diamond
//! shapes collapse naturally because staleness is a flag, not a counter.

use std::collections::{HashMap, HashSet, VecDeque};

use smallvec::SmallVec;
use tracing::trace;

use super::node::{DirtyState, Edge, Node, NodeId, NodeKind};

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,

    next_id: u64,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node of the given kind to the graph.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, kind));
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub fn remove_node(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.remove(&node_id) {
            for edge in node.dependencies() {
                if let Some(dep) = self.nodes.get_mut(&edge.source) {
                    dep.remove_dependent(node_id);
                }
            }

            for dependent_id in node.dependents() {
                if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                    dependent.remove_dependency(node_id);
                }
            }
        }
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Current dirty state, or `None` if the node is gone.
    pub fn dirty_state(&self, node_id: NodeId) -> Option<DirtyState> {
        self.nodes.get(&node_id).map(Node::dirty_state)
    }

    /// Current version of a node. Removed nodes report version 0.
    pub fn version(&self, node_id: NodeId) -> u64 {
        self.nodes.get(&node_id).map(Node::version).unwrap_or(0)
    }

    pub(crate) fn bump_version(&mut self, node_id: NodeId) -> u64 {
        self.nodes
            .get_mut(&node_id)
            .map(Node::bump_version)
            .unwrap_or(0)
    }

    pub(crate) fn mark_clean(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mark_clean();
        }
    }

    pub(crate) fn mark_dirty(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mark_dirty();
        }
    }

    /// Replace the dependency set of `node_id` wholesale.
    ///
    /// Reverse edges of sources that are no longer read are dropped, so a
    /// conditional read that was not taken this time stops notifying us.
    pub(crate) fn replace_dependencies(&mut self, node_id: NodeId, edges: SmallVec<[Edge; 4]>) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let old = node.set_dependencies(edges.clone());

        for edge in &old {
            if !edges.iter().any(|e| e.source == edge.source) {
                if let Some(source) = self.nodes.get_mut(&edge.source) {
                    source.remove_dependent(node_id);
                }
            }
        }

        for edge in &edges {
            if let Some(source) = self.nodes.get_mut(&edge.source) {
                source.add_dependent(node_id);
            }
        }
    }

    /// Mark a source node as changed and propagate dirty flags.
    ///
    /// Returns the effects reached by the propagation, in discovery order.
    pub fn mark_changed(&mut self, source_id: NodeId) -> Vec<NodeId> {
        let mut effects = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(source) = self.nodes.get(&source_id) {
            for dependent_id in source.dependents() {
                queue.push_back((*dependent_id, true));
            }
        }

        while let Some((node_id, direct)) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };

            let was_clean = node.is_clean();
            if direct {
                node.mark_dirty();
            } else {
                node.mark_maybe_dirty();
            }

            if !visited.insert(node_id) {
                continue;
            }

            if node.kind() == NodeKind::Effect {
                effects.push(node_id);
            }

            // Dependents of an already stale node were marked when it went stale.
            if was_clean {
                for dependent_id in node.dependents() {
                    queue.push_back((*dependent_id, false));
                }
            }
        }

        trace!(source = %source_id, stale = visited.len(), effects = effects.len(), "propagated change");
        effects
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
