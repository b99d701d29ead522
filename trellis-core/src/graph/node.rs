//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::fmt;

use indexmap::IndexSet;
use smallvec::SmallVec;

/// Unique identifier for a node in the dependency graph.
///
/// Identifiers are allocated by the owning [`UpdateScheduler`](super::UpdateScheduler)
/// in creation order, so ordering by id is ordering by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (cell). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Source,

    /// A derived node (computation). These have dependencies and may have dependents.
    /// They cache their computed value.
    Derived,

    /// An effect node. These are leaves of the graph.
    /// They have dependencies but no dependents (they produce side effects, not values).
    Effect,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// Something upstream changed, but not a direct dependency. The node must
    /// compare its recorded dependency versions before deciding to recompute.
    MaybeDirty,

    /// A direct dependency changed. The node must recompute.
    Dirty,
}

/// A dependency edge as recorded by the reader: which node was read and
/// which version of it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub source: NodeId,
    pub seen_version: u64,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    dirty: DirtyState,

    /// Bumped every time the node's observable value changes.
    version: u64,

    /// Nodes this node read during its last evaluation, with the versions seen.
    dependencies: SmallVec<[Edge; 4]>,

    /// Nodes that read this node during their last evaluation.
    dependents: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            dirty: match kind {
                NodeKind::Source => DirtyState::Clean,
                // Start dirty to ensure first computation
                NodeKind::Derived | NodeKind::Effect => DirtyState::Dirty,
            },
            version: 0,
            dependencies: SmallVec::new(),
            dependents: IndexSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as maybe dirty. Never downgrades a dirty node.
    pub(crate) fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    pub fn dependencies(&self) -> &[Edge] {
        &self.dependencies
    }

    pub(crate) fn set_dependencies(&mut self, edges: SmallVec<[Edge; 4]>) -> SmallVec<[Edge; 4]> {
        std::mem::replace(&mut self.dependencies, edges)
    }

    pub(crate) fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.retain(|edge| edge.source != node_id);
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    pub(crate) fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub(crate) fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }
}
