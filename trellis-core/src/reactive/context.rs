//! Reactive Context
//!
//! The reactive context records which nodes a computation or effect reads
//! while it runs. This enables automatic dependency tracking: every tracked
//! read goes through a context, and the context remembers the source node and
//! the version it observed.
//!
//! # Implementation
//!
//! Contexts are explicit values passed by reference into every `get()`. There
//! is no thread-local "current observer": a computation receives its own
//! context as an argument and hands it to whatever it reads. Callers outside
//! the graph use [`Runtime::untracked`], whose reads register nothing.
//!
//! This design supports nested evaluation (a computation that reads from
//! another computation) without any hidden global state.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::Runtime;
use crate::graph::{Edge, NodeId};

/// An evaluation context handed to every tracked read.
pub struct ReactiveContext {
    runtime: Runtime,

    /// The computation or effect being evaluated, if any.
    observer: Option<NodeId>,

    /// Dependencies collected during this evaluation, first read wins.
    reads: RefCell<SmallVec<[Edge; 4]>>,
}

impl ReactiveContext {
    /// A context that records reads on behalf of `observer`.
    pub(crate) fn tracking(runtime: Runtime, observer: NodeId) -> Self {
        Self {
            runtime,
            observer: Some(observer),
            reads: RefCell::new(SmallVec::new()),
        }
    }

    /// A context whose reads are not recorded.
    pub(crate) fn untracked(runtime: Runtime) -> Self {
        Self {
            runtime,
            observer: None,
            reads: RefCell::new(SmallVec::new()),
        }
    }

    /// The runtime this context belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Check if reads through this context register dependencies.
    pub fn is_tracking(&self) -> bool {
        self.observer.is_some()
    }

    /// The node being evaluated, if any.
    pub fn observer(&self) -> Option<NodeId> {
        self.observer
    }

    /// Record a dependency on `source`, observed at `version`.
    ///
    /// Called by cells and computations when they are read.
    pub(crate) fn track(&self, source: NodeId, version: u64) {
        if self.observer.is_none() {
            return;
        }
        let mut reads = self.reads.borrow_mut();
        if !reads.iter().any(|edge| edge.source == source) {
            reads.push(Edge {
                source,
                seen_version: version,
            });
        }
    }

    /// Get the dependencies collected so far.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.reads.borrow().iter().map(|edge| edge.source).collect()
    }

    pub(crate) fn into_edges(self) -> SmallVec<[Edge; 4]> {
        self.reads.into_inner()
    }
}

impl std::fmt::Debug for ReactiveContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveContext")
            .field("observer", &self.observer)
            .field("reads", &self.reads.borrow().len())
            .finish()
    }
}
