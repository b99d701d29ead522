//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, computations,
//! and effects. It owns the dependency graph and schedules updates when cells
//! change.
//!
//! # How It Works
//!
//! 1. When a cell, computation, or effect is created, it adds a node to the
//!    graph and registers a weak handle with the runtime.
//!
//! 2. When a computation or effect reads a node through its
//!    [`ReactiveContext`], the read is recorded; after the run the recorded
//!    reads replace the node's previous edges.
//!
//! 3. When a cell's value changes, the runtime:
//!    a. Marks direct dependents dirty and transitive dependents maybe-dirty
//!    b. Queues every reached effect
//!    c. Leaves computations alone - they recompute on next access
//!    d. Runs the queued effects once the outermost batch ends
//!
//! # Threading
//!
//! The runtime is single-threaded: handles are `Rc`-based and not `Send`.
//! Asynchronous collaborators talk to it only through ordinary cell writes.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::{Rc, Weak};

use tracing::{error, trace, warn};

use super::context::ReactiveContext;
use crate::error::ReactiveError;
use crate::graph::{DirtyState, Edge, NodeId, NodeKind, UpdateScheduler};

use smallvec::SmallVec;

/// Upper bound on effect runs within one flush. Effects that keep
/// invalidating each other are a configuration error; we stop instead of
/// spinning forever.
const MAX_EFFECT_RUNS_PER_FLUSH: usize = 100_000;

/// A node the runtime can bring up to date without knowing its value type.
pub(crate) trait Reactive {
    /// Recompute (computations) or re-run (effects) unconditionally.
    fn update(&self);
}

/// Handle to a reactive runtime.
///
/// Cloning is cheap; clones share the same graph. Separate runtimes share
/// nothing.
#[derive(Clone, Default)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

#[derive(Default)]
struct RuntimeInner {
    graph: RefCell<UpdateScheduler>,

    // Weak references so that dropping the last handle frees the node.
    registry: RefCell<HashMap<NodeId, Weak<dyn Reactive>>>,

    /// Effects queued for the current flush, ordered by creation.
    pending: RefCell<BTreeSet<NodeId>>,

    /// Stack of computations currently evaluating.
    evaluating: RefCell<Vec<NodeId>>,

    batch_depth: Cell<usize>,
    flushing: Cell<bool>,
}

impl Runtime {
    /// Create a new, empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context for reading outside of any computation or effect.
    pub fn untracked(&self) -> ReactiveContext {
        ReactiveContext::untracked(self.clone())
    }

    /// Run `f` as one batch.
    ///
    /// Writes inside the batch only mark nodes stale. Queued effects run once,
    /// with the final values, when the outermost batch returns.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = {
            let _batch = BatchGuard::enter(self);
            f()
        };
        if self.inner.batch_depth.get() == 0 {
            self.flush();
        }
        result
    }

    /// Check if we're inside an explicit batch.
    pub fn in_batch(&self) -> bool {
        self.inner.batch_depth.get() > 0
    }

    /// The computation currently evaluating, if any.
    pub fn current_computation(&self) -> Option<NodeId> {
        self.inner.evaluating.borrow().last().copied()
    }

    /// Number of live nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    /// Number of effects waiting for the next flush.
    pub fn pending_effects(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    pub fn dirty_state(&self, node_id: NodeId) -> Option<DirtyState> {
        self.inner.graph.borrow().dirty_state(node_id)
    }

    pub(crate) fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Node lifecycle
    // ------------------------------------------------------------------

    pub(crate) fn add_node(&self, kind: NodeKind) -> NodeId {
        self.inner.graph.borrow_mut().add_node(kind)
    }

    /// Register a reactive value with the runtime.
    pub(crate) fn register(&self, node_id: NodeId, reactive: Weak<dyn Reactive>) {
        self.inner.registry.borrow_mut().insert(node_id, reactive);
    }

    /// Remove a node, its edges, and any queued run.
    ///
    /// Called from `Drop`, so it must not panic on a busy runtime.
    pub(crate) fn unregister(&self, node_id: NodeId) {
        if let Ok(mut registry) = self.inner.registry.try_borrow_mut() {
            registry.remove(&node_id);
        }
        if let Ok(mut pending) = self.inner.pending.try_borrow_mut() {
            pending.remove(&node_id);
        }
        match self.inner.graph.try_borrow_mut() {
            Ok(mut graph) => graph.remove_node(node_id),
            Err(_) => warn!(node = %node_id, "graph busy while dropping node; edges left behind"),
        }
    }

    pub(crate) fn dependency_count(&self, node_id: NodeId) -> usize {
        self.inner
            .graph
            .borrow()
            .get_node(node_id)
            .map(|node| node.dependencies().len())
            .unwrap_or(0)
    }

    pub(crate) fn version(&self, node_id: NodeId) -> u64 {
        self.inner.graph.borrow().version(node_id)
    }

    pub(crate) fn bump_version(&self, node_id: NodeId) -> u64 {
        self.inner.graph.borrow_mut().bump_version(node_id)
    }

    /// Mark a node clean before its function runs.
    ///
    /// Propagation that reaches the node during the run marks it stale
    /// again, which [`finish_run`](Self::finish_run) then honours.
    pub(crate) fn begin_run(&self, node_id: NodeId) {
        self.inner.graph.borrow_mut().mark_clean(node_id);
    }

    /// Store the edges recorded by a finished run and settle the node.
    ///
    /// The node stays dirty if something invalidated it while it was running:
    /// propagation reached it, a source it read moved, or a computation it
    /// read went stale again (an effect writing a cell upstream of what it
    /// read). Effects left dirty are queued for another run.
    pub(crate) fn finish_run(&self, node_id: NodeId, edges: SmallVec<[Edge; 4]>) {
        let stale_effect = {
            let mut graph = self.inner.graph.borrow_mut();
            let reached = graph
                .dirty_state(node_id)
                .is_some_and(|state| state != DirtyState::Clean);
            let moved = edges.iter().any(|edge| {
                graph.version(edge.source) != edge.seen_version
                    || graph
                        .dirty_state(edge.source)
                        .is_some_and(|state| state != DirtyState::Clean)
            });
            graph.replace_dependencies(node_id, edges);

            if reached || moved {
                graph.mark_dirty(node_id);
                graph
                    .get_node(node_id)
                    .is_some_and(|node| node.kind() == NodeKind::Effect)
            } else {
                graph.mark_clean(node_id);
                false
            }
        };
        if stale_effect {
            trace!(node = %node_id, "invalidated during run; rescheduling");
            self.schedule(node_id);
        }
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Push a computation onto the evaluation stack.
    ///
    /// Fails if the computation is already evaluating, which means it read
    /// itself directly or transitively.
    pub(crate) fn enter_computation(&self, node_id: NodeId) -> Result<EvaluationGuard, ReactiveError> {
        let mut evaluating = self.inner.evaluating.borrow_mut();
        if evaluating.contains(&node_id) {
            return Err(ReactiveError::Cycle { node: node_id });
        }
        evaluating.push(node_id);
        Ok(EvaluationGuard {
            runtime: self.clone(),
            node_id,
        })
    }

    pub(crate) fn is_evaluating(&self, node_id: NodeId) -> bool {
        self.inner.evaluating.borrow().contains(&node_id)
    }

    /// Bring a node up to date, recomputing or re-running it only if needed.
    ///
    /// A maybe-dirty node first refreshes each recorded dependency and
    /// compares the version it saw last time with the current one.
    pub(crate) fn update_if_necessary(&self, node_id: NodeId) {
        let (state, edges) = {
            let graph = self.inner.graph.borrow();
            match graph.get_node(node_id) {
                Some(node) => (node.dirty_state(), SmallVec::<[Edge; 4]>::from(node.dependencies())),
                None => return,
            }
        };

        let must_run = match state {
            DirtyState::Clean => return,
            DirtyState::Dirty => true,
            DirtyState::MaybeDirty => edges.iter().any(|edge| {
                self.update_if_necessary(edge.source);
                let graph = self.inner.graph.borrow();
                graph.get_node(edge.source).is_none() || graph.version(edge.source) != edge.seen_version
            }),
        };

        if !must_run {
            trace!(node = %node_id, "dependencies unchanged; keeping cached value");
            self.inner.graph.borrow_mut().mark_clean(node_id);
            return;
        }

        let reactive = self
            .inner
            .registry
            .borrow()
            .get(&node_id)
            .and_then(Weak::upgrade);
        if let Some(reactive) = reactive {
            reactive.update();
        }
    }

    // ------------------------------------------------------------------
    // Change propagation
    // ------------------------------------------------------------------

    /// Propagate a cell change and queue the effects it reaches.
    ///
    /// Outside a batch the change is its own batch and effects run now.
    pub(crate) fn notify_changed(&self, node_id: NodeId) {
        let effects = self.inner.graph.borrow_mut().mark_changed(node_id);
        self.inner.pending.borrow_mut().extend(effects);

        if self.inner.batch_depth.get() == 0 {
            self.flush();
        }
    }

    /// Queue an effect for the next flush.
    pub(crate) fn schedule(&self, node_id: NodeId) {
        self.inner.graph.borrow_mut().mark_dirty(node_id);
        self.inner.pending.borrow_mut().insert(node_id);
        if self.inner.batch_depth.get() == 0 {
            self.flush();
        }
    }

    /// Run queued effects until none are left.
    ///
    /// Effects run in creation order. Writes they make are settled within the
    /// same flush. Re-entrant calls return immediately; the outer loop picks
    /// up whatever they queued.
    fn flush(&self) {
        if self.inner.flushing.replace(true) {
            return;
        }
        let _flushing = FlushGuard { runtime: self };

        let mut runs = 0usize;
        loop {
            let next = self.inner.pending.borrow_mut().pop_first();
            let Some(effect_id) = next else {
                break;
            };

            runs += 1;
            if runs > MAX_EFFECT_RUNS_PER_FLUSH {
                let dropped = std::mem::take(&mut *self.inner.pending.borrow_mut());
                error!(
                    effect = %effect_id,
                    dropped = dropped.len(),
                    "effects keep re-triggering each other; abandoning flush"
                );
                break;
            }

            self.update_if_necessary(effect_id);
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.node_count())
            .field("pending_effects", &self.pending_effects())
            .field("batch_depth", &self.inner.batch_depth.get())
            .finish()
    }
}

/// Pops the evaluation stack when dropped, even if the computation panics.
pub(crate) struct EvaluationGuard {
    runtime: Runtime,
    node_id: NodeId,
}

impl Drop for EvaluationGuard {
    fn drop(&mut self) {
        if let Ok(mut evaluating) = self.runtime.inner.evaluating.try_borrow_mut() {
            let popped = evaluating.pop();
            debug_assert_eq!(
                popped,
                Some(self.node_id),
                "evaluation stack mismatch"
            );
        }
    }
}

struct BatchGuard<'a> {
    runtime: &'a Runtime,
}

impl<'a> BatchGuard<'a> {
    fn enter(runtime: &'a Runtime) -> Self {
        let depth = &runtime.inner.batch_depth;
        depth.set(depth.get() + 1);
        Self { runtime }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let depth = &self.runtime.inner.batch_depth;
        depth.set(depth.get().saturating_sub(1));
    }
}

struct FlushGuard<'a> {
    runtime: &'a Runtime,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.runtime.inner.flushing.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockReactive {
        updates: Cell<usize>,
    }

    impl Reactive for MockReactive {
        fn update(&self) {
            self.updates.set(self.updates.get() + 1);
        }
    }

    fn register_mock(runtime: &Runtime, kind: NodeKind) -> (NodeId, Rc<MockReactive>) {
        let id = runtime.add_node(kind);
        let mock = Rc::new(MockReactive { updates: Cell::new(0) });
        let weak: Weak<dyn Reactive> = Rc::downgrade(&mock) as Weak<dyn Reactive>;
        runtime.register(id, weak);
        (id, mock)
    }

    /// Record a completed run of `node_id` that read `source` at version 0.
    fn settle(runtime: &Runtime, node_id: NodeId, source: NodeId) {
        runtime.begin_run(node_id);
        runtime.finish_run(node_id, smallvec::smallvec![Edge { source, seen_version: 0 }]);
    }

    #[test]
    fn runtime_registers_and_unregisters() {
        let runtime = Runtime::new();
        let (id, _mock) = register_mock(&runtime, NodeKind::Derived);

        assert_eq!(runtime.node_count(), 1);
        assert!(runtime.inner.registry.borrow().contains_key(&id));

        runtime.unregister(id);
        assert_eq!(runtime.node_count(), 0);
        assert!(!runtime.inner.registry.borrow().contains_key(&id));
    }

    #[test]
    fn change_runs_reached_effects() {
        let runtime = Runtime::new();
        let source = runtime.add_node(NodeKind::Source);
        let (memo_id, memo) = register_mock(&runtime, NodeKind::Derived);
        let (effect_id, effect) = register_mock(&runtime, NodeKind::Effect);

        settle(&runtime, memo_id, source);
        settle(&runtime, effect_id, source);

        runtime.bump_version(source);
        runtime.notify_changed(source);

        // Computations are lazy; only the effect was brought up to date.
        assert_eq!(memo.updates.get(), 0);
        assert_eq!(runtime.dirty_state(memo_id), Some(DirtyState::Dirty));
        assert_eq!(effect.updates.get(), 1);
        assert_eq!(runtime.pending_effects(), 0);
    }

    #[test]
    fn batch_defers_effects_until_outermost_batch_ends() {
        let runtime = Runtime::new();
        let source = runtime.add_node(NodeKind::Source);
        let (effect_id, effect) = register_mock(&runtime, NodeKind::Effect);
        settle(&runtime, effect_id, source);

        runtime.batch(|| {
            runtime.batch(|| {
                runtime.bump_version(source);
                runtime.notify_changed(source);
            });
            assert!(runtime.in_batch());
            assert_eq!(runtime.pending_effects(), 1);
            assert_eq!(effect.updates.get(), 0);

            runtime.bump_version(source);
            runtime.notify_changed(source);
        });

        assert!(!runtime.in_batch());
        assert_eq!(effect.updates.get(), 1);
    }

    #[test]
    fn enter_computation_detects_reentry() {
        let runtime = Runtime::new();
        let id = runtime.add_node(NodeKind::Derived);

        let guard = runtime.enter_computation(id).unwrap();
        assert_eq!(runtime.current_computation(), Some(id));
        assert!(matches!(
            runtime.enter_computation(id),
            Err(ReactiveError::Cycle { node }) if node == id
        ));

        drop(guard);
        assert!(runtime.current_computation().is_none());
    }

    #[test]
    fn separate_runtimes_share_nothing() {
        let first = Runtime::new();
        let second = Runtime::new();
        first.add_node(NodeKind::Source);

        assert_eq!(first.node_count(), 1);
        assert_eq!(second.node_count(), 0);
        assert!(!first.ptr_eq(&second));
        assert!(first.ptr_eq(&first.clone()));
    }
}
