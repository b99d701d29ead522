//! Computation Implementation
//!
//! A Computation is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computations Work
//!
//! 1. On first access, the computation runs its function and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns the cache.
//!
//! 3. When a direct dependency changes, the computation is marked "dirty";
//!    when something further upstream changes, it is marked "maybe dirty".
//!
//! 4. On next access, a maybe-dirty computation refreshes its upstream
//!    computations and compares the versions it saw last time.
//!
//! 5. If an input version moved, recompute. Otherwise, mark clean and return
//!    the cache.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A cell changes
//! - 10 computations depend on it
//! - Only the computations actually accessed will recompute
//! - Computations that are never read stay dirty (no wasted work)
//!
//! A recomputation that produces an equal value keeps the old version, so
//! downstream nodes see nothing changed and keep their caches too.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use tracing::{error, trace};

use super::context::ReactiveContext;
use super::runtime::{Reactive, Runtime};
use crate::error::ReactiveError;
use crate::graph::{DirtyState, NodeId, NodeKind};

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. The `PartialEq` bound is needed to
///   detect when the computed value actually changed (some computations return
///   the same value even if inputs changed).
///
/// The function must be pure: it may read any number of cells and
/// computations through the context it is given, and must not write cells.
pub struct Computation<T: 'static> {
    inner: Rc<ComputationInner<T>>,
}

struct ComputationInner<T> {
    id: NodeId,
    runtime: Runtime,
    compute: Box<dyn Fn(&ReactiveContext) -> T>,

    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,

    recompute_count: std::cell::Cell<usize>,
}

impl<T: PartialEq + 'static> Computation<T> {
    /// Create a new computation with the given function.
    ///
    /// The function is not run immediately. It runs on first access.
    pub fn new(runtime: &Runtime, compute: impl Fn(&ReactiveContext) -> T + 'static) -> Self {
        let id = runtime.add_node(NodeKind::Derived);
        let inner = Rc::new(ComputationInner {
            id,
            runtime: runtime.clone(),
            compute: Box::new(compute),
            value: RefCell::new(None),
            recompute_count: std::cell::Cell::new(0),
        });
        let weak: Weak<dyn Reactive> = Rc::downgrade(&inner) as Weak<dyn Reactive>;
        runtime.register(id, weak);
        Self { inner }
    }

    /// Borrow the up-to-date value, recording a dependency through `cx`.
    ///
    /// Fails with [`ReactiveError::Cycle`] if this computation is already
    /// evaluating further up the stack.
    pub fn try_with<R>(&self, cx: &ReactiveContext, f: impl FnOnce(&T) -> R) -> Result<R, ReactiveError> {
        let inner = &self.inner;
        debug_assert!(cx.runtime().ptr_eq(&inner.runtime), "computation read through a foreign runtime");

        if inner.runtime.is_evaluating(inner.id) {
            let err = ReactiveError::Cycle { node: inner.id };
            error!(%err, "computation graph is cyclic");
            return Err(err);
        }

        inner.runtime.update_if_necessary(inner.id);
        cx.track(inner.id, inner.runtime.version(inner.id));

        let value = inner.value.borrow();
        let value = value
            .as_ref()
            .expect("settled computation should have a value");
        Ok(f(value))
    }

    /// Borrow the up-to-date value, recording a dependency through `cx`.
    ///
    /// # Panics
    ///
    /// Panics on a dependency cycle.
    pub fn with<R>(&self, cx: &ReactiveContext, f: impl FnOnce(&T) -> R) -> R {
        match self.try_with(cx, f) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the cached value if not stale; otherwise recompute and cache.
    ///
    /// Cycles panic; use [`try_get`](Self::try_get) to observe them instead.
    pub fn get(&self, cx: &ReactiveContext) -> T
    where
        T: Clone,
    {
        self.with(cx, T::clone)
    }

    pub fn try_get(&self, cx: &ReactiveContext) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        self.try_with(cx, T::clone)
    }

    /// Get the up-to-date value without registering a dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.get(&self.inner.runtime.untracked())
    }
}

impl<T: 'static> Computation<T> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        self.inner
            .runtime
            .dirty_state(self.inner.id)
            .unwrap_or(DirtyState::Dirty)
    }

    /// Number of times the computed value changed.
    pub fn version(&self) -> u64 {
        self.inner.runtime.version(self.inner.id)
    }

    /// Number of times the function has run.
    pub fn recompute_count(&self) -> usize {
        self.inner.recompute_count.get()
    }

    /// Check if the computation has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }
}

impl<T: PartialEq + 'static> Reactive for ComputationInner<T> {
    fn update(&self) {
        let guard = match self.runtime.enter_computation(self.id) {
            Ok(guard) => guard,
            Err(err) => {
                error!(%err, "computation graph is cyclic");
                panic!("{err}");
            }
        };

        self.runtime.begin_run(self.id);
        let cx = ReactiveContext::tracking(self.runtime.clone(), self.id);
        let next = (self.compute)(&cx);
        drop(guard);

        let changed = self.value.borrow().as_ref() != Some(&next);
        if changed {
            let previous = self.value.replace(Some(next));
            drop(previous);
            self.runtime.bump_version(self.id);
        }

        self.runtime.finish_run(self.id, cx.into_edges());
        self.recompute_count.set(self.recompute_count.get() + 1);
        trace!(node = %self.id, changed, "recomputed");
    }
}

impl<T: 'static> Clone for Computation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Drop for ComputationInner<T> {
    fn drop(&mut self) {
        self.runtime.unregister(self.id);
    }
}

impl<T: Debug + 'static> Debug for Computation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("recompute_count", &self.recompute_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
