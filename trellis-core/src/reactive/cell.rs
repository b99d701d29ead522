//! Cell Implementation
//!
//! A Cell is the fundamental reactive primitive. It holds a value and is the
//! root of every dependency chain.
//!
//! # How Cells Work
//!
//! 1. When a cell is read through a tracking [`ReactiveContext`], the read
//!    (and the cell's current version) is recorded for the running
//!    computation or effect.
//!
//! 2. When a cell is written with a value that differs under its equality
//!    check, its version is bumped and every dependent is marked stale.
//!
//! 3. Writing a cell while a computation is evaluating is a configuration
//!    error: computations must be pure.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use tracing::error;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use crate::error::ReactiveError;
use crate::graph::{NodeId, NodeKind};

type Equality<T> = Box<dyn Fn(&T, &T) -> bool>;

/// A reactive cell holding a value of type T.
///
/// Cloning a cell produces another handle to the same value. The node is
/// removed from the graph when the last handle drops.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Cell, Runtime};
///
/// let runtime = Runtime::new();
/// let count = Cell::new(&runtime, 0);
///
/// count.set(5);
/// assert_eq!(count.get(&runtime.untracked()), 5);
/// ```
pub struct Cell<T: 'static> {
    inner: Rc<CellInner<T>>,
}

struct CellInner<T> {
    id: NodeId,
    runtime: Runtime,
    value: RefCell<T>,
    eq: Equality<T>,
}

impl<T: PartialEq + 'static> Cell<T> {
    /// Create a new cell that treats `PartialEq`-equal writes as no-ops.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self::new_with_eq(runtime, value, |a, b| a == b)
    }
}

impl<T: 'static> Cell<T> {
    /// Create a new cell with a custom equality check.
    ///
    /// Writes for which `eq(old, new)` holds replace the value but notify
    /// nobody.
    pub fn new_with_eq(runtime: &Runtime, value: T, eq: impl Fn(&T, &T) -> bool + 'static) -> Self {
        let id = runtime.add_node(NodeKind::Source);
        Self {
            inner: Rc::new(CellInner {
                id,
                runtime: runtime.clone(),
                value: RefCell::new(value),
                eq: Box::new(eq),
            }),
        }
    }

    /// Get the cell's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Number of observable changes so far.
    pub fn version(&self) -> u64 {
        self.inner.runtime.version(self.inner.id)
    }

    /// Borrow the value without cloning and without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.inner.value.borrow();
        f(&*value)
    }

    /// Borrow the value, recording a dependency through `cx`.
    pub fn with<R>(&self, cx: &ReactiveContext, f: impl FnOnce(&T) -> R) -> R {
        debug_assert!(cx.runtime().ptr_eq(&self.inner.runtime), "cell read through a foreign runtime");
        cx.track(self.inner.id, self.version());
        self.with_untracked(f)
    }

    /// Replace the value.
    ///
    /// # Panics
    ///
    /// Panics if called while a computation is evaluating. Use
    /// [`try_set`](Self::try_set) to get the error instead.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            panic!("{err}");
        }
    }

    /// Replace the value, failing if a computation is evaluating.
    pub fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        let inner = &self.inner;
        if let Some(computation) = inner.runtime.current_computation() {
            let err = ReactiveError::WriteDuringComputation {
                cell: inner.id,
                computation,
            };
            error!(%err, "rejected impure write");
            return Err(err);
        }

        let changed = {
            let current = inner.value.borrow();
            !(inner.eq)(&*current, &value)
        };
        let previous = inner.value.replace(value);
        drop(previous);

        if changed {
            inner.runtime.bump_version(inner.id);
            inner.runtime.notify_changed(inner.id);
        }
        Ok(())
    }

    /// Update the value using a function of the current one.
    ///
    /// The read of the current value is not tracked.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = {
            let current = self.inner.value.borrow();
            f(&*current)
        };
        self.set(next);
    }
}

impl<T: Clone + 'static> Cell<T> {
    /// Get the current value, recording a dependency through `cx`.
    pub fn get(&self, cx: &ReactiveContext) -> T {
        self.with(cx, T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T: 'static> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Drop for CellInner<T> {
    fn drop(&mut self) {
        self.runtime.unregister(self.id);
    }
}

impl<T: Debug + 'static> Debug for Cell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.version())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
