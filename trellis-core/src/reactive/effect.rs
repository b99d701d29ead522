//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued. Queued effects run
//!    when the current batch ends, after every write of the batch landed.
//!
//! 3. Each run records a fresh dependency set that replaces the old one.
//!
//! # Use Cases
//!
//! Effects are used to synchronize reactive state with the outside world:
//!
//! - Persisting a collection to a key-value store
//! - Raising cross-cutting notifications
//! - Logging state changes
//!
//! # Differences from Computation
//!
//! - Computations return a value; effects do not.
//! - Computations are lazy (compute on access); effects are eager (run when deps change).
//! - Computations must be pure; effects may write cells.
//!
//! # Cleanup
//!
//! Whatever the effect function returns is the resource of that run. It is
//! dropped right before the next run and when the effect is disposed. Return
//! `()` for nothing to release, or an [`OnCleanup`] to run a closure.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::runtime::{Reactive, Runtime};
use crate::graph::{NodeId, NodeKind};

type RunFn = Box<dyn FnMut(&ReactiveContext) -> Box<dyn Any>>;

/// A side-effecting computation that runs when dependencies change.
///
/// The effect lives as long as at least one handle does. Dropping the last
/// handle disposes it.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Cell, Effect, Runtime};
///
/// let runtime = Runtime::new();
/// let count = Cell::new(&runtime, 0);
///
/// let _effect = Effect::new(&runtime, {
///     let count = count.clone();
///     move |cx| println!("Count is: {}", count.get(cx))
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// ```
pub struct Effect {
    inner: Rc<EffectInner>,
}

struct EffectInner {
    id: NodeId,
    runtime: Runtime,
    run: RefCell<RunFn>,

    /// Resource returned by the last run.
    resource: RefCell<Option<Box<dyn Any>>>,

    disposed: Cell<bool>,
    run_count: Cell<usize>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish dependencies.
    pub fn new<R: 'static>(runtime: &Runtime, run: impl FnMut(&ReactiveContext) -> R + 'static) -> Self {
        let effect = Self::new_lazy(runtime, run);
        effect.inner.update();
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// The first run happens on [`schedule`](Self::schedule).
    pub fn new_lazy<R: 'static>(runtime: &Runtime, mut run: impl FnMut(&ReactiveContext) -> R + 'static) -> Self {
        let id = runtime.add_node(NodeKind::Effect);
        let inner = Rc::new(EffectInner {
            id,
            runtime: runtime.clone(),
            run: RefCell::new(Box::new(move |cx: &ReactiveContext| Box::new(run(cx)) as Box<dyn Any>)),
            resource: RefCell::new(None),
            disposed: Cell::new(false),
            run_count: Cell::new(0),
        });
        let weak: Weak<dyn Reactive> = Rc::downgrade(&inner) as Weak<dyn Reactive>;
        runtime.register(id, weak);
        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Queue the effect to re-run with the next flush.
    ///
    /// Outside a batch the effect runs before this returns.
    pub fn schedule(&self) {
        if !self.inner.disposed.get() {
            self.inner.runtime.schedule(self.inner.id);
        }
    }

    /// Dispose of the effect.
    ///
    /// Releases the resource of the last run. After disposal, the effect will
    /// not run again.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of nodes read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.runtime.dependency_count(self.inner.id)
    }
}

impl EffectInner {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.runtime.unregister(self.id);
        let resource = self.resource.borrow_mut().take();
        drop(resource);
        trace!(node = %self.id, "effect disposed");
    }
}

impl Reactive for EffectInner {
    fn update(&self) {
        if self.disposed.get() {
            return;
        }
        let Ok(mut run) = self.run.try_borrow_mut() else {
            warn!(node = %self.id, "effect triggered itself while running; skipping nested run");
            return;
        };

        // Release the previous run's resource before acquiring the next one.
        let previous = self.resource.borrow_mut().take();
        drop(previous);

        self.runtime.begin_run(self.id);
        let cx = ReactiveContext::tracking(self.runtime.clone(), self.id);
        let resource = run(&cx);
        drop(run);

        if self.disposed.get() {
            // Disposed from inside its own run.
            drop(resource);
            return;
        }

        *self.resource.borrow_mut() = Some(resource);
        self.runtime.finish_run(self.id, cx.into_edges());
        self.run_count.set(self.run_count.get() + 1);
        trace!(node = %self.id, runs = self.run_count.get(), "effect ran");
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Runs a closure when dropped.
///
/// Return one from an effect to get callback-style cleanup: the closure runs
/// before the effect's next run and on disposal.
pub struct OnCleanup(Option<Box<dyn FnOnce()>>);

impl OnCleanup {
    pub fn new(cleanup: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(cleanup)))
    }
}

impl Drop for OnCleanup {
    fn drop(&mut self) {
        if let Some(cleanup) = self.0.take() {
            cleanup();
        }
    }
}

impl std::fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("OnCleanup").field(&self.0.is_some()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
