//! Reactive Primitives
//!
//! This module implements the core reactive system: cells, computations, and
//! effects. These primitives form the foundation every domain store is built
//! from.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A Cell is a container for mutable state. When a cell's value is read
//! through a tracking context (such as a computation or effect), the cell
//! registers that context's owner as a dependent. When the cell's value
//! changes, all dependents are marked stale.
//!
//! ## Computations
//!
//! A Computation is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changes, and only when somebody reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as persistence or notifications.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered dynamically: every tracked read goes through an
//! explicit [`ReactiveContext`] handed to the running computation or effect.
//! There is no thread-local "current observer", so the engine carries no
//! hidden global state and two [`Runtime`]s never interfere.

mod cell;
mod computation;
mod context;
mod effect;
mod runtime;

pub use cell::Cell;
pub use computation::Computation;
pub use context::ReactiveContext;
pub use effect::{Effect, OnCleanup};
pub use runtime::Runtime;
