//! Trellis Core
//!
//! This crate provides a dependency-tracked reactive state engine and the
//! domain stores built on top of it. It implements:
//!
//! - Reactive primitives (cells, computations, effects)
//! - A push-pull scheduler with batching and equality cut-off
//! - Domain stores for tasks, notifications and metrics
//! - Fire-and-forget persistence to a key-value surface
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `graph`: Dependency graph and staleness propagation
//! - `store`: Domain stores and their collaborators (clock, ids, storage)
//! - `config`: Store configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust
//! use trellis_core::reactive::{Cell, Computation, Effect, Runtime};
//!
//! let runtime = Runtime::new();
//!
//! // Create a cell
//! let count = Cell::new(&runtime, 0);
//!
//! // Create a derived value
//! let doubled = Computation::new(&runtime, {
//!     let count = count.clone();
//!     move |cx| count.get(cx) * 2
//! });
//!
//! // Create an effect
//! let _effect = Effect::new(&runtime, {
//!     let count = count.clone();
//!     let doubled = doubled.clone();
//!     move |cx| println!("Count: {}, Doubled: {}", count.get(cx), doubled.get(cx))
//! });
//!
//! // Update the cell
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod store;

pub use config::StoreConfig;
pub use error::{ConfigError, LoadError, ReactiveError, StorageError};
