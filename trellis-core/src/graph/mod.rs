//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! relationships between reactive values and computations.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent reactive values (cells) or computations (computations, effects)
//! - Edges represent dependencies: if A depends on B, there is an edge from B to A
//!
//! Edges are not declared up front. They are discovered while a computation or
//! effect runs and replaced wholesale on every run.
//!
//! # Design Decisions
//!
//! 1. We use a centralized graph rather than distributed linked lists because:
//!    - It keeps staleness propagation in one place
//!    - It lets nodes be removed cleanly when their handles drop
//!
//! 2. The graph is indexed by node ID for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.

mod node;
mod scheduler;

pub use node::{DirtyState, Edge, Node, NodeId, NodeKind};
pub use scheduler::UpdateScheduler;
