//! Error types
//!
//! The engine distinguishes fatal configuration errors (a broken graph
//! definition) from recoverable failures at the collaborator boundary
//! (storage, transport, configuration files). Only the former ever cross the
//! public accessor/mutator boundary, and then only as panics or through the
//! explicit `try_*` entry points.

use thiserror::Error;

use crate::graph::NodeId;

/// Fatal errors raised by the reactive engine.
///
/// Both variants indicate a broken graph definition rather than a transient
/// condition. They are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computation read itself, directly or through other computations,
    /// while it was being evaluated.
    #[error("dependency cycle detected: computation {node} read itself during evaluation")]
    Cycle { node: NodeId },

    /// A cell was written while a computation was being evaluated.
    /// Computations must be pure.
    #[error("cell {cell} written while computation {computation} was evaluating")]
    WriteDuringComputation { cell: NodeId, computation: NodeId },
}

/// Failures of the key-value persistence surface.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for key `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by a transport while loading domain data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Failures while reading a [`StoreConfig`](crate::config::StoreConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reactive_errors_name_the_nodes() {
        let err = ReactiveError::Cycle { node: NodeId::from(7) };
        assert!(err.to_string().contains("cycle"));
        assert!(err.to_string().contains('7'));

        let err = ReactiveError::WriteDuringComputation {
            cell: NodeId::from(1),
            computation: NodeId::from(2),
        };
        let message = err.to_string();
        assert!(message.contains("cell 1"));
        assert!(message.contains("computation 2"));
    }
}
