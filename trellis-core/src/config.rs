//! Store configuration.
//!
//! All fields have defaults, so an empty JSON object (or no file at all) is a
//! valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings shared by every domain store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix of every persistence key.
    pub namespace: String,

    /// Install the persistence effect on construction.
    pub persist: bool,

    /// Tasks due within this many hours count as urgent.
    pub urgent_window_hours: i64,

    /// Window used for "completed this week".
    pub recent_completion_days: i64,

    /// Oldest notifications are dropped beyond this count.
    pub max_notifications: usize,

    /// Oldest metric samples are dropped beyond this count.
    pub metrics_retention: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: "trellis".to_string(),
            persist: true,
            urgent_window_hours: 24,
            recent_completion_days: 7,
            max_notifications: 50,
            metrics_retention: 500,
        }
    }
}

impl StoreConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Key under which `collection` is persisted.
    pub fn storage_key(&self, collection: &str) -> String {
        format!("{}.{}", self.namespace, collection)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: "must not be empty".to_string(),
            });
        }
        if self.urgent_window_hours < 0 {
            return Err(ConfigError::Invalid {
                field: "urgent_window_hours",
                reason: format!("must not be negative, got {}", self.urgent_window_hours),
            });
        }
        if self.recent_completion_days < 0 {
            return Err(ConfigError::Invalid {
                field: "recent_completion_days",
                reason: format!("must not be negative, got {}", self.recent_completion_days),
            });
        }
        Ok(())
    }
}
