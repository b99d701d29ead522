//! Persistence
//!
//! Stores persist one JSON-serialized collection per key. Writing happens in
//! an effect that re-runs whenever the collection cell changes; failures are
//! logged and swallowed so mutators never see them. Reading happens once at
//! construction and falls back to an empty collection on any problem.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::rc::Rc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::reactive::{Cell, Effect, Runtime};

/// The key-value surface persistence writes through.
pub trait KeyValueStore: Debug {
    /// The stored string, or `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-process storage. Contents are lost with the value.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        std::fs::write(self.path_for(key), value).map_err(io_err)
    }
}

/// Serialize `value` and write it under `key`.
pub fn write_json<T: Serialize + ?Sized>(storage: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })?;
    storage.set(key, &json)
}

/// Read the collection stored under `key`.
///
/// Absent, unreadable, or malformed data yields an empty collection.
pub fn restore_collection<T: DeserializeOwned>(storage: &dyn KeyValueStore, key: &str) -> Vec<T> {
    let json = match storage.get(key) {
        Ok(Some(json)) => json,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!(key, %err, "could not read persisted collection; starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str(&json) {
        Ok(items) => items,
        Err(err) => {
            warn!(key, %err, "persisted collection is malformed; starting empty");
            Vec::new()
        }
    }
}

/// An effect that writes `collection` under `key` every time it changes.
///
/// Fire-and-forget: failures are logged, never propagated.
pub fn persist_collection<T>(
    runtime: &Runtime,
    storage: Rc<dyn KeyValueStore>,
    key: String,
    collection: Cell<Rc<Vec<T>>>,
) -> Effect
where
    T: Serialize + 'static,
{
    Effect::new(runtime, move |cx| {
        collection.with(cx, |items| match write_json(storage.as_ref(), &key, items.as_slice()) {
            Ok(()) => debug!(key = %key, items = items.len(), "persisted collection"),
            Err(err) => warn!(key = %key, %err, "failed to persist collection; keeping in-memory state"),
        })
    })
}
