//! Collaborators a domain store needs from the outside world: a clock, an id
//! source, key-value storage, and configuration.

use std::fmt::Debug;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::persistence::{KeyValueStore, MemoryStorage};
use crate::config::StoreConfig;

/// Source of timestamps.
pub trait Clock: Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Source of entity identifiers.
pub trait IdGenerator: Debug {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// `prefix-1`, `prefix-2`, ... Deterministic, for tests and fixtures.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: Mutex<u64>,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: Mutex::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let mut next = self.next.lock();
        let id = format!("{}-{}", self.prefix, *next);
        *next += 1;
        id
    }
}

/// Everything a domain store is constructed with.
#[derive(Debug, Clone)]
pub struct StoreEnvironment {
    pub clock: Rc<dyn Clock>,
    pub ids: Rc<dyn IdGenerator>,
    pub storage: Rc<dyn KeyValueStore>,
    pub config: StoreConfig,
}

impl StoreEnvironment {
    /// System clock, UUIDs, default configuration.
    pub fn new(storage: Rc<dyn KeyValueStore>) -> Self {
        Self {
            clock: Rc::new(SystemClock),
            ids: Rc::new(UuidIds),
            storage,
            config: StoreConfig::default(),
        }
    }

    /// Like [`new`](Self::new), backed by a fresh [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::new(Rc::new(MemoryStorage::new()))
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Rc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }
}
