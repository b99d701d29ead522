//! Domain stores
//!
//! Each store is a concrete assembly of cells, computations and effects
//! owning one bounded piece of application state:
//!
//! - [`TaskStore`]: tasks with filtering, statistics, urgency and selection
//! - [`NotificationStore`]: user-facing notifications with read state
//! - [`MetricsStore`]: named numeric samples and their summaries
//!
//! Stores are built from a [`StoreEnvironment`] that supplies the clock, id
//! generator, key-value storage and configuration.

mod environment;
mod metrics_store;
mod notification_store;
mod persistence;
mod source;
mod task;
mod task_store;

pub use environment::{Clock, IdGenerator, ManualClock, SequentialIds, StoreEnvironment, SystemClock, UuidIds};
pub use metrics_store::{statistics_recorder, MetricSample, MetricSummaries, MetricSummary, MetricsStore, METRICS_COLLECTION};
pub use notification_store::{completion_notifier, Notification, NotificationKind, NotificationStore, NOTIFICATIONS_COLLECTION};
pub use persistence::{persist_collection, restore_collection, write_json, FileStorage, KeyValueStore, MemoryStorage};
pub use source::{StaticTaskSource, TaskSource};
pub use task::{
    urgent_tasks, Attachment, Comment, DateRange, NewTask, Task, TaskFilter, TaskId, TaskPatch, TaskPriority,
    TaskStatistics, TaskStatus,
};
pub use task_store::{TaskBoard, TaskStore, TASKS_COLLECTION};
