//! Notification store.
//!
//! A bounded, persisted list of user-facing notifications with read state.
//! Same shape as the task store: one collection cell, lazy views over it,
//! a persistence effect.

use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::environment::StoreEnvironment;
use super::persistence::{persist_collection, restore_collection};
use super::task::{TaskId, TaskStatus};
use super::task_store::TaskStore;
use crate::reactive::{Cell, Computation, Effect, ReactiveContext, Runtime};

pub const NOTIFICATIONS_COLLECTION: &str = "notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::Info,
        NotificationKind::Success,
        NotificationKind::Warning,
        NotificationKind::Error,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

#[derive(Clone)]
pub struct NotificationStore {
    runtime: Runtime,
    env: StoreEnvironment,

    /// Oldest first; the views reverse it.
    items: Cell<Rc<Vec<Notification>>>,

    newest_first: Computation<Rc<Vec<Notification>>>,
    unread: Computation<Rc<Vec<Notification>>>,
    counts: Computation<IndexMap<NotificationKind, usize>>,

    persistence: Option<Effect>,
}

impl NotificationStore {
    pub fn new(runtime: &Runtime, env: StoreEnvironment) -> Self {
        let key = env.config.storage_key(NOTIFICATIONS_COLLECTION);
        let mut restored: Vec<Notification> = restore_collection(env.storage.as_ref(), &key);
        trim_to(&mut restored, env.config.max_notifications);

        let items = Cell::new_with_eq(runtime, Rc::new(restored), |a, b| Rc::ptr_eq(a, b));

        let newest_first = Computation::new(runtime, {
            let items = items.clone();
            move |cx| items.with(cx, |items| Rc::new(items.iter().rev().cloned().collect::<Vec<_>>()))
        });

        let unread = Computation::new(runtime, {
            let newest_first = newest_first.clone();
            move |cx| {
                newest_first.with(cx, |items| {
                    Rc::new(items.iter().filter(|n| !n.read).cloned().collect::<Vec<_>>())
                })
            }
        });

        let counts = Computation::new(runtime, {
            let items = items.clone();
            move |cx| {
                items.with(cx, |items| {
                    let mut counts: IndexMap<NotificationKind, usize> =
                        NotificationKind::ALL.iter().map(|kind| (*kind, 0)).collect();
                    for item in items.iter() {
                        *counts.entry(item.kind).or_default() += 1;
                    }
                    counts
                })
            }
        });

        let persistence = env
            .config
            .persist
            .then(|| persist_collection(runtime, Rc::clone(&env.storage), key, items.clone()));

        Self {
            runtime: runtime.clone(),
            env,
            items,
            newest_first,
            unread,
            counts,
            persistence,
        }
    }

    pub fn notifications(&self, cx: &ReactiveContext) -> Rc<Vec<Notification>> {
        self.newest_first.get(cx)
    }

    pub fn unread(&self, cx: &ReactiveContext) -> Rc<Vec<Notification>> {
        self.unread.get(cx)
    }

    pub fn unread_count(&self, cx: &ReactiveContext) -> usize {
        self.unread.with(cx, |unread| unread.len())
    }

    pub fn counts_by_kind(&self, cx: &ReactiveContext) -> IndexMap<NotificationKind, usize> {
        self.counts.get(cx)
    }

    pub fn persistence(&self) -> Option<&Effect> {
        self.persistence.as_ref()
    }

    /// Add a notification, dropping the oldest ones beyond capacity.
    pub fn push(&self, kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Notification {
        let notification = Notification {
            id: self.env.ids.next_id(),
            kind,
            title: title.into(),
            message: message.into(),
            created_at: self.env.clock.now(),
            read: false,
        };

        let mut items = self.items.get_untracked().as_ref().clone();
        items.push(notification.clone());
        trim_to(&mut items, self.env.config.max_notifications);
        self.items.set(Rc::new(items));
        debug!(id = %notification.id, kind = ?kind, "notification pushed");
        notification
    }

    pub fn mark_read(&self, id: &str) {
        let current = self.items.get_untracked();
        if !current.iter().any(|n| n.id == id && !n.read) {
            debug!(id, "nothing to mark read");
            return;
        }
        let items = current
            .iter()
            .map(|n| Notification {
                read: n.read || n.id == id,
                ..n.clone()
            })
            .collect();
        self.items.set(Rc::new(items));
    }

    pub fn mark_all_read(&self) {
        let current = self.items.get_untracked();
        if current.iter().all(|n| n.read) {
            return;
        }
        let items = current
            .iter()
            .map(|n| Notification {
                read: true,
                ..n.clone()
            })
            .collect();
        self.items.set(Rc::new(items));
    }

    /// Remove one notification. Unknown ids are ignored.
    pub fn dismiss(&self, id: &str) {
        let current = self.items.get_untracked();
        if !current.iter().any(|n| n.id == id) {
            debug!(id, "dismiss of unknown notification ignored");
            return;
        }
        let items = current.iter().filter(|n| n.id != id).cloned().collect();
        self.items.set(Rc::new(items));
    }

    pub fn clear(&self) {
        if self.items.with_untracked(|items| !items.is_empty()) {
            self.items.set(Rc::new(Vec::new()));
        }
    }
}

fn trim_to(items: &mut Vec<Notification>, capacity: usize) {
    if items.len() > capacity {
        let excess = items.len() - capacity;
        items.drain(..excess);
    }
}

impl std::fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStore")
            .field("notifications", &self.items.with_untracked(|items| items.len()))
            .field("runtime", &self.runtime)
            .finish()
    }
}

/// An effect that pushes a success notification whenever a task enters
/// the completed state.
///
/// Tasks already completed when the effect is created do not notify.
pub fn completion_notifier(tasks: &TaskStore, notifications: &NotificationStore) -> Effect {
    let seen: std::cell::RefCell<Option<IndexMap<TaskId, TaskStatus>>> = std::cell::RefCell::new(None);
    let store = tasks.clone();
    let notifications = notifications.clone();

    Effect::new(tasks.runtime(), move |cx| {
        let all = store.tasks(cx);
        let mut seen = seen.borrow_mut();

        if let Some(previous) = seen.as_ref() {
            for task in all.iter().filter(|task| task.status == TaskStatus::Completed) {
                if previous.get(&task.id) != Some(&TaskStatus::Completed) {
                    notifications.push(
                        NotificationKind::Success,
                        "Task completed",
                        format!("\"{}\" is done", task.title),
                    );
                }
            }
        }
        *seen = Some(all.iter().map(|task| (task.id.clone(), task.status)).collect());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::environment::SequentialIds;
    use crate::store::persistence::MemoryStorage;
    use crate::store::task::NewTask;

    fn env(storage: Rc<MemoryStorage>) -> StoreEnvironment {
        StoreEnvironment::new(storage).with_ids(Rc::new(SequentialIds::new("n")))
    }

    #[test]
    fn newest_first_and_unread_views() {
        let runtime = Runtime::new();
        let store = NotificationStore::new(&runtime, env(Rc::new(MemoryStorage::new())));
        let cx = runtime.untracked();

        let first = store.push(NotificationKind::Info, "one", "");
        let second = store.push(NotificationKind::Warning, "two", "");
        assert_eq!(store.notifications(&cx)[0].id, second.id);
        assert_eq!(store.unread_count(&cx), 2);

        store.mark_read(&first.id);
        assert_eq!(store.unread_count(&cx), 1);
        assert_eq!(store.unread(&cx)[0].id, second.id);

        store.mark_all_read();
        assert_eq!(store.unread_count(&cx), 0);

        let counts = store.counts_by_kind(&cx);
        assert_eq!(counts[&NotificationKind::Info], 1);
        assert_eq!(counts[&NotificationKind::Warning], 1);
        assert_eq!(counts[&NotificationKind::Error], 0);
    }

    #[test]
    fn capacity_drops_oldest() {
        let runtime = Runtime::new();
        let config = StoreConfig {
            max_notifications: 2,
            ..StoreConfig::default()
        };
        let store = NotificationStore::new(&runtime, env(Rc::new(MemoryStorage::new())).with_config(config));
        let cx = runtime.untracked();

        store.push(NotificationKind::Info, "a", "");
        store.push(NotificationKind::Info, "b", "");
        store.push(NotificationKind::Info, "c", "");

        let titles: Vec<_> = store.notifications(&cx).iter().map(|n| n.title.clone()).collect();
        assert_eq!(titles, vec!["c", "b"]);
    }

    #[test]
    fn dismiss_and_clear() {
        let runtime = Runtime::new();
        let store = NotificationStore::new(&runtime, env(Rc::new(MemoryStorage::new())));
        let cx = runtime.untracked();

        let keep = store.push(NotificationKind::Info, "keep", "");
        let gone = store.push(NotificationKind::Error, "gone", "");
        store.dismiss(&gone.id);
        store.dismiss("unknown");
        assert_eq!(store.notifications(&cx).len(), 1);
        assert_eq!(store.notifications(&cx)[0].id, keep.id);

        store.clear();
        assert!(store.notifications(&cx).is_empty());
    }

    #[test]
    fn notifications_survive_a_restart() {
        let runtime = Runtime::new();
        let storage = Rc::new(MemoryStorage::new());
        {
            let store = NotificationStore::new(&runtime, env(storage.clone()));
            store.push(NotificationKind::Success, "saved", "");
        }

        let reopened = NotificationStore::new(&runtime, env(storage));
        let cx = runtime.untracked();
        assert_eq!(reopened.notifications(&cx)[0].title, "saved");
    }

    #[test]
    fn completing_a_task_notifies_once() {
        let runtime = Runtime::new();
        let storage = Rc::new(MemoryStorage::new());
        let tasks = TaskStore::new(&runtime, env(storage.clone()));
        let notifications = NotificationStore::new(&runtime, env(storage));
        let _notifier = completion_notifier(&tasks, &notifications);
        let cx = runtime.untracked();

        let id = tasks.add(NewTask::new("Ship it")).id;
        assert_eq!(notifications.notifications(&cx).len(), 0);

        tasks.update_progress(&id, 100);
        tasks.update(&id, Default::default());
        let pushed = notifications.notifications(&cx);
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].kind, NotificationKind::Success);
        assert!(pushed[0].message.contains("Ship it"));
    }
}
