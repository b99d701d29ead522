//! Task Store
//!
//! The task store is a bundle of cells, computations and effects over one
//! collection of tasks.
//!
//! # State
//!
//! - `tasks`: the collection, the only source of truth
//! - `filter`, `selected_id`: view state
//! - `loading`, `error`: status of the last asynchronous load
//! - `now`: the store's notion of the current time, refreshed on every
//!   mutation so time-dependent views re-derive
//!
//! # Derived views
//!
//! Filtered list, statistics over the filtered list, urgency ranking, the
//! selected task and a per-status board. All are lazy computations; nothing
//! is recomputed until somebody reads it.
//!
//! # Writes
//!
//! Mutators are the only write path. Each one is a single batch, so effects
//! (persistence, notifications) observe the final state once. Mutating an
//! unknown id is a logged no-op.

use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use tracing::{debug, warn};

use super::environment::StoreEnvironment;
use super::persistence::{persist_collection, restore_collection};
use super::source::TaskSource;
use super::task::{urgent_tasks, Attachment, Comment, NewTask, Task, TaskFilter, TaskId, TaskPatch, TaskStatistics, TaskStatus};
use crate::reactive::{Cell, Computation, Effect, ReactiveContext, Runtime};

/// Collection name used for the persistence key.
pub const TASKS_COLLECTION: &str = "tasks";

/// Tasks grouped by status, one bucket per status in board order.
pub type TaskBoard = IndexMap<TaskStatus, Vec<Task>>;

#[derive(Clone)]
pub struct TaskStore {
    runtime: Runtime,
    env: StoreEnvironment,

    tasks: Cell<Rc<Vec<Task>>>,
    filter: Cell<TaskFilter>,
    selected_id: Cell<Option<TaskId>>,
    loading: Cell<bool>,
    error: Cell<Option<String>>,
    now: Cell<DateTime<Utc>>,

    filtered: Computation<Rc<Vec<Task>>>,
    statistics: Computation<TaskStatistics>,
    urgent: Computation<Rc<Vec<Task>>>,
    selected: Computation<Option<Task>>,
    board: Computation<TaskBoard>,

    persistence: Option<Effect>,
}

impl TaskStore {
    /// Build the store, restoring whatever was persisted under the tasks key.
    pub fn new(runtime: &Runtime, env: StoreEnvironment) -> Self {
        let key = env.config.storage_key(TASKS_COLLECTION);
        let restored: Vec<Task> = restore_collection::<Task>(env.storage.as_ref(), &key)
            .into_iter()
            .map(normalize)
            .collect();
        debug!(key = %key, count = restored.len(), "restored tasks");

        // Every mutation installs a fresh vector, so identity is enough to
        // detect a change without walking the collection.
        let tasks = Cell::new_with_eq(runtime, Rc::new(restored), |a, b| Rc::ptr_eq(a, b));
        let filter = Cell::new(runtime, TaskFilter::default());
        let selected_id = Cell::new(runtime, None);
        let loading = Cell::new(runtime, false);
        let error = Cell::new(runtime, None);
        let now = Cell::new(runtime, env.clock.now());

        let filtered = Computation::new(runtime, {
            let tasks = tasks.clone();
            let filter = filter.clone();
            move |cx| filter.with(cx, |criteria| tasks.with(cx, |tasks| Rc::new(criteria.apply(tasks))))
        });

        let statistics = Computation::new(runtime, {
            let filtered = filtered.clone();
            let now = now.clone();
            let recent_days = env.config.recent_completion_days;
            move |cx| {
                let now = now.get(cx);
                filtered.with(cx, |tasks| TaskStatistics::compute(tasks, now, recent_days))
            }
        });

        let urgent = Computation::new(runtime, {
            let tasks = tasks.clone();
            let now = now.clone();
            let window = Duration::hours(env.config.urgent_window_hours);
            move |cx| {
                let now = now.get(cx);
                tasks.with(cx, |tasks| Rc::new(urgent_tasks(tasks, now, window)))
            }
        });

        let selected = Computation::new(runtime, {
            let tasks = tasks.clone();
            let selected_id = selected_id.clone();
            move |cx| {
                selected_id.with(cx, |id| {
                    let id = id.as_ref()?;
                    tasks.with(cx, |tasks| tasks.iter().find(|task| &task.id == id).cloned())
                })
            }
        });

        let board = Computation::new(runtime, {
            let filtered = filtered.clone();
            move |cx| {
                filtered.with(cx, |tasks| {
                    let mut board: TaskBoard = TaskStatus::ALL.iter().map(|status| (*status, Vec::new())).collect();
                    for task in tasks.iter() {
                        board.entry(task.status).or_default().push(task.clone());
                    }
                    board
                })
            }
        });

        let persistence = env
            .config
            .persist
            .then(|| persist_collection(runtime, Rc::clone(&env.storage), key, tasks.clone()));

        Self {
            runtime: runtime.clone(),
            env,
            tasks,
            filter,
            selected_id,
            loading,
            error,
            now,
            filtered,
            statistics,
            urgent,
            selected,
            board,
            persistence,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn tasks(&self, cx: &ReactiveContext) -> Rc<Vec<Task>> {
        self.tasks.get(cx)
    }

    pub fn task(&self, cx: &ReactiveContext, id: &TaskId) -> Option<Task> {
        self.tasks.with(cx, |tasks| tasks.iter().find(|task| &task.id == id).cloned())
    }

    pub fn filter(&self, cx: &ReactiveContext) -> TaskFilter {
        self.filter.get(cx)
    }

    pub fn filtered_tasks(&self, cx: &ReactiveContext) -> Rc<Vec<Task>> {
        self.filtered.get(cx)
    }

    /// Aggregates over the filtered tasks.
    pub fn statistics(&self, cx: &ReactiveContext) -> TaskStatistics {
        self.statistics.get(cx)
    }

    pub fn urgent_tasks(&self, cx: &ReactiveContext) -> Rc<Vec<Task>> {
        self.urgent.get(cx)
    }

    /// The selected task, or `None` if nothing is selected or the selected
    /// task no longer exists.
    pub fn selected_task(&self, cx: &ReactiveContext) -> Option<Task> {
        self.selected.get(cx)
    }

    pub fn tasks_by_status(&self, cx: &ReactiveContext) -> TaskBoard {
        self.board.get(cx)
    }

    pub fn loading(&self, cx: &ReactiveContext) -> bool {
        self.loading.get(cx)
    }

    pub fn error(&self, cx: &ReactiveContext) -> Option<String> {
        self.error.get(cx)
    }

    /// The filtered-list computation itself, for callers that want to
    /// inspect its state.
    pub fn filtered_view(&self) -> &Computation<Rc<Vec<Task>>> {
        &self.filtered
    }

    pub fn statistics_view(&self) -> &Computation<TaskStatistics> {
        &self.statistics
    }

    pub fn persistence(&self) -> Option<&Effect> {
        self.persistence.as_ref()
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Create a task. Always succeeds.
    ///
    /// The new task starts pending with no progress and no logged hours.
    pub fn add(&self, new: NewTask) -> Task {
        let now = self.env.clock.now();
        let task = Task {
            id: TaskId::from(self.env.ids.next_id()),
            title: new.title,
            description: new.description,
            status: TaskStatus::Pending,
            priority: new.priority,
            assignee_id: new.assignee_id,
            project_id: new.project_id,
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
            tags: new.tags,
            estimated_hours: new.estimated_hours.max(0.0),
            actual_hours: 0.0,
            completion_percentage: 0,
            attachments: Vec::new(),
            comments: Vec::new(),
        };

        self.runtime.batch(|| {
            let mut tasks = self.tasks.get_untracked().as_ref().clone();
            tasks.push(task.clone());
            self.tasks.set(Rc::new(tasks));
            self.now.set(now);
        });
        debug!(task = %task.id, title = %task.title, "task added");
        task
    }

    /// Merge `patch` into the task.
    pub fn update(&self, id: &TaskId, patch: TaskPatch) {
        self.modify(id, "update", |task| patch.apply(task));
    }

    /// Move the task to `status`.
    ///
    /// Entering completed forces 100% progress; leaving it lowers a full
    /// progress bar to 99%. Transitions refused by
    /// [`TaskStatus::can_move_to`] are ignored.
    pub fn change_status(&self, id: &TaskId, status: TaskStatus) {
        let refused = self.tasks.with_untracked(|tasks| {
            tasks
                .iter()
                .find(|task| &task.id == id)
                .is_some_and(|task| !task.status.can_move_to(status))
        });
        if refused {
            debug!(task = %id, to = %status, "status transition refused");
            return;
        }

        self.modify(id, "change_status", |task| {
            task.status = status;
            if status == TaskStatus::Completed {
                task.completion_percentage = 100;
            } else if task.completion_percentage == 100 {
                task.completion_percentage = 99;
            }
        });
    }

    /// Set the completion percentage, clamped to 0..=100.
    ///
    /// Reaching 100 completes the task; dropping below 100 reopens a completed
    /// task as in-progress. Cancelled tasks are left alone.
    pub fn update_progress(&self, id: &TaskId, percentage: i32) {
        let cancelled = self
            .tasks
            .with_untracked(|tasks| tasks.iter().any(|task| &task.id == id && task.status == TaskStatus::Cancelled));
        if cancelled {
            debug!(task = %id, "ignoring progress on a cancelled task");
            return;
        }

        let percentage = percentage.clamp(0, 100) as u8;
        self.modify(id, "update_progress", |task| {
            task.completion_percentage = percentage;
            if percentage == 100 {
                task.status = TaskStatus::Completed;
            } else if task.status == TaskStatus::Completed {
                task.status = TaskStatus::InProgress;
            }
        });
    }

    /// Remove the task. Deleting an unknown id does nothing.
    pub fn delete(&self, id: &TaskId) {
        let current = self.tasks.get_untracked();
        if !current.iter().any(|task| &task.id == id) {
            debug!(task = %id, "delete of unknown task ignored");
            return;
        }
        let remaining: Vec<Task> = current.iter().filter(|task| &task.id != id).cloned().collect();
        let now = self.env.clock.now();
        self.runtime.batch(|| {
            self.tasks.set(Rc::new(remaining));
            self.now.set(now);
        });
        debug!(task = %id, "task deleted");
    }

    pub fn select(&self, id: Option<TaskId>) {
        self.selected_id.set(id);
    }

    pub fn set_filter(&self, filter: TaskFilter) {
        self.filter.set(filter);
    }

    /// Edit the current filter in place.
    pub fn update_filter(&self, edit: impl FnOnce(&mut TaskFilter)) {
        self.filter.update(|current| {
            let mut next = current.clone();
            edit(&mut next);
            next
        });
    }

    pub fn clear_filter(&self) {
        self.filter.set(TaskFilter::default());
    }

    pub fn clear_error(&self) {
        self.error.set(None);
    }

    /// Re-read the clock so time-dependent views (overdue, urgent, this
    /// week) re-derive without a mutation.
    pub fn refresh_time(&self) {
        self.now.set(self.env.clock.now());
    }

    /// Append a comment. Returns `None` if the task does not exist.
    pub fn add_comment(&self, id: &TaskId, author_id: impl Into<String>, body: impl Into<String>) -> Option<Comment> {
        let comment = Comment {
            id: self.env.ids.next_id(),
            author_id: author_id.into(),
            body: body.into(),
            created_at: self.env.clock.now(),
        };
        let added = self.modify(id, "add_comment", |task| task.comments.push(comment.clone()));
        added.then_some(comment)
    }

    pub fn add_attachment(&self, id: &TaskId, attachment: Attachment) {
        self.modify(id, "add_attachment", |task| task.attachments.push(attachment));
    }

    /// Replace the whole collection. The selection and filter are kept.
    pub fn replace_all(&self, tasks: Vec<Task>) {
        let tasks: Vec<Task> = tasks.into_iter().map(normalize).collect();
        let count = tasks.len();
        let now = self.env.clock.now();
        self.runtime.batch(|| {
            self.tasks.set(Rc::new(tasks));
            self.now.set(now);
        });
        debug!(count, "task collection replaced");
    }

    /// The collection as JSON, in the persisted format.
    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        self.tasks.with_untracked(|tasks| serde_json::to_string(tasks.as_slice()))
    }

    /// Replace the collection from JSON. Malformed input yields an empty
    /// collection.
    pub fn restore_json(&self, json: &str) {
        let tasks = match serde_json::from_str::<Vec<Task>>(json) {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(%err, "malformed task snapshot; starting empty");
                Vec::new()
            }
        };
        self.replace_all(tasks);
    }

    /// Fetch the collection from `source`.
    ///
    /// `loading` is set for the duration of the fetch. On success the
    /// collection is replaced; on failure it is kept and the error text is
    /// stored. No retries.
    pub async fn load(&self, source: &impl TaskSource) {
        self.runtime.batch(|| {
            self.loading.set(true);
            self.error.set(None);
        });

        let result = source.fetch().await;

        self.runtime.batch(|| {
            match result {
                Ok(tasks) => self.replace_all(tasks),
                Err(err) => {
                    warn!(%err, "failed to load tasks");
                    self.error.set(Some(err.to_string()));
                }
            }
            self.loading.set(false);
        });
    }

    /// Apply `edit` to one task as a single batch and stamp `updated_at`.
    ///
    /// Returns whether the task existed.
    fn modify(&self, id: &TaskId, op: &'static str, edit: impl FnOnce(&mut Task)) -> bool {
        let mut tasks = self.tasks.get_untracked().as_ref().clone();
        let Some(task) = tasks.iter_mut().find(|task| &task.id == id) else {
            debug!(task = %id, op, "unknown task; ignoring");
            return false;
        };

        let now = self.env.clock.now();
        let before = task.status;
        edit(task);
        task.updated_at = now;
        if before != task.status {
            debug!(task = %id, from = %before, to = %task.status, "status changed");
        }

        self.runtime.batch(|| {
            self.tasks.set(Rc::new(tasks));
            self.now.set(now);
        });
        debug!(task = %id, op, "task modified");
        true
    }
}

/// Restore the progress/status invariant on data from outside.
fn normalize(mut task: Task) -> Task {
    task.completion_percentage = task.completion_percentage.min(100);
    if task.status == TaskStatus::Cancelled {
        task.completion_percentage = task.completion_percentage.min(99);
    } else if task.completion_percentage == 100 {
        task.status = TaskStatus::Completed;
    } else if task.status == TaskStatus::Completed {
        task.completion_percentage = 100;
    }
    task
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("tasks", &self.tasks.with_untracked(|tasks| tasks.len()))
            .field("selected_id", &self.selected_id.get_untracked())
            .field("loading", &self.loading.get_untracked())
            .field("persisting", &self.persistence.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::environment::{Clock, ManualClock, SequentialIds};
    use chrono::TimeZone;

    fn store() -> (TaskStore, Rc<ManualClock>) {
        let runtime = Runtime::new();
        let clock = Rc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()));
        let env = StoreEnvironment::in_memory()
            .with_clock(clock.clone())
            .with_ids(Rc::new(SequentialIds::new("task")));
        (TaskStore::new(&runtime, env), clock)
    }

    #[test]
    fn add_stamps_defaults() {
        let (store, clock) = store();
        let task = store.add(NewTask::new("Write docs").estimate(3.0));

        assert_eq!(task.id, TaskId::from("task-1"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.completion_percentage, 0);
        assert_eq!(task.actual_hours, 0.0);
        assert_eq!(task.created_at, clock.now());
        assert_eq!(task.updated_at, task.created_at);

        let cx = store.runtime().untracked();
        assert_eq!(store.tasks(&cx).len(), 1);
    }

    #[test]
    fn update_merges_and_stamps() {
        let (store, clock) = store();
        let task = store.add(NewTask::new("Draft"));
        clock.advance(Duration::minutes(5));

        store.update(
            &task.id,
            TaskPatch {
                title: Some("Final".to_string()),
                assignee_id: Some(Some("ana".to_string())),
                ..TaskPatch::default()
            },
        );

        let cx = store.runtime().untracked();
        let updated = store.task(&cx, &task.id).unwrap();
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.assignee_id.as_deref(), Some("ana"));
        assert_eq!(updated.status, TaskStatus::Pending);
        assert_eq!(updated.updated_at, clock.now());
    }

    #[test]
    fn mutating_unknown_ids_is_a_no_op() {
        let (store, _) = store();
        store.add(NewTask::new("only"));
        let cx = store.runtime().untracked();
        let before = store.tasks(&cx);

        let ghost = TaskId::from("ghost");
        store.update(&ghost, TaskPatch::default());
        store.change_status(&ghost, TaskStatus::Completed);
        store.update_progress(&ghost, 100);
        store.delete(&ghost);
        assert!(store.add_comment(&ghost, "ana", "hi").is_none());

        assert!(Rc::ptr_eq(&before, &store.tasks(&cx)));
    }

    #[test]
    fn completing_forces_full_progress_and_reopening_lowers_it() {
        let (store, _) = store();
        let id = store.add(NewTask::new("t")).id;
        let cx = store.runtime().untracked();

        store.change_status(&id, TaskStatus::Completed);
        assert_eq!(store.task(&cx, &id).unwrap().completion_percentage, 100);

        store.change_status(&id, TaskStatus::InReview);
        let task = store.task(&cx, &id).unwrap();
        assert_eq!(task.status, TaskStatus::InReview);
        assert_eq!(task.completion_percentage, 99);
    }

    #[test]
    fn progress_is_clamped_and_drives_status() {
        let (store, _) = store();
        let id = store.add(NewTask::new("t")).id;
        let cx = store.runtime().untracked();

        store.update_progress(&id, -20);
        assert_eq!(store.task(&cx, &id).unwrap().completion_percentage, 0);

        store.update_progress(&id, 250);
        let task = store.task(&cx, &id).unwrap();
        assert_eq!(task.completion_percentage, 100);
        assert_eq!(task.status, TaskStatus::Completed);

        store.update_progress(&id, 50);
        let task = store.task(&cx, &id).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.completion_percentage, 50);
    }

    #[test]
    fn cancelled_tasks_ignore_progress() {
        let (store, _) = store();
        let id = store.add(NewTask::new("t")).id;
        store.change_status(&id, TaskStatus::Cancelled);
        store.update_progress(&id, 100);

        let cx = store.runtime().untracked();
        let task = store.task(&cx, &id).unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.completion_percentage, 0);
    }

    #[test]
    fn cancelled_tasks_only_reopen_as_pending() {
        let (store, _) = store();
        let id = store.add(NewTask::new("t")).id;
        store.change_status(&id, TaskStatus::Cancelled);
        let cx = store.runtime().untracked();

        store.change_status(&id, TaskStatus::Completed);
        store.change_status(&id, TaskStatus::InProgress);
        let task = store.task(&cx, &id).unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.completion_percentage, 0);

        store.change_status(&id, TaskStatus::Pending);
        assert_eq!(store.task(&cx, &id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn completed_tasks_cannot_be_cancelled() {
        let (store, _) = store();
        let id = store.add(NewTask::new("t")).id;
        store.change_status(&id, TaskStatus::Completed);
        store.change_status(&id, TaskStatus::Cancelled);

        let cx = store.runtime().untracked();
        let task = store.task(&cx, &id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completion_percentage, 100);
    }

    #[test]
    fn delete_is_idempotent() {
        let (store, _) = store();
        let id = store.add(NewTask::new("t")).id;
        store.delete(&id);
        store.delete(&id);

        let cx = store.runtime().untracked();
        assert!(store.tasks(&cx).is_empty());
    }

    #[test]
    fn comments_and_attachments_are_appended() {
        let (store, _) = store();
        let id = store.add(NewTask::new("t")).id;

        let comment = store.add_comment(&id, "ana", "looks good").unwrap();
        store.add_attachment(
            &id,
            Attachment {
                id: "a1".to_string(),
                name: "spec.pdf".to_string(),
                url: "https://example.test/spec.pdf".to_string(),
                size_bytes: 1024,
            },
        );

        let cx = store.runtime().untracked();
        let task = store.task(&cx, &id).unwrap();
        assert_eq!(task.comments, vec![comment]);
        assert_eq!(task.attachments.len(), 1);
    }

    #[test]
    fn board_has_a_bucket_per_status() {
        let (store, _) = store();
        let a = store.add(NewTask::new("a")).id;
        store.add(NewTask::new("b"));
        store.change_status(&a, TaskStatus::OnHold);

        let cx = store.runtime().untracked();
        let board = store.tasks_by_status(&cx);
        assert_eq!(board.len(), TaskStatus::ALL.len());
        assert_eq!(board[&TaskStatus::Pending].len(), 1);
        assert_eq!(board[&TaskStatus::OnHold][0].id, a);
        assert!(board[&TaskStatus::Completed].is_empty());
    }

    #[test]
    fn refresh_time_rederives_overdue() {
        let (store, clock) = store();
        let due = clock.now() + Duration::hours(1);
        store.add(NewTask::new("soon").due(due));
        let cx = store.runtime().untracked();
        assert_eq!(store.statistics(&cx).overdue, 0);

        clock.advance(Duration::hours(2));
        assert_eq!(store.statistics(&cx).overdue, 0);
        store.refresh_time();
        assert_eq!(store.statistics(&cx).overdue, 1);
    }

    #[test]
    fn restore_json_normalizes_and_tolerates_garbage() {
        let (store, _) = store();
        store.add(NewTask::new("t"));
        let json = store.snapshot_json().unwrap();

        store.restore_json("definitely not json");
        let cx = store.runtime().untracked();
        assert!(store.tasks(&cx).is_empty());

        store.restore_json(&json);
        assert_eq!(store.tasks(&cx).len(), 1);
    }

    #[test]
    fn restored_cancelled_tasks_stay_cancelled() {
        let (store, _) = store();
        let id = store.add(NewTask::new("t")).id;
        store.change_status(&id, TaskStatus::Cancelled);
        let json = store
            .snapshot_json()
            .unwrap()
            .replace("\"completionPercentage\":0", "\"completionPercentage\":100");
        assert!(json.contains("\"completionPercentage\":100"));

        store.restore_json(&json);
        let cx = store.runtime().untracked();
        let task = store.task(&cx, &id).unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.completion_percentage, 99);
    }

    #[test]
    fn filter_can_be_edited_in_place() {
        let (store, _) = store();
        store.add(NewTask::new("alpha"));
        store.add(NewTask::new("beta"));

        store.update_filter(|filter| filter.search_term = Some("ALP".to_string()));
        let cx = store.runtime().untracked();
        assert_eq!(store.filtered_tasks(&cx).len(), 1);

        store.clear_filter();
        assert_eq!(store.filtered_tasks(&cx).len(), 2);
    }
}
