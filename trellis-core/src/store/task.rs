//! Task domain model.
//!
//! Plain data plus the pure functions the task store derives its views from.
//! Nothing in here knows about cells or effects.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Identifier of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a task.
///
/// The nominal flow is pending → in-progress → in-review → completed.
/// On-hold and cancelled are reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    InReview,
    Completed,
    Cancelled,
    OnHold,
}

impl TaskStatus {
    /// Every status, in board order.
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::InReview,
        TaskStatus::OnHold,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ];

    /// Completed and cancelled tasks are finished for statistics purposes.
    pub fn is_terminal(self) -> bool {
        match self {
            TaskStatus::Completed | TaskStatus::Cancelled => true,
            TaskStatus::Pending | TaskStatus::InProgress | TaskStatus::InReview | TaskStatus::OnHold => false,
        }
    }

    /// Whether `change_status` may move a task from `self` to `next`.
    ///
    /// Cancelled tasks can only be reopened as pending. Completed tasks can
    /// be reopened into any open state but not cancelled.
    pub fn can_move_to(self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Cancelled => matches!(next, TaskStatus::Cancelled | TaskStatus::Pending),
            TaskStatus::Completed => next != TaskStatus::Cancelled,
            TaskStatus::Pending | TaskStatus::InProgress | TaskStatus::InReview | TaskStatus::OnHold => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::InReview => "in-review",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::OnHold => "on-hold",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority, ordered from least to most pressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 5] = [
        TaskPriority::Low,
        TaskPriority::Medium,
        TaskPriority::High,
        TaskPriority::Urgent,
        TaskPriority::Critical,
    ];

    /// Urgent and critical tasks are always listed as urgent.
    pub fn is_urgent(self) -> bool {
        match self {
            TaskPriority::Urgent | TaskPriority::Critical => true,
            TaskPriority::Low | TaskPriority::Medium | TaskPriority::High => false,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A unit of work.
///
/// Created only by the store's `add` and changed only through its mutators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee_id: Option<String>,
    pub project_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub actual_hours: f64,
    /// 0 to 100. 100 if and only if the task is completed.
    #[serde(default)]
    pub completion_percentage: u8,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Task {
    /// Past its due date and not yet finished. Cancelled tasks are never
    /// overdue.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.due_date.is_some_and(|due| due < now)
    }
}

/// Fields accepted by `TaskStore::add`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub assignee_id: Option<String>,
    pub project_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    pub estimated_hours: f64,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn due(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn assignee(mut self, assignee_id: impl Into<String>) -> Self {
        self.assignee_id = Some(assignee_id.into());
        self
    }

    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn estimate(mut self, hours: f64) -> Self {
        self.estimated_hours = hours;
        self
    }
}

/// A partial update for `TaskStore::update`.
///
/// Status and completion percentage are deliberately absent: they change
/// only through `change_status` and `update_progress`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    /// `Some(None)` clears the assignee.
    pub assignee_id: Option<Option<String>>,
    pub project_id: Option<Option<String>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub tags: Option<BTreeSet<String>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
}

impl TaskPatch {
    pub(crate) fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(assignee_id) = self.assignee_id {
            task.assignee_id = assignee_id;
        }
        if let Some(project_id) = self.project_id {
            task.project_id = project_id;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(tags) = self.tags {
            task.tags = tags;
        }
        if let Some(hours) = self.estimated_hours {
            task.estimated_hours = hours.max(0.0);
        }
        if let Some(hours) = self.actual_hours {
            task.actual_hours = hours.max(0.0);
        }
    }
}

/// Inclusive due-date window. An open end is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

/// Filter criteria. Every field is optional; an unset field (or an empty
/// set, or a blank search term) places no constraint on its dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub statuses: Option<BTreeSet<TaskStatus>>,
    pub priorities: Option<BTreeSet<TaskPriority>>,
    pub assignees: Option<BTreeSet<String>>,
    pub project_id: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub search_term: Option<String>,
    pub due_range: Option<DateRange>,
}

fn active<T>(set: &Option<BTreeSet<T>>) -> Option<&BTreeSet<T>> {
    set.as_ref().filter(|set| !set.is_empty())
}

impl TaskFilter {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search_term: Some(term.into()),
            ..Self::default()
        }
    }

    pub fn with_statuses(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        Self {
            statuses: Some(statuses.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Apply the criteria in order: status, priority, search term, then
    /// assignee, project, tags and due-date range.
    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        let needle = self
            .search_term
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase);

        tasks
            .iter()
            .filter(|task| active(&self.statuses).map_or(true, |set| set.contains(&task.status)))
            .filter(|task| active(&self.priorities).map_or(true, |set| set.contains(&task.priority)))
            .filter(|task| {
                needle.as_deref().map_or(true, |needle| {
                    task.title.to_lowercase().contains(needle) || task.description.to_lowercase().contains(needle)
                })
            })
            .filter(|task| {
                active(&self.assignees).map_or(true, |set| {
                    task.assignee_id.as_ref().is_some_and(|assignee| set.contains(assignee))
                })
            })
            .filter(|task| {
                self.project_id
                    .as_ref()
                    .map_or(true, |project| task.project_id.as_ref() == Some(project))
            })
            .filter(|task| active(&self.tags).map_or(true, |set| !set.is_disjoint(&task.tags)))
            .filter(|task| {
                self.due_range
                    .map_or(true, |range| task.due_date.is_some_and(|due| range.contains(due)))
            })
            .cloned()
            .collect()
    }
}

/// Aggregates over a set of tasks. Always derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatistics {
    pub total: usize,
    pub by_status: IndexMap<TaskStatus, usize>,
    pub by_priority: IndexMap<TaskPriority, usize>,
    pub overdue: usize,
    pub completed_this_week: usize,
    /// Mean of `updated_at - created_at` over completed tasks, in days.
    pub average_completion_days: f64,
    pub estimated_hours: f64,
    pub actual_hours: f64,
}

impl TaskStatistics {
    pub fn compute(tasks: &[Task], now: DateTime<Utc>, recent_days: i64) -> Self {
        let mut by_status: IndexMap<TaskStatus, usize> = TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut by_priority: IndexMap<TaskPriority, usize> = TaskPriority::ALL.iter().map(|p| (*p, 0)).collect();
        let week_start = now - Duration::days(recent_days);

        let mut overdue = 0;
        let mut completed_this_week = 0;
        let mut completion_days = Vec::new();
        let mut estimated_hours = 0.0;
        let mut actual_hours = 0.0;

        for task in tasks {
            *by_status.entry(task.status).or_default() += 1;
            *by_priority.entry(task.priority).or_default() += 1;
            estimated_hours += task.estimated_hours;
            actual_hours += task.actual_hours;

            if task.is_overdue(now) {
                overdue += 1;
            }
            if task.status == TaskStatus::Completed {
                if task.updated_at >= week_start && task.updated_at <= now {
                    completed_this_week += 1;
                }
                let elapsed = task.updated_at - task.created_at;
                completion_days.push(elapsed.num_seconds() as f64 / 86_400.0);
            }
        }

        let average_completion_days = if completion_days.is_empty() {
            0.0
        } else {
            completion_days.iter().sum::<f64>() / completion_days.len() as f64
        };

        Self {
            total: tasks.len(),
            by_status,
            by_priority,
            overdue,
            completed_this_week,
            average_completion_days,
            estimated_hours,
            actual_hours,
        }
    }
}

/// Tasks that need attention soon, earliest due date first.
///
/// A task qualifies if its priority is urgent or critical, or if it is not
/// completed and due within `window` of `now` (overdue included). Tasks
/// without a due date sort last. The sort is stable.
pub fn urgent_tasks(tasks: &[Task], now: DateTime<Utc>, window: Duration) -> Vec<Task> {
    let horizon = now + window;
    let mut urgent: Vec<Task> = tasks
        .iter()
        .filter(|task| {
            task.priority.is_urgent()
                || (task.status != TaskStatus::Completed && task.due_date.is_some_and(|due| due <= horizon))
        })
        .cloned()
        .collect();

    urgent.sort_by(|a, b| match (a.due_date, b.due_date) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    urgent
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    fn task(id: &str, title: &str) -> Task {
        Task {
            id: TaskId::from(id),
            title: title.to_string(),
            description: String::new(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            assignee_id: None,
            project_id: None,
            due_date: None,
            created_at: at(1, 0),
            updated_at: at(1, 0),
            tags: BTreeSet::new(),
            estimated_hours: 0.0,
            actual_hours: 0.0,
            completion_percentage: 0,
            attachments: Vec::new(),
            comments: Vec::new(),
        }
    }

    #[test]
    fn status_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"in-progress\"");
        assert_eq!(serde_json::to_string(&TaskStatus::OnHold).unwrap(), "\"on-hold\"");
        assert_eq!(TaskStatus::InReview.to_string(), "in-review");
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::OnHold.is_terminal());
    }

    #[test]
    fn terminal_states_only_reopen() {
        assert!(TaskStatus::Cancelled.can_move_to(TaskStatus::Pending));
        assert!(!TaskStatus::Cancelled.can_move_to(TaskStatus::Completed));
        assert!(!TaskStatus::Cancelled.can_move_to(TaskStatus::InProgress));
        assert!(TaskStatus::Completed.can_move_to(TaskStatus::InReview));
        assert!(!TaskStatus::Completed.can_move_to(TaskStatus::Cancelled));
        for status in TaskStatus::ALL {
            assert!(TaskStatus::OnHold.can_move_to(status));
        }
    }

    #[test]
    fn unset_criteria_are_skipped() {
        let tasks = vec![task("1", "a"), task("2", "b")];
        let filter = TaskFilter {
            statuses: Some(BTreeSet::new()),
            search_term: Some("   ".to_string()),
            ..TaskFilter::default()
        };
        assert_eq!(filter.apply(&tasks).len(), 2);
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_description() {
        let mut described = task("2", "Routing");
        described.description = "Guards in ANGULAR".to_string();
        let tasks = vec![task("1", "Learn Rust"), described, task("3", "Angular pipes")];

        let found = TaskFilter::search("angular").apply(&tasks);
        let ids: Vec<_> = found.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn combined_criteria_intersect() {
        let mut a = task("a", "one");
        a.priority = TaskPriority::High;
        a.tags.insert("ui".to_string());
        a.assignee_id = Some("ana".to_string());
        let mut b = task("b", "two");
        b.priority = TaskPriority::High;
        b.assignee_id = Some("bo".to_string());
        let mut c = task("c", "three");
        c.priority = TaskPriority::Low;
        c.tags.insert("ui".to_string());

        let tasks = vec![a, b, c];
        let filter = TaskFilter {
            priorities: Some([TaskPriority::High].into_iter().collect()),
            tags: Some(["ui".to_string()].into_iter().collect()),
            ..TaskFilter::default()
        };
        let ids: Vec<_> = filter.apply(&tasks).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TaskId::from("a")]);

        let by_assignee = TaskFilter {
            assignees: Some(["bo".to_string()].into_iter().collect()),
            ..TaskFilter::default()
        };
        assert_eq!(by_assignee.apply(&tasks)[0].id, TaskId::from("b"));
    }

    #[test]
    fn due_range_excludes_undated_tasks() {
        let mut dated = task("dated", "x");
        dated.due_date = Some(at(10, 12));
        let tasks = vec![dated, task("undated", "y")];

        let filter = TaskFilter {
            due_range: Some(DateRange {
                from: Some(at(10, 0)),
                to: None,
            }),
            ..TaskFilter::default()
        };
        let found = filter.apply(&tasks);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, TaskId::from("dated"));
    }

    #[test]
    fn statistics_aggregate_everything() {
        let now = at(20, 12);
        let mut done = task("done", "done");
        done.status = TaskStatus::Completed;
        done.created_at = at(15, 12);
        done.updated_at = at(18, 12);
        done.due_date = Some(at(10, 0));
        done.estimated_hours = 4.0;
        done.actual_hours = 5.0;

        let mut late = task("late", "late");
        late.due_date = Some(at(19, 0));
        late.priority = TaskPriority::Critical;
        late.estimated_hours = 2.0;

        let mut old = task("old", "old");
        old.status = TaskStatus::Completed;
        old.created_at = at(1, 12);
        old.updated_at = at(2, 12);

        let stats = TaskStatistics::compute(&[done, late, old], now, 7);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status[&TaskStatus::Completed], 2);
        assert_eq!(stats.by_status[&TaskStatus::Pending], 1);
        assert_eq!(stats.by_status[&TaskStatus::OnHold], 0);
        assert_eq!(stats.by_priority[&TaskPriority::Critical], 1);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.completed_this_week, 1);
        assert!((stats.average_completion_days - 2.0).abs() < 1e-9);
        assert_eq!(stats.estimated_hours, 6.0);
        assert_eq!(stats.actual_hours, 5.0);
    }

    #[test]
    fn statistics_of_nothing_are_zero() {
        let stats = TaskStatistics::compute(&[], at(1, 0), 7);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_completion_days, 0.0);
    }

    #[test]
    fn urgent_tasks_sort_stably_with_undated_last() {
        let now = at(10, 0);
        let mut critical = task("critical", "c");
        critical.priority = TaskPriority::Critical;
        let mut first = task("first", "f");
        first.priority = TaskPriority::Urgent;
        first.due_date = Some(at(12, 0));
        let mut second = task("second", "s");
        second.priority = TaskPriority::Urgent;
        second.due_date = Some(at(12, 0));
        let mut soon = task("soon", "s");
        soon.due_date = Some(at(10, 6));
        let mut soon_done = task("soon-done", "d");
        soon_done.due_date = Some(at(10, 6));
        soon_done.status = TaskStatus::Completed;
        let mut later = task("later", "l");
        later.due_date = Some(at(20, 0));

        let tasks = vec![critical, first, second, soon, soon_done, later];
        let ids: Vec<_> = urgent_tasks(&tasks, now, Duration::hours(24))
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(ids, vec!["soon", "first", "second", "critical"]);
    }
}
