//! Metrics store.
//!
//! Keeps a bounded history of named numeric samples and derives per-name
//! summaries from it.

use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::environment::StoreEnvironment;
use super::persistence::{persist_collection, restore_collection};
use super::task::TaskStatus;
use super::task_store::TaskStore;
use crate::reactive::{Cell, Computation, Effect, ReactiveContext, Runtime};

pub const METRICS_COLLECTION: &str = "metrics";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate over every retained sample of one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub last: f64,
}

impl MetricSummary {
    fn first(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
            mean: value,
            last: value,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.mean = self.sum / self.count as f64;
        self.last = value;
    }
}

/// Summaries keyed by metric name, in order of first appearance.
pub type MetricSummaries = IndexMap<String, MetricSummary>;

#[derive(Clone)]
pub struct MetricsStore {
    env: StoreEnvironment,
    samples: Cell<Rc<Vec<MetricSample>>>,
    summaries: Computation<Rc<MetricSummaries>>,
    persistence: Option<Effect>,
}

impl MetricsStore {
    pub fn new(runtime: &Runtime, env: StoreEnvironment) -> Self {
        let key = env.config.storage_key(METRICS_COLLECTION);
        let mut restored: Vec<MetricSample> = restore_collection(env.storage.as_ref(), &key);
        retain_latest(&mut restored, env.config.metrics_retention);

        let samples = Cell::new_with_eq(runtime, Rc::new(restored), |a, b| Rc::ptr_eq(a, b));

        let summaries = Computation::new(runtime, {
            let samples = samples.clone();
            move |cx| {
                samples.with(cx, |samples| {
                    let mut summaries = MetricSummaries::new();
                    for sample in samples.iter() {
                        match summaries.get_mut(&sample.name) {
                            Some(summary) => summary.push(sample.value),
                            None => {
                                summaries.insert(sample.name.clone(), MetricSummary::first(sample.value));
                            }
                        }
                    }
                    Rc::new(summaries)
                })
            }
        });

        let persistence = env
            .config
            .persist
            .then(|| persist_collection(runtime, Rc::clone(&env.storage), key, samples.clone()));

        Self {
            env,
            samples,
            summaries,
            persistence,
        }
    }

    pub fn summaries(&self, cx: &ReactiveContext) -> Rc<MetricSummaries> {
        self.summaries.get(cx)
    }

    pub fn summary(&self, cx: &ReactiveContext, name: &str) -> Option<MetricSummary> {
        self.summaries.with(cx, |summaries| summaries.get(name).cloned())
    }

    pub fn total_samples(&self, cx: &ReactiveContext) -> usize {
        self.samples.with(cx, |samples| samples.len())
    }

    pub fn persistence(&self) -> Option<&Effect> {
        self.persistence.as_ref()
    }

    /// Record one sample. Non-finite values are rejected.
    pub fn record(&self, name: impl Into<String>, value: f64) {
        let name = name.into();
        if !value.is_finite() {
            warn!(metric = %name, value, "ignoring non-finite sample");
            return;
        }

        let mut samples = self.samples.get_untracked().as_ref().clone();
        samples.push(MetricSample {
            name,
            value,
            recorded_at: self.env.clock.now(),
        });
        retain_latest(&mut samples, self.env.config.metrics_retention);
        self.samples.set(Rc::new(samples));
    }

    pub fn reset(&self) {
        if self.samples.with_untracked(|samples| !samples.is_empty()) {
            debug!("metrics reset");
            self.samples.set(Rc::new(Vec::new()));
        }
    }
}

fn retain_latest(samples: &mut Vec<MetricSample>, retention: usize) {
    if samples.len() > retention {
        let excess = samples.len() - retention;
        samples.drain(..excess);
    }
}

impl std::fmt::Debug for MetricsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsStore")
            .field("samples", &self.samples.with_untracked(|samples| samples.len()))
            .field("persisting", &self.persistence.is_some())
            .finish()
    }
}

/// An effect that records task statistics every time they change:
/// `tasks.total`, `tasks.completed`, `tasks.overdue`.
pub fn statistics_recorder(tasks: &TaskStore, metrics: &MetricsStore) -> Effect {
    let store = tasks.clone();
    let metrics = metrics.clone();

    Effect::new(tasks.runtime(), move |cx| {
        let stats = store.statistics(cx);
        let completed = stats.by_status.get(&TaskStatus::Completed).copied().unwrap_or(0);
        metrics.record("tasks.total", stats.total as f64);
        metrics.record("tasks.completed", completed as f64);
        metrics.record("tasks.overdue", stats.overdue as f64);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::persistence::MemoryStorage;
    use crate::store::task::NewTask;

    fn metrics(config: StoreConfig) -> (Runtime, MetricsStore) {
        let runtime = Runtime::new();
        let env = StoreEnvironment::in_memory().with_config(config);
        let store = MetricsStore::new(&runtime, env);
        (runtime, store)
    }

    #[test]
    fn summaries_aggregate_per_name_in_first_seen_order() {
        let (runtime, store) = metrics(StoreConfig::default());
        store.record("latency", 10.0);
        store.record("errors", 1.0);
        store.record("latency", 30.0);

        let cx = runtime.untracked();
        let summaries = store.summaries(&cx);
        let names: Vec<_> = summaries.keys().cloned().collect();
        assert_eq!(names, vec!["latency", "errors"]);

        let latency = &summaries["latency"];
        assert_eq!(latency.count, 2);
        assert_eq!(latency.min, 10.0);
        assert_eq!(latency.max, 30.0);
        assert_eq!(latency.mean, 20.0);
        assert_eq!(latency.last, 30.0);
        assert_eq!(store.total_samples(&cx), 3);
    }

    #[test]
    fn retention_drops_oldest_samples() {
        let (runtime, store) = metrics(StoreConfig {
            metrics_retention: 2,
            ..StoreConfig::default()
        });
        store.record("x", 1.0);
        store.record("x", 2.0);
        store.record("x", 3.0);

        let cx = runtime.untracked();
        let summary = store.summary(&cx, "x").unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.sum, 5.0);
    }

    #[test]
    fn non_finite_samples_and_reset() {
        let (runtime, store) = metrics(StoreConfig::default());
        store.record("x", f64::NAN);
        let cx = runtime.untracked();
        assert_eq!(store.total_samples(&cx), 0);

        store.record("x", 1.0);
        store.reset();
        assert!(store.summaries(&cx).is_empty());
        assert!(store.summary(&cx, "x").is_none());
    }

    #[test]
    fn recorder_tracks_task_statistics() {
        let runtime = Runtime::new();
        let storage = Rc::new(MemoryStorage::new());
        let tasks = TaskStore::new(&runtime, StoreEnvironment::new(storage.clone()));
        let metrics = MetricsStore::new(&runtime, StoreEnvironment::new(storage));
        let _recorder = statistics_recorder(&tasks, &metrics);

        let id = tasks.add(NewTask::new("measure me")).id;
        tasks.change_status(&id, TaskStatus::Completed);

        let cx = runtime.untracked();
        let total = metrics.summary(&cx, "tasks.total").unwrap();
        assert_eq!(total.last, 1.0);
        assert_eq!(total.count, 3);
        assert_eq!(metrics.summary(&cx, "tasks.completed").unwrap().last, 1.0);
    }
}
