//! Task sources.
//!
//! A source is whatever hands the store a collection of tasks from outside:
//! a remote API, a fixture file, a canned list. The store applies no retry
//! or backoff; a failed fetch is reported once through its error cell.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::task::Task;
use crate::error::LoadError;

/// Something that can produce a task collection asynchronously.
pub trait TaskSource {
    fn fetch(&self) -> impl Future<Output = Result<Vec<Task>, LoadError>>;
}

#[derive(Debug, Clone)]
enum Payload {
    Tasks(Vec<Task>),
    Json(String),
    Failure(String),
}

/// A source that resolves to a fixed answer after an optional delay.
///
/// Stands in for a network transport in demos and tests.
#[derive(Debug, Clone)]
pub struct StaticTaskSource {
    payload: Payload,
    delay: Option<Duration>,
}

impl StaticTaskSource {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            payload: Payload::Tasks(tasks),
            delay: None,
        }
    }

    /// Resolves by parsing `json` as a task array.
    pub fn from_json(json: impl Into<String>) -> Self {
        Self {
            payload: Payload::Json(json.into()),
            delay: None,
        }
    }

    /// Always fails with a transport error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            payload: Payload::Failure(message.into()),
            delay: None,
        }
    }

    /// Simulate network latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl TaskSource for StaticTaskSource {
    async fn fetch(&self) -> Result<Vec<Task>, LoadError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.payload {
            Payload::Tasks(tasks) => Ok(tasks.clone()),
            Payload::Json(json) => {
                let tasks: Vec<Task> =
                    serde_json::from_str(json).map_err(|err| LoadError::Malformed(err.to_string()))?;
                debug!(count = tasks.len(), "parsed task payload");
                Ok(tasks)
            }
            Payload::Failure(message) => Err(LoadError::Transport(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_resolves_its_payload() {
        let tasks = StaticTaskSource::new(Vec::new()).fetch().await.unwrap();
        assert!(tasks.is_empty());

        let err = StaticTaskSource::failing("offline").fetch().await.unwrap_err();
        assert!(matches!(err, LoadError::Transport(message) if message == "offline"));
    }

    #[tokio::test]
    async fn malformed_json_is_a_load_error() {
        let err = StaticTaskSource::from_json("{oops").fetch().await.unwrap_err();
        assert!(matches!(err, LoadError::Malformed(_)));
    }

    #[tokio::test]
    async fn delay_is_honoured() {
        let source = StaticTaskSource::from_json("[]").with_delay(Duration::from_millis(20));
        let started = tokio::time::Instant::now();
        source.fetch().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
