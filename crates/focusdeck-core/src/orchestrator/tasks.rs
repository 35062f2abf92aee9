//! Background tasks owned by the orchestrator.
//!
//! Tasks are spawned onto the tokio runtime. Their state can be polled at any
//! time; draining waits for each task up to a timeout and aborts whatever is
//! left, so no task outlives the session that started it.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed out",
        })
    }
}

/// Handle to one fire-and-forget unit of work
pub struct BackgroundTask {
    name: String,
    handle: JoinHandle<bool>,
    outcome: Arc<OnceLock<bool>>,
}

impl BackgroundTask {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state without waiting. A task that panicked or was aborted
    /// reports `Failed`; `TimedOut` only comes out of a drain.
    #[must_use]
    pub fn state(&self) -> TaskState {
        if !self.handle.is_finished() {
            return TaskState::Running;
        }
        match self.outcome.get() {
            Some(true) => TaskState::Completed,
            Some(false) | None => TaskState::Failed,
        }
    }

    async fn settle(mut self, timeout: Duration) -> TaskState {
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(true)) => TaskState::Completed,
            Ok(Ok(false)) => TaskState::Failed,
            Ok(Err(e)) => {
                warn!("Task {} did not finish cleanly: {}", self.name, e);
                TaskState::Failed
            }
            Err(_) => {
                self.handle.abort();
                TaskState::TimedOut
            }
        }
    }
}

/// Owns every outstanding [`BackgroundTask`]
pub struct TaskArena {
    tasks: Vec<BackgroundTask>,
    span: Span,
}

impl TaskArena {
    #[must_use]
    pub fn new(span: Span) -> Self {
        Self {
            tasks: Vec::new(),
            span,
        }
    }

    /// Spawn `job` onto the runtime. Must be called from within a tokio runtime.
    pub fn spawn<F>(&mut self, name: impl Into<String>, job: F)
    where
        F: Future<Output = bool> + Send + 'static,
    {
        let name = name.into();
        self.span
            .in_scope(|| debug!("Spawning background task {}", name));
        let outcome = Arc::new(OnceLock::new());
        let slot = Arc::clone(&outcome);
        let job = async move {
            let ok = job.await;
            let _ = slot.set(ok);
            ok
        };
        let handle = tokio::spawn(job.instrument(self.span.clone()));
        self.tasks.push(BackgroundTask {
            name,
            handle,
            outcome,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Name and current state of every outstanding task, in spawn order.
    #[must_use]
    pub fn states(&self) -> Vec<(String, TaskState)> {
        self.tasks
            .iter()
            .map(|task| (task.name().to_string(), task.state()))
            .collect()
    }

    /// Wait for every task, each bounded by `timeout`, then forget them.
    /// Returns the final state of each task in spawn order.
    pub async fn drain(&mut self, timeout: Duration) -> Vec<(String, TaskState)> {
        let tasks = std::mem::take(&mut self.tasks);
        let mut results = Vec::with_capacity(tasks.len());

        for task in tasks {
            let name = task.name.clone();
            let state = task.settle(timeout).instrument(self.span.clone()).await;
            self.span.in_scope(|| match state {
                TaskState::Completed => info!("Background task {} completed", name),
                TaskState::Failed => warn!("Background task {} failed", name),
                TaskState::TimedOut => {
                    warn!("Background task {} timed out after {:?}", name, timeout);
                }
                TaskState::Running => {}
            });
            results.push((name, state));
        }
        results
    }
}

impl Drop for TaskArena {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.handle.abort();
        }
    }
}
