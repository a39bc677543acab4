//! Two-phase backend protocol: prepare now, execute later.
//!
//! A backend's `prepare` step validates input synchronously and returns a
//! [`Task`]. Nothing touches the network until the caller awaits
//! [`Task::execute`], which lets the caller gather many tasks and run them
//! concurrently. Validation failures found while preparing are carried by
//! the task and surface when it executes, so preparing never fails.

use futures::future::BoxFuture;
use std::future::Future;

use crate::error::BackendError;

enum TaskState<T> {
    Pending(BoxFuture<'static, Result<T, BackendError>>),
    Failed(BackendError),
}

/// A prepared unit of backend work that has not started yet.
pub struct Task<T> {
    label: String,
    state: TaskState<T>,
}

impl<T> Task<T> {
    /// Wraps deferred work.
    pub fn pending<F>(label: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = Result<T, BackendError>> + Send + 'static,
    {
        Self {
            label: label.into(),
            state: TaskState::Pending(Box::pin(work)),
        }
    }

    /// A task whose preparation already failed.
    pub fn failed(label: impl Into<String>, error: BackendError) -> Self {
        Self {
            label: label.into(),
            state: TaskState::Failed(error),
        }
    }

    /// Backend label used in logs and diagnostics.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns `true` if preparation already failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.state, TaskState::Failed(_))
    }

    /// Runs the deferred work to completion.
    ///
    /// # Errors
    ///
    /// Returns the preparation error, or whatever the work returns.
    pub async fn execute(self) -> Result<T, BackendError> {
        match self.state {
            TaskState::Pending(work) => work.await,
            TaskState::Failed(err) => Err(err),
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            TaskState::Pending(_) => "pending",
            TaskState::Failed(_) => "failed",
        };
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("state", &state)
            .finish()
    }
}
