//! Submit/poll driver for out-of-band artifact generation
//!
//! Once a task is accepted the poller is committed to that backend for the
//! task's lifetime; there is no mid-task failover. A caller that wants another
//! backend starts a fresh submission after a terminal error.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::TaskBackend;
use super::protocol::{AsyncTask, PollReport, TaskStatus};
use crate::error::OrchestratorError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_BUDGET: u32 = 15;
/// Upper bound on the upstream cancel request made when the caller gives up
pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll cadence and budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub poll_budget: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_budget: DEFAULT_POLL_BUDGET,
        }
    }
}

/// Drives one backend through `Submitted → Pending → terminal`
#[derive(Clone)]
pub struct AsyncTaskPoller {
    backend: Arc<dyn TaskBackend>,
    config: PollerConfig,
}

impl std::fmt::Debug for AsyncTaskPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTaskPoller")
            .field("backend", &self.backend.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

impl AsyncTaskPoller {
    pub fn new(backend: Arc<dyn TaskBackend>, config: PollerConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    /// Submit a task and poll until it succeeds, fails, or the budget runs out.
    /// Returns the first artifact locator.
    pub async fn run(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, OrchestratorError> {
        if !self.backend.is_configured() {
            return Err(OrchestratorError::TaskSubmission(format!(
                "{} backend is not configured",
                self.backend.backend_name()
            )));
        }

        let task_id = tokio::select! {
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            created = self.backend.create_task(prompt) => {
                created.map_err(|e| OrchestratorError::TaskSubmission(e.reason().to_string()))?
            }
        };

        let mut task = AsyncTask::new(task_id);
        info!(task_id = task.id(), backend = self.backend.backend_name(), "Task submitted");

        let budget = self.config.poll_budget.max(1);
        while !task.is_terminal() && task.polls() < budget {
            tokio::select! {
                _ = cancel.cancelled() => return Err(self.abandon(task.id()).await),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            let polled = tokio::select! {
                _ = cancel.cancelled() => return Err(self.abandon(task.id()).await),
                polled = self.backend.task_status(task.id()) => polled,
            };
            task.record_poll();

            match polled {
                Ok(report) => {
                    debug!(task_id = task.id(), poll = task.polls(), ?report, "Task polled");
                    task.apply(report);
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        task_id = task.id(),
                        poll = task.polls(),
                        error = %e,
                        "Status query failed, will poll again"
                    );
                }
                Err(e) => {
                    task.apply(PollReport::Failed(e.reason().to_string()));
                }
            }
        }

        task.time_out();

        match task.status().clone() {
            TaskStatus::Succeeded(locator) => {
                info!(task_id = task.id(), polls = task.polls(), "Task succeeded");
                Ok(locator)
            }
            TaskStatus::Failed(reason) => {
                warn!(task_id = task.id(), reason = %reason, "Task failed");
                Err(OrchestratorError::TaskFailed {
                    task_id: task.id().to_string(),
                    reason,
                })
            }
            TaskStatus::TimedOut | TaskStatus::Pending => {
                warn!(task_id = task.id(), polls = task.polls(), "Task timed out");
                Err(OrchestratorError::TaskTimeout {
                    task_id: task.id().to_string(),
                    polls: task.polls(),
                })
            }
        }
    }

    /// Best-effort upstream cancel of a task the caller no longer wants
    async fn abandon(&self, task_id: &str) -> OrchestratorError {
        match tokio::time::timeout(CANCEL_TIMEOUT, self.backend.cancel_task(task_id)).await {
            Ok(Ok(())) => info!(task_id, "Task cancelled upstream"),
            Ok(Err(e)) => warn!(task_id, error = %e, "Upstream cancel failed"),
            Err(_) => warn!(task_id, "Upstream cancel timed out"),
        }
        OrchestratorError::Cancelled
    }
}
