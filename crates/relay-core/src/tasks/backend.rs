//! Backend seam for providers that produce artifacts out of band

use async_trait::async_trait;

use super::protocol::PollReport;
use crate::error::ProviderError;

/// A provider that accepts a job, then reports on it by id
#[async_trait]
pub trait TaskBackend: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Whether credentials/configuration are present
    fn is_configured(&self) -> bool;

    /// Create a task and return the provider's task id
    async fn create_task(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Query the current state of a task
    async fn task_status(&self, task_id: &str) -> Result<PollReport, ProviderError>;

    /// Ask the provider to stop work on a task. Backends without a cancel
    /// endpoint leave the task to finish on its own.
    async fn cancel_task(&self, _task_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}
