//! Scripted in-process task backend for unit tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use super::backend::TaskBackend;
use super::protocol::PollReport;
use crate::error::ProviderError;

/// Hands out one task id, then replays status reports. An exhausted script
/// reports `Pending` forever.
pub struct ScriptedBackend {
    pub configured: bool,
    hang_on_create: bool,
    hang_on_status: bool,
    create: Mutex<Option<Result<String, ProviderError>>>,
    polls: Mutex<VecDeque<Result<PollReport, ProviderError>>>,
    pub creates: Arc<AtomicU32>,
    pub queries: Arc<AtomicU32>,
    pub cancels: Arc<AtomicU32>,
}

impl ScriptedBackend {
    pub fn new(polls: Vec<Result<PollReport, ProviderError>>) -> Self {
        Self {
            configured: true,
            hang_on_create: false,
            hang_on_status: false,
            create: Mutex::new(Some(Ok("task-1".to_string()))),
            polls: Mutex::new(polls.into()),
            creates: Arc::new(AtomicU32::new(0)),
            queries: Arc::new(AtomicU32::new(0)),
            cancels: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        let backend = Self::new(vec![]);
        *backend.create.lock().unwrap() = Some(Err(ProviderError::terminal(reason)));
        backend
    }

    /// `create_task` never returns
    pub fn hanging_on_create() -> Self {
        Self {
            hang_on_create: true,
            ..Self::new(vec![])
        }
    }

    /// `task_status` never returns
    pub fn hanging_on_status() -> Self {
        Self {
            hang_on_status: true,
            ..Self::new(vec![])
        }
    }
}

#[async_trait]
impl TaskBackend for ScriptedBackend {
    fn backend_name(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn create_task(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_create {
            std::future::pending::<()>().await;
        }
        self.create
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(ProviderError::terminal("already submitted")))
    }

    async fn task_status(&self, _task_id: &str) -> Result<PollReport, ProviderError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_status {
            std::future::pending::<()>().await;
        }
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(PollReport::Pending))
    }

    async fn cancel_task(&self, _task_id: &str) -> Result<(), ProviderError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
