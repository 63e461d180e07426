//! Async task lifecycle types
//!
//! A task is created on submission, mutated only by poll reports, and dropped
//! once it reaches a terminal status. Terminal statuses are absorbing.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a backend reports for one status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollReport {
    Pending,
    /// Completed, with zero or more artifact locators
    Succeeded(Vec<String>),
    Failed(String),
}

/// Lifecycle status of a submitted task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Succeeded(String),
    Failed(String),
    TimedOut,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Succeeded(_) => write!(f, "succeeded"),
            Self::Failed(_) => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// A task accepted by a backend
#[derive(Debug, Clone, Serialize)]
pub struct AsyncTask {
    id: String,
    submitted_at: DateTime<Utc>,
    status: TaskStatus,
    polls: u32,
}

impl AsyncTask {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            submitted_at: Utc::now(),
            status: TaskStatus::Pending,
            polls: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Count one status query against the poll budget
    pub fn record_poll(&mut self) {
        self.polls += 1;
    }

    /// Apply a poll report. Returns false (and changes nothing) once the task
    /// is terminal.
    pub fn apply(&mut self, report: PollReport) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = match report {
            PollReport::Pending => TaskStatus::Pending,
            PollReport::Succeeded(locators) => match locators.into_iter().next() {
                Some(locator) => TaskStatus::Succeeded(locator),
                None => TaskStatus::Failed("empty content".to_string()),
            },
            PollReport::Failed(reason) => TaskStatus::Failed(reason),
        };
        true
    }

    /// Give up on a task that never reached a terminal status
    pub fn time_out(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = TaskStatus::TimedOut;
        true
    }
}
