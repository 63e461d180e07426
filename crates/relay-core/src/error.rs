//! Error taxonomy for provider calls, response extraction and orchestration

use thiserror::Error;

/// Classified failure of a single provider call.
///
/// The classification decides whether [`crate::retry::RetryPolicy`] tries the
/// same provider again (`Transient`) or gives up on it immediately (`Terminal`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network failure, non-success transport status, rate limiting
    #[error("transient: {0}")]
    Transient(String),
    /// Malformed upstream response, content-policy rejection, empty content
    #[error("terminal: {0}")]
    Terminal(String),
}

impl ProviderError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        Self::Terminal(reason.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The reason without the classification prefix
    pub fn reason(&self) -> &str {
        match self {
            Self::Transient(r) | Self::Terminal(r) => r,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        // Anything that fails before a response is read is worth another try
        Self::Transient(format!("request failed: {e}"))
    }
}

/// Upstream text could not be turned into a structured value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("empty content")]
    EmptyContent,
    #[error("code fence opened but never closed")]
    UnclosedFence,
    #[error("invalid JSON: {0}")]
    Parse(String),
}

impl From<ExtractionError> for ProviderError {
    fn from(e: ExtractionError) -> Self {
        Self::Terminal(e.to_string())
    }
}

/// Last recorded failure of one provider during a fallback run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

/// Errors that cross the orchestration boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("no provider is configured (no credentials present)")]
    NoProviderConfigured,

    #[error("all providers failed: {}", format_failures(.failures))]
    AllProvidersExhausted { failures: Vec<ProviderFailure> },

    #[error("task submission failed: {0}")]
    TaskSubmission(String),

    #[error("task {task_id} failed: {reason}")]
    TaskFailed { task_id: String, reason: String },

    #[error("task {task_id} still pending after {polls} polls")]
    TaskTimeout { task_id: String, polls: u32 },

    #[error("operation cancelled")]
    Cancelled,
}

fn format_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_classification() {
        assert!(ProviderError::transient("HTTP 503").is_transient());
        assert!(!ProviderError::terminal("refused").is_transient());
        assert_eq!(ProviderError::terminal("refused").reason(), "refused");
    }

    #[test]
    fn test_extraction_error_is_terminal() {
        let err: ProviderError = ExtractionError::EmptyContent.into();
        assert_eq!(err, ProviderError::Terminal("empty content".to_string()));
    }

    #[test]
    fn test_exhausted_lists_failures_in_order() {
        let err = OrchestratorError::AllProvidersExhausted {
            failures: vec![
                ProviderFailure {
                    provider: "claude".to_string(),
                    reason: "HTTP 500".to_string(),
                },
                ProviderFailure {
                    provider: "gpt".to_string(),
                    reason: "empty content".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "all providers failed: claude: HTTP 500; gpt: empty content"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = OrchestratorError::TaskTimeout {
            task_id: "abc".to_string(),
            polls: 15,
        };
        assert!(err.to_string().contains("15 polls"));
    }
}
