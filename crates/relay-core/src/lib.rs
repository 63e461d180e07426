//! relay-core: structured answers from a prioritized list of LLM providers
//!
//! Providers are asked one at a time, each with its own linear-backoff retry
//! budget, and their text is reduced to a parsed JSON value. Image-style work
//! goes through a submit/poll task driver instead.

pub mod config;
pub mod error;
pub mod extract;
pub mod orchestrator;
pub mod providers;
pub mod retry;
pub mod sanitize;
pub mod schema;
pub mod tasks;

pub use config::RelayConfig;
pub use error::{ExtractionError, OrchestratorError, ProviderError, ProviderFailure};
pub use extract::extract;
pub use orchestrator::{Orchestrator, PromptInput};
pub use retry::{AttemptOutcome, RetryPolicy};
pub use sanitize::{ContentSanitizer, SanitizationRule, SanitizationRuleSet};
pub use schema::{ResultSchema, SchemaField, SchemaNode};
pub use tokio_util::sync::CancellationToken;
