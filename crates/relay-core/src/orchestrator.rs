//! Orchestrator facade
//!
//! The only surface the business layer talks to: structured answers with
//! provider failover, and out-of-band artifact generation.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::OrchestratorError;
use crate::providers::{ProviderRouter, ProviderStatus};
use crate::sanitize::ContentSanitizer;
use crate::schema::ResultSchema;
use crate::tasks::AsyncTaskPoller;

/// Prompt given either as plain text or as a structured value
#[derive(Debug, Clone, PartialEq)]
pub enum PromptInput {
    Text(String),
    Structured(Value),
}

impl PromptInput {
    /// Text the providers receive. Structured input is serialized compactly.
    pub fn render(&self) -> String {
        match self {
            PromptInput::Text(text) => text.clone(),
            PromptInput::Structured(Value::String(text)) => text.clone(),
            PromptInput::Structured(value) => value.to_string(),
        }
    }
}

impl From<&str> for PromptInput {
    fn from(text: &str) -> Self {
        PromptInput::Text(text.to_string())
    }
}

impl From<String> for PromptInput {
    fn from(text: String) -> Self {
        PromptInput::Text(text)
    }
}

impl From<Value> for PromptInput {
    fn from(value: Value) -> Self {
        PromptInput::Structured(value)
    }
}

pub struct Orchestrator {
    router: ProviderRouter,
    poller: AsyncTaskPoller,
    sanitizer: ContentSanitizer,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.router.providers().len())
            .field("poller", &self.poller)
            .field("sanitizer_rules", &self.sanitizer.rules().len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(router: ProviderRouter, poller: AsyncTaskPoller, sanitizer: ContentSanitizer) -> Self {
        Self {
            router,
            poller,
            sanitizer,
        }
    }

    /// Build from config, reading credentials from the process environment
    pub fn from_config(config: &RelayConfig) -> anyhow::Result<Self> {
        Self::from_config_with(config, |name| std::env::var(name).ok())
    }

    /// Build from config with an explicit credential lookup
    pub fn from_config_with(
        config: &RelayConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let descriptors = config
            .providers
            .iter()
            .map(|p| p.build_descriptor(&lookup))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let router = ProviderRouter::new(descriptors);
        let poller = config.artifacts.build_poller(&lookup)?;
        let sanitizer = config.sanitizer.build()?;

        info!(
            providers = router.providers().len(),
            available = router.available_count(),
            artifacts = poller.is_configured(),
            "Orchestrator ready"
        );

        Ok(Self::new(router, poller, sanitizer))
    }

    /// Ask the configured providers, in priority order, for a value shaped
    /// like `schema`.
    pub async fn answer(
        &self,
        prompt: impl Into<PromptInput>,
        schema: &ResultSchema,
        cancel: &CancellationToken,
    ) -> Result<Value, OrchestratorError> {
        let prompt = prompt.into().render();
        let span = info_span!("answer", request_id = %Uuid::new_v4(), schema = schema.name());

        self.router
            .answer(&prompt, schema, cancel)
            .instrument(span)
            .await
    }

    /// Generate an artifact out of band and return its locator
    pub async fn generate_artifact(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, OrchestratorError> {
        let span = info_span!("generate_artifact", request_id = %Uuid::new_v4());
        self.poller.run(prompt, cancel).instrument(span).await
    }

    /// Rewrite restricted terms in user-authored text
    pub fn sanitize(&self, text: &str) -> String {
        self.sanitizer.sanitize(text)
    }

    pub fn providers(&self) -> Vec<ProviderStatus> {
        self.router.statuses()
    }
}
