//! Provider router: ordered failover across structured-answer providers
//!
//! Providers are tried strictly one at a time in ascending priority. Each gets
//! its own [`RetryPolicy`]; the first success wins and no lower-priority
//! provider is contacted. When everything fails the caller gets every
//! provider's last reason, in the order they were tried.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{ProviderDescriptor, ProviderStatus};
use crate::error::{OrchestratorError, ProviderFailure};
use crate::retry::AttemptOutcome;
use crate::schema::ResultSchema;

/// Fallback orchestrator over an ordered provider list
#[derive(Debug, Clone, Default)]
pub struct ProviderRouter {
    providers: Vec<ProviderDescriptor>,
}

impl ProviderRouter {
    /// Providers are ordered by priority; equal priorities keep their given order
    pub fn new(mut providers: Vec<ProviderDescriptor>) -> Self {
        providers.sort_by_key(ProviderDescriptor::priority);
        Self { providers }
    }

    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    pub fn statuses(&self) -> Vec<ProviderStatus> {
        self.providers.iter().map(ProviderStatus::from).collect()
    }

    pub fn available_count(&self) -> usize {
        self.providers.iter().filter(|p| p.is_available()).count()
    }

    /// Ask providers in order until one returns a parsed answer
    pub async fn answer(
        &self,
        prompt: &str,
        schema: &ResultSchema,
        cancel: &CancellationToken,
    ) -> Result<Value, OrchestratorError> {
        let available: Vec<&ProviderDescriptor> =
            self.providers.iter().filter(|p| p.is_available()).collect();

        if available.is_empty() {
            warn!("No provider has credentials configured");
            return Err(OrchestratorError::NoProviderConfigured);
        }

        let mut failures = Vec::with_capacity(available.len());

        for provider in available {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            debug!(
                provider = provider.name(),
                priority = provider.priority(),
                schema = schema.name(),
                "Trying provider"
            );

            let client = provider.client();
            let outcome = provider
                .retry()
                .run(cancel, || client.submit(prompt, schema))
                .await;

            match outcome {
                AttemptOutcome::Success(value) => {
                    info!(provider = provider.name(), "Provider answered");
                    return Ok(value);
                }
                AttemptOutcome::TransientFailure(reason)
                | AttemptOutcome::TerminalFailure(reason) => {
                    if cancel.is_cancelled() {
                        return Err(OrchestratorError::Cancelled);
                    }
                    warn!(
                        provider = provider.name(),
                        reason = %reason,
                        "Provider failed, falling through"
                    );
                    failures.push(ProviderFailure {
                        provider: provider.name().to_string(),
                        reason,
                    });
                }
            }
        }

        Err(OrchestratorError::AllProvidersExhausted { failures })
    }
}
