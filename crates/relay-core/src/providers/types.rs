//! Provider-agnostic types for structured answers

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::retry::RetryPolicy;
use crate::schema::ResultSchema;

/// Transport family a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Direct request/response messages endpoint
    Anthropic,
    /// Chat-completion endpoint, content under `choices[0].message`
    OpenAi,
    /// Generative-text endpoint returning candidate parts
    Google,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAi => write!(f, "openai"),
            Self::Google => write!(f, "google"),
        }
    }
}

/// Trait that every structured-answer provider implements
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Human-readable provider name (e.g. "anthropic", "openai")
    fn provider_name(&self) -> &str;

    /// Model identifier sent upstream
    fn model(&self) -> &str;

    /// Whether credentials/configuration are present
    fn is_configured(&self) -> bool;

    /// Send the prompt with the schema instruction and return the parsed answer
    async fn submit(&self, prompt: &str, schema: &ResultSchema) -> Result<Value, ProviderError>;
}

/// A provider as the router sees it: name, rank, retry budget and client.
///
/// Built once at startup; availability is resolved at construction and never
/// changes afterwards.
#[derive(Clone)]
pub struct ProviderDescriptor {
    name: String,
    priority: u32,
    retry: RetryPolicy,
    available: bool,
    client: Arc<dyn ProviderClient>,
}

impl ProviderDescriptor {
    pub fn new(
        name: impl Into<String>,
        priority: u32,
        retry: RetryPolicy,
        client: Arc<dyn ProviderClient>,
    ) -> Self {
        let available = client.is_configured();
        Self {
            name: name.into(),
            priority,
            retry,
            available,
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn client(&self) -> &Arc<dyn ProviderClient> {
        &self.client
    }
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("retry", &self.retry)
            .field("available", &self.available)
            .field("model", &self.client.model())
            .finish()
    }
}

/// Snapshot of a descriptor for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub provider: String,
    pub model: String,
    pub priority: u32,
    pub available: bool,
}

impl From<&ProviderDescriptor> for ProviderStatus {
    fn from(d: &ProviderDescriptor) -> Self {
        Self {
            name: d.name.clone(),
            provider: d.client.provider_name().to_string(),
            model: d.client.model().to_string(),
            priority: d.priority,
            available: d.available,
        }
    }
}
