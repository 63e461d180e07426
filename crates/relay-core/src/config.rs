//! Startup configuration
//!
//! Loaded once from TOML. Credentials are never written in the file by
//! default: each provider names the environment variable holding its key, and
//! presence of that key decides the provider's availability.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::providers::{
    AnthropicClient, GoogleClient, OpenAiClient, ProviderClient, ProviderDescriptor, ProviderKind,
    ProviderRouter, anthropic, google, http::build_http_client, openai,
};
use crate::retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use crate::sanitize::{ContentSanitizer, SanitizationRule, SanitizationRuleSet};
use crate::tasks::{AsyncTaskPoller, PollerConfig, PredictionBackend, prediction};

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            artifacts: ArtifactConfig::default(),
            sanitizer: SanitizerConfig::default(),
        }
    }
}

/// One structured-answer provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding the API key; defaults per kind
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Inline key; takes precedence over `api_key_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Linear backoff base; defaults per kind when absent
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Out-of-band artifact (image) generation backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_base_url")]
    pub base_url: String,
    #[serde(default = "default_artifact_model")]
    pub model: String,
    #[serde(default = "default_artifact_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_budget")]
    pub poll_budget: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            base_url: default_artifact_base_url(),
            model: default_artifact_model(),
            api_key_env: default_artifact_key_env(),
            api_key: None,
            poll_interval_ms: default_poll_interval_ms(),
            poll_budget: default_poll_budget(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Sanitizer rules applied to user-authored text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizerConfig {
    #[serde(default = "default_true")]
    pub use_default_rules: bool,
    /// Extra rules, applied after the built-in ones
    #[serde(default)]
    pub rules: Vec<SanitizationRule>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            use_default_rules: true,
            rules: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_artifact_base_url() -> String {
    prediction::DEFAULT_BASE_URL.to_string()
}
fn default_artifact_model() -> String {
    prediction::DEFAULT_MODEL.to_string()
}
fn default_artifact_key_env() -> Option<String> {
    Some("REPLICATE_API_TOKEN".to_string())
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_poll_budget() -> u32 {
    15
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::stock("claude", ProviderKind::Anthropic, 0),
        ProviderConfig::stock("gpt", ProviderKind::OpenAi, 1),
        ProviderConfig::stock("gemini", ProviderKind::Google, 2),
    ]
}

impl ProviderConfig {
    /// A provider with every field at its default for `kind`
    pub fn stock(name: &str, kind: ProviderKind, priority: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            priority,
            model: None,
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(match self.kind {
            ProviderKind::Anthropic => anthropic::DEFAULT_MODEL,
            ProviderKind::OpenAi => openai::DEFAULT_MODEL,
            ProviderKind::Google => google::DEFAULT_MODEL,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(match self.kind {
            ProviderKind::Anthropic => anthropic::DEFAULT_BASE_URL,
            ProviderKind::OpenAi => openai::DEFAULT_BASE_URL,
            ProviderKind::Google => google::DEFAULT_BASE_URL,
        })
    }

    /// The direct endpoint backs off 2s per attempt; the SDK-style transports
    /// retry immediately.
    pub fn base_delay(&self) -> Duration {
        let ms = self.base_delay_ms.unwrap_or(match self.kind {
            ProviderKind::Anthropic => 2000,
            ProviderKind::OpenAi | ProviderKind::Google => 0,
        });
        Duration::from_millis(ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_delay())
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| default_key_env(self.kind))
    }

    /// Resolve the API key through `lookup` (normally the process environment)
    pub fn resolve_api_key(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        resolve_key(self.api_key.as_deref(), Some(self.api_key_env()), lookup)
    }

    /// Build the client and descriptor. Availability is fixed here.
    pub fn build_descriptor(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ProviderDescriptor> {
        let http = build_http_client(Duration::from_secs(self.timeout_secs))?;
        let api_key = self.resolve_api_key(lookup);
        if api_key.is_none() {
            debug!(provider = %self.name, "No credentials, provider unavailable");
        }

        let client: Arc<dyn ProviderClient> = match self.kind {
            ProviderKind::Anthropic => Arc::new(AnthropicClient::new(
                http,
                api_key,
                self.model(),
                self.base_url(),
                self.max_tokens,
            )),
            ProviderKind::OpenAi => Arc::new(OpenAiClient::new(
                http,
                api_key,
                self.model(),
                self.base_url(),
                self.max_tokens,
            )),
            ProviderKind::Google => Arc::new(GoogleClient::new(
                http,
                api_key,
                self.model(),
                self.base_url(),
                self.max_tokens,
            )),
        };

        Ok(ProviderDescriptor::new(
            self.name.clone(),
            self.priority,
            self.retry_policy(),
            client,
        ))
    }
}

fn default_key_env(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        ProviderKind::OpenAi => "OPENAI_API_KEY",
        ProviderKind::Google => "GOOGLE_AI_API_KEY",
    }
}

fn resolve_key(
    inline: Option<&str>,
    env_name: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    inline
        .map(str::to_string)
        .or_else(|| env_name.and_then(&lookup))
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

impl ArtifactConfig {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_budget: self.poll_budget,
        }
    }

    pub fn build_poller(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<AsyncTaskPoller> {
        let http = build_http_client(Duration::from_secs(self.timeout_secs))?;
        let api_key = resolve_key(self.api_key.as_deref(), self.api_key_env.as_deref(), lookup);
        let backend = PredictionBackend::new(http, api_key, self.model.clone(), self.base_url.clone());
        Ok(AsyncTaskPoller::new(Arc::new(backend), self.poller_config()))
    }
}

impl SanitizerConfig {
    pub fn build(&self) -> Result<ContentSanitizer> {
        let mut rules = if self.use_default_rules {
            SanitizationRuleSet::default_rules()
        } else {
            Vec::new()
        };
        rules.extend(self.rules.iter().cloned());

        let rule_set = SanitizationRuleSet::new(rules).context("Invalid sanitizer rule")?;
        rule_set
            .ensure_closed()
            .context("Sanitizer rules are not idempotent")?;
        Ok(ContentSanitizer::new(rule_set))
    }
}

impl RelayConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse relay config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                bail!("Provider name must not be empty");
            }
            if !names.insert(provider.name.as_str()) {
                bail!("Duplicate provider name '{}'", provider.name);
            }
            if provider.max_attempts == 0 {
                bail!("Provider '{}': max_attempts must be at least 1", provider.name);
            }
            url::Url::parse(provider.base_url())
                .with_context(|| format!("Provider '{}': invalid base_url", provider.name))?;
        }

        if self.artifacts.poll_budget == 0 {
            bail!("artifacts.poll_budget must be at least 1");
        }
        url::Url::parse(&self.artifacts.base_url).context("artifacts: invalid base_url")?;

        self.sanitizer.build()?;
        Ok(())
    }
}
