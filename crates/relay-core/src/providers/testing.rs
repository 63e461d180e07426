//! Scripted in-process providers for unit tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::types::ProviderClient;
use crate::error::ProviderError;
use crate::schema::ResultSchema;

/// Replays a fixed list of results, one per `submit`. Once the script is
/// exhausted every further call fails transiently.
pub struct ScriptedProvider {
    name: String,
    configured: bool,
    script: Mutex<VecDeque<Result<Value, ProviderError>>>,
    calls: Arc<AtomicU32>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Vec<Result<Value, ProviderError>>) -> Self {
        Self {
            name: name.to_string(),
            configured: true,
            script: Mutex::new(script.into()),
            calls: Arc::new(AtomicU32::new(0)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured(name: &str) -> Self {
        Self {
            configured: false,
            ..Self::new(name, vec![])
        }
    }

    /// Shared call counter, readable after the provider moves into an `Arc`
    pub fn call_counter(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn submit(&self, prompt: &str, _schema: &ResultSchema) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::transient("script exhausted")))
    }
}

/// Accepts every `submit` and never answers
pub struct HangingProvider {
    name: String,
    calls: Arc<AtomicU32>,
}

impl HangingProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }
}

#[async_trait]
impl ProviderClient for HangingProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "hanging"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn submit(&self, _prompt: &str, _schema: &ResultSchema) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}
