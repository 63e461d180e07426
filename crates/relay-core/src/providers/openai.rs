//! OpenAI-style chat completions: chat-completion transport
//!
//! Works against OpenAI and any endpoint that speaks the same
//! `/v1/chat/completions` shape.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::http::{decode_envelope, read_body};
use super::types::ProviderClient;
use crate::error::ProviderError;
use crate::extract::extract;
use crate::schema::{ResultSchema, SchemaNode};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Client for chat-completion endpoints
pub struct OpenAiClient {
    http: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// JSON mode only guarantees an object, so it is requested only when the
/// schema's root is one. Arrays and scalars rely on the instruction alone.
fn response_format(schema: &ResultSchema) -> Option<ResponseFormat> {
    matches!(schema.root(), SchemaNode::Object { .. }).then_some(ResponseFormat {
        kind: "json_object",
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<AssistantMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        http: Client,
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_tokens,
        }
    }
}

fn policy_rejection(body: &str) -> Option<String> {
    let error: Value = serde_json::from_str(body).ok()?;
    let code = error.pointer("/error/code").and_then(Value::as_str)?;
    matches!(code, "content_policy_violation" | "content_filter").then(|| code.to_string())
}

fn response_text(response: ChatResponse) -> Result<String, ProviderError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(ProviderError::terminal("empty content"));
    };

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(ProviderError::terminal(
            "content policy rejection: content_filter",
        ));
    }

    let message = choice.message.ok_or_else(|| ProviderError::terminal("empty content"))?;
    if let Some(refusal) = message.refusal.filter(|r| !r.is_empty()) {
        return Err(ProviderError::terminal(format!(
            "content policy rejection: {refusal}"
        )));
    }

    match message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ProviderError::terminal("empty content")),
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn submit(&self, prompt: &str, schema: &ResultSchema) -> Result<Value, ProviderError> {
        let Some(api_key) = &self.api_key else {
            return Err(ProviderError::terminal("openai API key not configured"));
        };

        let instruction = schema.instruction();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &instruction,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            response_format: response_format(schema),
        };

        debug!(
            model = %self.model,
            schema = schema.name(),
            prompt_len = prompt.len(),
            "Chat completion request"
        );

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let body = read_body(response, "openai", policy_rejection).await?;
        let envelope: ChatResponse = decode_envelope(&body, "openai")?;
        let text = response_text(envelope)?;
        Ok(extract(&text)?)
    }
}
