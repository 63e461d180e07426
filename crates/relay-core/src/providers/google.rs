//! Google Gemini `generateContent`: generative-text transport

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::http::{decode_envelope, read_body};
use super::types::ProviderClient;
use crate::error::ProviderError;
use crate::extract::extract;
use crate::schema::ResultSchema;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Client for the Gemini generative-text API
pub struct GoogleClient {
    http: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl std::fmt::Debug for GoogleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleClient")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GoogleClient {
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

/// Non-2xx body; only a parsed block reason counts as a policy rejection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

fn policy_rejection(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let reason = parsed.prompt_feedback?.block_reason?;
    Some(format!("prompt blocked ({reason})"))
}

fn response_text(response: GenerateResponse) -> Result<String, ProviderError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::terminal(format!(
            "content policy rejection: prompt blocked ({reason})"
        )));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ProviderError::terminal("empty content"));
    };

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(ProviderError::terminal(
            "content policy rejection: candidate blocked (SAFETY)",
        ));
    }

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(ProviderError::terminal("empty content"));
    }
    Ok(text)
}

#[async_trait]
impl ProviderClient for GoogleClient {
    fn provider_name(&self) -> &str {
        "google"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn submit(&self, prompt: &str, schema: &ResultSchema) -> Result<Value, ProviderError> {
        let Some(api_key) = &self.api_key else {
            return Err(ProviderError::terminal("google API key not configured"));
        };

        let instruction = schema.instruction();
        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![RequestPart { text: &instruction }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                max_output_tokens: self.max_tokens,
            },
        };

        // The key travels in the query string, so the URL is never logged
        debug!(
            model = %self.model,
            schema = schema.name(),
            prompt_len = prompt.len(),
            "Gemini generateContent request"
        );

        let response = self
            .http
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transient(format!("request failed: {}", e.without_url())))?;

        let body = read_body(response, "google", policy_rejection).await?;
        let envelope: GenerateResponse = decode_envelope(&body, "google")?;
        let text = response_text(envelope)?;
        Ok(extract(&text)?)
    }
}
