//! Anthropic Messages API: direct-endpoint transport

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

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic `/v1/messages` endpoint
pub struct AnthropicClient {
    http: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
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
    // Anthropic reports policy blocks as invalid_request_error with this wording
    let lower = body.to_ascii_lowercase();
    (lower.contains("usage policy") || lower.contains("content policy"))
        .then(|| "request violates usage policy".to_string())
}

fn response_text(response: MessagesResponse) -> Result<String, ProviderError> {
    if response.stop_reason.as_deref() == Some("refusal") {
        return Err(ProviderError::terminal("content policy rejection: refusal"));
    }

    let text = response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::terminal("empty content"));
    }
    Ok(text)
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn submit(&self, prompt: &str, schema: &ResultSchema) -> Result<Value, ProviderError> {
        let Some(api_key) = &self.api_key else {
            return Err(ProviderError::terminal("anthropic API key not configured"));
        };

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: schema.instruction(),
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(
            model = %self.model,
            schema = schema.name(),
            prompt_len = prompt.len(),
            "Anthropic messages request"
        );

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let body = read_body(response, "anthropic", policy_rejection).await?;
        let envelope: MessagesResponse = decode_envelope(&body, "anthropic")?;
        let text = response_text(envelope)?;
        Ok(extract(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaField, SchemaNode};
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn schema() -> ResultSchema {
        ResultSchema::new(
            "verdict",
            SchemaNode::object(vec![SchemaField::required("ok", SchemaNode::Boolean)]),
        )
    }

    fn client(base_url: &str, key: Option<&str>) -> AnthropicClient {
        AnthropicClient::new(
            Client::new(),
            key.map(str::to_string),
            DEFAULT_MODEL,
            base_url,
            1024,
        )
    }

    #[test]
    fn test_blank_key_is_unconfigured() {
        assert!(!client(DEFAULT_BASE_URL, Some("  ")).is_configured());
        assert!(!client(DEFAULT_BASE_URL, None).is_configured());
        assert!(client(DEFAULT_BASE_URL, Some("sk-ant")).is_configured());
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", client(DEFAULT_BASE_URL, Some("sk-secret")));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_request_serialization() {
        let request = MessagesRequest {
            model: "m",
            max_tokens: 10,
            system: "sys".to_string(),
            messages: vec![RequestMessage {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["system"], "sys");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[tokio::test]
    async fn test_submit_success_with_fenced_text() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-test")
            .match_header("anthropic-version", API_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "model": DEFAULT_MODEL,
                "messages": [{"role": "user", "content": "judge this"}]
            })))
            .with_status(200)
            .with_body(
                r#"{"content":[{"type":"text","text":"```json\n{\"ok\": true}\n```"}],"stop_reason":"end_turn"}"#,
            )
            .create_async()
            .await;

        let result = client(&server.url(), Some("sk-test"))
            .submit("judge this", &schema())
            .await;

        mock.assert_async().await;
        assert_eq!(result.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(500)
            .with_body("overloaded")
            .create_async()
            .await;

        let err = client(&server.url(), Some("sk-test"))
            .submit("p", &schema())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.reason().contains("500"));
    }

    #[tokio::test]
    async fn test_empty_content_is_terminal() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(r#"{"content":[],"stop_reason":"end_turn"}"#)
            .create_async()
            .await;

        let err = client(&server.url(), Some("sk-test"))
            .submit("p", &schema())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Terminal("empty content".to_string()));
    }

    #[tokio::test]
    async fn test_refusal_is_terminal() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(r#"{"content":[{"type":"text","text":"I can't help"}],"stop_reason":"refusal"}"#)
            .create_async()
            .await;

        let err = client(&server.url(), Some("sk-test"))
            .submit("p", &schema())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(err.reason().contains("content policy"));
    }

    #[tokio::test]
    async fn test_unparseable_text_is_terminal() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(r#"{"content":[{"type":"text","text":"Sure! Here you go."}]}"#)
            .create_async()
            .await;

        let err = client(&server.url(), Some("sk-test"))
            .submit("p", &schema())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(err.reason().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let err = client("http://127.0.0.1:1", None)
            .submit("p", &schema())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let err = client("http://127.0.0.1:1", Some("sk-test"))
            .submit("p", &schema())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
