//! Prediction-style image generation backend
//!
//! Speaks the common "predictions" shape: create with
//! `POST /models/{model}/predictions`, then poll `GET /predictions/{id}`.
//! An abandoned prediction is stopped with `POST /predictions/{id}/cancel`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::backend::TaskBackend;
use super::protocol::PollReport;
use crate::error::ProviderError;
use crate::providers::http::{decode_envelope, read_body};

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";
pub const DEFAULT_MODEL: &str = "black-forest-labs/flux-schnell";

/// HTTP client for a prediction API
pub struct PredictionBackend {
    http: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for PredictionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionBackend")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct CreatePrediction<'a> {
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
}

/// Prediction status as reported upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Prediction {
    fn locators(&self) -> Vec<String> {
        match &self.output {
            Some(Value::String(url)) => vec![url.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn error_reason(&self) -> String {
        match &self.error {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Null) | None => "provider reported failure".to_string(),
            Some(other) => other.to_string(),
        }
    }

    fn report(&self) -> PollReport {
        match self.status {
            PredictionStatus::Starting | PredictionStatus::Processing => PollReport::Pending,
            PredictionStatus::Succeeded => PollReport::Succeeded(self.locators()),
            PredictionStatus::Failed => PollReport::Failed(self.error_reason()),
            PredictionStatus::Canceled => PollReport::Failed("canceled".to_string()),
        }
    }
}

fn no_policy_check(_body: &str) -> Option<String> {
    None
}

impl PredictionBackend {
    pub fn new(
        http: Client,
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::terminal("prediction API token not configured"))
    }
}

#[async_trait]
impl TaskBackend for PredictionBackend {
    fn backend_name(&self) -> &str {
        "prediction"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn create_task(&self, prompt: &str) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;
        let url = format!("{}/models/{}/predictions", self.base_url, self.model);
        debug!(url = %url, prompt_len = prompt.len(), "Creating prediction");

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&CreatePrediction {
                input: PredictionInput { prompt },
            })
            .send()
            .await?;

        let body = read_body(response, "prediction", no_policy_check).await?;
        let prediction: Prediction = decode_envelope(&body, "prediction")?;

        info!(task_id = %prediction.id, model = %self.model, "Prediction created");
        Ok(prediction.id)
    }

    async fn task_status(&self, task_id: &str) -> Result<PollReport, ProviderError> {
        let api_key = self.api_key()?;
        let url = format!("{}/predictions/{}", self.base_url, task_id);

        let response = self.http.get(&url).bearer_auth(api_key).send().await?;
        let body = read_body(response, "prediction", no_policy_check).await?;
        let prediction: Prediction = decode_envelope(&body, "prediction")?;

        debug!(task_id, status = ?prediction.status, "Prediction status");
        Ok(prediction.report())
    }

    async fn cancel_task(&self, task_id: &str) -> Result<(), ProviderError> {
        let api_key = self.api_key()?;
        let url = format!("{}/predictions/{}/cancel", self.base_url, task_id);

        let response = self.http.post(&url).bearer_auth(api_key).send().await?;
        read_body(response, "prediction", no_policy_check).await?;

        info!(task_id, "Prediction cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn backend(base_url: &str) -> PredictionBackend {
        PredictionBackend::new(
            Client::new(),
            Some("r8-test".to_string()),
            DEFAULT_MODEL,
            base_url,
        )
    }

    fn prediction(value: Value) -> Prediction {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_report_mapping() {
        assert_eq!(
            prediction(json!({"id": "p", "status": "starting"})).report(),
            PollReport::Pending
        );
        assert_eq!(
            prediction(json!({"id": "p", "status": "processing"})).report(),
            PollReport::Pending
        );
        assert_eq!(
            prediction(json!({"id": "p", "status": "succeeded", "output": "https://x/1.png"})).report(),
            PollReport::Succeeded(vec!["https://x/1.png".to_string()])
        );
        assert_eq!(
            prediction(json!({"id": "p", "status": "succeeded", "output": ["https://x/1.png", 3, "https://x/2.png"]})).report(),
            PollReport::Succeeded(vec!["https://x/1.png".to_string(), "https://x/2.png".to_string()])
        );
        assert_eq!(
            prediction(json!({"id": "p", "status": "failed", "error": "NSFW content detected"})).report(),
            PollReport::Failed("NSFW content detected".to_string())
        );
        assert_eq!(
            prediction(json!({"id": "p", "status": "failed", "error": null})).report(),
            PollReport::Failed("provider reported failure".to_string())
        );
        assert_eq!(
            prediction(json!({"id": "p", "status": "canceled"})).report(),
            PollReport::Failed("canceled".to_string())
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", backend("http://localhost"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("r8-test"));
    }

    #[tokio::test]
    async fn test_create_task() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", format!("/models/{DEFAULT_MODEL}/predictions").as_str())
            .match_header("authorization", "Bearer r8-test")
            .match_body(Matcher::Json(json!({"input": {"prompt": "a lighthouse"}})))
            .with_status(201)
            .with_body(r#"{"id":"abc123","status":"starting"}"#)
            .create_async()
            .await;

        let id = backend(&server.url())
            .create_task("a lighthouse")
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(id, "abc123");
    }

    #[tokio::test]
    async fn test_create_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", format!("/models/{DEFAULT_MODEL}/predictions").as_str())
            .with_status(422)
            .with_body(r#"{"detail":"prompt is required"}"#)
            .create_async()
            .await;

        let err = backend(&server.url()).create_task("").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_task_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/predictions/abc123")
            .match_header("authorization", "Bearer r8-test")
            .with_status(200)
            .with_body(r#"{"id":"abc123","status":"succeeded","output":["https://cdn/out.webp"]}"#)
            .create_async()
            .await;

        let report = backend(&server.url()).task_status("abc123").await.unwrap();
        assert_eq!(
            report,
            PollReport::Succeeded(vec!["https://cdn/out.webp".to_string()])
        );
    }

    #[tokio::test]
    async fn test_cancel_task() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/predictions/abc123/cancel")
            .match_header("authorization", "Bearer r8-test")
            .with_status(200)
            .with_body(r#"{"id":"abc123","status":"canceled"}"#)
            .expect(1)
            .create_async()
            .await;

        backend(&server.url()).cancel_task("abc123").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_task_server_error_is_transient() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/predictions/abc123/cancel")
            .with_status(503)
            .create_async()
            .await;

        let err = backend(&server.url()).cancel_task("abc123").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unconfigured_rejects_without_request() {
        let backend = PredictionBackend::new(Client::new(), None, DEFAULT_MODEL, "http://127.0.0.1:1");
        assert!(!backend.is_configured());
        let err = backend.create_task("x").await.unwrap_err();
        assert!(!err.is_transient());
    }
}
