//! HTTP plumbing shared by the provider transports

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use crate::error::ProviderError;

const ERROR_BODY_LIMIT: usize = 300;

/// Build a client with a per-request timeout
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Map a non-success status to a classified error.
///
/// 400 and 422 mean the request itself is malformed and are terminal unless
/// the body says the caller is being rate limited. Every other status
/// (5xx, 408, 429, auth failures) is transient.
pub fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let snippet = truncate(body, ERROR_BODY_LIMIT);
    match status.as_u16() {
        400 | 422 if !mentions_rate_limit(body) => {
            ProviderError::terminal(format!("HTTP {status} (malformed request): {snippet}"))
        }
        429 => ProviderError::transient(format!("HTTP {status} (rate limited): {snippet}")),
        _ => ProviderError::transient(format!("HTTP {status}: {snippet}")),
    }
}

/// Read the body of a response, classifying non-success statuses.
///
/// `policy_check` lets a transport turn provider-specific content-policy
/// bodies on 4xx responses into terminal failures before generic
/// classification.
pub async fn read_body(
    response: Response,
    provider: &str,
    policy_check: fn(&str) -> Option<String>,
) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::transient(format!("failed to read response body: {e}")))?;

    if status.is_success() {
        debug!(provider, status = %status, body_len = body.len(), "Provider response");
        return Ok(body);
    }

    // Server errors stay transient whatever their body says
    if status.is_client_error() {
        if let Some(reason) = policy_check(&body) {
            return Err(ProviderError::terminal(format!(
                "content policy rejection: {reason}"
            )));
        }
    }
    Err(classify_status(status, &body))
}

/// Decode a success envelope; an undecodable envelope is terminal
pub fn decode_envelope<T: serde::de::DeserializeOwned>(
    body: &str,
    provider: &str,
) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| {
        ProviderError::terminal(format!(
            "malformed {provider} response: {e} - body: {}",
            truncate(body, ERROR_BODY_LIMIT)
        ))
    })
}

fn mentions_rate_limit(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("rate_limit")
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
