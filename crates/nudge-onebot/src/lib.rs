//! OneBot v11 HTTP action client.
//!
//! Posts each action as JSON to `{api_base}/{action}` and unwraps the standard
//! `{status, retcode, data}` envelope. Requests are never retried: pokes and
//! likes are not idempotent.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use nudge_reciprocity::{OneBotApi, OneBotApiError};

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Clone)]
pub struct OneBotHttpClient {
    http: reqwest::Client,
    api_base: String,
    access_token: Option<String>,
}

impl OneBotHttpClient {
    pub fn new(
        api_base: &str,
        access_token: Option<String>,
        request_timeout_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("nudge-onebot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create onebot http client")?;
        Ok(Self {
            http,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            access_token: access_token
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[async_trait]
impl OneBotApi for OneBotHttpClient {
    async fn call_api(&self, action: &str, params: Value) -> Result<Value, OneBotApiError> {
        tracing::debug!(action, params = %params, "calling onebot action");
        let mut request = self
            .http
            .post(format!("{}/{}", self.api_base, action))
            .json(&params);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|error| OneBotApiError::Transport {
                action: action.to_string(),
                message: error.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| OneBotApiError::Transport {
                action: action.to_string(),
                message: error.to_string(),
            })?;
        if !status.is_success() {
            return Err(OneBotApiError::HttpStatus {
                action: action.to_string(),
                status: status.as_u16(),
                body: truncate_for_error(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let parsed = serde_json::from_str::<Value>(&body).map_err(|error| {
            OneBotApiError::InvalidResponse {
                action: action.to_string(),
                message: format!("{error}: {}", truncate_for_error(&body, MAX_ERROR_BODY_CHARS)),
            }
        })?;
        unwrap_onebot_envelope(action, parsed)
    }
}

/// Returns `data` from a OneBot envelope, or the body itself when it is not one.
pub fn unwrap_onebot_envelope(action: &str, mut body: Value) -> Result<Value, OneBotApiError> {
    let is_envelope = body
        .as_object()
        .is_some_and(|map| map.contains_key("status") || map.contains_key("retcode"));
    if !is_envelope {
        return Ok(body);
    }

    let status = body.get("status").and_then(Value::as_str).unwrap_or("ok");
    let retcode = body.get("retcode").and_then(Value::as_i64).unwrap_or(0);
    if status == "failed" || retcode != 0 {
        let message = ["wording", "message", "msg"]
            .iter()
            .filter_map(|field| body.get(*field).and_then(Value::as_str))
            .find(|text| !text.trim().is_empty())
            .unwrap_or("no error message")
            .to_string();
        return Err(OneBotApiError::ActionFailed {
            action: action.to_string(),
            retcode,
            message,
        });
    }

    Ok(body
        .as_object_mut()
        .and_then(|map| map.remove("data"))
        .unwrap_or(Value::Null))
}

fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
