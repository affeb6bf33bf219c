//! Judge client for OpenAI-compatible chat completion APIs.
//!
//! Sends one rendered audit instruction to one model and hands the raw text
//! (with code fences removed) to the verdict normalizer. Every call is timed,
//! whether it succeeds or not.

use crate::audit::SYSTEM_MESSAGE;
use crate::config::{JudgeCredentials, JudgeSettings};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from a single judge call. All are recoverable by the run driver.
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("No response from model {model}")]
    NoResponse { model: String },

    #[error("Empty response content from model {model}")]
    EmptyResponse { model: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP {status} from judge: {body}")]
    Http { status: u16, body: String },
}

/// Successful judge reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeReply {
    /// Reply text with code fences stripped
    pub content: String,
    /// Total tokens reported by the provider (0 when absent)
    pub tokens_used: u64,
}

/// Outcome of one timed judge call
#[derive(Debug)]
pub struct JudgeCall {
    /// Wall-clock span around the request
    pub latency: Duration,
    /// Reply or error
    pub result: Result<JudgeReply, JudgeError>,
}

/// A judge that can audit one instruction with one model
pub trait Judge {
    /// Run one blocking judge request
    fn judge(&self, model_id: &str, instruction: &str) -> JudgeCall;
}

/// How the request asks the provider for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Send `response_format: {"type": "json_object"}`
    ForceJson,
    /// Rely on the instruction text alone
    InstructionOnly,
}

impl ResponseMode {
    /// Pick the response mode from the model naming convention
    #[must_use]
    pub fn for_model(model_id: &str) -> Self {
        if model_id.to_lowercase().starts_with("claude") {
            Self::InstructionOnly
        } else {
            Self::ForceJson
        }
    }
}

/// Blocking HTTP judge against a chat completions endpoint
pub struct HttpJudge {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    temperature: f64,
}

impl HttpJudge {
    /// Create a judge from credentials and settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(credentials: &JudgeCredentials, settings: &JudgeSettings) -> Result<Self, JudgeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| JudgeError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                credentials.base_url.trim_end_matches('/')
            ),
            api_key: credentials.api_key.clone(),
            temperature: settings.temperature,
        })
    }

    /// Chat completions URL requests are sent to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send(&self, model_id: &str, instruction: &str) -> Result<JudgeReply, JudgeError> {
        let body = request_body(model_id, instruction, self.temperature);

        tracing::debug!(url = %self.endpoint, model = model_id, "Sending judge request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| JudgeError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| JudgeError::Transport(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(JudgeError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = serde_json::from_str(&text).map_err(|_| JudgeError::NoResponse {
            model: model_id.to_string(),
        })?;

        parse_completion(&payload, model_id)
    }
}

impl Judge for HttpJudge {
    fn judge(&self, model_id: &str, instruction: &str) -> JudgeCall {
        let start = Instant::now();
        let result = self.send(model_id, instruction);
        let latency = start.elapsed();

        tracing::info!(
            model = model_id,
            latency_secs = latency.as_secs_f64(),
            ok = result.is_ok(),
            "Judge call finished"
        );

        JudgeCall { latency, result }
    }
}

/// Build the chat completion request body for a model
#[must_use]
pub fn request_body(model_id: &str, instruction: &str, temperature: f64) -> Value {
    let mut body = json!({
        "model": model_id,
        "messages": [
            {"role": "system", "content": SYSTEM_MESSAGE},
            {"role": "user", "content": instruction},
        ],
        "temperature": temperature,
    });
    if ResponseMode::for_model(model_id) == ResponseMode::ForceJson {
        body["response_format"] = json!({"type": "json_object"});
    }
    body
}

/// Extract the reply from a chat completion payload
///
/// # Errors
///
/// Returns `NoResponse` when there is no usable choice and `EmptyResponse`
/// when the message content is missing or blank.
pub fn parse_completion(payload: &Value, model_id: &str) -> Result<JudgeReply, JudgeError> {
    let choice = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| JudgeError::NoResponse {
            model: model_id.to_string(),
        })?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(strip_code_fences)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| JudgeError::EmptyResponse {
            model: model_id.to_string(),
        })?;

    let tokens_used = payload
        .get("usage")
        .and_then(|u| u.get("total_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    Ok(JudgeReply {
        content,
        tokens_used,
    })
}

/// Strip one pair of Markdown code fences (with or without a language tag)
#[must_use]
pub fn strip_code_fences(text: &str) -> String {
    let mut content = text.trim();
    if let Some(rest) = content.strip_prefix("```") {
        // Drop the language tag on the opening fence line, if any
        content = match rest.find('\n') {
            Some(newline) if rest[..newline].trim().chars().all(char::is_alphanumeric) => {
                &rest[newline + 1..]
            }
            _ => rest.strip_prefix("json").unwrap_or(rest),
        };
    }
    if let Some(rest) = content.trim_end().strip_suffix("```") {
        content = rest;
    }
    content.trim().to_string()
}
