//! Chat backends
//!
//! A backend answers one prompt per call. The HTTP backend speaks the
//! OpenAI-compatible `/chat/completions` protocol; the echo backend answers
//! locally and is used for dry runs.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Failure of a single backend call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("backend returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),
}

/// One prompt plus sampling options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u64>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A message returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub text: String,
}

/// Backend answer to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub messages: Vec<ChatMessage>,
    /// Present when the backend signaled completion
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// Text of all messages, newline separated
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Capability to complete a prompt
pub trait ChatBackend: Send + Sync + fmt::Debug {
    /// Provider name, for logs
    fn provider(&self) -> &str;

    /// Blocking round trip for one prompt
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError>;
}

/// OpenAI-compatible HTTP backend
pub struct OpenAiChatBackend {
    client: reqwest::blocking::Client,
    model: String,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl OpenAiChatBackend {
    /// Build a client with a per-request timeout
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_error(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout.as_secs())
        } else {
            BackendError::Http(err.to_string())
        }
    }

    fn parse(body: &Value) -> Result<ChatResponse, BackendError> {
        let choices = body
            .get("choices")
            .and_then(Value::as_array)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| BackendError::Decode("response has no choices".to_string()))?;

        let mut messages = Vec::with_capacity(choices.len());
        let mut finish_reason = None;
        for choice in choices {
            let message = choice
                .get("message")
                .ok_or_else(|| BackendError::Decode("choice has no message".to_string()))?;
            messages.push(ChatMessage {
                role: message
                    .get("role")
                    .and_then(Value::as_str)
                    .unwrap_or("assistant")
                    .to_string(),
                text: message
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
            if finish_reason.is_none() {
                finish_reason = choice
                    .get("finish_reason")
                    .and_then(Value::as_str)
                    .map(String::from);
            }
        }

        Ok(ChatResponse {
            messages,
            finish_reason,
        })
    }
}

impl fmt::Debug for OpenAiChatBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiChatBackend")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ChatBackend for OpenAiChatBackend {
    fn provider(&self) -> &str {
        "openai"
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().map_err(|e| self.map_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().map_err(|e| {
            if e.is_timeout() {
                self.map_error(e)
            } else {
                BackendError::Decode(e.to_string())
            }
        })?;
        Self::parse(&body)
    }
}

/// Local backend answering with the prompt itself
#[derive(Debug, Clone, Default)]
pub struct EchoBackend;

impl ChatBackend for EchoBackend {
    fn provider(&self) -> &str {
        "echo"
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        Ok(ChatResponse {
            messages: vec![ChatMessage {
                role: "assistant".to_string(),
                text: request.prompt.clone(),
            }],
            finish_reason: Some("stop".to_string()),
        })
    }
}
