//! Backend connection config
//!
//! Shape of the JSON config artifact:
//! `{"provider": "...", "config": {"model": "...", "api_key": "...", "api_base": "..."}}`

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::backend::{ChatBackend, EchoBackend, OpenAiChatBackend};
use crate::error::{ModelOpsError, Result};

/// Providers served by [`OpenAiChatBackend`]
pub const HTTP_PROVIDERS: &[&str] = &["openai_chat_completion_client", "openai", "litellm"];

/// Provider served by [`EchoBackend`]
pub const ECHO_PROVIDER: &str = "echo";

/// Client section of a model config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Model identifier sent to the backend
    pub model: String,
    /// API key, or a `${ENV_VAR}` placeholder
    #[serde(default)]
    pub api_key: String,
    /// Base endpoint URL
    #[serde(default)]
    pub api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

/// Model config artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub config: ClientConfig,
}

impl ModelConfig {
    /// Config for the local echo backend
    pub fn echo(model: impl Into<String>) -> Self {
        Self {
            provider: ECHO_PROVIDER.to_string(),
            config: ClientConfig {
                model: model.into(),
                api_key: String::new(),
                api_base: String::new(),
                temperature: None,
                max_tokens: None,
            },
        }
    }

    /// Config for an OpenAI-compatible endpoint
    pub fn openai(
        model: impl Into<String>,
        api_key: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            provider: "openai".to_string(),
            config: ClientConfig {
                model: model.into(),
                api_key: api_key.into(),
                api_base: api_base.into(),
                temperature: None,
                max_tokens: None,
            },
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| ModelOpsError::ConfigError(format!("Invalid model config: {}", e)))
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Read a config artifact from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ModelOpsError::ConfigError(format!(
                "Configuration file '{}' not found",
                path.display()
            )));
        }
        let text = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        Self::from_value(&value)
    }

    /// API key with any `${VAR}` placeholder resolved from the environment
    pub fn resolve_api_key(&self) -> Result<String> {
        resolve_placeholder(&self.config.api_key)
    }

    /// Build the backend handle
    pub fn build_backend(&self, timeout: Duration) -> Result<Arc<dyn ChatBackend>> {
        let provider = self.provider.as_str();
        if provider == ECHO_PROVIDER {
            return Ok(Arc::new(EchoBackend));
        }
        if !HTTP_PROVIDERS.contains(&provider) {
            return Err(ModelOpsError::ConfigError(format!(
                "Unknown provider: {}",
                provider
            )));
        }
        if self.config.api_base.is_empty() {
            return Err(ModelOpsError::ConfigError(
                "config.api_base is required for HTTP providers".to_string(),
            ));
        }

        let api_key = self.resolve_api_key()?;
        let backend =
            OpenAiChatBackend::new(&self.config.model, api_key, &self.config.api_base, timeout)
                .map_err(|e| ModelOpsError::ConfigError(e.to_string()))?;
        Ok(Arc::new(backend))
    }
}

/// Resolve a `${VAR}` placeholder; other strings pass through
pub fn resolve_placeholder(raw: &str) -> Result<String> {
    let Some(name) = raw.strip_prefix("${").and_then(|r| r.strip_suffix('}')) else {
        return Ok(raw.to_string());
    };
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ModelOpsError::MissingCredential(name.to_string())),
    }
}
