//! Settings and job configuration files
//!
//! Job configs are JSON documents. Several files and an inline string can be
//! given; they are deep-merged in order, objects recursively and every other
//! value by replacement.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ModelOpsError, Result};

pub const DEFAULT_TRACKING_URI: &str = "./mlruns";
pub const DEFAULT_REGISTRY_NAME: &str = "autogen_team";
pub const DEFAULT_EXPERIMENT_NAME: &str = "autogen_team";

/// Process-wide settings, read once from the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Root directory of the tracking store
    pub tracking_uri: PathBuf,
    /// Registered model name used by jobs
    pub registry_name: String,
    /// Experiment runs are grouped under
    pub experiment_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tracking_uri: PathBuf::from(DEFAULT_TRACKING_URI),
            registry_name: DEFAULT_REGISTRY_NAME.to_string(),
            experiment_name: DEFAULT_EXPERIMENT_NAME.to_string(),
        }
    }
}

impl Settings {
    /// Read `TRACKING_URI`, `REGISTRY_NAME` and `EXPERIMENT_NAME`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tracking_uri: env_or("TRACKING_URI")
                .map(PathBuf::from)
                .unwrap_or(defaults.tracking_uri),
            registry_name: env_or("REGISTRY_NAME").unwrap_or(defaults.registry_name),
            experiment_name: env_or("EXPERIMENT_NAME").unwrap_or(defaults.experiment_name),
        }
    }

    pub fn with_tracking_uri(mut self, uri: impl Into<PathBuf>) -> Self {
        self.tracking_uri = uri.into();
        self
    }

    pub fn with_registry_name(mut self, name: impl Into<String>) -> Self {
        self.registry_name = name.into();
        self
    }

    pub fn with_experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = name.into();
        self
    }

    /// Apply a partial override object on top of these settings
    pub fn merged(&self, overrides: Option<&Value>) -> Result<Self> {
        let Some(overrides) = overrides else {
            return Ok(self.clone());
        };
        let merged = merge_configs([serde_json::to_value(self)?, overrides.clone()]);
        serde_json::from_value(merged)
            .map_err(|e| ModelOpsError::ConfigError(format!("Invalid tracking settings: {}", e)))
    }
}

fn env_or(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse one JSON config file
pub fn parse_file(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        ModelOpsError::ConfigError(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    debug!(path = %path.display(), "Parsed config file");
    serde_json::from_str(&text).map_err(|e| {
        ModelOpsError::ConfigError(format!("Invalid JSON in {}: {}", path.display(), e))
    })
}

/// Parse an inline JSON config
pub fn parse_string(text: &str) -> Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| ModelOpsError::ConfigError(format!("Invalid inline config: {}", e)))
}

/// Deep-merge configs left to right
pub fn merge_configs(configs: impl IntoIterator<Item = Value>) -> Value {
    configs
        .into_iter()
        .fold(Value::Object(Default::default()), |mut acc, next| {
            merge_into(&mut acc, next);
            acc
        })
}

fn merge_into(base: &mut Value, next: Value) {
    match (base, next) {
        (Value::Object(base), Value::Object(next)) => {
            for (key, value) in next {
                match base.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, next) => *base = next,
    }
}

/// Deserialize a merged config into a typed record
pub fn to_object<T: DeserializeOwned>(config: Value) -> Result<T> {
    serde_json::from_value(config)
        .map_err(|e| ModelOpsError::ConfigError(format!("Invalid config: {}", e)))
}

/// Load and merge config files plus an optional inline JSON string
pub fn load_configs(files: &[PathBuf], inline: Option<&str>) -> Result<Value> {
    let mut configs = files.iter().map(parse_file).collect::<Result<Vec<_>>>()?;
    if let Some(text) = inline {
        configs.push(parse_string(text)?);
    }
    if configs.is_empty() {
        return Err(ModelOpsError::ConfigError(
            "At least one config file or inline config is required".to_string(),
        ));
    }
    Ok(merge_configs(configs))
}
