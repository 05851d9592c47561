//! Model abstraction
//!
//! Every model variant implements [`Model`]. The closed set of variants is
//! [`ModelKind`], serialized with a `KIND` tag. Persisted hyperparameters and
//! the runtime backend handle live in separate structs, so a serialized model
//! never carries a live client and a restored one starts unbound.

pub mod backend;
pub mod baseline;
pub mod config;
pub mod lookup;

pub use backend::{
    BackendError, ChatBackend, ChatMessage, ChatRequest, ChatResponse, EchoBackend,
    OpenAiChatBackend,
};
pub use baseline::{BaselineChatModel, ChatParams};
pub use config::{ClientConfig, ModelConfig};
pub use lookup::{LookupModel, LookupParams};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelOpsError, Result};
use crate::schema::{FeatureImportances, Inputs, Outputs, ShapValues, Targets};

/// Model hyperparameters as an ordered JSON map
pub type Params = Map<String, Value>;

/// Cooperative cancellation flag shared between a job and its model calls
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle returned by [`Model::get_internal_model`]
#[derive(Debug, Clone)]
pub enum InternalModel {
    /// Bound chat backend
    Chat(Arc<dyn ChatBackend>),
    /// Memorized responses
    Lookup(BTreeMap<String, String>),
}

/// Capability set shared by all model variants
pub trait Model: Send + Sync {
    /// Variant name, as written in the `KIND` tag
    fn kind(&self) -> &'static str;

    /// Persisted hyperparameters
    fn get_params(&self) -> Result<Params>;

    /// Assign hyperparameters in place
    fn set_params(&mut self, params: Params) -> Result<()>;

    /// Bind the backend handle from a config
    fn load_context(&mut self, config: &ModelConfig) -> Result<()>;

    /// Whether a backend handle is bound
    fn is_bound(&self) -> bool;

    /// Bind from a config file; no-op when already bound
    fn load_context_path(&mut self, path: &Path) -> Result<()> {
        if self.is_bound() {
            return Ok(());
        }
        let config = ModelConfig::from_path(path)?;
        self.load_context(&config)
    }

    /// Bind from the config stored in the hyperparameters, if any
    ///
    /// Returns whether the model is bound afterwards.
    fn bind_stored_context(&mut self) -> Result<bool> {
        Ok(self.is_bound())
    }

    /// Train on aligned inputs and targets
    fn fit(&mut self, inputs: &Inputs, targets: &Targets) -> Result<()>;

    /// Predict one output row per input row, in order
    fn predict(&self, inputs: &Inputs) -> Result<Outputs> {
        self.predict_cancellable(inputs, &CancelToken::new())
    }

    /// Predict, checking `cancel` between rows
    fn predict_cancellable(&self, inputs: &Inputs, cancel: &CancelToken) -> Result<Outputs>;

    fn explain_model(&self) -> Result<FeatureImportances> {
        Err(ModelOpsError::NotImplementedCapability {
            kind: self.kind(),
            capability: "explain_model",
        })
    }

    fn explain_samples(&self, _inputs: &Inputs) -> Result<ShapValues> {
        Err(ModelOpsError::NotImplementedCapability {
            kind: self.kind(),
            capability: "explain_samples",
        })
    }

    /// Backend handle, binding lazily from a stored config
    fn get_internal_model(&mut self) -> Result<InternalModel>;
}

/// Closed set of model variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "KIND")]
pub enum ModelKind {
    #[serde(alias = "BaselineAutogenModel")]
    BaselineChatModel(BaselineChatModel),
    LookupModel(LookupModel),
}

impl Default for ModelKind {
    fn default() -> Self {
        ModelKind::BaselineChatModel(BaselineChatModel::default())
    }
}

impl ModelKind {
    fn inner(&self) -> &dyn Model {
        match self {
            ModelKind::BaselineChatModel(m) => m,
            ModelKind::LookupModel(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Model {
        match self {
            ModelKind::BaselineChatModel(m) => m,
            ModelKind::LookupModel(m) => m,
        }
    }

    /// Path of the config file referenced by the hyperparameters
    pub fn model_config_path(&self) -> Option<&str> {
        match self {
            ModelKind::BaselineChatModel(m) => m.params().model_config_path.as_deref(),
            ModelKind::LookupModel(_) => None,
        }
    }

    /// Inline config stored in the hyperparameters
    pub fn model_config_data(&self) -> Option<&Value> {
        match self {
            ModelKind::BaselineChatModel(m) => m.params().model_config_data.as_ref(),
            ModelKind::LookupModel(_) => None,
        }
    }
}

impl Model for ModelKind {
    fn kind(&self) -> &'static str {
        self.inner().kind()
    }

    fn get_params(&self) -> Result<Params> {
        self.inner().get_params()
    }

    fn set_params(&mut self, params: Params) -> Result<()> {
        self.inner_mut().set_params(params)
    }

    fn load_context(&mut self, config: &ModelConfig) -> Result<()> {
        self.inner_mut().load_context(config)
    }

    fn is_bound(&self) -> bool {
        self.inner().is_bound()
    }

    fn load_context_path(&mut self, path: &Path) -> Result<()> {
        self.inner_mut().load_context_path(path)
    }

    fn bind_stored_context(&mut self) -> Result<bool> {
        self.inner_mut().bind_stored_context()
    }

    fn fit(&mut self, inputs: &Inputs, targets: &Targets) -> Result<()> {
        self.inner_mut().fit(inputs, targets)
    }

    fn predict_cancellable(&self, inputs: &Inputs, cancel: &CancelToken) -> Result<Outputs> {
        self.inner().predict_cancellable(inputs, cancel)
    }

    fn explain_model(&self) -> Result<FeatureImportances> {
        self.inner().explain_model()
    }

    fn explain_samples(&self, inputs: &Inputs) -> Result<ShapValues> {
        self.inner().explain_samples(inputs)
    }

    fn get_internal_model(&mut self) -> Result<InternalModel> {
        self.inner_mut().get_internal_model()
    }
}

/// Whether a field name is public: not `_`-prefixed and not uppercase-only
pub fn is_public_param(name: &str) -> bool {
    let uppercase_only =
        name.chars().any(|c| c.is_alphabetic()) && !name.chars().any(|c| c.is_lowercase());
    !name.starts_with('_') && !uppercase_only
}

/// Serialize hyperparameters, keeping public fields only
pub fn params_of<T: Serialize>(params: &T) -> Result<Params> {
    match serde_json::to_value(params)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .filter(|(k, _)| is_public_param(k))
            .collect()),
        other => Err(ModelOpsError::SerializationError(format!(
            "Parameters must serialize to an object, got {}",
            other
        ))),
    }
}

/// Merge `updates` into `current` and rebuild the hyperparameters
///
/// Unknown keys and values of the wrong type are rejected and leave
/// `current` untouched.
pub fn apply_params<T>(current: &T, updates: Params) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = params_of(current)?;
    for (key, value) in updates {
        if !merged.contains_key(&key) {
            return Err(ModelOpsError::invalid_parameter(
                key,
                "not a declared attribute",
            ));
        }
        let mut probe = merged.clone();
        probe.insert(key.clone(), value.clone());
        serde_json::from_value::<T>(Value::Object(probe))
            .map_err(|e| ModelOpsError::invalid_parameter(&key, e.to_string()))?;
        merged.insert(key, value);
    }
    serde_json::from_value(Value::Object(merged))
        .map_err(|e| ModelOpsError::invalid_parameter("params", e.to_string()))
}

/// Check that inputs and targets have the same number of rows
pub(crate) fn check_aligned(inputs: &Inputs, targets: &Targets) -> Result<()> {
    if inputs.len() != targets.len() {
        return Err(ModelOpsError::Misaligned {
            left: inputs.len(),
            right: targets.len(),
        });
    }
    Ok(())
}
