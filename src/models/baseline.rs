//! Baseline chat model
//!
//! Sends each input row as one prompt to a chat backend and returns the
//! backend's answer with per-row metadata.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    apply_params, check_aligned, params_of, CancelToken, ChatBackend, ChatRequest, InternalModel,
    Model, ModelConfig, Params,
};
use crate::error::{ModelOpsError, Result};
use crate::schema::{
    FeatureImportances, Inputs, OutputMetadata, OutputRecord, Outputs, ShapValues, Targets,
};

fn default_max_tokens() -> u64 {
    320_000
}

fn default_temperature() -> f64 {
    0.5
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_parallelism() -> usize {
    1
}

/// Persisted hyperparameters of [`BaselineChatModel`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatParams {
    /// Path of a JSON config artifact
    #[serde(default)]
    pub model_config_path: Option<String>,
    /// Inline config, also stored by `load_context` for lazy rebinding
    #[serde(default)]
    pub model_config_data: Option<Value>,
    /// Upper bound for `max_tokens` sent to the backend
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
    /// Sampling temperature when the config sets none
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Per-call timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Rows predicted concurrently
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            model_config_path: None,
            model_config_data: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            parallelism: default_parallelism(),
        }
    }
}

/// Runtime handle, never persisted
#[derive(Debug, Clone)]
struct BoundClient {
    config: ModelConfig,
    backend: Arc<dyn ChatBackend>,
}

/// Chat model driven by a remote (or echo) backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "ChatParams", into = "ChatParams")]
pub struct BaselineChatModel {
    params: ChatParams,
    client: Option<BoundClient>,
}

impl From<ChatParams> for BaselineChatModel {
    fn from(params: ChatParams) -> Self {
        Self {
            params,
            client: None,
        }
    }
}

/// Equal when the persisted hyperparameters are equal
impl PartialEq for BaselineChatModel {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
    }
}

impl From<BaselineChatModel> for ChatParams {
    fn from(model: BaselineChatModel) -> Self {
        model.params
    }
}

impl BaselineChatModel {
    pub fn new(params: ChatParams) -> Self {
        params.into()
    }

    pub fn params(&self) -> &ChatParams {
        &self.params
    }

    pub fn with_model_config_path(mut self, path: impl Into<String>) -> Self {
        self.params.model_config_path = Some(path.into());
        self
    }

    pub fn with_model_config_data(mut self, data: Value) -> Self {
        self.params.model_config_data = Some(data);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.params.temperature = temperature;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.params.timeout_secs = timeout_secs;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.params.parallelism = parallelism.max(1);
        self
    }

    fn bound(&self) -> Result<&BoundClient> {
        self.client.as_ref().ok_or_else(|| {
            ModelOpsError::NotBound(
                "BaselineChatModel has no backend; call load_context first".to_string(),
            )
        })
    }

    fn request(&self, config: &ModelConfig, prompt: &str) -> ChatRequest {
        ChatRequest::new(prompt)
            .with_temperature(config.config.temperature.unwrap_or(self.params.temperature))
            .with_max_tokens(
                config
                    .config
                    .max_tokens
                    .map(|m| m.min(self.params.max_tokens)),
            )
    }

    fn predict_row(
        &self,
        client: &BoundClient,
        row: usize,
        text: &str,
        cancel: &CancelToken,
    ) -> Result<OutputRecord> {
        if cancel.is_cancelled() {
            return Err(ModelOpsError::Cancelled { completed: row });
        }

        let response = client
            .backend
            .complete(&self.request(&client.config, text))
            .map_err(|source| {
                warn!(row, error = %source, "Backend call failed");
                ModelOpsError::Prediction { row, source }
            })?;

        let metadata = OutputMetadata::now(
            response.finish_reason.is_some(),
            response.messages.iter().map(|m| m.text.clone()).collect(),
        );
        Ok(OutputRecord {
            response: response.text(),
            metadata: Some(metadata),
        })
    }
}

impl Model for BaselineChatModel {
    fn kind(&self) -> &'static str {
        "BaselineChatModel"
    }

    fn get_params(&self) -> Result<Params> {
        params_of(&self.params)
    }

    fn set_params(&mut self, params: Params) -> Result<()> {
        self.params = apply_params(&self.params, params)?;
        Ok(())
    }

    fn load_context(&mut self, config: &ModelConfig) -> Result<()> {
        if let Some(bound) = &self.client {
            if bound.config == *config {
                debug!(provider = %config.provider, "Backend already bound with this config");
                return Ok(());
            }
        }

        let backend = config.build_backend(Duration::from_secs(self.params.timeout_secs))?;
        info!(
            provider = %config.provider,
            model = %config.config.model,
            "Bound chat backend"
        );
        self.params.model_config_data = Some(config.to_value()?);
        self.client = Some(BoundClient {
            config: config.clone(),
            backend,
        });
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.client.is_some()
    }

    fn bind_stored_context(&mut self) -> Result<bool> {
        if self.client.is_some() {
            return Ok(true);
        }
        if let Some(data) = &self.params.model_config_data {
            let config = ModelConfig::from_value(data)?;
            self.load_context(&config)?;
            return Ok(true);
        }
        if let Some(path) = self.params.model_config_path.clone() {
            self.load_context_path(Path::new(&path))?;
            return Ok(true);
        }
        Ok(false)
    }

    fn fit(&mut self, inputs: &Inputs, targets: &Targets) -> Result<()> {
        check_aligned(inputs, targets)?;
        debug!(rows = inputs.len(), "BaselineChatModel fit is a no-op");
        Ok(())
    }

    fn predict_cancellable(&self, inputs: &Inputs, cancel: &CancelToken) -> Result<Outputs> {
        let client = self.bound()?;
        let texts = inputs.texts();
        info!(
            rows = texts.len(),
            parallelism = self.params.parallelism,
            provider = client.backend.provider(),
            "Predicting"
        );

        let records: Vec<OutputRecord> = if self.params.parallelism > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.params.parallelism)
                .build()
                .map_err(|e| ModelOpsError::ConfigError(e.to_string()))?;
            pool.install(|| {
                texts
                    .par_iter()
                    .enumerate()
                    .map(|(row, text)| self.predict_row(client, row, text, cancel))
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            texts
                .iter()
                .enumerate()
                .map(|(row, text)| self.predict_row(client, row, text, cancel))
                .collect::<Result<Vec<_>>>()?
        };

        Outputs::from_records(records)
    }

    fn explain_model(&self) -> Result<FeatureImportances> {
        Ok(FeatureImportances::from_pairs(vec![(
            Inputs::INPUT.to_string(),
            1.0,
        )]))
    }

    fn explain_samples(&self, inputs: &Inputs) -> Result<ShapValues> {
        let outputs = self.predict(inputs)?;
        ShapValues::new(
            vec![Inputs::INPUT.to_string()],
            Array2::from_elem((outputs.len(), 1), 1.0),
        )
    }

    fn get_internal_model(&mut self) -> Result<InternalModel> {
        self.bind_stored_context()?;
        Ok(InternalModel::Chat(self.bound()?.backend.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bound_model() -> BaselineChatModel {
        let mut model = BaselineChatModel::default();
        model.load_context(&ModelConfig::echo("echo-1")).unwrap();
        model
    }

    #[test]
    fn test_defaults() {
        let params = BaselineChatModel::default().get_params().unwrap();
        assert_eq!(params["max_tokens"], json!(320000));
        assert_eq!(params["temperature"], json!(0.5));
        assert!(params.contains_key("model_config_path"));
        assert!(!params.contains_key("KIND"));
    }

    #[test]
    fn test_predict_unbound_fails() {
        let model = BaselineChatModel::default();
        let err = model.predict(&Inputs::from_texts(["hi"])).unwrap_err();
        assert!(matches!(err, ModelOpsError::NotBound(_)));
    }

    #[test]
    fn test_predict_rows_and_metadata() {
        let model = bound_model();
        let outputs = model.predict(&Inputs::from_texts(["a", "b"])).unwrap();
        let records = outputs.records();
        assert_eq!(outputs.responses(), vec!["a", "b"]);
        let metadata = records[0].metadata.as_ref().unwrap();
        assert!(metadata.terminated);
        assert_eq!(metadata.model_version, "v1.0.0");
        assert_eq!(metadata.messages, vec!["a".to_string()]);
        assert!(Outputs::check(outputs.table()).is_ok());
    }

    #[test]
    fn test_parallel_predict_keeps_order() {
        let mut model = BaselineChatModel::default().with_parallelism(4);
        model.load_context(&ModelConfig::echo("echo")).unwrap();
        let texts: Vec<String> = (0..50).map(|i| format!("row-{i}")).collect();
        let outputs = model.predict(&Inputs::from_texts(texts.clone())).unwrap();
        assert_eq!(outputs.responses(), texts.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancelled_before_first_row() {
        let model = bound_model();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = model
            .predict_cancellable(&Inputs::from_texts(["a"]), &cancel)
            .unwrap_err();
        assert!(matches!(err, ModelOpsError::Cancelled { completed: 0 }));
    }

    #[test]
    fn test_load_context_idempotent_and_rebinding() {
        let mut model = bound_model();
        let InternalModel::Chat(first) = model.get_internal_model().unwrap() else {
            panic!("expected chat backend");
        };
        model.load_context(&ModelConfig::echo("echo-1")).unwrap();
        let InternalModel::Chat(same) = model.get_internal_model().unwrap() else {
            panic!("expected chat backend");
        };
        assert!(Arc::ptr_eq(&first, &same));

        model.load_context(&ModelConfig::echo("echo-2")).unwrap();
        let InternalModel::Chat(other) = model.get_internal_model().unwrap() else {
            panic!("expected chat backend");
        };
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_serialization_drops_backend() {
        let model = bound_model();
        let text = serde_json::to_string(&model).unwrap();
        let mut restored: BaselineChatModel = serde_json::from_str(&text).unwrap();
        assert!(!restored.is_bound());
        assert!(restored.predict(&Inputs::from_texts(["x"])).is_err());

        assert!(restored.bind_stored_context().unwrap());
        let outputs = restored.predict(&Inputs::from_texts(["x"])).unwrap();
        assert_eq!(outputs.responses(), vec!["x"]);
    }

    #[test]
    fn test_get_internal_model_without_config() {
        let mut model = BaselineChatModel::default();
        assert!(matches!(
            model.get_internal_model().unwrap_err(),
            ModelOpsError::NotBound(_)
        ));
    }

    #[test]
    fn test_set_params() {
        let mut model = BaselineChatModel::default();
        let mut params = Params::new();
        params.insert("temperature".into(), json!(0.9));
        model.set_params(params).unwrap();
        assert_eq!(model.params().temperature, 0.9);

        let mut unknown = Params::new();
        unknown.insert("colour".into(), json!("blue"));
        assert!(matches!(
            model.set_params(unknown).unwrap_err(),
            ModelOpsError::InvalidParameter { name, .. } if name == "colour"
        ));

        let mut wrong = Params::new();
        wrong.insert("max_tokens".into(), json!("many"));
        assert!(model.set_params(wrong).is_err());
        assert_eq!(model.params().max_tokens, 320_000);
    }

    #[test]
    fn test_missing_credential() {
        let mut model = BaselineChatModel::default();
        let config = ModelConfig::openai("gpt", "${MODELOPS_UNSET_KEY_FOR_TEST}", "http://localhost:1");
        assert!(matches!(
            model.load_context(&config).unwrap_err(),
            ModelOpsError::MissingCredential(_)
        ));
        assert!(!model.is_bound());
    }

    #[test]
    fn test_fit_checks_alignment() {
        let mut model = BaselineChatModel::default();
        let inputs = Inputs::from_texts(["a", "b"]);
        let targets = Targets::from_pairs([("a", "x")]);
        assert!(matches!(
            model.fit(&inputs, &targets).unwrap_err(),
            ModelOpsError::Misaligned { left: 2, right: 1 }
        ));
    }

    #[test]
    fn test_explanations() {
        let model = bound_model();
        assert_eq!(model.explain_model().unwrap().len(), 1);
        let shap = model.explain_samples(&Inputs::from_texts(["a", "b", "c"])).unwrap();
        assert_eq!(shap.nrows(), 3);
        assert_eq!(shap.features(), &["input".to_string()]);
    }
}
