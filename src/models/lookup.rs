//! Lookup model: memorizes `input -> response` pairs at fit time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    apply_params, check_aligned, params_of, CancelToken, InternalModel, Model, ModelConfig, Params,
};
use crate::error::{ModelOpsError, Result};
use crate::schema::{Inputs, OutputMetadata, OutputRecord, Outputs, Targets};

/// Hyperparameters and fitted state of [`LookupModel`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupParams {
    /// Answer for unseen inputs; unseen inputs are echoed when unset
    #[serde(default)]
    pub default_response: Option<String>,
    /// Memorized responses
    #[serde(default)]
    pub memory: BTreeMap<String, String>,
}

/// Local heuristic predictor with no backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "LookupParams", into = "LookupParams")]
pub struct LookupModel {
    params: LookupParams,
}

impl From<LookupParams> for LookupModel {
    fn from(params: LookupParams) -> Self {
        Self { params }
    }
}

impl From<LookupModel> for LookupParams {
    fn from(model: LookupModel) -> Self {
        model.params
    }
}

impl LookupModel {
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.params.default_response = Some(response.into());
        self
    }

    pub fn memory(&self) -> &BTreeMap<String, String> {
        &self.params.memory
    }

    fn answer<'a>(&'a self, input: &'a str) -> &'a str {
        self.params
            .memory
            .get(input)
            .map(String::as_str)
            .or(self.params.default_response.as_deref())
            .unwrap_or(input)
    }
}

impl Model for LookupModel {
    fn kind(&self) -> &'static str {
        "LookupModel"
    }

    fn get_params(&self) -> Result<Params> {
        params_of(&self.params)
    }

    fn set_params(&mut self, params: Params) -> Result<()> {
        self.params = apply_params(&self.params, params)?;
        Ok(())
    }

    fn load_context(&mut self, config: &ModelConfig) -> Result<()> {
        debug!(provider = %config.provider, "LookupModel ignores backend config");
        Ok(())
    }

    fn is_bound(&self) -> bool {
        true
    }

    fn fit(&mut self, inputs: &Inputs, targets: &Targets) -> Result<()> {
        check_aligned(inputs, targets)?;
        for (input, response) in targets.inputs().into_iter().zip(targets.responses()) {
            self.params
                .memory
                .insert(input.to_string(), response.to_string());
        }
        debug!(entries = self.params.memory.len(), "LookupModel fitted");
        Ok(())
    }

    fn predict_cancellable(&self, inputs: &Inputs, cancel: &CancelToken) -> Result<Outputs> {
        let mut records = Vec::with_capacity(inputs.len());
        for (row, input) in inputs.texts().into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ModelOpsError::Cancelled { completed: row });
            }
            let response = self.answer(input).to_string();
            records.push(OutputRecord {
                metadata: Some(OutputMetadata::now(true, vec![response.clone()])),
                response,
            });
        }
        Outputs::from_records(records)
    }

    fn get_internal_model(&mut self) -> Result<InternalModel> {
        Ok(InternalModel::Lookup(self.params.memory.clone()))
    }
}
