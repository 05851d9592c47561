//! Inference job: batch predictions with a registered model

use serde::{Deserialize, Serialize};

use super::{default_selector, read_inputs, Job, JobContext};
use crate::data::{ReaderKind, Writer, WriterKind};
use crate::error::Result;
use crate::registry::{AliasOrVersion, LoaderKind};
use crate::tracking::RunConfig;

fn default_run_config() -> RunConfig {
    RunConfig::new("Inference")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InferenceJob {
    #[serde(default = "default_run_config")]
    pub run_config: RunConfig,
    pub inputs: ReaderKind,
    pub outputs: WriterKind,
    #[serde(default = "default_selector")]
    pub alias_or_version: AliasOrVersion,
    #[serde(default)]
    pub loader: LoaderKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceReport {
    pub run_id: String,
    pub model_uri: String,
    pub rows: usize,
}

impl InferenceJob {
    pub fn new(inputs: ReaderKind, outputs: WriterKind) -> Self {
        Self {
            run_config: default_run_config(),
            inputs,
            outputs,
            alias_or_version: default_selector(),
            loader: LoaderKind::default(),
        }
    }

    pub fn with_selector(mut self, selector: AliasOrVersion) -> Self {
        self.alias_or_version = selector;
        self
    }
}

impl Job for InferenceJob {
    type Report = InferenceReport;

    fn run(&self, ctx: &JobContext) -> Result<InferenceReport> {
        let model_uri = ctx.model_uri(&self.alias_or_version);

        let report = ctx.tracking.with_run(&self.run_config, |run| {
            let adapter = ctx.load_model(&self.loader, &self.alias_or_version)?;
            run.log_param("model_uri", model_uri.as_str());

            let inputs = read_inputs(&self.inputs, run)?;
            let outputs = adapter.predict_cancellable(inputs.table(), &ctx.cancel)?;
            self.outputs.write(outputs.table())?;
            run.log_metric("rows", outputs.len() as f64);

            Ok(InferenceReport {
                run_id: run.run_id.clone(),
                model_uri: model_uri.clone(),
                rows: outputs.len(),
            })
        })?;

        ctx.alerts.notify(
            "Inference Job Finished",
            &format!("Wrote {} predictions from {}", report.rows, model_uri),
        );
        Ok(report)
    }
}
