//! Explanations job: write model-level and sample-level explanations

use serde::{Deserialize, Serialize};

use super::{default_selector, read_inputs, Job, JobContext};
use crate::data::{ReaderKind, Writer, WriterKind};
use crate::error::Result;
use crate::models::Model;
use crate::registry::{AliasOrVersion, LoaderKind};
use crate::tracking::RunConfig;

fn default_run_config() -> RunConfig {
    RunConfig::new("Explanations")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExplanationsJob {
    #[serde(default = "default_run_config")]
    pub run_config: RunConfig,
    /// Samples to explain
    pub inputs_samples: ReaderKind,
    #[serde(default = "default_selector")]
    pub alias_or_version: AliasOrVersion,
    #[serde(default)]
    pub loader: LoaderKind,
    /// Destination of the feature importances
    pub models_explanations: WriterKind,
    /// Destination of the per-sample attributions
    pub samples_explanations: WriterKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationsReport {
    pub run_id: String,
    pub model_uri: String,
    pub features: usize,
    pub samples: usize,
}

impl ExplanationsJob {
    pub fn new(
        inputs_samples: ReaderKind,
        models_explanations: WriterKind,
        samples_explanations: WriterKind,
    ) -> Self {
        Self {
            run_config: default_run_config(),
            inputs_samples,
            alias_or_version: default_selector(),
            loader: LoaderKind::default(),
            models_explanations,
            samples_explanations,
        }
    }
}

impl Job for ExplanationsJob {
    type Report = ExplanationsReport;

    fn run(&self, ctx: &JobContext) -> Result<ExplanationsReport> {
        let model_uri = ctx.model_uri(&self.alias_or_version);

        let report = ctx.tracking.with_run(&self.run_config, |run| {
            let adapter = ctx.load_model(&self.loader, &self.alias_or_version)?;
            run.log_param("model_uri", model_uri.as_str());

            let importances = adapter.model().explain_model()?;
            self.models_explanations.write(importances.table())?;

            let inputs = read_inputs(&self.inputs_samples, run)?;
            let attributions = adapter.model().explain_samples(&inputs)?;
            self.samples_explanations.write(&attributions.to_table()?)?;

            Ok(ExplanationsReport {
                run_id: run.run_id.clone(),
                model_uri: model_uri.clone(),
                features: importances.len(),
                samples: attributions.nrows(),
            })
        })?;

        ctx.alerts.notify(
            "Explanations Job Finished",
            &format!("Explained {} samples of {}", report.samples, model_uri),
        );
        Ok(report)
    }
}
