//! Evaluations job: score a registered model and enforce thresholds

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{default_selector, read_inputs, read_targets, Job, JobContext};
use crate::data::ReaderKind;
use crate::error::{ModelOpsError, Result};
use crate::metrics::{default_metrics, evaluate, EvaluationReport, MetricKind, Threshold};
use crate::registry::{AliasOrVersion, LoaderKind};
use crate::tracking::RunConfig;

fn default_run_config() -> RunConfig {
    RunConfig::new("Evaluations")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationsJob {
    #[serde(default = "default_run_config")]
    pub run_config: RunConfig,
    pub inputs: ReaderKind,
    pub targets: ReaderKind,
    /// Registered model to evaluate, `Champion` by default
    #[serde(default = "default_selector")]
    pub alias_or_version: AliasOrVersion,
    #[serde(default)]
    pub loader: LoaderKind,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricKind>,
    /// Thresholds keyed by metric name
    #[serde(default)]
    pub thresholds: BTreeMap<String, Threshold>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationsReport {
    pub run_id: String,
    pub model_uri: String,
    pub evaluation: EvaluationReport,
}

impl EvaluationsJob {
    pub fn new(inputs: ReaderKind, targets: ReaderKind) -> Self {
        Self {
            run_config: default_run_config(),
            inputs,
            targets,
            alias_or_version: default_selector(),
            loader: LoaderKind::default(),
            metrics: default_metrics(),
            thresholds: BTreeMap::new(),
        }
    }

    pub fn with_selector(mut self, selector: AliasOrVersion) -> Self {
        self.alias_or_version = selector;
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<MetricKind>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_threshold(mut self, metric: impl Into<String>, threshold: Threshold) -> Self {
        self.thresholds.insert(metric.into(), threshold);
        self
    }
}

impl Job for EvaluationsJob {
    type Report = EvaluationsReport;

    fn run(&self, ctx: &JobContext) -> Result<EvaluationsReport> {
        let model_uri = ctx.model_uri(&self.alias_or_version);

        let result = ctx.tracking.with_run(&self.run_config, |run| {
            let adapter = ctx.load_model(&self.loader, &self.alias_or_version)?;
            run.log_param("model_uri", model_uri.as_str());

            let inputs = read_inputs(&self.inputs, run)?;
            let targets = read_targets(&self.targets, run)?;
            let outputs = adapter.predict_cancellable(inputs.table(), &ctx.cancel)?;

            let evaluation = evaluate(&self.metrics, &self.thresholds, &targets, &outputs)?;
            run.log_metrics(&evaluation.scores());
            for result in &evaluation.results {
                if let Some(passed) = result.passed {
                    run.set_tag(format!("threshold_{}", result.name), passed.to_string());
                }
            }

            Ok(EvaluationsReport {
                run_id: run.run_id.clone(),
                model_uri: model_uri.clone(),
                evaluation: evaluation.ensure_passed()?,
            })
        });

        match &result {
            Ok(_) => ctx.alerts.notify(
                "Evaluations Job Finished",
                &format!("All thresholds passed for {}", model_uri),
            ),
            Err(ModelOpsError::ThresholdFailed(names)) => ctx.alerts.warn(
                "Evaluations Job Failed",
                &format!("Thresholds failed for {}: {}", model_uri, names.join(", ")),
            ),
            Err(_) => {}
        }
        result
    }
}
