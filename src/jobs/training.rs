//! Training job: fit, score, sign, save and register a model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{read_inputs, read_targets, Job, JobContext};
use crate::data::{ReaderKind, Splitter, SplitterKind};
use crate::error::{ModelOpsError, Result};
use crate::metrics::{default_metrics, evaluate, MetricKind};
use crate::models::{Model, ModelKind};
use crate::registry::{Register, RegisterKind, Saver, SaverKind};
use crate::signers::{Signer, SignerKind};
use crate::tracking::RunConfig;

fn default_run_config() -> RunConfig {
    RunConfig::new("Training")
}

/// Rows of the training inputs kept as the bundle's input example
const INPUT_EXAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingJob {
    #[serde(default = "default_run_config")]
    pub run_config: RunConfig,
    pub inputs: ReaderKind,
    pub targets: ReaderKind,
    #[serde(default)]
    pub model: ModelKind,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricKind>,
    #[serde(default)]
    pub splitter: SplitterKind,
    #[serde(default)]
    pub signer: SignerKind,
    #[serde(default)]
    pub saver: SaverKind,
    #[serde(default)]
    pub register: RegisterKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: String,
    pub model_uri: String,
    pub version: u64,
    pub metrics: BTreeMap<String, f64>,
    /// Saved to the local fallback directory
    pub fallback: bool,
}

impl TrainingJob {
    pub fn new(inputs: ReaderKind, targets: ReaderKind, model: ModelKind) -> Self {
        Self {
            run_config: default_run_config(),
            inputs,
            targets,
            model,
            metrics: default_metrics(),
            splitter: SplitterKind::default(),
            signer: SignerKind::default(),
            saver: SaverKind::default(),
            register: RegisterKind::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<MetricKind>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_splitter(mut self, splitter: SplitterKind) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_saver(mut self, saver: SaverKind) -> Self {
        self.saver = saver;
        self
    }
}

impl Job for TrainingJob {
    type Report = TrainingReport;

    fn run(&self, ctx: &JobContext) -> Result<TrainingReport> {
        let store = ctx.tracking.store();
        let name = ctx.settings.registry_name.as_str();

        let report = ctx.tracking.with_run(&self.run_config, |run| {
            let inputs = read_inputs(&self.inputs, run)?;
            let targets = read_targets(&self.targets, run)?;
            if inputs.len() != targets.len() {
                return Err(ModelOpsError::Misaligned {
                    left: inputs.len(),
                    right: targets.len(),
                });
            }

            let mut model = self.model.clone();
            run.log_param("model_kind", model.kind());
            run.log_params(&model.get_params()?);
            model.bind_stored_context()?;

            let (train, test) = self
                .splitter
                .split(inputs.len())?
                .into_iter()
                .next()
                .ok_or_else(|| ModelOpsError::ValidationError("Splitter produced no splits".into()))?;
            let (inputs_train, targets_train) = (inputs.take(&train)?, targets.take(&train)?);
            let (inputs_test, targets_test) = (inputs.take(&test)?, targets.take(&test)?);
            info!(train = train.len(), test = test.len(), "Split training data");

            model.fit(&inputs_train, &targets_train)?;
            let outputs = model.predict_cancellable(&inputs_test, &ctx.cancel)?;
            let scores = evaluate(&self.metrics, &BTreeMap::new(), &targets_test, &outputs)?.scores();
            run.log_metrics(&scores);

            let signature = self.signer.sign(&inputs_test, &outputs)?;
            let info = self.saver.save(
                &model,
                &signature,
                &inputs_train.head(INPUT_EXAMPLE_ROWS),
                &run.run_id,
                store,
            )?;
            run.log_artifact(info.model_uri.clone());
            if info.fallback {
                run.set_tag("fallback", "true");
            }

            let version =
                self.register
                    .register(name, &info.model_uri, Some(&run.run_id), store, store)?;
            run.set_tag("registered_version", version.version.to_string());

            Ok(TrainingReport {
                run_id: run.run_id.clone(),
                model_uri: info.model_uri,
                version: version.version,
                metrics: scores,
                fallback: info.fallback,
            })
        })?;

        ctx.alerts.notify(
            "Training Job Finished",
            &format!("Registered {} version {}", name, report.version),
        );
        Ok(report)
    }
}
