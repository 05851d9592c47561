//! Tuning job: grid search over hyperparameters

use serde::{Deserialize, Serialize};

use super::{read_inputs, read_targets, Job, JobContext};
use crate::data::{ReaderKind, SplitterKind, TimeSeriesSplitter};
use crate::error::Result;
use crate::metrics::{default_metrics, MetricKind};
use crate::models::{Model, ModelKind, Params};
use crate::search::{Candidate, Searcher, SearcherKind};
use crate::tracking::RunConfig;

fn default_run_config() -> RunConfig {
    RunConfig::new("Tuning")
}

fn default_metric() -> MetricKind {
    default_metrics().remove(0)
}

fn default_splitter() -> SplitterKind {
    SplitterKind::TimeSeriesSplitter(TimeSeriesSplitter::default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TuningJob {
    #[serde(default = "default_run_config")]
    pub run_config: RunConfig,
    pub inputs: ReaderKind,
    pub targets: ReaderKind,
    #[serde(default)]
    pub model: ModelKind,
    #[serde(default = "default_metric")]
    pub metric: MetricKind,
    #[serde(default)]
    pub searcher: SearcherKind,
    #[serde(default = "default_splitter")]
    pub splitter: SplitterKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningReport {
    pub run_id: String,
    pub best_params: Params,
    pub best_score: f64,
    pub candidates: Vec<Candidate>,
}

impl TuningJob {
    pub fn new(inputs: ReaderKind, targets: ReaderKind, model: ModelKind) -> Self {
        Self {
            run_config: default_run_config(),
            inputs,
            targets,
            model,
            metric: default_metric(),
            searcher: SearcherKind::default(),
            splitter: default_splitter(),
        }
    }

    pub fn with_searcher(mut self, searcher: SearcherKind) -> Self {
        self.searcher = searcher;
        self
    }

    pub fn with_splitter(mut self, splitter: SplitterKind) -> Self {
        self.splitter = splitter;
        self
    }
}

impl Job for TuningJob {
    type Report = TuningReport;

    fn run(&self, ctx: &JobContext) -> Result<TuningReport> {
        let report = ctx.tracking.with_run(&self.run_config, |run| {
            let inputs = read_inputs(&self.inputs, run)?;
            let targets = read_targets(&self.targets, run)?;

            let mut model = self.model.clone();
            model.bind_stored_context()?;
            run.log_param("model_kind", model.kind());

            let results =
                self.searcher
                    .search(&model, &self.metric, &inputs, &targets, &self.splitter)?;
            for (key, value) in &results.best_params {
                run.log_param(format!("best_{}", key), value.to_string());
            }
            run.log_metric("best_score", results.best_score);

            Ok(TuningReport {
                run_id: run.run_id.clone(),
                best_params: results.best_params,
                best_score: results.best_score,
                candidates: results.candidates,
            })
        })?;

        ctx.alerts.notify(
            "Tuning Job Finished",
            &format!("Best score: {:.4}", report.best_score),
        );
        Ok(report)
    }
}
