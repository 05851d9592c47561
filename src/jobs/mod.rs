//! Jobs
//!
//! Each job is a `KIND`-tagged config record that runs inside one tracked run
//! against a [`JobContext`]. A job config file looks like
//!
//! ```json
//! {"tracking": {"registry_name": "team"}, "job": {"KIND": "PromotionJob", "alias": "Champion"}}
//! ```

pub mod evaluations;
pub mod explanations;
pub mod inference;
pub mod promotion;
pub mod training;
pub mod tuning;

pub use evaluations::{EvaluationsJob, EvaluationsReport};
pub use explanations::{ExplanationsJob, ExplanationsReport};
pub use inference::{InferenceJob, InferenceReport};
pub use promotion::{PromotionJob, PromotionReport};
pub use training::{TrainingJob, TrainingReport};
pub use tuning::{TuningJob, TuningReport};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{self, Settings};
use crate::data::{Reader, ReaderKind};
use crate::error::Result;
use crate::models::CancelToken;
use crate::registry::{uri_for_model_alias_or_version, Adapter, AliasOrVersion, Loader, LoaderKind};
use crate::schema::{Inputs, Targets};
use crate::services::{AlertsService, LoggerService};
use crate::tracking::{Run, TrackingService};

/// Everything a job needs besides its own config
#[derive(Debug, Clone)]
pub struct JobContext {
    pub settings: Settings,
    pub tracking: TrackingService,
    pub alerts: AlertsService,
    pub cancel: CancelToken,
}

impl JobContext {
    /// Open the tracking store named by `settings`
    pub fn new(settings: Settings) -> Result<Self> {
        Ok(Self {
            tracking: TrackingService::new(settings.clone())?,
            settings,
            alerts: AlertsService::default(),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_alerts(mut self, alerts: AlertsService) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Registry URI for `selector` under the configured model name
    pub fn model_uri(&self, selector: &AliasOrVersion) -> String {
        uri_for_model_alias_or_version(&self.settings.registry_name, selector)
    }

    /// Load the registered model selected by `selector`
    pub fn load_model(&self, loader: &LoaderKind, selector: &AliasOrVersion) -> Result<Adapter> {
        let store = self.tracking.store();
        loader.load(&self.model_uri(selector), store, store)
    }
}

/// A runnable job with a typed report
pub trait Job {
    type Report: Serialize;

    fn run(&self, ctx: &JobContext) -> Result<Self::Report>;
}

/// Closed set of jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "KIND")]
pub enum JobKind {
    TrainingJob(TrainingJob),
    TuningJob(TuningJob),
    PromotionJob(PromotionJob),
    EvaluationsJob(EvaluationsJob),
    ExplanationsJob(ExplanationsJob),
    InferenceJob(InferenceJob),
}

/// Report of any job
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "KIND")]
pub enum JobReport {
    TrainingJob(TrainingReport),
    TuningJob(TuningReport),
    PromotionJob(PromotionReport),
    EvaluationsJob(EvaluationsReport),
    ExplanationsJob(ExplanationsReport),
    InferenceJob(InferenceReport),
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::TrainingJob(_) => "TrainingJob",
            JobKind::TuningJob(_) => "TuningJob",
            JobKind::PromotionJob(_) => "PromotionJob",
            JobKind::EvaluationsJob(_) => "EvaluationsJob",
            JobKind::ExplanationsJob(_) => "ExplanationsJob",
            JobKind::InferenceJob(_) => "InferenceJob",
        }
    }
}

impl Job for JobKind {
    type Report = JobReport;

    fn run(&self, ctx: &JobContext) -> Result<JobReport> {
        Ok(match self {
            JobKind::TrainingJob(job) => JobReport::TrainingJob(job.run(ctx)?),
            JobKind::TuningJob(job) => JobReport::TuningJob(job.run(ctx)?),
            JobKind::PromotionJob(job) => JobReport::PromotionJob(job.run(ctx)?),
            JobKind::EvaluationsJob(job) => JobReport::EvaluationsJob(job.run(ctx)?),
            JobKind::ExplanationsJob(job) => JobReport::ExplanationsJob(job.run(ctx)?),
            JobKind::InferenceJob(job) => JobReport::InferenceJob(job.run(ctx)?),
        })
    }
}

/// Top-level job config document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Overrides applied on top of the environment settings
    #[serde(default)]
    pub tracking: Option<Value>,
    #[serde(default)]
    pub logger: LoggerService,
    #[serde(default)]
    pub alerts: AlertsService,
    pub job: JobKind,
}

impl JobConfig {
    /// Merge config files and an inline string into a job config
    pub fn load(files: &[std::path::PathBuf], inline: Option<&str>) -> Result<Self> {
        config::to_object(config::load_configs(files, inline)?)
    }

    /// Build the job context from the environment plus overrides
    pub fn context(&self, base: &Settings) -> Result<JobContext> {
        let settings = base.merged(self.tracking.as_ref())?;
        Ok(JobContext::new(settings)?.with_alerts(self.alerts.clone()))
    }
}

/// Read and check inputs, logging their lineage
pub(crate) fn read_inputs(reader: &ReaderKind, run: &mut Run) -> Result<Inputs> {
    let table = reader.read()?;
    run.log_input(reader.lineage(&table, "inputs", None)?);
    Inputs::check(&table)
}

/// Read and check targets, logging their lineage
pub(crate) fn read_targets(reader: &ReaderKind, run: &mut Run) -> Result<Targets> {
    let table = reader.read()?;
    run.log_input(reader.lineage(&table, "targets", Some(Targets::RESPONSE))?);
    Targets::check(&table)
}

pub(crate) fn default_selector() -> AliasOrVersion {
    AliasOrVersion::Alias(promotion::CHAMPION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_config_parses_kind() {
        let config: JobConfig = serde_json::from_value(json!({
            "tracking": {"registry_name": "team"},
            "job": {"KIND": "PromotionJob", "alias": "Challenger", "version": 2}
        }))
        .unwrap();
        assert_eq!(config.job.name(), "PromotionJob");
        assert!(config.alerts.enable);

        let settings = Settings::default().merged(config.tracking.as_ref()).unwrap();
        assert_eq!(settings.registry_name, "team");
    }

    #[test]
    fn test_job_config_rejects_unknown_fields() {
        assert!(serde_json::from_value::<JobConfig>(json!({
            "job": {"KIND": "PromotionJob", "aliass": "x"}
        }))
        .is_err());
        assert!(serde_json::from_value::<JobConfig>(json!({
            "jobs": {"KIND": "PromotionJob"}
        }))
        .is_err());
    }
}
