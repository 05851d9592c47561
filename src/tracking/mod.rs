//! Run tracking
//!
//! A [`Run`] records one execution of a job: parameters, metrics, tags,
//! dataset lineage and artifact URIs. [`TrackingService::with_run`] opens a
//! run, hands it to a closure and persists the final status.

pub mod lineage;

pub use lineage::Lineage;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{ModelOpsError, Result};
use crate::models::Params;
use crate::registry::store::sync_writer;
use crate::registry::LocalTrackingStore;

const RUN_FILE: &str = "run.json";

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// One tracked execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub name: String,
    pub description: Option<String>,
    pub experiment: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    /// Latest value per metric
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    pub inputs: Vec<Lineage>,
    pub artifacts: Vec<String>,
}

impl Run {
    pub fn new(config: &RunConfig, experiment: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().simple().to_string(),
            name: config.name.clone(),
            description: config.description.clone(),
            experiment: experiment.into(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            tags: config.tags.clone(),
            inputs: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn log_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Log every hyperparameter; strings as-is, other values as JSON
    pub fn log_params(&mut self, params: &Params) {
        for (key, value) in params {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.params.insert(key.clone(), text);
        }
    }

    pub fn log_metric(&mut self, key: impl Into<String>, value: f64) {
        self.metrics.insert(key.into(), value);
    }

    pub fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) {
        for (key, value) in metrics {
            self.metrics.insert(key.clone(), *value);
        }
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn log_input(&mut self, lineage: Lineage) {
        self.inputs.push(lineage);
    }

    pub fn log_artifact(&mut self, uri: impl Into<String>) {
        self.artifacts.push(uri.into());
    }

    /// Wall-clock duration, up to now for running runs
    pub fn duration_secs(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.end_time = Some(Utc::now());
    }
}

/// Name, description and initial tags of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub name: String,
    pub description: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "run".to_string(),
            description: None,
            tags: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Persistence of run records
pub trait RunStore: Send + Sync {
    fn save_run(&self, run: &Run) -> Result<()>;

    fn get_run(&self, run_id: &str) -> Result<Run>;

    /// Runs of one experiment, or all runs, oldest first
    fn list_runs(&self, experiment: Option<&str>) -> Result<Vec<Run>>;
}

impl RunStore for LocalTrackingStore {
    fn save_run(&self, run: &Run) -> Result<()> {
        let dir = self.run_dir(&run.run_id)?;
        fs::create_dir_all(&dir)?;
        let tmp = dir.join("run.json.tmp");
        let file = File::create(&tmp)
            .map_err(|e| ModelOpsError::StoreError(format!("Failed to write run: {}", e)))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, run)?;
        sync_writer(writer)
            .map_err(|e| ModelOpsError::StoreError(format!("Failed to flush run: {}", e)))?;
        fs::rename(&tmp, dir.join(RUN_FILE))
            .map_err(|e| ModelOpsError::StoreError(format!("Failed to write run: {}", e)))
    }

    fn get_run(&self, run_id: &str) -> Result<Run> {
        let path = self.run_dir(run_id)?.join(RUN_FILE);
        let file = File::open(&path)
            .map_err(|_| ModelOpsError::StoreError(format!("Run not found: {}", run_id)))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn list_runs(&self, experiment: Option<&str>) -> Result<Vec<Run>> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(self.root().join("runs"))? {
            let path = entry?.path().join(RUN_FILE);
            if !path.is_file() {
                continue;
            }
            let run: Run = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
            if experiment.map_or(true, |e| run.experiment == e) {
                runs.push(run);
            }
        }
        runs.sort_by_key(|r| r.start_time);
        Ok(runs)
    }
}

/// Opens runs against the tracking store
#[derive(Debug, Clone)]
pub struct TrackingService {
    settings: Settings,
    store: LocalTrackingStore,
}

impl TrackingService {
    /// Open the store at `settings.tracking_uri`
    pub fn new(settings: Settings) -> Result<Self> {
        let store = LocalTrackingStore::open(&settings.tracking_uri)?;
        Ok(Self { settings, store })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &LocalTrackingStore {
        &self.store
    }

    /// Run `f` inside a tracked run
    ///
    /// The run is persisted as `Running` first, then `Finished` or `Failed`
    /// depending on the closure's result. A failure tag carries the error.
    pub fn with_run<T>(
        &self,
        config: &RunConfig,
        f: impl FnOnce(&mut Run) -> Result<T>,
    ) -> Result<T> {
        let mut run = Run::new(config, &self.settings.experiment_name);
        self.store.save_run(&run)?;
        info!(run_id = %run.run_id, name = %run.name, experiment = %run.experiment, "Started run");

        let result = f(&mut run);
        match &result {
            Ok(_) => run.finish(RunStatus::Finished),
            Err(e) => {
                run.set_tag("error", e.to_string());
                run.finish(RunStatus::Failed);
            }
        }

        match (self.store.save_run(&run), result) {
            (Ok(()), result) => {
                info!(
                    run_id = %run.run_id,
                    status = ?run.status,
                    duration_secs = run.duration_secs(),
                    "Ended run"
                );
                result
            }
            (Err(save_err), Err(e)) => {
                warn!(run_id = %run.run_id, error = %save_err, "Failed to persist failed run");
                Err(e)
            }
            (Err(save_err), Ok(_)) => Err(save_err),
        }
    }
}
