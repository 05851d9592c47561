//! Promotion job: point an alias at a registered version

use serde::{Deserialize, Serialize};

use super::{Job, JobContext};
use crate::error::Result;
use crate::registry::{ModelRegistry, Stage};
use crate::tracking::RunConfig;

/// Alias used by jobs that load "the" production model
pub const CHAMPION: &str = "Champion";

fn default_run_config() -> RunConfig {
    RunConfig::new("Promotion")
}

fn default_alias() -> String {
    CHAMPION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromotionJob {
    #[serde(default = "default_run_config")]
    pub run_config: RunConfig,
    #[serde(default = "default_alias")]
    pub alias: String,
    /// Version to promote; the latest when unset
    #[serde(default)]
    pub version: Option<u64>,
    /// Stage to move the version to
    #[serde(default)]
    pub stage: Option<Stage>,
}

impl Default for PromotionJob {
    fn default() -> Self {
        Self {
            run_config: default_run_config(),
            alias: default_alias(),
            version: None,
            stage: None,
        }
    }
}

impl PromotionJob {
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionReport {
    pub run_id: String,
    pub name: String,
    pub version: u64,
    pub alias: String,
    pub model_uri: String,
}

impl Job for PromotionJob {
    type Report = PromotionReport;

    fn run(&self, ctx: &JobContext) -> Result<PromotionReport> {
        let registry = ctx.tracking.store();
        let name = ctx.settings.registry_name.as_str();

        let report = ctx.tracking.with_run(&self.run_config, |run| {
            let version = match self.version {
                Some(v) => registry.get_version(name, v)?,
                None => registry.latest_version(name)?,
            };
            let promoted = registry.set_alias(name, &self.alias, version.version)?;
            if let Some(stage) = self.stage {
                registry.transition_stage(name, promoted.version, stage)?;
            }
            run.log_param("alias", self.alias.as_str());
            run.log_param("version", promoted.version.to_string());

            Ok(PromotionReport {
                run_id: run.run_id.clone(),
                name: name.to_string(),
                version: promoted.version,
                alias: self.alias.clone(),
                model_uri: promoted.model_uri,
            })
        })?;

        ctx.alerts.notify(
            "Promotion Job Finished",
            &format!("{}@{} -> version {}", name, report.alias, report.version),
        );
        Ok(report)
    }
}
