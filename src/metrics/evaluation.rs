//! Evaluation reports: every metric scored, thresholds matched by name

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Metric, MetricKind, Threshold};
use crate::error::{ModelOpsError, Result};
use crate::schema::{Outputs, Targets};

/// Score of one metric and its threshold outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub name: String,
    pub score: f64,
    pub greater_is_better: bool,
    pub threshold: Option<Threshold>,
    /// `None` when no threshold targets this metric
    pub passed: Option<bool>,
}

/// Outcome of scoring a set of metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub results: Vec<MetricResult>,
}

impl EvaluationReport {
    /// Scores keyed by metric name
    pub fn scores(&self) -> BTreeMap<String, f64> {
        self.results
            .iter()
            .map(|r| (r.name.clone(), r.score))
            .collect()
    }

    /// Names of metrics that failed their threshold
    pub fn failures(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.passed == Some(false))
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn passed(&self) -> bool {
        self.failures().is_empty()
    }

    /// Fail with `ThresholdFailed` when any threshold failed
    pub fn ensure_passed(self) -> Result<Self> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(self)
        } else {
            Err(ModelOpsError::ThresholdFailed(failures))
        }
    }
}

/// Score every metric and evaluate the thresholds named after them
pub fn evaluate(
    metrics: &[MetricKind],
    thresholds: &BTreeMap<String, Threshold>,
    targets: &Targets,
    outputs: &Outputs,
) -> Result<EvaluationReport> {
    let mut results = Vec::with_capacity(metrics.len());
    for metric in metrics {
        let score = metric.score(targets, outputs)?;
        let threshold = thresholds.get(metric.name()).copied();
        let passed = threshold.map(|t| t.evaluate(score));
        info!(metric = metric.name(), score, ?passed, "Scored metric");
        results.push(MetricResult {
            name: metric.name().to_string(),
            score,
            greater_is_better: metric.greater_is_better(),
            threshold,
            passed,
        });
    }

    for name in thresholds.keys() {
        if !metrics.iter().any(|m| m.name() == name) {
            warn!(threshold = %name, "No metric matches threshold; skipped");
        }
    }

    Ok(EvaluationReport { results })
}
