//! Metric and threshold engine
//!
//! Metrics score `(targets, outputs)` pairs into a single float with a
//! polarity. They are stateless; the closed set of variants is
//! [`MetricKind`], tagged by `KIND`.

pub mod conversation;
pub mod evaluation;
pub mod sequence;
pub mod text;
pub mod threshold;

pub use conversation::AutogenConversationMetric;
pub use evaluation::{evaluate, EvaluationReport, MetricResult};
pub use text::{AutogenMetric, TextMetricType};
pub use threshold::Threshold;

use serde::{Deserialize, Serialize};

use crate::error::{ModelOpsError, Result};
use crate::models::Model;
use crate::schema::{Inputs, Outputs, Targets};

/// Scoring rule with a polarity
pub trait Metric: Send + Sync {
    /// Name used in reports and threshold matching
    fn name(&self) -> &str;

    /// Maximize (`true`) or minimize the score
    fn greater_is_better(&self) -> bool;

    /// Score outputs against targets
    fn score(&self, targets: &Targets, outputs: &Outputs) -> Result<f64>;

    /// Predict with `model` then score
    fn scorer(&self, model: &dyn Model, inputs: &Inputs, targets: &Targets) -> Result<f64> {
        let outputs = model.predict(inputs)?;
        self.score(targets, &outputs)
    }
}

/// Closed set of metric variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "KIND")]
pub enum MetricKind {
    AutogenMetric(AutogenMetric),
    AutogenConversationMetric(AutogenConversationMetric),
}

impl MetricKind {
    fn inner(&self) -> &dyn Metric {
        match self {
            MetricKind::AutogenMetric(m) => m,
            MetricKind::AutogenConversationMetric(m) => m,
        }
    }
}

impl Metric for MetricKind {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn greater_is_better(&self) -> bool {
        self.inner().greater_is_better()
    }

    fn score(&self, targets: &Targets, outputs: &Outputs) -> Result<f64> {
        self.inner().score(targets, outputs)
    }
}

/// Default metric set: exact match on responses
pub fn default_metrics() -> Vec<MetricKind> {
    vec![MetricKind::AutogenMetric(AutogenMetric::new(
        "exact_match",
        "exact_match",
    ))]
}

/// Row counts must match and be non-zero
pub(crate) fn check_rows(targets: usize, outputs: usize) -> Result<()> {
    if targets != outputs {
        return Err(ModelOpsError::Misaligned {
            left: targets,
            right: outputs,
        });
    }
    if targets == 0 {
        return Err(ModelOpsError::ValidationError(
            "Cannot score zero rows".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LookupModel;
    use serde_json::json;

    #[test]
    fn test_kind_tagged_config() {
        let metrics: Vec<MetricKind> = serde_json::from_value(json!([
            {"KIND": "AutogenMetric", "name": "sim", "metric_type": "similarity"},
            {"KIND": "AutogenConversationMetric", "name": "conv", "check_termination": false}
        ]))
        .unwrap();
        assert_eq!(metrics[0].name(), "sim");
        assert_eq!(metrics[1].name(), "conv");
        assert!(metrics[1].greater_is_better());
    }

    #[test]
    fn test_scorer_predicts_then_scores() {
        let mut model = LookupModel::default();
        let targets = Targets::from_pairs([("a", "1"), ("b", "2")]);
        model.fit(&targets.to_inputs(), &targets).unwrap();

        let metric = AutogenMetric::new("em", "exact_match");
        let score = metric.scorer(&model, &targets.to_inputs(), &targets).unwrap();
        assert_eq!(score, 1.0);
    }
}
