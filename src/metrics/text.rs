//! Text metrics over the `response` columns

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{sequence, Metric};
use crate::error::{ModelOpsError, Result};
use crate::schema::{Outputs, Targets};

/// Scoring mode of [`AutogenMetric`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMetricType {
    ExactMatch,
    Similarity,
    LengthRatio,
}

impl FromStr for TextMetricType {
    type Err = ModelOpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact_match" => Ok(TextMetricType::ExactMatch),
            "similarity" => Ok(TextMetricType::Similarity),
            "length_ratio" => Ok(TextMetricType::LengthRatio),
            other => Err(ModelOpsError::UnknownMetricType(other.to_string())),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_metric_type() -> String {
    "similarity".to_string()
}

fn default_similarity_threshold() -> f64 {
    0.7
}

/// Compares predicted and expected responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutogenMetric {
    /// Name used for reporting and threshold matching
    pub name: String,
    #[serde(default = "default_true")]
    pub greater_is_better: bool,
    /// One of `exact_match`, `similarity`, `length_ratio`
    #[serde(default = "default_metric_type")]
    pub metric_type: String,
    /// Minimum ratio counted as similar
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl AutogenMetric {
    pub fn new(name: impl Into<String>, metric_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            greater_is_better: true,
            metric_type: metric_type.into(),
            similarity_threshold: default_similarity_threshold(),
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_greater_is_better(mut self, greater_is_better: bool) -> Self {
        self.greater_is_better = greater_is_better;
        self
    }

    fn exact_match(y_true: &[&str], y_pred: &[&str]) -> f64 {
        let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
        hits as f64 / y_true.len() as f64
    }

    fn similarity(&self, y_true: &[&str], y_pred: &[&str]) -> f64 {
        let hits = y_true
            .iter()
            .zip(y_pred)
            .filter(|(t, p)| sequence::ratio(t, p) >= self.similarity_threshold)
            .count();
        hits as f64 / y_true.len() as f64
    }

    fn length_ratio(y_true: &[&str], y_pred: &[&str]) -> f64 {
        let total: f64 = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| {
                let expected = t.chars().count().max(1);
                p.chars().count() as f64 / expected as f64
            })
            .sum();
        total / y_true.len() as f64
    }
}

impl Metric for AutogenMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn greater_is_better(&self) -> bool {
        self.greater_is_better
    }

    fn score(&self, targets: &Targets, outputs: &Outputs) -> Result<f64> {
        let metric_type: TextMetricType = self.metric_type.parse()?;
        let y_true = targets.responses();
        let y_pred = outputs.responses();
        super::check_rows(y_true.len(), y_pred.len())?;

        Ok(match metric_type {
            TextMetricType::ExactMatch => Self::exact_match(&y_true, &y_pred),
            TextMetricType::Similarity => self.similarity(&y_true, &y_pred),
            TextMetricType::LengthRatio => Self::length_ratio(&y_true, &y_pred),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(metric: &AutogenMetric, truth: &[&str], pred: &[&str]) -> Result<f64> {
        let targets = Targets::from_pairs(truth.iter().map(|t| ("q", *t)));
        let outputs = Outputs::from_responses(pred.iter().copied());
        metric.score(&targets, &outputs)
    }

    #[test]
    fn test_exact_match() {
        let metric = AutogenMetric::new("em", "exact_match");
        let all = score(&metric, &["cat", "dog", "bird"], &["cat", "dog", "bird"]).unwrap();
        assert_eq!(all, 1.0);
        let none = score(&metric, &["a", "b"], &["x", "y"]).unwrap();
        assert_eq!(none, 0.0);
        let some = score(
            &metric,
            &["apple", "banana", "cherry"],
            &["apple", "berry", "cherry"],
        )
        .unwrap();
        assert!((some - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_exact_match_is_case_sensitive() {
        let metric = AutogenMetric::new("em", "exact_match");
        assert_eq!(score(&metric, &["Cat"], &["cat"]).unwrap(), 0.0);
        assert_eq!(score(&metric, &["cat "], &["cat"]).unwrap(), 0.0);
    }

    #[test]
    fn test_similarity() {
        let metric = AutogenMetric::new("sim", "similarity");
        assert_eq!(
            score(&metric, &["apple", "banana"], &["app", "bananna"]).unwrap(),
            1.0
        );

        let strict = metric.clone().with_similarity_threshold(0.8);
        assert_eq!(
            score(&strict, &["hello world", "foo bar"], &["helo world", "foo baz"]).unwrap(),
            1.0
        );

        let stricter = metric.with_similarity_threshold(0.9);
        assert_eq!(
            score(&stricter, &["hello world", "foo bar"], &["helo world", "foo baz"]).unwrap(),
            0.5
        );
    }

    #[test]
    fn test_length_ratio() {
        let metric = AutogenMetric::new("len", "length_ratio");
        let value = score(
            &metric,
            &["short", "medium text", "longer text"],
            &["shorter", "medium", "longer"],
        )
        .unwrap();
        let expected = (7.0 / 5.0 + 6.0 / 11.0 + 6.0 / 11.0) / 3.0;
        assert!((value - expected).abs() < 1e-9);
        assert!((value - 0.8303).abs() < 1e-4);

        assert_eq!(score(&metric, &["same"], &["same"]).unwrap(), 1.0);
        assert_eq!(score(&metric, &[""], &["abc"]).unwrap(), 3.0);
    }

    #[test]
    fn test_unknown_type() {
        let metric = AutogenMetric::new("x", "bleu");
        assert!(matches!(
            score(&metric, &["a"], &["a"]).unwrap_err(),
            ModelOpsError::UnknownMetricType(t) if t == "bleu"
        ));
    }

    #[test]
    fn test_misaligned_and_empty() {
        let metric = AutogenMetric::new("em", "exact_match");
        assert!(matches!(
            score(&metric, &["a", "b"], &["a"]).unwrap_err(),
            ModelOpsError::Misaligned { left: 2, right: 1 }
        ));
        assert!(matches!(
            score(&metric, &[], &[]).unwrap_err(),
            ModelOpsError::ValidationError(_)
        ));
    }

    #[test]
    fn test_defaults_from_json() {
        let metric: AutogenMetric = serde_json::from_str(r#"{"name": "m"}"#).unwrap();
        assert_eq!(metric.metric_type, "similarity");
        assert_eq!(metric.similarity_threshold, 0.7);
        assert!(metric.greater_is_better);
    }
}
