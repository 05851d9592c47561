//! Pass/fail thresholds for metric scores

use serde::{Deserialize, Serialize};

/// Immutable `(threshold, greater_is_better)` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Threshold {
    pub threshold: f64,
    pub greater_is_better: bool,
}

impl Threshold {
    pub fn new(threshold: f64, greater_is_better: bool) -> Self {
        Self {
            threshold,
            greater_is_better,
        }
    }

    /// Whether `score` passes
    pub fn evaluate(&self, score: f64) -> bool {
        if self.greater_is_better {
            score >= self.threshold
        } else {
            score <= self.threshold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greater_is_better() {
        let threshold = Threshold::new(0.5, true);
        assert!(threshold.evaluate(0.6));
        assert!(threshold.evaluate(0.5));
        assert!(!threshold.evaluate(0.4));
    }

    #[test]
    fn test_lower_is_better() {
        let threshold = Threshold::new(10.0, false);
        assert!(threshold.evaluate(3.0));
        assert!(threshold.evaluate(10.0));
        assert!(!threshold.evaluate(10.5));
    }
}
