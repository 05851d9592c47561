//! Hyperparameter search
//!
//! [`GridCVSearcher`] scores every combination of a parameter grid with
//! cross-validation and keeps the best one by the metric's polarity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::data::{Splitter, SplitterKind};
use crate::error::{ModelOpsError, Result};
use crate::metrics::{Metric, MetricKind};
use crate::models::{Model, ModelKind, Params};
use crate::schema::{Inputs, Targets};

/// Cross-validated score of one parameter combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub params: Params,
    pub scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
}

impl Candidate {
    fn from_scores(params: Params, scores: Vec<f64>) -> Self {
        let n = scores.len().max(1) as f64;
        let mean_score = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n;
        Self {
            params,
            scores,
            mean_score,
            std_score: variance.sqrt(),
        }
    }
}

/// Every candidate plus the winner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub candidates: Vec<Candidate>,
    pub best_params: Params,
    pub best_score: f64,
}

/// Searches model hyperparameters
pub trait Searcher: Send + Sync {
    fn search(
        &self,
        model: &ModelKind,
        metric: &MetricKind,
        inputs: &Inputs,
        targets: &Targets,
        splitter: &SplitterKind,
    ) -> Result<SearchResults>;
}

/// Exhaustive search over a parameter grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridCVSearcher {
    /// Candidate values per hyperparameter
    #[serde(default)]
    pub param_grid: BTreeMap<String, Vec<Value>>,
}

impl GridCVSearcher {
    pub fn with_param(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.param_grid.insert(name.into(), values);
        self
    }

    /// Cartesian product of the grid, keys in sorted order
    pub fn combinations(&self) -> Result<Vec<Params>> {
        let mut combinations = vec![Params::new()];
        for (name, values) in &self.param_grid {
            if values.is_empty() {
                return Err(ModelOpsError::invalid_parameter(
                    name,
                    "param_grid entry has no values",
                ));
            }
            combinations = combinations
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |value| {
                        let mut next = base.clone();
                        next.insert(name.clone(), value.clone());
                        next
                    })
                })
                .collect();
        }
        Ok(combinations)
    }

    fn cross_validate(
        &self,
        model: &ModelKind,
        params: &Params,
        metric: &MetricKind,
        inputs: &Inputs,
        targets: &Targets,
        splits: &[(Vec<usize>, Vec<usize>)],
    ) -> Result<Vec<f64>> {
        let mut scores = Vec::with_capacity(splits.len());
        for (train, test) in splits {
            let mut candidate = model.clone();
            candidate.set_params(params.clone())?;
            candidate.fit(&inputs.take(train)?, &targets.take(train)?)?;
            let score = metric.scorer(&candidate, &inputs.take(test)?, &targets.take(test)?)?;
            scores.push(score);
        }
        Ok(scores)
    }
}

impl Searcher for GridCVSearcher {
    fn search(
        &self,
        model: &ModelKind,
        metric: &MetricKind,
        inputs: &Inputs,
        targets: &Targets,
        splitter: &SplitterKind,
    ) -> Result<SearchResults> {
        if inputs.len() != targets.len() {
            return Err(ModelOpsError::Misaligned {
                left: inputs.len(),
                right: targets.len(),
            });
        }
        let combinations = self.combinations()?;
        let splits = splitter.split(inputs.len())?;
        info!(
            candidates = combinations.len(),
            folds = splits.len(),
            metric = metric.name(),
            "Starting grid search"
        );

        let mut candidates = Vec::with_capacity(combinations.len());
        for params in combinations {
            let scores = self.cross_validate(model, &params, metric, inputs, targets, &splits)?;
            let candidate = Candidate::from_scores(params, scores);
            debug!(params = ?candidate.params, mean_score = candidate.mean_score, "Scored candidate");
            candidates.push(candidate);
        }

        let greater_is_better = metric.greater_is_better();
        let best = candidates
            .iter()
            .fold(None::<&Candidate>, |best, c| match best {
                Some(b)
                    if (greater_is_better && b.mean_score >= c.mean_score)
                        || (!greater_is_better && b.mean_score <= c.mean_score) =>
                {
                    Some(b)
                }
                _ => Some(c),
            })
            .ok_or_else(|| ModelOpsError::ValidationError("No candidates to search".to_string()))?;

        let (best_params, best_score) = (best.params.clone(), best.mean_score);
        info!(best_params = ?best_params, best_score, "Grid search finished");
        Ok(SearchResults {
            candidates,
            best_params,
            best_score,
        })
    }
}

/// Closed set of searchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "KIND")]
pub enum SearcherKind {
    GridCVSearcher(GridCVSearcher),
}

impl Default for SearcherKind {
    fn default() -> Self {
        SearcherKind::GridCVSearcher(GridCVSearcher::default())
    }
}

impl Searcher for SearcherKind {
    fn search(
        &self,
        model: &ModelKind,
        metric: &MetricKind,
        inputs: &Inputs,
        targets: &Targets,
        splitter: &SplitterKind,
    ) -> Result<SearchResults> {
        match self {
            SearcherKind::GridCVSearcher(s) => s.search(model, metric, inputs, targets, splitter),
        }
    }
}
