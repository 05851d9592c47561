//! Train/test index splitters

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{ModelOpsError, Result};

/// Row indices of one `(train, test)` split
pub type Split = (Vec<usize>, Vec<usize>);

/// Produces train/test splits over `n_rows` rows
pub trait Splitter: Send + Sync {
    fn split(&self, n_rows: usize) -> Result<Vec<Split>>;
}

fn default_test_size() -> f64 {
    0.2
}

fn default_shuffle() -> bool {
    true
}

fn default_random_state() -> Option<u64> {
    Some(42)
}

/// Single holdout split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainTestSplitter {
    /// Fraction of rows in the test split, rounded up
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
    /// Seed for the shuffle; `None` draws from entropy
    #[serde(default = "default_random_state")]
    pub random_state: Option<u64>,
}

impl Default for TrainTestSplitter {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            shuffle: default_shuffle(),
            random_state: default_random_state(),
        }
    }
}

impl TrainTestSplitter {
    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }
}

impl Splitter for TrainTestSplitter {
    fn split(&self, n_rows: usize) -> Result<Vec<Split>> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ModelOpsError::invalid_parameter(
                "test_size",
                format!("must be in (0, 1), got {}", self.test_size),
            ));
        }
        let n_test = (n_rows as f64 * self.test_size).ceil() as usize;
        if n_test == 0 || n_test >= n_rows {
            return Err(ModelOpsError::ValidationError(format!(
                "Cannot split {} rows with test_size {}",
                n_rows, self.test_size
            )));
        }

        let mut indices: Vec<usize> = (0..n_rows).collect();
        if self.shuffle {
            let mut rng = match self.random_state {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            indices.shuffle(&mut rng);
        }
        let test = indices.split_off(n_rows - n_test);
        Ok(vec![(indices, test)])
    }
}

fn default_n_splits() -> usize {
    4
}

/// Expanding-window splits: every test fold follows its training rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeSeriesSplitter {
    #[serde(default = "default_n_splits")]
    pub n_splits: usize,
    /// Rows per test fold; defaults to `n_rows / (n_splits + 1)`
    #[serde(default)]
    pub test_size: Option<usize>,
}

impl Default for TimeSeriesSplitter {
    fn default() -> Self {
        Self {
            n_splits: default_n_splits(),
            test_size: None,
        }
    }
}

impl TimeSeriesSplitter {
    pub fn with_n_splits(mut self, n_splits: usize) -> Self {
        self.n_splits = n_splits;
        self
    }

    pub fn with_test_size(mut self, test_size: usize) -> Self {
        self.test_size = Some(test_size);
        self
    }
}

impl Splitter for TimeSeriesSplitter {
    fn split(&self, n_rows: usize) -> Result<Vec<Split>> {
        if self.n_splits == 0 {
            return Err(ModelOpsError::invalid_parameter("n_splits", "must be at least 1"));
        }
        let test_size = self.test_size.unwrap_or(n_rows / (self.n_splits + 1));
        let needed = test_size * self.n_splits;
        if test_size == 0 || needed >= n_rows {
            return Err(ModelOpsError::ValidationError(format!(
                "Cannot make {} time series splits of {} rows",
                self.n_splits, n_rows
            )));
        }

        Ok((0..self.n_splits)
            .map(|i| {
                let train_end = n_rows - (self.n_splits - i) * test_size;
                ((0..train_end).collect(), (train_end..train_end + test_size).collect())
            })
            .collect())
    }
}

/// Closed set of splitters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "KIND")]
pub enum SplitterKind {
    TrainTestSplitter(TrainTestSplitter),
    TimeSeriesSplitter(TimeSeriesSplitter),
}

impl Default for SplitterKind {
    fn default() -> Self {
        SplitterKind::TrainTestSplitter(TrainTestSplitter::default())
    }
}

impl Splitter for SplitterKind {
    fn split(&self, n_rows: usize) -> Result<Vec<Split>> {
        match self {
            SplitterKind::TrainTestSplitter(s) => s.split(n_rows),
            SplitterKind::TimeSeriesSplitter(s) => s.split(n_rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_test_partition() {
        let splits = TrainTestSplitter::default().split(10).unwrap();
        assert_eq!(splits.len(), 1);
        let (train, test) = &splits[0];
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let mut all: Vec<usize> = train.iter().chain(test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_train_test_seeded_and_unshuffled() {
        let splitter = TrainTestSplitter::default().with_random_state(7);
        assert_eq!(splitter.split(20).unwrap(), splitter.split(20).unwrap());

        let ordered = TrainTestSplitter::default()
            .with_shuffle(false)
            .with_test_size(0.25)
            .split(4)
            .unwrap();
        assert_eq!(ordered[0], (vec![0, 1, 2], vec![3]));
    }

    #[test]
    fn test_train_test_rejects_degenerate() {
        assert!(TrainTestSplitter::default().split(1).is_err());
        assert!(TrainTestSplitter::default().with_test_size(1.5).split(10).is_err());
    }

    #[test]
    fn test_time_series_folds() {
        let splits = TimeSeriesSplitter::default().with_n_splits(3).split(8).unwrap();
        assert_eq!(
            splits,
            vec![
                (vec![0, 1], vec![2, 3]),
                (vec![0, 1, 2, 3], vec![4, 5]),
                (vec![0, 1, 2, 3, 4, 5], vec![6, 7]),
            ]
        );
        assert!(TimeSeriesSplitter::default().split(3).is_err());
    }
}
