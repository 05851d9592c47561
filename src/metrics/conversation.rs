//! Conversation quality metric over output metadata

use serde::{Deserialize, Serialize};

use super::Metric;
use crate::error::Result;
use crate::schema::{OutputRecord, Outputs, Targets};

fn default_true() -> bool {
    true
}

/// Scores termination and absence of error messages
///
/// Rows without metadata count as not terminated and error-free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutogenConversationMetric {
    pub name: String,
    #[serde(default = "default_true")]
    pub greater_is_better: bool,
    #[serde(default = "default_true")]
    pub check_termination: bool,
    #[serde(default = "default_true")]
    pub check_error_messages: bool,
}

impl AutogenConversationMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            greater_is_better: true,
            check_termination: true,
            check_error_messages: true,
        }
    }

    pub fn with_checks(mut self, termination: bool, error_messages: bool) -> Self {
        self.check_termination = termination;
        self.check_error_messages = error_messages;
        self
    }
}

/// Marker message a conversation emits when it failed
pub const ERROR_MARKER: &str = "error";

/// Whether a message is exactly the error marker
pub fn is_error_marker(message: &str) -> bool {
    message == ERROR_MARKER
}

fn terminated(record: &OutputRecord) -> bool {
    record.metadata.as_ref().map(|m| m.terminated).unwrap_or(false)
}

fn has_error(record: &OutputRecord) -> bool {
    record
        .metadata
        .as_ref()
        .map(|m| m.messages.iter().any(|msg| is_error_marker(msg)))
        .unwrap_or(false)
}

impl Metric for AutogenConversationMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn greater_is_better(&self) -> bool {
        self.greater_is_better
    }

    fn score(&self, _targets: &Targets, outputs: &Outputs) -> Result<f64> {
        if !self.check_termination && !self.check_error_messages {
            return Ok(1.0);
        }
        let records = outputs.records();
        super::check_rows(records.len(), records.len())?;
        let rows = records.len() as f64;

        let mut score = 1.0;
        if self.check_termination {
            score *= records.iter().filter(|r| terminated(r)).count() as f64 / rows;
        }
        if self.check_error_messages {
            score *= 1.0 - records.iter().filter(|r| has_error(r)).count() as f64 / rows;
        }
        Ok(score)
    }
}
