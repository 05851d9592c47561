//! Error types for the modelops engine

use thiserror::Error;

use crate::models::BackendError;

/// Result type alias for modelops operations
pub type Result<T> = std::result::Result<T, ModelOpsError>;

/// Kind of schema violation found while checking a table
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaViolation {
    #[error("missing required column")]
    MissingColumn,

    #[error("expected {expected}, got {actual}")]
    WrongType { expected: String, actual: String },

    #[error("null value at row {row} in a non-nullable column")]
    NullValue { row: usize },

    #[error("unexpected column in strict schema")]
    UnexpectedColumn,
}

/// Main error type for the modelops engine
#[derive(Error, Debug)]
pub enum ModelOpsError {
    #[error("Schema error on column '{column}': {reason}")]
    Schema {
        column: String,
        reason: SchemaViolation,
    },

    #[error("Unknown metric type: {0}")]
    UnknownMetricType(String),

    #[error("Model is not initialized: {0}")]
    NotBound(String),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("Prediction failed on row {row}: {source}")]
    Prediction {
        row: usize,
        #[source]
        source: BackendError,
    },

    #[error("Invalid parameter: {name}, {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("{kind} does not support {capability}")]
    NotImplementedCapability {
        kind: &'static str,
        capability: &'static str,
    },

    #[error("Rows are not aligned: {left} vs {right}")]
    Misaligned { left: usize, right: usize },

    #[error("Operation cancelled after {completed} rows")]
    Cancelled { completed: usize },

    #[error("Thresholds failed for metrics: {}", .0.join(", "))]
    ThresholdFailed(Vec<String>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ModelOpsError {
    /// Build a schema error for a column
    pub fn schema(column: impl Into<String>, reason: SchemaViolation) -> Self {
        ModelOpsError::Schema {
            column: column.into(),
            reason,
        }
    }

    /// Build an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelOpsError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for ModelOpsError {
    fn from(err: polars::error::PolarsError) -> Self {
        ModelOpsError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ModelOpsError {
    fn from(err: serde_json::Error) -> Self {
        ModelOpsError::SerializationError(err.to_string())
    }
}
