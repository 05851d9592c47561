//! modelops - Model lifecycle engine for chat models
//!
//! Trains, evaluates, explains, registers, promotes and serves chat-based
//! models behind one interface, with lineage tracking and signature checks.
//!
//! # Modules
//!
//! ## Core
//! - [`schema`] - Tables and schema validation with coercion
//! - [`models`] - Model trait, chat and lookup models, backends
//! - [`metrics`] - Metrics, thresholds and evaluation reports
//! - [`signers`] - Input/output signatures
//! - [`registry`] - Save, register, alias and load models
//!
//! ## Workflow
//! - [`jobs`] - Training, tuning, promotion, evaluation, explanation and inference jobs
//! - [`tracking`] - Runs and dataset lineage
//! - [`data`] - CSV/Parquet readers and writers, splitters
//! - [`search`] - Grid search with cross-validation
//!
//! ## Services
//! - [`config`] - Settings and job configs
//! - [`services`] - Logging and alerts
//! - [`serving`] - HTTP prediction server
//! - [`cli`] - Command-line interface

pub mod error;

pub mod metrics;
pub mod models;
pub mod registry;
pub mod schema;
pub mod signers;

pub mod data;
pub mod jobs;
pub mod search;
pub mod tracking;

pub mod cli;
pub mod config;
pub mod services;
pub mod serving;

pub use error::{ModelOpsError, Result};

/// Prelude for common imports
pub mod prelude {
    pub use crate::error::{ModelOpsError, Result};
    pub use crate::jobs::{Job, JobConfig, JobContext, JobKind};
    pub use crate::metrics::{Metric, MetricKind, Threshold};
    pub use crate::models::{Model, ModelConfig, ModelKind};
    pub use crate::registry::{ArtifactStore, Loader, ModelRegistry, Register, Saver};
    pub use crate::schema::{Inputs, Outputs, Schema, Table, Targets};
    pub use crate::signers::{Signer, SignerKind};
}
