//! Model bundle saving

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::store::ArtifactStore;
use crate::error::{ModelOpsError, Result};
use crate::models::{Model, ModelKind};
use crate::schema::Inputs;
use crate::signers::Signature;

pub const MODEL_FILE: &str = "model.json";
pub const MODEL_CONFIG_FILE: &str = "model_config.json";
pub const SIGNATURE_FILE: &str = "signature.json";
pub const INPUT_EXAMPLE_FILE: &str = "input_example.json";
pub const MANIFEST_FILE: &str = "MLmodel.json";

/// Flavor recorded for every bundle
pub const PYFUNC_FLAVOR: &str = "python_function";
/// Flavor naming this crate's loader
pub const MODELOPS_FLAVOR: &str = "modelops";

/// Descriptor written as `MLmodel.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// `KIND` of the saved model
    pub kind: String,
    pub flavors: Vec<String>,
    pub run_id: String,
    pub artifact_path: String,
    pub signature: Signature,
    pub saved_at: DateTime<Utc>,
    /// Whether `model_config.json` is part of the bundle
    pub has_config: bool,
}

/// Result of a save, immutable once returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub model_uri: String,
    pub run_id: String,
    pub signature: Signature,
    pub flavors: Vec<String>,
    pub artifact_path: String,
    /// Written to the local fallback directory instead of the store
    pub fallback: bool,
}

/// Persists a model bundle
pub trait Saver: Send + Sync {
    fn save(
        &self,
        model: &ModelKind,
        signature: &Signature,
        input_example: &Inputs,
        run_id: &str,
        store: &dyn ArtifactStore,
    ) -> Result<Info>;
}

fn default_path() -> String {
    "model".to_string()
}

fn default_strict() -> bool {
    true
}

fn default_fallback_dir() -> PathBuf {
    PathBuf::from("fallback_models")
}

/// Saves the model, its config and its signature as a bundle of JSON files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomSaver {
    /// Artifact path within the run
    #[serde(default = "default_path")]
    pub path: String,
    /// Propagate store failures instead of falling back to a local directory
    #[serde(default = "default_strict")]
    pub strict_registry: bool,
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: PathBuf,
}

impl Default for CustomSaver {
    fn default() -> Self {
        Self {
            path: default_path(),
            strict_registry: default_strict(),
            fallback_dir: default_fallback_dir(),
        }
    }
}

impl CustomSaver {
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_strict_registry(mut self, strict: bool) -> Self {
        self.strict_registry = strict;
        self
    }

    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = dir.into();
        self
    }

    /// Serialized files of the bundle, manifest last
    fn bundle(
        &self,
        model: &ModelKind,
        signature: &Signature,
        input_example: &Inputs,
        run_id: &str,
    ) -> Result<Vec<(&'static str, Vec<u8>)>> {
        let mut files = vec![(MODEL_FILE, serde_json::to_vec_pretty(model)?)];

        let config = config_bytes(model)?;
        let has_config = config.is_some();
        if let Some(bytes) = config {
            files.push((MODEL_CONFIG_FILE, bytes));
        }

        files.push((SIGNATURE_FILE, serde_json::to_vec_pretty(signature)?));
        files.push((
            INPUT_EXAMPLE_FILE,
            serde_json::to_vec_pretty(&input_example.table().to_json_columns())?,
        ));

        let manifest = ModelManifest {
            kind: model.kind().to_string(),
            flavors: flavors(),
            run_id: run_id.to_string(),
            artifact_path: self.path.clone(),
            signature: signature.clone(),
            saved_at: Utc::now(),
            has_config,
        };
        files.push((MANIFEST_FILE, serde_json::to_vec_pretty(&manifest)?));
        Ok(files)
    }

    fn save_to_store(
        &self,
        files: &[(&'static str, Vec<u8>)],
        run_id: &str,
        store: &dyn ArtifactStore,
    ) -> Result<String> {
        let mut uri = String::new();
        for (name, bytes) in files {
            uri = store.put(run_id, &self.path, name, bytes)?;
        }
        Ok(uri)
    }

    fn save_to_fallback(&self, files: &[(&'static str, Vec<u8>)], run_id: &str) -> Result<String> {
        let dir = self.fallback_dir.join(run_id).join(&self.path);
        fs::create_dir_all(&dir)?;
        for (name, bytes) in files {
            fs::write(dir.join(name), bytes)?;
        }
        let dir = absolute(&dir)?;
        Ok(format!("file://{}", dir.display()))
    }
}

impl Saver for CustomSaver {
    fn save(
        &self,
        model: &ModelKind,
        signature: &Signature,
        input_example: &Inputs,
        run_id: &str,
        store: &dyn ArtifactStore,
    ) -> Result<Info> {
        let files = self.bundle(model, signature, input_example, run_id)?;

        let (model_uri, fallback) = match self.save_to_store(&files, run_id, store) {
            Ok(uri) => (uri, false),
            Err(e) if self.strict_registry => return Err(e),
            Err(e) => {
                warn!(
                    error = %e,
                    fallback_dir = %self.fallback_dir.display(),
                    "Tracking store rejected the model; saving to local fallback"
                );
                (self.save_to_fallback(&files, run_id)?, true)
            }
        };

        info!(model_uri = %model_uri, run_id, kind = model.kind(), fallback, "Saved model");
        Ok(Info {
            model_uri,
            run_id: run_id.to_string(),
            signature: signature.clone(),
            flavors: flavors(),
            artifact_path: self.path.clone(),
            fallback,
        })
    }
}

fn flavors() -> Vec<String> {
    vec![PYFUNC_FLAVOR.to_string(), MODELOPS_FLAVOR.to_string()]
}

/// Config file contents, preferring the referenced file over inline data
fn config_bytes(model: &ModelKind) -> Result<Option<Vec<u8>>> {
    if let Some(path) = model.model_config_path() {
        let bytes = fs::read(path).map_err(|e| {
            ModelOpsError::ConfigError(format!("Failed to read model config {}: {}", path, e))
        })?;
        return Ok(Some(bytes));
    }
    match model.model_config_data() {
        Some(data) => Ok(Some(serde_json::to_vec_pretty(data)?)),
        None => Ok(None),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Closed set of savers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "KIND")]
pub enum SaverKind {
    CustomSaver(CustomSaver),
}

impl Default for SaverKind {
    fn default() -> Self {
        SaverKind::CustomSaver(CustomSaver::default())
    }
}

impl Saver for SaverKind {
    fn save(
        &self,
        model: &ModelKind,
        signature: &Signature,
        input_example: &Inputs,
        run_id: &str,
        store: &dyn ArtifactStore,
    ) -> Result<Info> {
        match self {
            SaverKind::CustomSaver(s) => s.save(model, signature, input_example, run_id, store),
        }
    }
}
