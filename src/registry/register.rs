//! Model registration

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::saver::MANIFEST_FILE;
use super::store::{ArtifactStore, ModelRegistry, ModelVersion};
use super::uri::ModelUri;
use crate::error::{ModelOpsError, Result};

/// Records a saved bundle as a new model version
pub trait Register: Send + Sync {
    fn register(
        &self,
        name: &str,
        model_uri: &str,
        run_id: Option<&str>,
        store: &dyn ArtifactStore,
        registry: &dyn ModelRegistry,
    ) -> Result<ModelVersion>;
}

/// Registers into the tracking store's registry with fixed tags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreRegister {
    /// Tags attached to every registered version
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl StoreRegister {
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Whether `model_uri` points at a saved bundle
fn check_bundle(model_uri: &str, store: &dyn ArtifactStore) -> Result<()> {
    let parsed = ModelUri::parse(model_uri)
        .map_err(|_| ModelOpsError::Registration(format!("Unsupported model URI: {}", model_uri)))?;
    let found = match &parsed {
        ModelUri::Run { run_id, path } => store.exists(run_id, path, MANIFEST_FILE),
        ModelUri::File(dir) => dir.join(MANIFEST_FILE).is_file(),
        ModelUri::Alias { .. } | ModelUri::Version { .. } => {
            return Err(ModelOpsError::Registration(format!(
                "Cannot register a registry URI: {}",
                model_uri
            )))
        }
    };
    if found {
        Ok(())
    } else {
        Err(ModelOpsError::Registration(format!(
            "No saved model at {}",
            model_uri
        )))
    }
}

impl Register for StoreRegister {
    fn register(
        &self,
        name: &str,
        model_uri: &str,
        run_id: Option<&str>,
        store: &dyn ArtifactStore,
        registry: &dyn ModelRegistry,
    ) -> Result<ModelVersion> {
        check_bundle(model_uri, store)?;
        let version = registry
            .create_version(name, model_uri, run_id, self.tags.clone())
            .map_err(|e| match e {
                ModelOpsError::Registration(_) => e,
                other => ModelOpsError::Registration(other.to_string()),
            })?;
        info!(name, version = version.version, model_uri, "Model registered");
        Ok(version)
    }
}

/// Closed set of registers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "KIND")]
pub enum RegisterKind {
    StoreRegister(StoreRegister),
}

impl Default for RegisterKind {
    fn default() -> Self {
        RegisterKind::StoreRegister(StoreRegister::default())
    }
}

impl Register for RegisterKind {
    fn register(
        &self,
        name: &str,
        model_uri: &str,
        run_id: Option<&str>,
        store: &dyn ArtifactStore,
        registry: &dyn ModelRegistry,
    ) -> Result<ModelVersion> {
        match self {
            RegisterKind::StoreRegister(r) => r.register(name, model_uri, run_id, store, registry),
        }
    }
}
