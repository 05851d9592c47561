//! Tracking store contracts and the filesystem implementation
//!
//! Layout under the store root:
//!
//! ```text
//! runs/<run_id>/run.json
//! runs/<run_id>/artifacts/<path>/<file>
//! registry/index.json
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::uri::uri_for_run_artifact;
use crate::error::{ModelOpsError, Result};

/// Lifecycle stage of a model version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    None,
    Staging,
    Production,
    Archived,
}

impl std::str::FromStr for Stage {
    type Err = ModelOpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Stage::None),
            "staging" => Ok(Stage::Staging),
            "production" => Ok(Stage::Production),
            "archived" => Ok(Stage::Archived),
            other => Err(ModelOpsError::ValidationError(format!(
                "Unknown stage: {}",
                other
            ))),
        }
    }
}

/// A registered model version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Registered model name
    pub name: String,
    /// Monotonic per name, starting at 1
    pub version: u64,
    /// URI of the saved bundle
    pub model_uri: String,
    /// Run that produced the bundle
    pub run_id: Option<String>,
    pub stage: Stage,
    pub tags: BTreeMap<String, String>,
    /// Aliases currently pointing at this version
    pub aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Artifact storage scoped by run
pub trait ArtifactStore: Send + Sync {
    /// Store one file under `runs:/<run_id>/<path>` and return the directory URI
    fn put(&self, run_id: &str, path: &str, name: &str, bytes: &[u8]) -> Result<String>;

    /// Fetch one file previously stored
    fn fetch(&self, run_id: &str, path: &str, name: &str) -> Result<Vec<u8>>;

    /// Whether a file exists
    fn exists(&self, run_id: &str, path: &str, name: &str) -> bool;
}

/// Versioned model registry
pub trait ModelRegistry: Send + Sync {
    /// Record the next version of `name`
    fn create_version(
        &self,
        name: &str,
        model_uri: &str,
        run_id: Option<&str>,
        tags: BTreeMap<String, String>,
    ) -> Result<ModelVersion>;

    fn get_version(&self, name: &str, version: u64) -> Result<ModelVersion>;

    /// Point `alias` at `version`, moving it off any other version
    fn set_alias(&self, name: &str, alias: &str, version: u64) -> Result<ModelVersion>;

    fn get_by_alias(&self, name: &str, alias: &str) -> Result<ModelVersion>;

    fn latest_version(&self, name: &str) -> Result<ModelVersion>;

    fn list_versions(&self, name: &str) -> Result<Vec<ModelVersion>>;

    fn transition_stage(&self, name: &str, version: u64, stage: Stage) -> Result<ModelVersion>;
}

/// Versions and aliases of one registered model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegisteredModel {
    versions: Vec<ModelVersion>,
    aliases: BTreeMap<String, u64>,
}

impl RegisteredModel {
    fn version(&self, name: &str, version: u64) -> Result<&ModelVersion> {
        self.versions
            .iter()
            .find(|v| v.version == version)
            .ok_or_else(|| ModelOpsError::ModelNotFound(format!("{} version {}", name, version)))
    }
}

/// Registry index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryIndex {
    models: BTreeMap<String, RegisteredModel>,
}

/// Filesystem tracking store: run artifacts, run records and the registry
///
/// Registry updates are read-modify-write cycles on `index.json` guarded by a
/// mutex shared between clones, so clone the store rather than opening the
/// same root twice.
#[derive(Debug, Clone)]
pub struct LocalTrackingStore {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl LocalTrackingStore {
    /// Open or create a store at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("runs")).map_err(|e| {
            ModelOpsError::StoreError(format!(
                "Failed to create store at {}: {}",
                root.display(),
                e
            ))
        })?;
        fs::create_dir_all(root.join("registry"))?;
        debug!(root = %root.display(), "Opened tracking store");
        Ok(Self {
            root,
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one run
    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        check_segment(run_id)?;
        Ok(self.root.join("runs").join(run_id))
    }

    /// Directory of an artifact path within a run
    pub fn artifact_dir(&self, run_id: &str, path: &str) -> Result<PathBuf> {
        check_relative(path)?;
        Ok(self.run_dir(run_id)?.join("artifacts").join(path))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("registry").join("index.json")
    }

    fn read_index(&self) -> Result<RegistryIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(RegistryIndex::default());
        }
        let file = File::open(&path)
            .map_err(|e| ModelOpsError::StoreError(format!("Failed to open index: {}", e)))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ModelOpsError::SerializationError(format!("Failed to read index: {}", e))
        })
    }

    fn write_index(&self, index: &RegistryIndex) -> Result<()> {
        let path = self.index_path();
        let tmp = path.with_extension("json.tmp");
        let file = File::create(&tmp)
            .map_err(|e| ModelOpsError::StoreError(format!("Failed to create index: {}", e)))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, index).map_err(|e| {
            ModelOpsError::SerializationError(format!("Failed to write index: {}", e))
        })?;
        sync_writer(writer)
            .map_err(|e| ModelOpsError::StoreError(format!("Failed to flush index: {}", e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| ModelOpsError::StoreError(format!("Failed to replace index: {}", e)))
    }

    /// Run `f` on the index under the lock and persist the result
    fn update_index<T>(&self, f: impl FnOnce(&mut RegistryIndex) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        let mut index = self.read_index()?;
        let out = f(&mut index)?;
        self.write_index(&index)?;
        Ok(out)
    }

    fn registered(&self, name: &str) -> Result<RegisteredModel> {
        let _guard = self.lock.lock();
        self.read_index()?
            .models
            .remove(name)
            .ok_or_else(|| ModelOpsError::ModelNotFound(format!("Registered model: {}", name)))
    }

    /// Names of all registered models
    pub fn list_models(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_index()?.models.keys().cloned().collect())
    }
}

/// Flush buffered bytes and sync the file before it replaces a live one
pub(crate) fn sync_writer(mut writer: BufWriter<File>) -> io::Result<()> {
    writer.flush()?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()
}

/// A single path segment: non-empty, no separators, no `..`
fn check_segment(segment: &str) -> Result<()> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains(['/', '\\']) {
        return Err(ModelOpsError::StoreError(format!(
            "Invalid path segment: {:?}",
            segment
        )));
    }
    Ok(())
}

/// A relative path that stays inside its parent
fn check_relative(path: &str) -> Result<()> {
    let ok = !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !ok {
        return Err(ModelOpsError::StoreError(format!(
            "Invalid artifact path: {:?}",
            path
        )));
    }
    Ok(())
}

impl ArtifactStore for LocalTrackingStore {
    fn put(&self, run_id: &str, path: &str, name: &str, bytes: &[u8]) -> Result<String> {
        check_segment(name)?;
        let dir = self.artifact_dir(run_id, path)?;
        fs::create_dir_all(&dir).map_err(|e| {
            ModelOpsError::StoreError(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        fs::write(dir.join(name), bytes).map_err(|e| {
            ModelOpsError::StoreError(format!("Failed to write artifact {}: {}", name, e))
        })?;
        debug!(run_id, path, name, bytes = bytes.len(), "Stored artifact");
        Ok(uri_for_run_artifact(run_id, path))
    }

    fn fetch(&self, run_id: &str, path: &str, name: &str) -> Result<Vec<u8>> {
        check_segment(name)?;
        let file = self.artifact_dir(run_id, path)?.join(name);
        fs::read(&file).map_err(|e| {
            ModelOpsError::StoreError(format!("Failed to read {}: {}", file.display(), e))
        })
    }

    fn exists(&self, run_id: &str, path: &str, name: &str) -> bool {
        check_segment(name).is_ok()
            && self
                .artifact_dir(run_id, path)
                .map(|dir| dir.join(name).is_file())
                .unwrap_or(false)
    }
}

impl ModelRegistry for LocalTrackingStore {
    fn create_version(
        &self,
        name: &str,
        model_uri: &str,
        run_id: Option<&str>,
        tags: BTreeMap<String, String>,
    ) -> Result<ModelVersion> {
        if name.trim().is_empty() {
            return Err(ModelOpsError::Registration(
                "Model name must not be empty".to_string(),
            ));
        }
        let version = self.update_index(|index| {
            let model = index.models.entry(name.to_string()).or_default();
            let next = model.versions.iter().map(|v| v.version).max().unwrap_or(0) + 1;
            let version = ModelVersion {
                name: name.to_string(),
                version: next,
                model_uri: model_uri.to_string(),
                run_id: run_id.map(String::from),
                stage: Stage::None,
                tags,
                aliases: Vec::new(),
                created_at: Utc::now(),
            };
            model.versions.push(version.clone());
            Ok(version)
        })?;
        info!(name, version = version.version, model_uri, "Registered model version");
        Ok(version)
    }

    fn get_version(&self, name: &str, version: u64) -> Result<ModelVersion> {
        self.registered(name)?.version(name, version).cloned()
    }

    fn set_alias(&self, name: &str, alias: &str, version: u64) -> Result<ModelVersion> {
        if alias.trim().is_empty() {
            return Err(ModelOpsError::ValidationError(
                "Alias must not be empty".to_string(),
            ));
        }
        let updated = self.update_index(|index| {
            let model = index.models.get_mut(name).ok_or_else(|| {
                ModelOpsError::ModelNotFound(format!("Registered model: {}", name))
            })?;
            model.version(name, version)?;

            model.aliases.insert(alias.to_string(), version);
            for v in model.versions.iter_mut() {
                v.aliases.retain(|a| a != alias);
                if v.version == version {
                    v.aliases.push(alias.to_string());
                }
            }
            model.version(name, version).cloned()
        })?;
        info!(name, alias, version, "Set model alias");
        Ok(updated)
    }

    fn get_by_alias(&self, name: &str, alias: &str) -> Result<ModelVersion> {
        let model = self.registered(name)?;
        let version = model.aliases.get(alias).copied().ok_or_else(|| {
            ModelOpsError::ModelNotFound(format!("{} has no alias {}", name, alias))
        })?;
        model.version(name, version).cloned()
    }

    fn latest_version(&self, name: &str) -> Result<ModelVersion> {
        self.registered(name)?
            .versions
            .into_iter()
            .max_by_key(|v| v.version)
            .ok_or_else(|| ModelOpsError::ModelNotFound(format!("{} has no versions", name)))
    }

    fn list_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        let mut versions = self.registered(name)?.versions;
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    fn transition_stage(&self, name: &str, version: u64, stage: Stage) -> Result<ModelVersion> {
        let updated = self.update_index(|index| {
            let model = index.models.get_mut(name).ok_or_else(|| {
                ModelOpsError::ModelNotFound(format!("Registered model: {}", name))
            })?;
            let entry = model
                .versions
                .iter_mut()
                .find(|v| v.version == version)
                .ok_or_else(|| {
                    ModelOpsError::ModelNotFound(format!("{} version {}", name, version))
                })?;
            entry.stage = stage;
            Ok(entry.clone())
        })?;
        info!(name, version, stage = ?stage, "Transitioned model stage");
        Ok(updated)
    }
}
