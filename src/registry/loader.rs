//! Model loading and the prediction adapter

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::saver::{ModelManifest, MANIFEST_FILE, MODEL_CONFIG_FILE, MODEL_FILE};
use super::store::{ArtifactStore, ModelRegistry};
use super::uri::ModelUri;
use crate::error::{ModelOpsError, Result};
use crate::models::{CancelToken, Model, ModelConfig, ModelKind};
use crate::schema::{Inputs, Outputs, Table};
use crate::signers::Signature;

/// Where the files of one bundle live
enum BundleSource<'a> {
    Store {
        store: &'a dyn ArtifactStore,
        run_id: String,
        path: String,
    },
    Dir(PathBuf),
}

impl BundleSource<'_> {
    fn exists(&self, name: &str) -> bool {
        match self {
            BundleSource::Store {
                store,
                run_id,
                path,
            } => store.exists(run_id, path, name),
            BundleSource::Dir(dir) => dir.join(name).is_file(),
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        match self {
            BundleSource::Store {
                store,
                run_id,
                path,
            } => store.fetch(run_id, path, name),
            BundleSource::Dir(dir) => Ok(fs::read(dir.join(name))?),
        }
    }
}

/// Loaded model with schema-checked prediction
#[derive(Debug)]
pub struct Adapter {
    model: ModelKind,
    manifest: ModelManifest,
}

impl Adapter {
    pub fn new(model: ModelKind, manifest: ModelManifest) -> Self {
        Self { model, manifest }
    }

    /// Rebind the model's backend
    pub fn load_context(&mut self, config: &ModelConfig) -> Result<()> {
        self.model.load_context(config)
    }

    /// Validate inputs, predict, validate outputs
    pub fn predict(&self, inputs: &Table) -> Result<Outputs> {
        self.predict_cancellable(inputs, &CancelToken::new())
    }

    pub fn predict_cancellable(&self, inputs: &Table, cancel: &CancelToken) -> Result<Outputs> {
        let inputs = Inputs::check(inputs)?;
        let outputs = self.model.predict_cancellable(&inputs, cancel)?;
        Outputs::check(outputs.table())
    }

    /// Bundle descriptor: run id, signature, flavors
    pub fn metadata(&self) -> &ModelManifest {
        &self.manifest
    }

    pub fn signature(&self) -> &Signature {
        &self.manifest.signature
    }

    pub fn model(&self) -> &ModelKind {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ModelKind {
        &mut self.model
    }

    pub fn into_model(self) -> ModelKind {
        self.model
    }
}

/// Restores a saved model from a URI
pub trait Loader: Send + Sync {
    fn load(
        &self,
        uri: &str,
        store: &dyn ArtifactStore,
        registry: &dyn ModelRegistry,
    ) -> Result<Adapter>;
}

/// Loads bundles written by [`super::CustomSaver`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomLoader {}

impl CustomLoader {
    /// Follow registry URIs to the bundle they point at
    fn resolve(&self, uri: &str, registry: &dyn ModelRegistry) -> Result<ModelUri> {
        let parsed = ModelUri::parse(uri)?;
        let version = match &parsed {
            ModelUri::Alias { name, alias } => registry.get_by_alias(name, alias)?,
            ModelUri::Version { name, version } => registry.get_version(name, *version)?,
            _ => return Ok(parsed),
        };
        debug!(uri, version = version.version, model_uri = %version.model_uri, "Resolved registry URI");

        let target = ModelUri::parse(&version.model_uri)?;
        if target.is_registry() {
            return Err(ModelOpsError::ModelNotFound(format!(
                "{} resolves to another registry URI: {}",
                uri, version.model_uri
            )));
        }
        Ok(target)
    }
}

impl Loader for CustomLoader {
    fn load(
        &self,
        uri: &str,
        store: &dyn ArtifactStore,
        registry: &dyn ModelRegistry,
    ) -> Result<Adapter> {
        let source = match self.resolve(uri, registry)? {
            ModelUri::Run { run_id, path } => BundleSource::Store {
                store,
                run_id,
                path,
            },
            ModelUri::File(dir) => BundleSource::Dir(dir),
            ModelUri::Alias { .. } | ModelUri::Version { .. } => {
                return Err(ModelOpsError::ModelNotFound(uri.to_string()))
            }
        };

        if !source.exists(MANIFEST_FILE) {
            return Err(ModelOpsError::ModelNotFound(format!(
                "No {} at {}",
                MANIFEST_FILE, uri
            )));
        }
        let manifest: ModelManifest = serde_json::from_slice(&source.read(MANIFEST_FILE)?)?;
        let mut model: ModelKind = serde_json::from_slice(&source.read(MODEL_FILE)?)?;

        if source.exists(MODEL_CONFIG_FILE) {
            let value: serde_json::Value =
                serde_json::from_slice(&source.read(MODEL_CONFIG_FILE)?)?;
            model.load_context(&ModelConfig::from_value(&value)?)?;
        } else {
            model.bind_stored_context()?;
        }

        info!(uri, kind = model.kind(), run_id = %manifest.run_id, bound = model.is_bound(), "Loaded model");
        Ok(Adapter::new(model, manifest))
    }
}

/// Closed set of loaders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "KIND")]
pub enum LoaderKind {
    CustomLoader(CustomLoader),
}

impl Default for LoaderKind {
    fn default() -> Self {
        LoaderKind::CustomLoader(CustomLoader::default())
    }
}

impl Loader for LoaderKind {
    fn load(
        &self,
        uri: &str,
        store: &dyn ArtifactStore,
        registry: &dyn ModelRegistry,
    ) -> Result<Adapter> {
        match self {
            LoaderKind::CustomLoader(l) => l.load(uri, store, registry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CustomSaver, LocalTrackingStore, Saver};
    use crate::signers::{InferSigner, Signer};
    use crate::models::{BaselineChatModel, LookupModel};
    use crate::schema::Targets;
    use tempfile::TempDir;

    fn save(store: &LocalTrackingStore, model: &ModelKind, run_id: &str) -> String {
        let inputs = Inputs::from_texts(["hi"]);
        let signature = InferSigner::default()
            .sign(&inputs, &Outputs::from_responses(["hi"]))
            .unwrap();
        CustomSaver::default()
            .save(model, &signature, &inputs, run_id, store)
            .unwrap()
            .model_uri
    }

    #[test]
    fn test_load_binds_from_bundled_config() {
        let dir = TempDir::new().unwrap();
        let store = LocalTrackingStore::open(dir.path()).unwrap();
        let config = ModelConfig::echo("echo-1").to_value().unwrap();
        let model = ModelKind::BaselineChatModel(
            BaselineChatModel::default().with_model_config_data(config),
        );
        let uri = save(&store, &model, "r1");

        let adapter = CustomLoader::default().load(&uri, &store, &store).unwrap();
        assert!(adapter.model().is_bound());
        assert_eq!(adapter.metadata().run_id, "r1");

        let outputs = adapter
            .predict(Inputs::from_texts(["ping"]).table())
            .unwrap();
        assert_eq!(outputs.responses(), vec!["ping"]);
    }

    #[test]
    fn test_load_through_alias() {
        let dir = TempDir::new().unwrap();
        let store = LocalTrackingStore::open(dir.path()).unwrap();
        let mut lookup = LookupModel::default();
        let targets = Targets::from_pairs([("q", "a")]);
        lookup.fit(&targets.to_inputs(), &targets).unwrap();
        let uri = save(&store, &ModelKind::LookupModel(lookup), "r1");

        store
            .create_version("team", &uri, Some("r1"), Default::default())
            .unwrap();
        store.set_alias("team", "Champion", 1).unwrap();

        let adapter = CustomLoader::default()
            .load("models:/team@Champion", &store, &store)
            .unwrap();
        let outputs = adapter.predict(Inputs::from_texts(["q"]).table()).unwrap();
        assert_eq!(outputs.responses(), vec!["a"]);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LocalTrackingStore::open(dir.path()).unwrap();
        let loader = LoaderKind::default();
        for uri in ["runs:/none/model", "models:/team/1", "models:/team@Champion", "ftp://x"] {
            let err = loader.load(uri, &store, &store).unwrap_err();
            assert!(matches!(err, ModelOpsError::ModelNotFound(_)), "{uri}: {err}");
        }
    }

    #[test]
    fn test_predict_rejects_bad_inputs() {
        let dir = TempDir::new().unwrap();
        let store = LocalTrackingStore::open(dir.path()).unwrap();
        let uri = save(&store, &ModelKind::LookupModel(LookupModel::default()), "r1");
        let adapter = CustomLoader::default().load(&uri, &store, &store).unwrap();
        assert!(matches!(
            adapter.predict(&Table::new()).unwrap_err(),
            ModelOpsError::Schema { .. }
        ));
    }
}
