//! Integration test: save → register → alias → load
//! Tests: bundle round trips, alias repointing, fallback saving when the store fails

use modelops::error::{ModelOpsError, Result};
use modelops::models::{LookupModel, Model, ModelKind};
use modelops::registry::{
    uri_for_model_alias, uri_for_model_version, ArtifactStore, CustomLoader, CustomSaver,
    LocalTrackingStore, Loader, ModelRegistry, Register, Saver, StoreRegister,
};
use modelops::registry::saver::MANIFEST_FILE;
use modelops::schema::{Inputs, Outputs, Table, Targets};
use modelops::signers::{InferSigner, Signature, Signer};
use tempfile::TempDir;

/// Store that rejects every write
struct ReadOnlyStore;

impl ArtifactStore for ReadOnlyStore {
    fn put(&self, _run_id: &str, _path: &str, _name: &str, _bytes: &[u8]) -> Result<String> {
        Err(ModelOpsError::StoreError("store is read-only".to_string()))
    }

    fn fetch(&self, _run_id: &str, _path: &str, name: &str) -> Result<Vec<u8>> {
        Err(ModelOpsError::StoreError(format!("{} not found", name)))
    }

    fn exists(&self, _run_id: &str, _path: &str, _name: &str) -> bool {
        false
    }
}

fn fitted(pairs: &[(&str, &str)]) -> ModelKind {
    let mut model = ModelKind::LookupModel(LookupModel::default());
    let targets = Targets::from_pairs(pairs.iter().copied());
    model.fit(&targets.to_inputs(), &targets).unwrap();
    model
}

fn signature() -> Signature {
    InferSigner::default()
        .sign(&Inputs::from_texts(["a"]), &Outputs::from_responses(["b"]))
        .unwrap()
}

fn inputs_table(texts: &[&str]) -> Table {
    Inputs::from_texts(texts.iter().copied()).into_table()
}

fn save_and_register(store: &LocalTrackingStore, model: &ModelKind, run_id: &str) -> u64 {
    let info = CustomSaver::default()
        .save(model, &signature(), &Inputs::from_texts(["a"]), run_id, store)
        .unwrap();
    StoreRegister::default()
        .register("team", &info.model_uri, Some(run_id), store, store)
        .unwrap()
        .version
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_saved_model_loads_by_version_and_alias() {
    let dir = TempDir::new().unwrap();
    let store = LocalTrackingStore::open(dir.path()).unwrap();
    let model = fitted(&[("ping", "pong")]);

    let version = save_and_register(&store, &model, "run1");
    assert_eq!(version, 1);
    store.set_alias("team", "Champion", version).unwrap();

    for uri in [uri_for_model_version("team", 1), uri_for_model_alias("team", "Champion")] {
        let adapter = CustomLoader::default().load(&uri, &store, &store).unwrap();
        assert_eq!(adapter.metadata().kind, "LookupModel");
        assert_eq!(adapter.metadata().run_id, "run1");
        let outputs = adapter.predict(&inputs_table(&["ping"])).unwrap();
        assert_eq!(outputs.responses(), vec!["pong"]);
    }
}

#[test]
fn test_alias_follows_promotions() {
    let dir = TempDir::new().unwrap();
    let store = LocalTrackingStore::open(dir.path()).unwrap();

    for (run, answer) in [("r1", "one"), ("r2", "two"), ("r3", "three")] {
        save_and_register(&store, &fitted(&[("q", answer)]), run);
    }
    let versions: Vec<u64> = store
        .list_versions("team")
        .unwrap()
        .iter()
        .map(|v| v.version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);

    let loader = CustomLoader::default();
    let champion = uri_for_model_alias("team", "Champion");

    store.set_alias("team", "Champion", 2).unwrap();
    let adapter = loader.load(&champion, &store, &store).unwrap();
    assert_eq!(adapter.predict(&inputs_table(&["q"])).unwrap().responses(), vec!["two"]);

    store.set_alias("team", "Champion", 3).unwrap();
    let adapter = loader.load(&champion, &store, &store).unwrap();
    assert_eq!(adapter.predict(&inputs_table(&["q"])).unwrap().responses(), vec!["three"]);
}

#[test]
fn test_load_checks_inputs_against_schema() {
    let dir = TempDir::new().unwrap();
    let store = LocalTrackingStore::open(dir.path()).unwrap();
    save_and_register(&store, &fitted(&[("ping", "pong")]), "run1");

    let adapter = CustomLoader::default()
        .load(&uri_for_model_version("team", 1), &store, &store)
        .unwrap();
    let bad = Table::from_json_columns(
        serde_json::json!({"text": ["ping"]}).as_object().unwrap(),
    )
    .unwrap();
    assert!(matches!(
        adapter.predict(&bad).unwrap_err(),
        ModelOpsError::Schema { .. }
    ));
}

// ============================================================================
// Fallback saving
// ============================================================================

#[test]
fn test_strict_saver_propagates_store_errors() {
    let err = CustomSaver::default()
        .save(
            &fitted(&[("a", "b")]),
            &signature(),
            &Inputs::from_texts(["a"]),
            "run1",
            &ReadOnlyStore,
        )
        .unwrap_err();
    assert!(matches!(err, ModelOpsError::StoreError(_)));
}

#[test]
fn test_lenient_saver_falls_back_to_local_dir() {
    let dir = TempDir::new().unwrap();
    let fallback = dir.path().join("fallback_models");
    let info = CustomSaver::default()
        .with_strict_registry(false)
        .with_fallback_dir(&fallback)
        .save(
            &fitted(&[("ping", "pong")]),
            &signature(),
            &Inputs::from_texts(["ping"]),
            "run1",
            &ReadOnlyStore,
        )
        .unwrap();

    assert!(info.fallback);
    assert!(info.model_uri.starts_with("file://"));
    let bundle = fallback.join("run1").join("model");
    assert!(bundle.join(MANIFEST_FILE).is_file());

    // A fallback bundle can still be registered and loaded by version
    let store = LocalTrackingStore::open(dir.path().join("mlruns")).unwrap();
    let version = StoreRegister::default()
        .register("team", &info.model_uri, Some("run1"), &store, &store)
        .unwrap();
    assert_eq!(version.model_uri, info.model_uri);

    let adapter = CustomLoader::default()
        .load(&uri_for_model_version("team", 1), &store, &store)
        .unwrap();
    assert_eq!(
        adapter.predict(&inputs_table(&["ping"])).unwrap().responses(),
        vec!["pong"]
    );
}

#[test]
fn test_register_rejects_uri_without_bundle() {
    let dir = TempDir::new().unwrap();
    let store = LocalTrackingStore::open(dir.path()).unwrap();
    let err = StoreRegister::default()
        .register("team", "runs:/missing/model", None, &store, &store)
        .unwrap_err();
    assert!(matches!(err, ModelOpsError::Registration(_)));
    assert!(store.list_versions("team").is_err());
}
