//! Integration test: typed records over JSON tables
//! Tests: inputs/targets/outputs contracts, metadata records, explanation tables

use serde_json::{json, Value};

use modelops::error::{ModelOpsError, SchemaViolation};
use modelops::schema::{FeatureImportances, Inputs, Outputs, ShapValues, Table, Targets};

fn table(object: Value) -> Table {
    Table::from_json_columns(object.as_object().unwrap()).unwrap()
}

fn violation(err: ModelOpsError) -> (String, SchemaViolation) {
    match err {
        ModelOpsError::Schema { column, reason } => (column, reason),
        other => panic!("expected schema error, got {other:?}"),
    }
}

// ============================================================================
// Inputs and targets
// ============================================================================

#[test]
fn test_inputs_accept_and_coerce() {
    let inputs = Inputs::check(&table(json!({"input": ["hello", 42]}))).unwrap();
    assert_eq!(inputs.texts(), vec!["hello", "42"]);
    assert_eq!(inputs.len(), 2);
}

#[test]
fn test_inputs_reject_extra_and_null() {
    let (column, reason) = violation(
        Inputs::check(&table(json!({"input": ["a"], "extra": [1]}))).unwrap_err(),
    );
    assert_eq!(column, "extra");
    assert_eq!(reason, SchemaViolation::UnexpectedColumn);

    let (column, reason) =
        violation(Inputs::check(&table(json!({"input": ["a", null]}))).unwrap_err());
    assert_eq!(column, "input");
    assert_eq!(reason, SchemaViolation::NullValue { row: 1 });
}

#[test]
fn test_targets_require_both_columns() {
    let (column, reason) =
        violation(Targets::check(&table(json!({"input": ["q"]}))).unwrap_err());
    assert_eq!(column, "response");
    assert_eq!(reason, SchemaViolation::MissingColumn);

    let targets = Targets::check(&table(json!({"response": ["a"], "input": ["q"]}))).unwrap();
    assert_eq!(targets.table().column_names(), vec!["input", "response"]);
}

#[test]
fn test_empty_table_is_valid() {
    let inputs = Inputs::check(&table(json!({"input": []}))).unwrap();
    assert!(inputs.is_empty());
}

// ============================================================================
// Outputs
// ============================================================================

#[test]
fn test_outputs_metadata_parsed_from_json_strings() {
    let metadata = json!({
        "timestamp": "2024-05-01T12:00:00Z",
        "model_version": "v1.0.0",
        "terminated": "true",
        "messages": ["hi"]
    });
    let outputs = Outputs::check(&table(json!({
        "response": ["hi", "bye"],
        "metadata": [metadata.to_string(), null]
    })))
    .unwrap();

    let records = outputs.records();
    let first = records[0].metadata.as_ref().unwrap();
    assert!(first.terminated);
    assert_eq!(first.messages, vec!["hi"]);
    assert!(records[1].metadata.is_none());
}

#[test]
fn test_outputs_reject_bad_timestamp() {
    let err = Outputs::check(&table(json!({
        "response": ["hi"],
        "metadata": [{"timestamp": "yesterday", "model_version": "v1.0.0"}]
    })))
    .unwrap_err();
    assert!(matches!(err, ModelOpsError::Schema { .. }));
}

#[test]
fn test_outputs_without_metadata_column() {
    let outputs = Outputs::check(&table(json!({"response": ["x"]}))).unwrap();
    assert_eq!(outputs.responses(), vec!["x"]);
    assert!(outputs.records()[0].metadata.is_none());
}

// ============================================================================
// Explanations
// ============================================================================

#[test]
fn test_feature_importances_contract() {
    let importances = FeatureImportances::check(&table(json!({
        "feature": ["input"],
        "importance": ["0.25"]
    })))
    .unwrap();
    assert_eq!(importances.rows(), vec![("input".to_string(), 0.25)]);

    assert!(FeatureImportances::check(&table(json!({"feature": ["x"]}))).is_err());
}

#[test]
fn test_shap_values_accept_any_float_columns() {
    let values = ShapValues::check(&table(json!({"a": [0.5, 1.0], "b": [null, 2]}))).unwrap();
    assert_eq!(values.features(), &["a".to_string(), "b".to_string()]);
    assert_eq!(values.nrows(), 2);
    assert!(values.values()[[0, 1]].is_nan());

    let back = values.to_table().unwrap();
    assert_eq!(back.column("b").unwrap().null_count(), 1);

    assert!(ShapValues::check(&table(json!({"a": ["not a number"]}))).is_err());
}
