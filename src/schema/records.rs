//! Typed tabular records
//!
//! Each wrapper holds a table that already passed its schema, so code that
//! receives an [`Inputs`] or [`Outputs`] never re-validates it.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ColumnSpec, DType, Schema, Table};
use super::table::Column;
use crate::error::{ModelOpsError, Result};

/// Fixed version tag written into output metadata
pub const MODEL_VERSION: &str = "v1.0.0";

/// Model inputs: one `input` string column
#[derive(Debug, Clone, PartialEq)]
pub struct Inputs(Table);

impl Inputs {
    pub const INPUT: &'static str = "input";

    pub fn schema() -> Schema {
        Schema::new("inputs", vec![ColumnSpec::new(Self::INPUT, DType::String)])
    }

    /// Validate and wrap a table
    pub fn check(table: &Table) -> Result<Self> {
        Self::schema().check(table).map(Self)
    }

    /// Build inputs from texts
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            Table::from_columns(vec![Column::from_strings(Self::INPUT, texts)])
                .unwrap_or_default(),
        )
    }

    /// Input texts in row order
    pub fn texts(&self) -> Vec<&str> {
        string_cells(&self.0, Self::INPUT)
    }

    pub fn len(&self) -> usize {
        self.0.height()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn table(&self) -> &Table {
        &self.0
    }

    pub fn into_table(self) -> Table {
        self.0
    }

    /// Select rows by index
    pub fn take(&self, indices: &[usize]) -> Result<Self> {
        self.0.take(indices).map(Self)
    }

    /// First `n` rows
    pub fn head(&self, n: usize) -> Self {
        Self(self.0.head(n))
    }
}

/// Ground truth: `input` and `response` string columns
#[derive(Debug, Clone, PartialEq)]
pub struct Targets(Table);

impl Targets {
    pub const INPUT: &'static str = "input";
    pub const RESPONSE: &'static str = "response";

    pub fn schema() -> Schema {
        Schema::new(
            "targets",
            vec![
                ColumnSpec::new(Self::INPUT, DType::String),
                ColumnSpec::new(Self::RESPONSE, DType::String),
            ],
        )
    }

    pub fn check(table: &Table) -> Result<Self> {
        Self::schema().check(table).map(Self)
    }

    /// Build targets from `(input, response)` pairs
    pub fn from_pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let (inputs, responses): (Vec<String>, Vec<String>) = pairs
            .into_iter()
            .map(|(a, b)| (a.into(), b.into()))
            .unzip();
        Self(Table::from_columns(vec![
            Column::from_strings(Self::INPUT, inputs),
            Column::from_strings(Self::RESPONSE, responses),
        ])
        .unwrap_or_default())
    }

    pub fn inputs(&self) -> Vec<&str> {
        string_cells(&self.0, Self::INPUT)
    }

    pub fn responses(&self) -> Vec<&str> {
        string_cells(&self.0, Self::RESPONSE)
    }

    /// The `input` column as model inputs
    pub fn to_inputs(&self) -> Inputs {
        Inputs::from_texts(self.inputs())
    }

    pub fn len(&self) -> usize {
        self.0.height()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn table(&self) -> &Table {
        &self.0
    }

    pub fn take(&self, indices: &[usize]) -> Result<Self> {
        self.0.take(indices).map(Self)
    }
}

/// Per-row metadata attached to a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMetadata {
    /// Completion time, ISO-8601 UTC
    pub timestamp: String,
    /// Model version tag
    pub model_version: String,
    /// Whether the backend signaled a finish reason
    #[serde(default)]
    pub terminated: bool,
    /// Text of every message returned for the call
    #[serde(default)]
    pub messages: Vec<String>,
}

impl OutputMetadata {
    /// Metadata stamped with the current time
    pub fn now(terminated: bool, messages: Vec<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            model_version: MODEL_VERSION.to_string(),
            terminated,
            messages,
        }
    }
}

/// One prediction row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub response: String,
    #[serde(default)]
    pub metadata: Option<OutputMetadata>,
}

/// Model outputs: `response` plus optional nullable `metadata`
#[derive(Debug, Clone, PartialEq)]
pub struct Outputs(Table);

impl Outputs {
    pub const RESPONSE: &'static str = "response";
    pub const METADATA: &'static str = "metadata";

    /// Field contract of the `metadata` record
    pub fn metadata_dtype() -> DType {
        DType::Record(vec![
            ColumnSpec::new("timestamp", DType::Timestamp),
            ColumnSpec::new("model_version", DType::String),
            ColumnSpec::new("terminated", DType::Bool).optional(),
            ColumnSpec::new("messages", DType::List(Box::new(DType::String))).optional(),
        ])
    }

    pub fn schema() -> Schema {
        Schema::new(
            "outputs",
            vec![
                ColumnSpec::new(Self::RESPONSE, DType::String),
                ColumnSpec::new(Self::METADATA, Self::metadata_dtype())
                    .optional()
                    .nullable(),
            ],
        )
    }

    pub fn check(table: &Table) -> Result<Self> {
        Self::schema().check(table).map(Self)
    }

    /// Build outputs from typed rows
    pub fn from_records(records: Vec<OutputRecord>) -> Result<Self> {
        let with_metadata = records.iter().any(|r| r.metadata.is_some());
        let mut responses = Vec::with_capacity(records.len());
        let mut metadata = Vec::with_capacity(records.len());
        for record in records {
            responses.push(Value::String(record.response));
            metadata.push(match record.metadata {
                Some(m) => serde_json::to_value(m)?,
                None => Value::Null,
            });
        }

        let mut columns = vec![Column::new(Self::RESPONSE, responses)];
        if with_metadata {
            columns.push(Column::new(Self::METADATA, metadata));
        }
        Ok(Self(Table::from_columns(columns)?))
    }

    /// Build outputs holding only responses
    pub fn from_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            Table::from_columns(vec![Column::from_strings(Self::RESPONSE, responses)])
                .unwrap_or_default(),
        )
    }

    pub fn responses(&self) -> Vec<&str> {
        string_cells(&self.0, Self::RESPONSE)
    }

    /// Typed rows; rows with no metadata or an unreadable one get `None`
    pub fn records(&self) -> Vec<OutputRecord> {
        let metadata = self.0.column(Self::METADATA);
        self.responses()
            .into_iter()
            .enumerate()
            .map(|(i, response)| OutputRecord {
                response: response.to_string(),
                metadata: metadata
                    .and_then(|c| c.values.get(i))
                    .filter(|v| !v.is_null())
                    .and_then(|v| serde_json::from_value(v.clone()).ok()),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.height()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn table(&self) -> &Table {
        &self.0
    }

    pub fn into_table(self) -> Table {
        self.0
    }
}

/// Global feature importances: `feature` and `importance`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureImportances(Table);

impl FeatureImportances {
    pub fn schema() -> Schema {
        Schema::new(
            "feature_importances",
            vec![
                ColumnSpec::new("feature", DType::String),
                ColumnSpec::new("importance", DType::Float32),
            ],
        )
    }

    pub fn check(table: &Table) -> Result<Self> {
        Self::schema().check(table).map(Self)
    }

    pub fn from_pairs(pairs: Vec<(String, f32)>) -> Self {
        let (features, importances): (Vec<String>, Vec<f32>) = pairs.into_iter().unzip();
        let importances = importances
            .into_iter()
            .map(|v| Value::from(f64::from(v)))
            .collect();
        Self(
            Table::from_columns(vec![
                Column::from_strings("feature", features),
                Column::new("importance", importances),
            ])
            .unwrap_or_default(),
        )
    }

    /// `(feature, importance)` rows
    pub fn rows(&self) -> Vec<(String, f32)> {
        let features = string_cells(&self.0, "feature");
        let importances = self
            .0
            .column("importance")
            .map(|c| c.values.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
            .unwrap_or_else(Vec::new);
        features
            .into_iter()
            .map(String::from)
            .zip(importances)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.height()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn table(&self) -> &Table {
        &self.0
    }
}

/// Per-sample attributions keyed by feature name
#[derive(Debug, Clone, PartialEq)]
pub struct ShapValues {
    features: Vec<String>,
    values: Array2<f32>,
}

impl ShapValues {
    /// Loose schema: any column, all float32
    pub fn schema() -> Schema {
        Schema::new("shap_values", vec![])
            .with_strict(false)
            .with_default_dtype(DType::Float32)
    }

    pub fn new(features: Vec<String>, values: Array2<f32>) -> Result<Self> {
        if features.len() != values.ncols() {
            return Err(ModelOpsError::ValidationError(format!(
                "SHAP matrix has {} columns but {} feature names",
                values.ncols(),
                features.len()
            )));
        }
        Ok(Self { features, values })
    }

    /// Validate a table and read it into a matrix
    pub fn check(table: &Table) -> Result<Self> {
        let checked = Self::schema().check(table)?;
        let features: Vec<String> = checked.column_names().into_iter().map(String::from).collect();
        let mut values = Array2::<f32>::zeros((checked.height(), checked.width()));
        for (j, column) in checked.columns().iter().enumerate() {
            for (i, cell) in column.values.iter().enumerate() {
                values[[i, j]] = cell.as_f64().map(|v| v as f32).unwrap_or(f32::NAN);
            }
        }
        Self::new(features, values)
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    /// Convert to a table; NaN cells become nulls
    pub fn to_table(&self) -> Result<Table> {
        let columns = self
            .features
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let values = self
                    .values
                    .column(j)
                    .iter()
                    .map(|&v| {
                        serde_json::Number::from_f64(f64::from(v))
                            .map(Value::Number)
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                Column::new(name.clone(), values)
            })
            .collect();
        Table::from_columns(columns)
    }
}

/// Rows of a validated string column
fn string_cells<'a>(table: &'a Table, name: &str) -> Vec<&'a str> {
    table
        .column(name)
        .map(|c| c.values.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn record(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_inputs_keep_row_count() {
        let table = Table::from_json_columns(
            json!({"input": ["a", 2, "c"]}).as_object().unwrap(),
        )
        .unwrap();
        let inputs = Inputs::check(&table).unwrap();
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs.texts(), vec!["a", "2", "c"]);
        assert_eq!(inputs.table().column_names(), vec!["input"]);
    }

    #[test]
    fn test_targets_project_inputs() {
        let targets = Targets::from_pairs([("q1", "a1"), ("q2", "a2")]);
        assert_eq!(targets.to_inputs().texts(), vec!["q1", "q2"]);
        assert_eq!(targets.responses(), vec!["a1", "a2"]);
    }

    #[test]
    fn test_outputs_metadata_round_trip() {
        let records = vec![
            OutputRecord {
                response: "hi".into(),
                metadata: Some(OutputMetadata::now(true, vec!["hi".into()])),
            },
            OutputRecord {
                response: "there".into(),
                metadata: None,
            },
        ];
        let outputs = Outputs::from_records(records.clone()).unwrap();
        let checked = Outputs::check(outputs.table()).unwrap();
        assert_eq!(checked.records(), records);
        assert_eq!(checked.records()[0].metadata.as_ref().unwrap().model_version, "v1.0.0");
    }

    #[test]
    fn test_outputs_without_metadata_column() {
        let outputs = Outputs::from_responses(["x"]);
        assert!(Outputs::check(outputs.table()).is_ok());
        assert!(outputs.records()[0].metadata.is_none());
    }

    #[test]
    fn test_outputs_reject_bad_metadata() {
        let table = Table::from_records(&[record(&[
            ("response", json!("x")),
            ("metadata", json!({"model_version": "v1.0.0"})),
        ])]);
        assert!(Outputs::check(&table).is_err());
    }

    #[test]
    fn test_feature_importances() {
        let fi = FeatureImportances::from_pairs(vec![("input".into(), 1.0)]);
        let checked = FeatureImportances::check(fi.table()).unwrap();
        assert_eq!(checked.rows(), vec![("input".to_string(), 1.0)]);
    }

    #[test]
    fn test_shap_values_table_round_trip() {
        let shap = ShapValues::new(vec!["input".into()], Array2::from_elem((3, 1), 1.0)).unwrap();
        let table = shap.to_table().unwrap();
        assert_eq!(table.height(), 3);
        let back = ShapValues::check(&table).unwrap();
        assert_eq!(back, shap);

        assert!(ShapValues::new(vec![], Array2::zeros((1, 1))).is_err());
    }
}
