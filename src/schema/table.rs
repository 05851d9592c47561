//! Columnar table used at every schema boundary
//!
//! A [`Table`] is an ordered list of named, equal-length columns whose cells are
//! JSON values, so nested records (`metadata`) and sequences (`messages`) live
//! next to plain strings and floats.
//!
//! Cells stay JSON-typed because schema coercion runs per cell and record
//! columns carry nested fields. Polars frames are only built at the file
//! boundary (see [`crate::data::to_frame`] and [`crate::data::from_frame`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelOpsError, Result};

/// A single named column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Create a string column
    pub fn from_strings<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            values.into_iter().map(|s| Value::String(s.into())).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of null cells
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }
}

/// Ordered collection of named, equal-length columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from columns, checking names and lengths
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut table = Self::new();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    /// Build a table from row records; columns appear in first-seen order and
    /// keys missing from a row become nulls
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|r| r.get(&name).cloned().unwrap_or(Value::Null))
                    .collect();
                Column { name, values }
            })
            .collect();

        Self { columns }
    }

    /// Build a table from a JSON object of columns (`{"col": [..]}`)
    pub fn from_json_columns(object: &Map<String, Value>) -> Result<Self> {
        let mut columns = Vec::with_capacity(object.len());
        for (name, values) in object {
            let values = match values {
                Value::Array(items) => items.clone(),
                other => {
                    return Err(ModelOpsError::DataError(format!(
                        "Column '{}' must be an array, got {}",
                        name,
                        json_type_name(other)
                    )))
                }
            };
            columns.push(Column::new(name.clone(), values));
        }
        Self::from_columns(columns)
    }

    /// Convert to a JSON object of columns
    pub fn to_json_columns(&self) -> Map<String, Value> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), Value::Array(c.values.clone())))
            .collect()
    }

    /// Append a column
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.column(&column.name).is_some() {
            return Err(ModelOpsError::DataError(format!(
                "Duplicate column: {}",
                column.name
            )));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(ModelOpsError::DataError(format!(
                    "Column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    first.len()
                )));
            }
        }
        self.columns.push(column);
        Ok(())
    }

    /// Builder variant of [`Table::push_column`]
    pub fn with_column(mut self, column: Column) -> Result<Self> {
        self.push_column(column)?;
        Ok(self)
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Borrow a column as strings; nulls and non-strings are errors
    pub fn strings(&self, name: &str) -> Result<Vec<&str>> {
        let column = self
            .column(name)
            .ok_or_else(|| ModelOpsError::DataError(format!("Column not found: {}", name)))?;
        column
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_str().ok_or_else(|| {
                    ModelOpsError::DataError(format!(
                        "Column '{}' row {} is {}, expected string",
                        name,
                        i,
                        json_type_name(v)
                    ))
                })
            })
            .collect()
    }

    /// Row `i` as a record
    pub fn row(&self, i: usize) -> Option<Map<String, Value>> {
        if i >= self.height() {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|c| (c.name.clone(), c.values[i].clone()))
                .collect(),
        )
    }

    /// All rows as records
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        (0..self.height()).filter_map(|i| self.row(i)).collect()
    }

    /// Select rows by index, in the given order
    pub fn take(&self, indices: &[usize]) -> Result<Self> {
        let height = self.height();
        if let Some(bad) = indices.iter().find(|&&i| i >= height) {
            return Err(ModelOpsError::DataError(format!(
                "Row index {} out of bounds for {} rows",
                bad, height
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: indices.iter().map(|&i| c.values[i].clone()).collect(),
            })
            .collect();
        Ok(Self { columns })
    }

    /// First `n` rows
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.height());
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: c.values[..n].to_vec(),
            })
            .collect();
        Self { columns }
    }

    /// Concatenate the columns of two tables with the same height; columns of
    /// `other` whose names already exist are prefixed with `prefix`
    pub fn hstack(&self, other: &Table, prefix: &str) -> Result<Self> {
        if !self.columns.is_empty() && !other.columns.is_empty() && self.height() != other.height()
        {
            return Err(ModelOpsError::Misaligned {
                left: self.height(),
                right: other.height(),
            });
        }
        let mut out = self.clone();
        for column in &other.columns {
            let name = if out.column(&column.name).is_some() {
                format!("{}{}", prefix, column.name)
            } else {
                column.name.clone()
            };
            out.push_column(Column::new(name, column.values.clone()))?;
        }
        Ok(out)
    }
}

/// Human-readable JSON type name used in error messages and signatures
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "record",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_columns(vec![
            Column::from_strings("input", ["a", "b", "c"]),
            Column::new("score", vec![json!(1.0), json!(2.0), Value::Null]),
        ])
        .unwrap()
    }

    #[test]
    fn test_shape() {
        let table = sample();
        assert_eq!(table.height(), 3);
        assert_eq!(table.width(), 2);
        assert_eq!(table.column_names(), vec!["input", "score"]);
        assert_eq!(table.column("score").unwrap().null_count(), 1);
    }

    #[test]
    fn test_rejects_ragged_columns() {
        let result = Table::from_columns(vec![
            Column::from_strings("a", ["x", "y"]),
            Column::from_strings("b", ["x"]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_duplicate_columns() {
        let result = Table::from_columns(vec![
            Column::from_strings("a", ["x"]),
            Column::from_strings("a", ["y"]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_records_fill_missing_keys() {
        let records = vec![
            json!({"input": "a", "extra": 1}).as_object().unwrap().clone(),
            json!({"input": "b"}).as_object().unwrap().clone(),
        ];
        let table = Table::from_records(&records);
        assert_eq!(table.height(), 2);
        assert_eq!(table.column("extra").unwrap().values[1], Value::Null);
        assert_eq!(table.to_records()[0]["input"], json!("a"));
    }

    #[test]
    fn test_take_and_head() {
        let table = sample();
        let picked = table.take(&[2, 0]).unwrap();
        assert_eq!(picked.strings("input").unwrap(), vec!["c", "a"]);
        assert!(table.take(&[5]).is_err());
        assert_eq!(table.head(2).height(), 2);
        assert_eq!(table.head(10).height(), 3);
    }

    #[test]
    fn test_hstack_prefixes_duplicates() {
        let left = Table::from_columns(vec![Column::from_strings("input", ["a"])]).unwrap();
        let right = Table::from_columns(vec![
            Column::from_strings("input", ["a"]),
            Column::from_strings("response", ["b"]),
        ])
        .unwrap();
        let both = left.hstack(&right, "target_").unwrap();
        assert_eq!(both.column_names(), vec!["input", "target_input", "response"]);
    }

    #[test]
    fn test_json_columns() {
        let object = json!({"input": ["x", "y"]});
        let table = Table::from_json_columns(object.as_object().unwrap()).unwrap();
        assert_eq!(table.height(), 2);
        assert_eq!(table.to_json_columns()["input"], json!(["x", "y"]));

        let bad = json!({"input": "x"});
        assert!(Table::from_json_columns(bad.as_object().unwrap()).is_err());
    }
}
