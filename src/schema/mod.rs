//! Schema validation
//!
//! A [`Schema`] is a named column contract with a coercion policy and a
//! strictness policy. [`Schema::check`] coerces cells toward their declared
//! types (when `coerce` is set), then type checks every column and returns a
//! conforming [`Table`] or the first violation found.

pub mod records;
pub mod table;

pub use records::{
    FeatureImportances, Inputs, OutputMetadata, OutputRecord, Outputs, ShapValues, Targets,
};
pub use table::{json_type_name, Column, Table};

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{ModelOpsError, Result, SchemaViolation};

/// Column data type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    String,
    /// ISO-8601 timestamp stored as a string
    Timestamp,
    Float32,
    Float64,
    Int64,
    Bool,
    /// Nested record with its own field contract
    Record(Vec<ColumnSpec>),
    /// Homogeneous sequence
    List(Box<DType>),
}

impl DType {
    /// Short descriptor used in errors and signatures
    pub fn name(&self) -> String {
        match self {
            DType::String => "string".to_string(),
            DType::Timestamp => "timestamp".to_string(),
            DType::Float32 => "float32".to_string(),
            DType::Float64 => "float64".to_string(),
            DType::Int64 => "int64".to_string(),
            DType::Bool => "bool".to_string(),
            DType::Record(_) => "record".to_string(),
            DType::List(inner) => format!("list<{}>", inner.name()),
        }
    }

    /// Best-effort conversion of a cell toward this type
    ///
    /// Cells that cannot be converted are returned unchanged so the type
    /// check reports them.
    pub fn coerce(&self, value: Value) -> Value {
        if value.is_null() {
            return value;
        }
        match self {
            DType::String | DType::Timestamp => match value {
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
                other => other,
            },
            DType::Float32 | DType::Float64 => {
                let float = match &value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                    _ => None,
                };
                float
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(value)
            }
            DType::Int64 => {
                let int = match &value {
                    Value::Number(n) => n.as_i64().or_else(|| {
                        n.as_f64()
                            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                            .map(|f| f as i64)
                    }),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    Value::Bool(b) => Some(i64::from(*b)),
                    _ => None,
                };
                int.map(|i| Value::Number(i.into())).unwrap_or(value)
            }
            DType::Bool => match &value {
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    _ => value,
                },
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Value::Bool(false),
                    Some(1) => Value::Bool(true),
                    _ => value,
                },
                _ => value,
            },
            DType::Record(fields) => {
                let value = match value {
                    Value::String(s) => match serde_json::from_str::<Value>(&s) {
                        Ok(parsed @ Value::Object(_)) => parsed,
                        _ => Value::String(s),
                    },
                    other => other,
                };
                match value {
                    Value::Object(mut object) => {
                        for field in fields {
                            if let Some(cell) = object.remove(&field.name) {
                                object.insert(field.name.clone(), field.dtype.coerce(cell));
                            }
                        }
                        Value::Object(object)
                    }
                    other => other,
                }
            }
            DType::List(inner) => {
                let value = match value {
                    Value::String(s) => match serde_json::from_str::<Value>(&s) {
                        Ok(parsed @ Value::Array(_)) => parsed,
                        _ => Value::String(s),
                    },
                    other => other,
                };
                match value {
                    Value::Array(items) => {
                        Value::Array(items.into_iter().map(|v| inner.coerce(v)).collect())
                    }
                    other => other,
                }
            }
        }
    }

    /// Type check a non-null cell; `path` names the column for errors
    fn check(&self, path: &str, value: &Value, row: usize) -> Result<()> {
        let wrong_type = || {
            ModelOpsError::schema(
                path,
                SchemaViolation::WrongType {
                    expected: self.name(),
                    actual: json_type_name(value).to_string(),
                },
            )
        };

        match self {
            DType::String => value.as_str().map(|_| ()).ok_or_else(wrong_type),
            DType::Timestamp => match value.as_str() {
                Some(s) if is_iso8601(s) => Ok(()),
                Some(_) => Err(ModelOpsError::schema(
                    path,
                    SchemaViolation::WrongType {
                        expected: self.name(),
                        actual: "string".to_string(),
                    },
                )),
                None => Err(wrong_type()),
            },
            DType::Float32 | DType::Float64 => {
                value.as_f64().map(|_| ()).ok_or_else(wrong_type)
            }
            DType::Int64 => value.as_i64().map(|_| ()).ok_or_else(wrong_type),
            DType::Bool => value.as_bool().map(|_| ()).ok_or_else(wrong_type),
            DType::Record(fields) => {
                let object = value.as_object().ok_or_else(wrong_type)?;
                for field in fields {
                    let field_path = format!("{}.{}", path, field.name);
                    match object.get(&field.name) {
                        None if field.required => {
                            return Err(ModelOpsError::schema(
                                field_path,
                                SchemaViolation::MissingColumn,
                            ))
                        }
                        None => {}
                        Some(Value::Null) if field.nullable => {}
                        Some(Value::Null) => {
                            return Err(ModelOpsError::schema(
                                field_path,
                                SchemaViolation::NullValue { row },
                            ))
                        }
                        Some(cell) => field.dtype.check(&field_path, cell, row)?,
                    }
                }
                Ok(())
            }
            DType::List(inner) => {
                let items = value.as_array().ok_or_else(wrong_type)?;
                for item in items {
                    if item.is_null() {
                        return Err(ModelOpsError::schema(
                            path,
                            SchemaViolation::NullValue { row },
                        ));
                    }
                    inner.check(path, item, row)?;
                }
                Ok(())
            }
        }
    }
}

fn is_iso8601(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
}

/// Contract for one column (or one field of a record column)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Declared type
    pub dtype: DType,
    /// Whether the column must be present
    pub required: bool,
    /// Whether null cells are allowed
    pub nullable: bool,
}

impl ColumnSpec {
    /// Required, non-nullable column
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
            required: true,
            nullable: false,
        }
    }

    /// Mark the column optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Allow null cells
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Named column contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name, used in logs
    pub name: String,
    /// Declared columns, in output order
    pub columns: Vec<ColumnSpec>,
    /// Attempt type conversion before checking
    pub coerce: bool,
    /// Reject undeclared columns
    pub strict: bool,
    /// Type applied to undeclared columns in non-strict schemas
    pub default_dtype: Option<DType>,
}

impl Schema {
    /// Create a coercing, strict schema
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
            coerce: true,
            strict: true,
            default_dtype: None,
        }
    }

    /// Set the coercion policy
    pub fn with_coerce(mut self, coerce: bool) -> Self {
        self.coerce = coerce;
        self
    }

    /// Set the strictness policy
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the type of undeclared columns
    pub fn with_default_dtype(mut self, dtype: DType) -> Self {
        self.default_dtype = Some(dtype);
        self
    }

    pub fn spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Validate a table, returning a conforming copy
    ///
    /// Declared columns come first in declared order, followed by undeclared
    /// columns when the schema is not strict. The row count never changes.
    pub fn check(&self, table: &Table) -> Result<Table> {
        let mut out = Table::new();

        for spec in &self.columns {
            let column = match table.column(&spec.name) {
                Some(column) => column,
                None if spec.required => {
                    return Err(ModelOpsError::schema(
                        &spec.name,
                        SchemaViolation::MissingColumn,
                    ))
                }
                None => continue,
            };
            out.push_column(self.check_column(column, &spec.dtype, spec.nullable)?)?;
        }

        for column in table.columns() {
            if self.spec(&column.name).is_some() {
                continue;
            }
            if self.strict {
                return Err(ModelOpsError::schema(
                    &column.name,
                    SchemaViolation::UnexpectedColumn,
                ));
            }
            let checked = match &self.default_dtype {
                Some(dtype) => self.check_column(column, dtype, true)?,
                None => column.clone(),
            };
            out.push_column(checked)?;
        }

        tracing::debug!(schema = %self.name, rows = out.height(), "Schema check passed");
        Ok(out)
    }

    fn check_column(&self, column: &Column, dtype: &DType, nullable: bool) -> Result<Column> {
        let values: Vec<Value> = if self.coerce {
            column.values.iter().cloned().map(|v| dtype.coerce(v)).collect()
        } else {
            column.values.clone()
        };

        for (row, value) in values.iter().enumerate() {
            if value.is_null() {
                if !nullable {
                    return Err(ModelOpsError::schema(
                        &column.name,
                        SchemaViolation::NullValue { row },
                    ));
                }
                continue;
            }
            dtype.check(&column.name, value, row)?;
        }

        Ok(Column::new(column.name.clone(), values))
    }
}
