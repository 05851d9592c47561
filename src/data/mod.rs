//! Dataset access
//!
//! Readers and writers move [`Table`]s in and out of CSV and Parquet files
//! through polars. Splitters produce train/test row indices.

pub mod readers;
pub mod splitters;
pub mod writers;

pub use readers::{CsvReader, ParquetReader, Reader, ReaderKind};
pub use splitters::{Split, Splitter, SplitterKind, TimeSeriesSplitter, TrainTestSplitter};
pub use writers::{CsvWriter, ParquetWriter, Writer, WriterKind};

use polars::prelude::{AnyValue, DataFrame, IntoColumn, NamedFrom, Series};
use serde_json::Value;

use crate::error::Result;
use crate::schema::table::Column;
use crate::schema::Table;

/// Convert a polars frame into a table
pub fn from_frame(df: &DataFrame) -> Result<Table> {
    let mut columns = Vec::with_capacity(df.width());
    for col in df.get_columns() {
        let mut values = Vec::with_capacity(col.len());
        for i in 0..col.len() {
            values.push(any_to_json(col.get(i)?));
        }
        columns.push(Column::new(col.name().to_string(), values));
    }
    Table::from_columns(columns)
}

fn any_to_json(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(v) => Value::Bool(v),
        AnyValue::Int8(v) => v.into(),
        AnyValue::Int16(v) => v.into(),
        AnyValue::Int32(v) => v.into(),
        AnyValue::Int64(v) => v.into(),
        AnyValue::UInt8(v) => v.into(),
        AnyValue::UInt16(v) => v.into(),
        AnyValue::UInt32(v) => v.into(),
        AnyValue::UInt64(v) => v.into(),
        AnyValue::Float32(v) => serde_json::json!(v),
        AnyValue::Float64(v) => serde_json::json!(v),
        AnyValue::String(v) => Value::String(v.to_string()),
        AnyValue::StringOwned(v) => Value::String(v.to_string()),
        other => Value::String(other.to_string()),
    }
}

/// Convert a table into a polars frame
///
/// Boolean, integer and float columns keep their type; everything else is
/// written as strings, with records and lists encoded as JSON.
pub fn to_frame(table: &Table) -> Result<DataFrame> {
    let columns = table
        .columns()
        .iter()
        .map(|c| column_series(c).into_column())
        .collect();
    Ok(DataFrame::new(columns)?)
}

fn column_series(column: &Column) -> Series {
    let name = column.name.as_str();
    let present = || column.values.iter().filter(|v| !v.is_null());

    // Empty and all-null columns carry no type; write them as strings
    if present().next().is_none() {
        let values: Vec<Option<String>> = vec![None; column.values.len()];
        return Series::new(name.into(), values);
    }
    if present().all(Value::is_boolean) {
        let values: Vec<Option<bool>> = column.values.iter().map(Value::as_bool).collect();
        return Series::new(name.into(), values);
    }
    if present().all(|v| v.is_i64()) {
        let values: Vec<Option<i64>> = column.values.iter().map(Value::as_i64).collect();
        return Series::new(name.into(), values);
    }
    if present().all(Value::is_number) {
        let values: Vec<Option<f64>> = column.values.iter().map(Value::as_f64).collect();
        return Series::new(name.into(), values);
    }
    let values: Vec<Option<String>> = column
        .values
        .iter()
        .map(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect();
    Series::new(name.into(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::DataType;
    use serde_json::json;

    #[test]
    fn test_frame_round_trip_keeps_types() {
        let table = Table::from_columns(vec![
            Column::from_strings("input", ["a", "b"]),
            Column::new("n", vec![json!(1), Value::Null]),
            Column::new("x", vec![json!(0.5), json!(2)]),
            Column::new("flag", vec![json!(true), json!(false)]),
            Column::new("meta", vec![json!({"k": 1}), Value::Null]),
        ])
        .unwrap();

        let df = to_frame(&table).unwrap();
        assert_eq!(df.shape(), (2, 5));

        let back = from_frame(&df).unwrap();
        assert_eq!(back.column("input").unwrap().values, vec![json!("a"), json!("b")]);
        assert_eq!(back.column("n").unwrap().values, vec![json!(1), Value::Null]);
        assert_eq!(back.column("x").unwrap().values, vec![json!(0.5), json!(2.0)]);
        assert_eq!(back.column("flag").unwrap().values, vec![json!(true), json!(false)]);
        assert_eq!(
            back.column("meta").unwrap().values,
            vec![json!("{\"k\":1}"), Value::Null]
        );
    }

    #[test]
    fn test_untyped_columns_are_written_as_strings() {
        let table = Table::from_columns(vec![
            Column::from_strings("input", ["a", "b"]),
            Column::new("empty", vec![Value::Null, Value::Null]),
        ])
        .unwrap();

        let df = to_frame(&table).unwrap();
        let empty = df.column("empty").unwrap();
        assert_eq!(empty.dtype(), &DataType::String);
        assert_eq!(empty.null_count(), 2);

        let no_rows = Table::from_columns(vec![Column::new("x", Vec::new())]).unwrap();
        let df = to_frame(&no_rows).unwrap();
        assert_eq!(df.column("x").unwrap().dtype(), &DataType::String);
    }
}
