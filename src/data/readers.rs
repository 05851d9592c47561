//! Dataset readers

use std::fs::File;
use std::path::PathBuf;

use polars::prelude::{CsvReadOptions, SerReader};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::from_frame;
use crate::error::{ModelOpsError, Result};
use crate::schema::Table;
use crate::tracking::Lineage;

/// Reads a dataset into a table
pub trait Reader: Send + Sync {
    fn read(&self) -> Result<Table>;

    /// Source URI recorded in lineage
    fn source_uri(&self) -> String;

    /// Lineage of data read by this reader
    fn lineage(&self, data: &Table, name: &str, targets: Option<&str>) -> Result<Lineage> {
        Lineage::from_table(data, name, self.source_uri(), targets)
    }
}

fn open(path: &PathBuf) -> Result<File> {
    File::open(path).map_err(|e| {
        ModelOpsError::DataError(format!("Failed to open {}: {}", path.display(), e))
    })
}

/// Reads a CSV file with a header row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsvReader {
    pub path: PathBuf,
    /// Maximum number of rows to read
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CsvReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Reader for CsvReader {
    fn read(&self) -> Result<Table> {
        let file = open(&self.path)?;
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(100))
            .with_n_rows(self.limit)
            .into_reader_with_file_handle(file)
            .finish()?;
        info!(path = %self.path.display(), rows = df.height(), "Read CSV dataset");
        from_frame(&df)
    }

    fn source_uri(&self) -> String {
        self.path.display().to_string()
    }
}

/// Reads a Parquet file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParquetReader {
    pub path: PathBuf,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ParquetReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Reader for ParquetReader {
    fn read(&self) -> Result<Table> {
        let file = open(&self.path)?;
        let mut df = polars::prelude::ParquetReader::new(file).finish()?;
        if let Some(limit) = self.limit {
            df = df.head(Some(limit));
        }
        info!(path = %self.path.display(), rows = df.height(), "Read Parquet dataset");
        from_frame(&df)
    }

    fn source_uri(&self) -> String {
        self.path.display().to_string()
    }
}

/// Closed set of readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "KIND")]
pub enum ReaderKind {
    CsvReader(CsvReader),
    ParquetReader(ParquetReader),
}

impl ReaderKind {
    fn inner(&self) -> &dyn Reader {
        match self {
            ReaderKind::CsvReader(r) => r,
            ReaderKind::ParquetReader(r) => r,
        }
    }
}

impl Reader for ReaderKind {
    fn read(&self) -> Result<Table> {
        self.inner().read()
    }

    fn source_uri(&self) -> String {
        self.inner().source_uri()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_csv_reader_with_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inputs.csv");
        fs::write(&path, "input,response\nhello,hi\nbye,ciao\nyes,si\n").unwrap();

        let all = CsvReader::new(&path).read().unwrap();
        assert_eq!(all.height(), 3);
        assert_eq!(all.strings("input").unwrap(), vec!["hello", "bye", "yes"]);

        let limited = CsvReader::new(&path).with_limit(2).read().unwrap();
        assert_eq!(limited.height(), 2);
    }

    #[test]
    fn test_reader_kind_from_json_and_lineage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "input,response\na,1\nb,\n").unwrap();

        let reader: ReaderKind =
            serde_json::from_value(json!({"KIND": "CsvReader", "path": path})).unwrap();
        let table = reader.read().unwrap();
        let lineage = reader.lineage(&table, "targets", Some("response")).unwrap();
        assert_eq!(lineage.row_count, 2);
        assert_eq!(lineage.null_counts["response"], 1);
        assert_eq!(lineage.source_uri, path.display().to_string());
    }

    #[test]
    fn test_missing_file_is_data_error() {
        let err = CsvReader::new("/nonexistent/x.csv").read().unwrap_err();
        assert!(matches!(err, ModelOpsError::DataError(_)));
    }
}
