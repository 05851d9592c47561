//! Dataset writers

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::SerWriter;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::to_frame;
use crate::error::{ModelOpsError, Result};
use crate::schema::Table;

/// Writes a table to a destination
pub trait Writer: Send + Sync {
    fn write(&self, data: &Table) -> Result<()>;
}

fn create(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    File::create(path).map_err(|e| {
        ModelOpsError::DataError(format!("Failed to create {}: {}", path.display(), e))
    })
}

/// Writes CSV with a header row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsvWriter {
    pub path: PathBuf,
}

impl CsvWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Writer for CsvWriter {
    fn write(&self, data: &Table) -> Result<()> {
        let mut df = to_frame(data)?;
        let mut file = create(&self.path)?;
        polars::prelude::CsvWriter::new(&mut file).finish(&mut df)?;
        info!(path = %self.path.display(), rows = data.height(), "Wrote CSV dataset");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParquetWriter {
    pub path: PathBuf,
}

impl ParquetWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Writer for ParquetWriter {
    fn write(&self, data: &Table) -> Result<()> {
        let mut df = to_frame(data)?;
        let file = create(&self.path)?;
        polars::prelude::ParquetWriter::new(file).finish(&mut df)?;
        info!(path = %self.path.display(), rows = data.height(), "Wrote Parquet dataset");
        Ok(())
    }
}

/// Closed set of writers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "KIND")]
pub enum WriterKind {
    CsvWriter(CsvWriter),
    ParquetWriter(ParquetWriter),
}

impl Writer for WriterKind {
    fn write(&self, data: &Table) -> Result<()> {
        match self {
            WriterKind::CsvWriter(w) => w.write(data),
            WriterKind::ParquetWriter(w) => w.write(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CsvReader, ParquetReader, Reader};
    use crate::schema::{OutputMetadata, OutputRecord, Outputs};
    use tempfile::TempDir;

    fn outputs() -> Outputs {
        Outputs::from_records(vec![
            OutputRecord {
                response: "hi".into(),
                metadata: Some(OutputMetadata::now(true, vec!["hi".into()])),
            },
            OutputRecord {
                response: "there".into(),
                metadata: None,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_csv_outputs_survive_schema_check() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out.csv");
        CsvWriter::new(&path).write(outputs().table()).unwrap();

        let table = CsvReader::new(&path).read().unwrap();
        let restored = Outputs::check(&table).unwrap();
        assert_eq!(restored.responses(), vec!["hi", "there"]);
        let records = restored.records();
        assert_eq!(records[0].metadata.as_ref().unwrap().messages, vec!["hi".to_string()]);
        assert!(records[1].metadata.is_none());
    }

    #[test]
    fn test_parquet_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.parquet");
        let writer: WriterKind = WriterKind::ParquetWriter(ParquetWriter::new(&path));
        writer.write(outputs().table()).unwrap();

        let table = ParquetReader::new(&path).read().unwrap();
        assert_eq!(Outputs::check(&table).unwrap().len(), 2);
    }
}
