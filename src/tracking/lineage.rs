//! Dataset lineage records

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::schema::Table;
use crate::signers::{infer_columns, ColumnDescriptor};

/// Origin, shape and fingerprint of a dataset used by a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    /// Dataset role within the run, e.g. `inputs`
    pub name: String,
    /// Where the data was read from
    pub source_uri: String,
    /// SHA-256 over the column data
    pub digest: String,
    pub row_count: usize,
    pub schema: Vec<ColumnDescriptor>,
    /// Column holding the targets, if any
    pub targets: Option<String>,
    /// Null cells per column
    pub null_counts: BTreeMap<String, usize>,
}

impl Lineage {
    /// Describe a table read from `source_uri`
    pub fn from_table(
        table: &Table,
        name: impl Into<String>,
        source_uri: impl Into<String>,
        targets: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            source_uri: source_uri.into(),
            digest: digest(table)?,
            row_count: table.height(),
            schema: infer_columns(table),
            targets: targets.map(String::from),
            null_counts: table
                .columns()
                .iter()
                .map(|c| (c.name.clone(), c.null_count()))
                .collect(),
        })
    }
}

/// Hex SHA-256 of the table's JSON columns
pub fn digest(table: &Table) -> Result<String> {
    let bytes = serde_json::to_vec(&table.to_json_columns())?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
