//! Model signatures
//!
//! A [`Signature`] describes the columns a model accepts and produces,
//! inferred once from a representative sample and fingerprinted with SHA-256.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::schema::{json_type_name, Inputs, Outputs, Table};

/// Name and inferred type of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub dtype: String,
}

/// Structural descriptor of model inputs and outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Input columns, sorted by name
    pub inputs: Vec<ColumnDescriptor>,
    /// Output columns, sorted by name
    pub outputs: Vec<ColumnDescriptor>,
    /// SHA-256 over the descriptors
    pub fingerprint: String,
}

impl Signature {
    /// Build a signature, sorting columns and computing the fingerprint
    pub fn new(mut inputs: Vec<ColumnDescriptor>, mut outputs: Vec<ColumnDescriptor>) -> Self {
        inputs.sort_by(|a, b| a.name.cmp(&b.name));
        outputs.sort_by(|a, b| a.name.cmp(&b.name));
        let fingerprint = fingerprint(&inputs, &outputs);
        Self {
            inputs,
            outputs,
            fingerprint,
        }
    }

    /// Input columns missing from `table`
    pub fn check_inputs(&self, table: &Table) -> Vec<String> {
        self.inputs
            .iter()
            .filter(|c| table.column(&c.name).is_none())
            .map(|c| c.name.clone())
            .collect()
    }
}

fn fingerprint(inputs: &[ColumnDescriptor], outputs: &[ColumnDescriptor]) -> String {
    let mut hasher = Sha256::new();
    for (section, columns) in [("inputs", inputs), ("outputs", outputs)] {
        hasher.update(section.as_bytes());
        for column in columns {
            hasher.update(b"|");
            hasher.update(column.name.as_bytes());
            hasher.update(b":");
            hasher.update(column.dtype.as_bytes());
        }
        hasher.update(b";");
    }
    format!("{:x}", hasher.finalize())
}

/// Type descriptor of a cell; records list their sorted field names
fn describe(value: &Value) -> String {
    match value {
        Value::Object(fields) => {
            let mut names: Vec<&str> = fields.keys().map(String::as_str).collect();
            names.sort_unstable();
            format!("record<{}>", names.join(","))
        }
        Value::Array(items) => match items.iter().find(|v| !v.is_null()) {
            Some(item) => format!("list<{}>", describe(item)),
            None => "list".to_string(),
        },
        other => json_type_name(other).to_string(),
    }
}

/// Describe every column of a table from its first non-null value
pub fn infer_columns(table: &Table) -> Vec<ColumnDescriptor> {
    table
        .columns()
        .iter()
        .map(|column| ColumnDescriptor {
            name: column.name.clone(),
            dtype: column
                .values
                .iter()
                .find(|v| !v.is_null())
                .map(describe)
                .unwrap_or_else(|| "null".to_string()),
        })
        .collect()
}

/// Derives a signature from sample data
pub trait Signer: Send + Sync {
    fn sign(&self, inputs: &Inputs, outputs: &Outputs) -> Result<Signature>;
}

/// Infers the signature from the sample's columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferSigner {}

impl Signer for InferSigner {
    fn sign(&self, inputs: &Inputs, outputs: &Outputs) -> Result<Signature> {
        Ok(Signature::new(
            infer_columns(inputs.table()),
            infer_columns(outputs.table()),
        ))
    }
}

/// Closed set of signers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "KIND")]
pub enum SignerKind {
    InferSigner(InferSigner),
}

impl Default for SignerKind {
    fn default() -> Self {
        SignerKind::InferSigner(InferSigner::default())
    }
}

impl Signer for SignerKind {
    fn sign(&self, inputs: &Inputs, outputs: &Outputs) -> Result<Signature> {
        match self {
            SignerKind::InferSigner(s) => s.sign(inputs, outputs),
        }
    }
}
