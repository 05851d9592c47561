//! Model URIs
//!
//! Supported forms: `models:/<name>@<alias>`, `models:/<name>/<version>`,
//! `runs:/<run_id>/<path>`, `file://<path>` and plain filesystem paths.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelOpsError, Result};

/// Explicit alias or version selector
///
/// In JSON configs an integer is a version and a string is an alias, so a
/// numeric-looking alias such as `"2"` stays an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasOrVersion {
    Version(u64),
    Alias(String),
}

impl fmt::Display for AliasOrVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AliasOrVersion::Version(v) => write!(f, "version {}", v),
            AliasOrVersion::Alias(a) => write!(f, "alias {}", a),
        }
    }
}

/// `models:/<name>@<alias>`
pub fn uri_for_model_alias(name: &str, alias: &str) -> String {
    format!("models:/{}@{}", name, alias)
}

/// `models:/<name>/<version>`
pub fn uri_for_model_version(name: &str, version: u64) -> String {
    format!("models:/{}/{}", name, version)
}

/// URI for either selector
pub fn uri_for_model_alias_or_version(name: &str, selector: &AliasOrVersion) -> String {
    match selector {
        AliasOrVersion::Version(v) => uri_for_model_version(name, *v),
        AliasOrVersion::Alias(a) => uri_for_model_alias(name, a),
    }
}

/// `runs:/<run_id>/<path>`
pub fn uri_for_run_artifact(run_id: &str, path: &str) -> String {
    format!("runs:/{}/{}", run_id, path)
}

/// Parsed model URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelUri {
    Alias { name: String, alias: String },
    Version { name: String, version: u64 },
    Run { run_id: String, path: String },
    File(PathBuf),
}

impl ModelUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let not_found = || ModelOpsError::ModelNotFound(format!("Unsupported model URI: {}", uri));

        if uri.trim().is_empty() {
            return Err(not_found());
        }

        if let Some(rest) = uri.strip_prefix("models:/") {
            if let Some((name, alias)) = rest.rsplit_once('@') {
                if name.is_empty() || alias.is_empty() || name.contains('/') {
                    return Err(not_found());
                }
                return Ok(ModelUri::Alias {
                    name: name.to_string(),
                    alias: alias.to_string(),
                });
            }
            let (name, version) = rest.split_once('/').ok_or_else(not_found)?;
            let version = version.parse::<u64>().map_err(|_| not_found())?;
            if name.is_empty() {
                return Err(not_found());
            }
            return Ok(ModelUri::Version {
                name: name.to_string(),
                version,
            });
        }

        if let Some(rest) = uri.strip_prefix("runs:/") {
            let (run_id, path) = rest.split_once('/').ok_or_else(not_found)?;
            if run_id.is_empty() || path.is_empty() {
                return Err(not_found());
            }
            return Ok(ModelUri::Run {
                run_id: run_id.to_string(),
                path: path.trim_end_matches('/').to_string(),
            });
        }

        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(ModelUri::File(PathBuf::from(path)));
        }

        if uri.contains(":/") {
            return Err(not_found());
        }
        Ok(ModelUri::File(PathBuf::from(uri)))
    }

    /// Whether the URI points into the registry rather than at a bundle
    pub fn is_registry(&self) -> bool {
        matches!(self, ModelUri::Alias { .. } | ModelUri::Version { .. })
    }
}

impl FromStr for ModelUri {
    type Err = ModelOpsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelUri::Alias { name, alias } => f.write_str(&uri_for_model_alias(name, alias)),
            ModelUri::Version { name, version } => {
                f.write_str(&uri_for_model_version(name, *version))
            }
            ModelUri::Run { run_id, path } => f.write_str(&uri_for_run_artifact(run_id, path)),
            ModelUri::File(path) => write!(f, "file://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_helpers() {
        assert_eq!(uri_for_model_alias("team", "Champion"), "models:/team@Champion");
        assert_eq!(uri_for_model_version("team", 3), "models:/team/3");
        assert_eq!(
            uri_for_model_alias_or_version("team", &AliasOrVersion::Alias("2".into())),
            "models:/team@2"
        );
        assert_eq!(
            uri_for_model_alias_or_version("team", &AliasOrVersion::Version(2)),
            "models:/team/2"
        );
    }

    #[test]
    fn test_alias_or_version_from_json() {
        let v: AliasOrVersion = serde_json::from_str("2").unwrap();
        assert_eq!(v, AliasOrVersion::Version(2));
        let a: AliasOrVersion = serde_json::from_str("\"2\"").unwrap();
        assert_eq!(a, AliasOrVersion::Alias("2".into()));
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            ModelUri::parse("models:/team@Champion").unwrap(),
            ModelUri::Alias {
                name: "team".into(),
                alias: "Champion".into()
            }
        );
        assert_eq!(
            ModelUri::parse("models:/team/4").unwrap(),
            ModelUri::Version {
                name: "team".into(),
                version: 4
            }
        );
        assert_eq!(
            ModelUri::parse("runs:/abc/model").unwrap(),
            ModelUri::Run {
                run_id: "abc".into(),
                path: "model".into()
            }
        );
        assert_eq!(
            ModelUri::parse("file:///tmp/model").unwrap(),
            ModelUri::File(PathBuf::from("/tmp/model"))
        );
        assert_eq!(
            ModelUri::parse("some/dir").unwrap(),
            ModelUri::File(PathBuf::from("some/dir"))
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "models:/team", "models:/team/latest", "runs:/abc", "s3://bucket/x"] {
            assert!(
                matches!(ModelUri::parse(bad), Err(ModelOpsError::ModelNotFound(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_display_round_trip() {
        for uri in ["models:/team@Champion", "models:/team/1", "runs:/r1/model"] {
            assert_eq!(ModelUri::parse(uri).unwrap().to_string(), uri);
        }
    }
}
