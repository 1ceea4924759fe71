//! # Export Manifest
//!
//! An export directory holds one file per artifact, an optional export data
//! file, and `export-manifest.json` linking them:
//!
//! ```json
//! {
//!   "blockHeight": 123,
//!   "data": "export-data.jsonl",
//!   "artifacts": [
//!     ["bundle.b0-1", "0-bundle.b0-1"]
//!   ]
//! }
//! ```
//!
//! The manifest is the last file written, so a directory without one is
//! incomplete.

use serde::{Deserialize, Serialize};

use super::errors::ExportError;

/// Fixed name of the manifest file.
pub const EXPORT_MANIFEST_FILENAME: &str = "export-manifest.json";

/// Fixed name of the export data file.
pub const EXPORT_DATA_FILENAME: &str = "export-data.jsonl";

/// Reserved name of the synthetic artifact carrying unverified export data.
pub const UNTRUSTED_EXPORT_DATA_ARTIFACT_NAME: &str = "UNTRUSTED-EXPORT-DATA";

/// File the untrusted export data artifact is written to. Never listed in a
/// manifest.
pub const UNTRUSTED_EXPORT_DATA_FILENAME: &str = "untrusted-export-data.jsonl";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportManifest {
    #[serde(default)]
    pub block_height: u64,

    /// Export data file, if the export carries export data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// `(artifact name, file name)` pairs in export order.
    #[serde(default)]
    pub artifacts: Vec<(String, String)>,
}

impl ExportManifest {
    pub fn new(block_height: u64) -> Self {
        Self {
            block_height,
            ..Self::default()
        }
    }

    /// Record an artifact and return the file name it must be written to.
    pub fn push_artifact(&mut self, name: &str) -> String {
        let filename = format!("{}-{}", self.artifacts.len(), sanitize_artifact_name(name));
        self.artifacts.push((name.to_string(), filename.clone()));
        filename
    }

    /// Reject a manifest listing the reserved untrusted artifact.
    pub fn validate(&self) -> Result<(), ExportError> {
        match self
            .artifacts
            .iter()
            .find(|(name, _)| name == UNTRUSTED_EXPORT_DATA_ARTIFACT_NAME)
        {
            Some((name, _)) => Err(ExportError::ReservedArtifactName(name.clone())),
            None => Ok(()),
        }
    }

    /// Two-space indented JSON.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, ExportError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ExportError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// File name derived from an untrusted artifact name: every character other
/// than ASCII letters, digits, `-`, `_` and `.` becomes `-`.
pub fn sanitize_artifact_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
