//! # Controller Actions
//!
//! JSON actions sent to the controller, all of type `SWING_STORE_EXPORT` and
//! discriminated by their `request` field:
//!
//! ```text
//! {"type":"SWING_STORE_EXPORT","request":"initiate","blockHeight":123,"args":[{"artifactMode":"replay","exportDataMode":"skip"}]}
//! {"type":"SWING_STORE_EXPORT","request":"retrieve"}
//! {"type":"SWING_STORE_EXPORT","request":"discard"}
//! {"type":"SWING_STORE_EXPORT","request":"restore","blockHeight":123,"args":[{"exportDir":"/tmp/x","artifactMode":"replay","exportDataMode":"all"}]}
//! ```
//!
//! An initiate without `blockHeight` exports the latest committed block.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::errors::ExportError;
use super::options::{ArtifactMode, ExportDataMode, ExportOptions, RestoreOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "SWING_STORE_EXPORT")]
    SwingStoreExport,
}

/// Arguments of a restore request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    pub export_dir: PathBuf,
    pub artifact_mode: ArtifactMode,
    pub export_data_mode: ExportDataMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "lowercase")]
pub enum ExportRequest {
    #[serde(rename_all = "camelCase")]
    Initiate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_height: Option<u64>,
        args: [ExportOptions; 1],
    },
    Retrieve,
    Discard,
    #[serde(rename_all = "camelCase")]
    Restore {
        block_height: u64,
        args: [ImportOptions; 1],
    },
}

impl ExportRequest {
    /// Value of the `request` field.
    pub fn name(&self) -> &'static str {
        match self {
            ExportRequest::Initiate { .. } => "initiate",
            ExportRequest::Retrieve => "retrieve",
            ExportRequest::Discard => "discard",
            ExportRequest::Restore { .. } => "restore",
        }
    }
}

/// Complete action as sent over the controller call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwingStoreExportAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(flatten)]
    pub request: ExportRequest,
}

impl SwingStoreExportAction {
    fn new(request: ExportRequest) -> Self {
        Self {
            action_type: ActionType::SwingStoreExport,
            request,
        }
    }

    pub fn initiate(block_height: Option<u64>, options: ExportOptions) -> Self {
        Self::new(ExportRequest::Initiate {
            block_height,
            args: [options],
        })
    }

    pub fn retrieve() -> Self {
        Self::new(ExportRequest::Retrieve)
    }

    pub fn discard() -> Self {
        Self::new(ExportRequest::Discard)
    }

    pub fn restore(block_height: u64, export_dir: PathBuf, options: RestoreOptions) -> Self {
        Self::new(ExportRequest::Restore {
            block_height,
            args: [ImportOptions {
                export_dir,
                artifact_mode: options.artifact_mode,
                export_data_mode: options.export_data_mode,
            }],
        })
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ExportError> {
        Ok(serde_json::from_str(json)?)
    }
}
