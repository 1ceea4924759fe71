//! Export and restore options understood by the controller.

use serde::{Deserialize, Serialize};

use super::errors::ExportError;

/// Set of artifacts included in an export or restore, by increasing scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactMode {
    /// No artifacts.
    None,
    /// Minimal set of artifacts needed to operate a node.
    Operational,
    /// Artifacts needed to replay the current incarnation of every vat.
    Replay,
    /// Every artifact needed to replay any vat from its creation.
    Archival,
    /// Every available artifact, including ones not needed for replay.
    Debug,
}

/// Handling of "export data", the store entries mirrored in chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportDataMode {
    /// Leave export data out.
    Skip,
    /// Only import missing metadata (restore only).
    RepairMetadata,
    /// Include all export data.
    All,
}

/// Options of an export request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    pub artifact_mode: ArtifactMode,
    pub export_data_mode: ExportDataMode,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            artifact_mode: ArtifactMode::Operational,
            export_data_mode: ExportDataMode::All,
        }
    }
}

impl ExportOptions {
    pub fn new(artifact_mode: ArtifactMode, export_data_mode: ExportDataMode) -> Self {
        Self {
            artifact_mode,
            export_data_mode,
        }
    }

    /// Reject combinations the controller refuses.
    pub fn validate(&self) -> Result<(), ExportError> {
        match (self.artifact_mode, self.export_data_mode) {
            (ArtifactMode::None, ExportDataMode::Skip) => Err(ExportError::InvalidOptions(
                "exportDataMode \"skip\" requires an artifactMode other than \"none\"".into(),
            )),
            (_, ExportDataMode::RepairMetadata) => Err(ExportError::InvalidOptions(
                "exportDataMode \"repair-metadata\" is only valid for restores".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Options of a restore request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOptions {
    pub artifact_mode: ArtifactMode,
    pub export_data_mode: ExportDataMode,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            artifact_mode: ArtifactMode::Operational,
            export_data_mode: ExportDataMode::All,
        }
    }
}

impl RestoreOptions {
    pub fn new(artifact_mode: ArtifactMode, export_data_mode: ExportDataMode) -> Self {
        Self {
            artifact_mode,
            export_data_mode,
        }
    }

    /// Reject combinations the controller refuses.
    pub fn validate(&self) -> Result<(), ExportError> {
        match self.export_data_mode {
            ExportDataMode::RepairMetadata if self.artifact_mode != ArtifactMode::None => {
                Err(ExportError::InvalidOptions(
                    "exportDataMode \"repair-metadata\" requires artifactMode \"none\"".into(),
                ))
            }
            ExportDataMode::All if self.artifact_mode < ArtifactMode::Operational => {
                Err(ExportError::InvalidOptions(
                    "exportDataMode \"all\" requires artifactMode \"operational\" or above".into(),
                ))
            }
            ExportDataMode::Skip => Err(ExportError::InvalidOptions(
                "exportDataMode \"skip\" is not valid for restores".into(),
            )),
            _ => Ok(()),
        }
    }
}
