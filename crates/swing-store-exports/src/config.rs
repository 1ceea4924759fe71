//! # Export Configuration
//!
//! Configuration of the exports handler and the snapshot extension.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::adapters::EXPORTED_FILES_MODE;
use crate::domain::{
    ArtifactMode, ExportDataMode, ExportError, ExportOptions, RestoreOptions,
};

/// Exports handler configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportsConfig {
    /// Directory restore staging directories are created in. `None` uses the
    /// system temporary directory.
    pub restore_temp_root: Option<PathBuf>,

    /// Prefix of restore staging directories. The block height is appended.
    pub restore_dir_prefix: String,

    /// Permissions of exported files.
    pub exported_files_mode: u32,

    /// Name of export worker threads.
    pub worker_thread_name: String,
}

impl Default for ExportsConfig {
    fn default() -> Self {
        Self {
            restore_temp_root: None,
            restore_dir_prefix: "swingset-store-restore".to_string(),
            exported_files_mode: EXPORTED_FILES_MODE,
            worker_thread_name: "swing-store-export".to_string(),
        }
    }
}

impl ExportsConfig {
    /// Config for testing, staging restores under `temp_root`.
    pub fn for_testing(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            restore_temp_root: Some(temp_root.into()),
            restore_dir_prefix: "test-swing-store-restore".to_string(),
            ..Self::default()
        }
    }

    /// Directory prefix of the restore of `block_height`.
    pub fn restore_dir_prefix_for(&self, block_height: u64) -> String {
        format!("{}-{}-", self.restore_dir_prefix, block_height)
    }
}

/// Options the snapshot extension uses for its exports and restores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotterConfig {
    /// Export data is mirrored in chain state, so snapshots skip it.
    pub export_options: ExportOptions,

    /// Restores rebuild the whole store from chain export data and payloads.
    pub restore_options: RestoreOptions,
}

impl Default for SnapshotterConfig {
    fn default() -> Self {
        Self {
            export_options: ExportOptions::new(ArtifactMode::Replay, ExportDataMode::Skip),
            restore_options: RestoreOptions::new(ArtifactMode::Replay, ExportDataMode::All),
        }
    }
}

impl SnapshotterConfig {
    pub fn validate(&self) -> Result<(), ExportError> {
        self.export_options.validate()?;
        self.restore_options.validate()
    }
}
