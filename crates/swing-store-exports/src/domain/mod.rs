//! # Domain Layer
//!
//! Pure types of the export subsystem: operations and their signals, wire
//! actions, options, the export manifest and artifacts.

pub mod actions;
pub mod artifact;
pub mod errors;
pub mod manifest;
pub mod operation;
pub mod options;
pub mod signal;

pub use actions::{ExportRequest, ImportOptions, SwingStoreExportAction};
pub use artifact::SwingStoreArtifact;
pub use errors::{merge_cleanup, ExportError};
pub use manifest::{
    sanitize_artifact_name, ExportManifest, EXPORT_DATA_FILENAME, EXPORT_MANIFEST_FILENAME,
    UNTRUSTED_EXPORT_DATA_ARTIFACT_NAME, UNTRUSTED_EXPORT_DATA_FILENAME,
};
pub use operation::{height_label, Operation, OperationKind, OperationResult};
pub use options::{ArtifactMode, ExportDataMode, ExportOptions, RestoreOptions};
pub use signal::OneShot;
