//! # Domain Errors
//!
//! Error types for the swing-store export subsystem.
//!
//! `ExportError` is `Clone` because an operation's terminal result is handed
//! to every waiter of its one-shot signals.

use shared_types::KVEntryError;
use thiserror::Error;

use super::operation::{height_label, OperationKind};

/// Errors from export and restore operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    /// Another export or restore is still active.
    #[error("{kind} operation already in progress for height {}", height_label(.height))]
    OperationInProgress {
        kind: OperationKind,
        height: Option<u64>,
    },

    /// The export behind a retrieve closure is not the active operation anymore.
    #[error("export operation no longer active")]
    OperationNotActive,

    /// A retrieve closure was invoked twice.
    #[error("export already retrieved")]
    AlreadyRetrieved,

    /// Error returned by the controller, passed through unchanged.
    #[error("{0}")]
    Controller(String),

    /// The controller returned an export for a different height.
    #[error("export manifest blockHeight ({actual}) doesn't match ({expected})")]
    HeightMismatch { expected: u64, actual: u64 },

    /// Invalid export or restore options.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// An artifact list contains the reserved untrusted export data name.
    #[error("unexpected export artifact name {0}")]
    ReservedArtifactName(String),

    /// An artifact was requested after the provider reported the last one.
    #[error("exceeded expected artifact count: {read} > {expected}")]
    ArtifactCountExceeded { read: usize, expected: usize },

    /// The host snapshot manager is not set up.
    #[error("snapshot manager not configured")]
    SnapshotNotConfigured,

    /// Snapshots of height 0 cannot be taken.
    #[error("snapshot block height must be greater than 0")]
    InvalidSnapshotHeight,

    /// The host asked for a snapshot payload while no snapshot was active.
    #[error("no active swingset snapshot")]
    NoActiveSnapshot,

    /// The active snapshot has no payload writer to send artifacts to.
    #[error("swingset snapshot has no payload writer")]
    MissingPayloadWriter,

    /// The host asked for a snapshot payload at an unexpected height.
    #[error("snapshot extension height {requested} doesn't match active snapshot height {active}")]
    SnapshotHeightMismatch { requested: u64, active: u64 },

    /// Snapshot payload format not understood by this extension.
    #[error("unsupported swingset snapshot format {0}")]
    UnsupportedFormat(u32),

    /// The verified chain store has no export data for a restore.
    #[error("no export data available for restore at height {0}")]
    MissingExportData(u64),

    /// Event handler or host callback failure.
    #[error("{0}")]
    Handler(String),

    /// The background worker could not be started.
    #[error("failed to spawn export worker: {0}")]
    WorkerSpawn(String),

    /// JSON or bincode encoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Export data stream failure.
    #[error(transparent)]
    KVEntry(#[from] KVEntryError),

    /// A cleanup failure wrapped around the primary error.
    #[error("{primary}; {context}: {secondary}")]
    Combined {
        primary: Box<ExportError>,
        secondary: Box<ExportError>,
        context: String,
    },
}

impl ExportError {
    /// Wrap `secondary` around `primary`, or return `secondary` alone.
    pub fn combine(
        primary: Option<ExportError>,
        secondary: ExportError,
        context: impl Into<String>,
    ) -> ExportError {
        match primary {
            Some(primary) => ExportError::Combined {
                primary: Box::new(primary),
                secondary: Box::new(secondary),
                context: context.into(),
            },
            None => secondary,
        }
    }

    /// Handler error from any displayable error.
    pub fn handler(err: impl std::fmt::Display) -> ExportError {
        ExportError::Handler(err.to_string())
    }
}

/// Merge a cleanup result into a primary result. The primary error wins and
/// the cleanup error is wrapped around it.
pub fn merge_cleanup(
    result: Result<(), ExportError>,
    cleanup: Result<(), ExportError>,
    context: &str,
) -> Result<(), ExportError> {
    match (result, cleanup) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) => Err(e),
        (primary, Err(cleanup)) => Err(ExportError::combine(primary.err(), cleanup, context)),
    }
}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for ExportError {
    fn from(e: bincode::Error) -> Self {
        ExportError::Serialization(e.to_string())
    }
}
