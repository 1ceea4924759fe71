//! # Swing-Store Exports
//!
//! Produces and restores point-in-time copies of the controller's store,
//! coordinated with the chain's block commits.
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`SwingStoreExportsHandler`] | single-flight export/restore, commit synchronization |
//! | [`ExtensionSnapshotter`] | host snapshot extension backed by exports |
//! | [`adapters::directory`] | export directory codec (manifest + one file per artifact) |
//! | [`CommitBoundary`] | block commit sequencing around exports |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - operations, signals, wire actions, options, manifest
//! - `ports/` - inbound APIs and outbound controller/host/store traits
//! - `adapters/` - directory codec, controller bridge, in-memory store
//! - `service/` - handler, snapshotter, genesis export, commit boundary
//!
//! ## Usage
//!
//! ```ignore
//! use swing_store_exports::{ExportsConfig, JsonControllerBridge, SwingStoreExportsHandler};
//!
//! let controller = Arc::new(JsonControllerBridge::new(blocking_send));
//! let exports = Arc::new(SwingStoreExportsHandler::new(controller, ExportsConfig::default()));
//!
//! exports.initiate_export(Some(height), handler, ExportOptions::default())?;
//! // before committing the next block
//! exports.wait_until_started()?;
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

/// Mocks of the controller, snapshot host and event handlers.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{
    open_swing_store_export_directory, write_swing_store_export_to_directory,
    DirectoryExportProvider, JsonControllerBridge, MemoryExportProvider, MemoryKVStore,
};
pub use config::{ExportsConfig, SnapshotterConfig};
pub use domain::{
    ArtifactMode, ExportDataMode, ExportError, ExportManifest, ExportOptions, RestoreOptions,
    SwingStoreArtifact, SwingStoreExportAction, UNTRUSTED_EXPORT_DATA_ARTIFACT_NAME,
};
pub use ports::{
    BlockCommitter, ControllerPort, ExportDataSink, ExportDataSource, ExportEventHandler,
    ExtensionPayloadReader, ExtensionPayloadWriter, SnapshotExtension, SnapshotHost,
    SnapshotInitiator, SwingStoreExportProvider, SwingStoreExportsApi,
};
pub use service::{
    export_to_directory, restore_from_directory, restore_from_directory_with_shadow_copy,
    CommitBoundary, DirectoryExporter, ExportRetriever, ExtensionSnapshotter,
    SwingStoreExportsHandler,
};
