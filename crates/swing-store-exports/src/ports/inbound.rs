//! # Inbound Ports (Driving Ports)
//!
//! APIs this subsystem offers to the node and to callers of exports.

use std::sync::Arc;

use crate::domain::{ExportError, ExportOptions, RestoreOptions};
use crate::ports::outbound::{ExtensionPayloadReader, ExtensionPayloadWriter, SwingStoreExportProvider};
use crate::service::ExportRetriever;

/// Export and restore orchestration.
///
/// All methods must be called from one logical caller context at a time.
pub trait SwingStoreExportsApi: Send + Sync {
    /// Start an export in the background. `None` exports the latest block.
    fn initiate_export(
        &self,
        block_height: Option<u64>,
        event_handler: Arc<dyn ExportEventHandler>,
        options: ExportOptions,
    ) -> Result<(), ExportError>;

    /// Restore the controller's store from `provider`, blocking until done.
    fn restore_export(
        &self,
        provider: &mut dyn SwingStoreExportProvider,
        options: RestoreOptions,
    ) -> Result<(), ExportError>;

    /// Block until the active export has started.
    fn wait_until_started(&self) -> Result<(), ExportError>;

    /// Block until the active export is done.
    fn wait_until_done(&self) -> Result<(), ExportError>;
}

/// Callbacks of an export, invoked from its background worker.
pub trait ExportEventHandler: Send + Sync {
    /// The controller started the export.
    ///
    /// Must call `retriever.retrieve()` before returning, otherwise the export
    /// is discarded.
    fn on_export_started(
        &self,
        block_height: Option<u64>,
        retriever: ExportRetriever,
    ) -> Result<(), ExportError>;

    /// The export is ready. Called during `retrieve()`; `provider` must be
    /// consumed before returning.
    fn on_export_retrieved(
        &self,
        provider: &mut dyn SwingStoreExportProvider,
    ) -> Result<(), ExportError>;
}

/// Participant in the host's snapshot protocol.
pub trait SnapshotExtension: Send + Sync {
    /// Name the host files this extension's payloads under.
    fn snapshot_name(&self) -> &'static str;

    /// Format written by `snapshot_extension`.
    fn snapshot_format(&self) -> u32;

    /// Formats `restore_extension` accepts.
    fn supported_formats(&self) -> &'static [u32];

    /// Write this extension's payloads for the snapshot at `height`.
    fn snapshot_extension(
        &self,
        height: u64,
        payload_writer: Box<dyn ExtensionPayloadWriter>,
    ) -> Result<(), ExportError>;

    /// Restore from payloads written by `snapshot_extension`.
    fn restore_extension(
        &self,
        height: u64,
        format: u32,
        payload_reader: &mut dyn ExtensionPayloadReader,
    ) -> Result<(), ExportError>;
}

/// Entry point the commit loop uses to start a snapshot.
pub trait SnapshotInitiator: Send + Sync {
    fn initiate_snapshot(&self, height: u64) -> Result<(), ExportError>;
}
