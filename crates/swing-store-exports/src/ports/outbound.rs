//! # Outbound Ports (Driven Ports)
//!
//! What the export subsystem needs from the rest of the node: the controller
//! call, the host snapshot manager, the chain's verified store, and the
//! sources and sinks export content moves through.

use shared_types::{KVEntry, KVEntryReader};

use crate::domain::{ExportError, SwingStoreArtifact};

/// The single blocking call into the controller.
///
/// Production: the node's controller RPC, usually wrapped in
/// `JsonControllerBridge`.
/// Testing: `MockController` (test_utils.rs)
pub trait ControllerPort: Send + Sync {
    /// Send a JSON action and wait for its JSON reply.
    ///
    /// `must_not_be_initialized` is set for requests that rewrite the
    /// controller's store and are only allowed before it starts running.
    fn blocking_send(&self, action: &str, must_not_be_initialized: bool) -> Result<String, ExportError>;
}

/// Access to the content of one store export.
///
/// Providers are consumed once, synchronously, by whoever receives them.
pub trait SwingStoreExportProvider {
    /// Height the export was taken at.
    fn block_height(&self) -> u64;

    /// Reader over the export data, or `None` if the export carries none.
    fn export_data_reader(&mut self) -> Result<Option<Box<dyn KVEntryReader>>, ExportError>;

    /// Next unread artifact, `None` once all artifacts were read.
    fn read_next_artifact(&mut self) -> Result<Option<SwingStoreArtifact>, ExportError>;
}

/// The host's snapshot manager.
pub trait SnapshotHost: Send + Sync {
    /// Whether snapshots are enabled on this node.
    fn is_configured(&self) -> bool;

    /// Take a whole-node snapshot at `height`.
    ///
    /// The host calls every registered extension's `snapshot_extension`
    /// while doing so. Failures are handled by the host and not reported.
    fn take_snapshot(&self, height: u64);
}

/// Chain-side source of export data as committed at a height.
pub trait ExportDataSource: Send + Sync {
    /// Reader over the export data at `height`, or `None` if that height is
    /// not available.
    fn export_data_reader(&self, height: u64) -> Result<Option<Box<dyn KVEntryReader>>, ExportError>;
}

/// Chain-side copy of the export data, fed while an export streams through.
///
/// Production: the chain's mirror of the controller's export data.
/// Testing: `MemoryKVStore`
pub trait ExportDataSink: Send + Sync {
    /// Apply one entry: set the key, or delete it if the entry has no value.
    fn apply(&self, entry: &KVEntry) -> Result<(), ExportError>;

    /// Seal the applied entries as the state at `height`.
    fn commit(&self, height: u64) -> Result<(), ExportError>;
}

/// Sink for the payloads of one snapshot extension.
pub trait ExtensionPayloadWriter: Send {
    fn write_payload(&mut self, payload: &[u8]) -> Result<(), ExportError>;
}

/// Source of the payloads of one snapshot extension, in write order.
pub trait ExtensionPayloadReader {
    /// Next payload, `None` once all were read.
    fn read_payload(&mut self) -> Result<Option<Vec<u8>>, ExportError>;
}

/// The two commit steps surrounding a block's commit boundary.
pub trait BlockCommitter: Send + Sync {
    /// Tell the controller to commit the mutations of the block at `height`.
    fn commit_controller_block(&self, height: u64) -> Result<(), ExportError>;

    /// Commit chain state. Returns the height to snapshot, if a snapshot is
    /// due after this block.
    fn commit_chain(&self, height: u64) -> Result<Option<u64>, ExportError>;
}
