//! # Ports Layer
//!
//! - `inbound` - APIs offered by this subsystem
//! - `outbound` - interfaces required from the node

pub mod inbound;
pub mod outbound;

pub use inbound::{ExportEventHandler, SnapshotExtension, SnapshotInitiator, SwingStoreExportsApi};
pub use outbound::{
    BlockCommitter, ControllerPort, ExportDataSink, ExportDataSource, ExtensionPayloadReader,
    ExtensionPayloadWriter, SnapshotHost, SwingStoreExportProvider,
};
