//! # Extension Snapshotter
//!
//! Plugs store exports into the host's two-phase snapshot protocol.
//!
//! ## Taking a snapshot
//!
//! 1. `initiate_snapshot(h)` starts an export of height `h`.
//! 2. The export worker calls `on_export_started`, which records the active
//!    snapshot and asks the host to take its snapshot.
//! 3. The host calls `snapshot_extension(h, writer)`, which retrieves the
//!    export.
//! 4. `on_export_retrieved` writes every artifact, then the export data as
//!    an `UNTRUSTED-EXPORT-DATA` artifact, as bincode payloads.
//!
//! ## Restoring
//!
//! `restore_extension` builds a provider whose export data comes from the
//! chain's verified store and whose artifacts are the decoded payloads, and
//! restores it. Export data from the payloads is never trusted.
//!
//! The host does not report errors returned from `snapshot_extension`, so
//! every failure is logged where it happens.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use shared_types::{encode_kv_entry_reader_to_jsonl, KVEntryReader};
use tracing::{error, info};

use crate::config::SnapshotterConfig;
use crate::domain::{ExportError, SwingStoreArtifact, UNTRUSTED_EXPORT_DATA_ARTIFACT_NAME};
use crate::ports::{
    ExportDataSource, ExportEventHandler, ExtensionPayloadReader, ExtensionPayloadWriter,
    SnapshotExtension, SnapshotHost, SnapshotInitiator, SwingStoreExportProvider,
    SwingStoreExportsApi,
};
use crate::service::ExportRetriever;

/// Name of the snapshot extension.
pub const SNAPSHOT_EXTENSION_NAME: &str = "swingset";

/// Payload format: one bincode encoded `SwingStoreArtifact` per payload.
pub const SNAPSHOT_FORMAT: u32 = 1;

const SUPPORTED_FORMATS: &[u32] = &[SNAPSHOT_FORMAT];

struct ActiveSnapshot {
    height: u64,
    retriever: ExportRetriever,
    payload_writer: Option<Box<dyn ExtensionPayloadWriter>>,
}

fn log_failure(err: ExportError) -> ExportError {
    error!(error = %err, "swingset snapshot extension failed");
    err
}

/// Snapshot extension backed by store exports.
pub struct ExtensionSnapshotter {
    exports: Arc<dyn SwingStoreExportsApi>,
    host: Arc<dyn SnapshotHost>,
    verified_store: Arc<dyn ExportDataSource>,
    shadow_copy: Option<Arc<dyn ExportDataSource>>,
    config: SnapshotterConfig,
    active: Mutex<Option<ActiveSnapshot>>,
    this: Weak<ExtensionSnapshotter>,
}

impl ExtensionSnapshotter {
    /// Create the snapshotter.
    ///
    /// `verified_store` provides the export data of restores. `shadow_copy`,
    /// if any, provides the untrusted export data written into snapshots
    /// whose export carries none.
    pub fn new(
        exports: Arc<dyn SwingStoreExportsApi>,
        host: Arc<dyn SnapshotHost>,
        verified_store: Arc<dyn ExportDataSource>,
        shadow_copy: Option<Arc<dyn ExportDataSource>>,
        config: SnapshotterConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            exports,
            host,
            verified_store,
            shadow_copy,
            config,
            active: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// Start a snapshot of `height` in the background.
    pub fn initiate_snapshot(&self, height: u64) -> Result<(), ExportError> {
        if !self.host.is_configured() {
            return Err(log_failure(ExportError::SnapshotNotConfigured));
        }
        if height == 0 {
            return Err(log_failure(ExportError::InvalidSnapshotHeight));
        }
        let handler: Arc<dyn ExportEventHandler> = self
            .this
            .upgrade()
            .ok_or_else(|| log_failure(ExportError::handler("snapshotter dropped")))?;

        info!(height, "initiating swingset snapshot");
        self.exports
            .initiate_export(Some(height), handler, self.config.export_options)
            .map_err(log_failure)
    }

    fn write_payload(
        writer: &mut dyn ExtensionPayloadWriter,
        artifact: &SwingStoreArtifact,
    ) -> Result<(), ExportError> {
        writer.write_payload(&artifact.to_payload()?)
    }

    /// Export data for the untrusted artifact: the export's own, else the
    /// shadow copy at the snapshot height.
    fn untrusted_export_data(
        &self,
        provider: &mut dyn SwingStoreExportProvider,
    ) -> Result<Option<Box<dyn KVEntryReader>>, ExportError> {
        if let Some(reader) = provider.export_data_reader()? {
            return Ok(Some(reader));
        }
        match &self.shadow_copy {
            Some(shadow_copy) => shadow_copy.export_data_reader(provider.block_height()),
            None => Ok(None),
        }
    }
}

impl SnapshotInitiator for ExtensionSnapshotter {
    fn initiate_snapshot(&self, height: u64) -> Result<(), ExportError> {
        ExtensionSnapshotter::initiate_snapshot(self, height)
    }
}

impl ExportEventHandler for ExtensionSnapshotter {
    fn on_export_started(
        &self,
        block_height: Option<u64>,
        retriever: ExportRetriever,
    ) -> Result<(), ExportError> {
        let height = block_height
            .ok_or(ExportError::InvalidSnapshotHeight)
            .map_err(log_failure)?;
        *self.active.lock() = Some(ActiveSnapshot {
            height,
            retriever,
            payload_writer: None,
        });

        // Calls back into snapshot_extension. Failures surface through the
        // retriever's recorded error.
        self.host.take_snapshot(height);

        *self.active.lock() = None;
        Ok(())
    }

    fn on_export_retrieved(
        &self,
        provider: &mut dyn SwingStoreExportProvider,
    ) -> Result<(), ExportError> {
        let mut writer = {
            let mut active = self.active.lock();
            let snapshot = active
                .as_mut()
                .filter(|snapshot| snapshot.height == provider.block_height())
                .ok_or(ExportError::NoActiveSnapshot)?;
            snapshot
                .payload_writer
                .take()
                .ok_or(ExportError::MissingPayloadWriter)?
        };

        let mut artifacts = 0usize;
        while let Some(artifact) = provider.read_next_artifact()? {
            Self::write_payload(writer.as_mut(), &artifact)?;
            artifacts += 1;
        }

        if let Some(mut reader) = self.untrusted_export_data(provider)? {
            let mut encoded = Vec::new();
            let encoded_result = encode_kv_entry_reader_to_jsonl(reader.as_mut(), &mut encoded);
            let closed = reader.close();
            encoded_result?;
            closed?;
            let artifact = SwingStoreArtifact::new(UNTRUSTED_EXPORT_DATA_ARTIFACT_NAME, encoded);
            Self::write_payload(writer.as_mut(), &artifact)?;
        }

        info!(
            height = provider.block_height(),
            artifacts, "wrote swingset snapshot payloads"
        );
        Ok(())
    }
}

impl SnapshotExtension for ExtensionSnapshotter {
    fn snapshot_name(&self) -> &'static str {
        SNAPSHOT_EXTENSION_NAME
    }

    fn snapshot_format(&self) -> u32 {
        SNAPSHOT_FORMAT
    }

    fn supported_formats(&self) -> &'static [u32] {
        SUPPORTED_FORMATS
    }

    fn snapshot_extension(
        &self,
        height: u64,
        payload_writer: Box<dyn ExtensionPayloadWriter>,
    ) -> Result<(), ExportError> {
        let retriever = {
            let mut active = self.active.lock();
            let snapshot = active
                .as_mut()
                .ok_or(ExportError::NoActiveSnapshot)
                .map_err(log_failure)?;
            if snapshot.height != height {
                return Err(log_failure(ExportError::SnapshotHeightMismatch {
                    requested: height,
                    active: snapshot.height,
                }));
            }
            snapshot.payload_writer = Some(payload_writer);
            snapshot.retriever.clone()
        };

        retriever.retrieve().map_err(log_failure)
    }

    fn restore_extension(
        &self,
        height: u64,
        format: u32,
        payload_reader: &mut dyn ExtensionPayloadReader,
    ) -> Result<(), ExportError> {
        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(log_failure(ExportError::UnsupportedFormat(format)));
        }

        let mut provider = PayloadExportProvider {
            block_height: height,
            verified_store: self.verified_store.as_ref(),
            payload_reader,
        };
        self.exports
            .restore_export(&mut provider, self.config.restore_options)
            .map_err(log_failure)
    }
}

/// Restore source: export data from the verified store, artifacts from
/// snapshot payloads.
struct PayloadExportProvider<'a, 'r> {
    block_height: u64,
    verified_store: &'a dyn ExportDataSource,
    payload_reader: &'r mut dyn ExtensionPayloadReader,
}

impl SwingStoreExportProvider for PayloadExportProvider<'_, '_> {
    fn block_height(&self) -> u64 {
        self.block_height
    }

    fn export_data_reader(&mut self) -> Result<Option<Box<dyn KVEntryReader>>, ExportError> {
        match self.verified_store.export_data_reader(self.block_height)? {
            Some(reader) => Ok(Some(reader)),
            None => Err(ExportError::MissingExportData(self.block_height)),
        }
    }

    fn read_next_artifact(&mut self) -> Result<Option<SwingStoreArtifact>, ExportError> {
        match self.payload_reader.read_payload()? {
            Some(payload) => Ok(Some(SwingStoreArtifact::from_payload(&payload)?)),
            None => Ok(None),
        }
    }
}
