//! # Snapshot Extension Integration Tests
//!
//! Full snapshot and restore cycles through the exports handler, a scripted
//! controller and a mock snapshot manager.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use shared_types::{JsonlKVEntryReader, KVEntry, KVEntryReader};
use swing_store_exports::domain::ExportRequest;
use swing_store_exports::service::SNAPSHOT_FORMAT;
use swing_store_exports::test_utils::{
    MockController, MockSnapshotHost, VecPayloadReader, VecPayloadWriter,
};
use swing_store_exports::{
    ArtifactMode, ExportDataMode, ExportDataSource, ExportError, ExportsConfig,
    ExtensionSnapshotter, MemoryExportProvider, MemoryKVStore, SnapshotExtension,
    SnapshotterConfig, SwingStoreArtifact, SwingStoreExportProvider, SwingStoreExportsHandler,
    UNTRUSTED_EXPORT_DATA_ARTIFACT_NAME,
};

// =============================================================================
// TEST HELPERS
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Log sink for a scoped subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn chain_store(height: u64) -> Arc<MemoryKVStore> {
    let store = Arc::new(MemoryKVStore::new());
    store.set("kv.v1.vs.c", "10");
    store.set("kv.v1.vs.vom.o+1", "{\"x\":1}");
    store.set("snapshot.v1.1", "{\"hash\":\"abc\"}");
    store.commit(height);
    store
}

fn store_entries(store: &MemoryKVStore, height: u64) -> Vec<KVEntry> {
    let mut reader = store.export_data_reader(height).unwrap().unwrap();
    let mut entries = Vec::new();
    while let Some(entry) = reader.read().unwrap() {
        entries.push(entry);
    }
    entries
}

fn artifacts() -> Vec<SwingStoreArtifact> {
    vec![
        SwingStoreArtifact::new("bundle.b0-1", b"bundle".to_vec()),
        SwingStoreArtifact::new("snapshot.v1.1", vec![0xde, 0xad, 0xbe, 0xef]),
        SwingStoreArtifact::new("transcript.v1.1.0.5", b"{\"d\":1}\n".to_vec()),
    ]
}

struct Node {
    controller: Arc<MockController>,
    exports: Arc<SwingStoreExportsHandler>,
    host: Arc<MockSnapshotHost>,
    snapshotter: Arc<ExtensionSnapshotter>,
    _temp_root: tempfile::TempDir,
}

fn node(
    controller: MockController,
    host: MockSnapshotHost,
    store: &Arc<MemoryKVStore>,
    shadow_copy: bool,
) -> Node {
    init_tracing();
    let temp_root = tempfile::tempdir().unwrap();
    let controller = Arc::new(controller);
    let exports = Arc::new(SwingStoreExportsHandler::new(
        controller.clone(),
        ExportsConfig::for_testing(temp_root.path()),
    ));
    let host = Arc::new(host);
    let shadow_copy = shadow_copy.then(|| store.clone() as Arc<dyn ExportDataSource>);
    let snapshotter = ExtensionSnapshotter::new(
        exports.clone(),
        host.clone(),
        store.clone(),
        shadow_copy,
        SnapshotterConfig::default(),
    );
    host.register(&snapshotter);
    Node {
        controller,
        exports,
        host,
        snapshotter,
        _temp_root: temp_root,
    }
}

fn decode_payloads(payloads: &[Vec<u8>]) -> Vec<SwingStoreArtifact> {
    payloads
        .iter()
        .map(|payload| SwingStoreArtifact::from_payload(payload).unwrap())
        .collect()
}

fn decode_jsonl(bytes: &[u8]) -> Vec<KVEntry> {
    let mut reader = JsonlKVEntryReader::new(bytes);
    let mut entries = Vec::new();
    while let Some(entry) = reader.read().unwrap() {
        entries.push(entry);
    }
    entries
}

// =============================================================================
// SNAPSHOT AND RESTORE
// =============================================================================

#[test]
fn test_snapshot_then_restore() {
    let store = chain_store(20);
    let source = node(
        MockController::with_export(MemoryExportProvider::new(20, None, artifacts())),
        MockSnapshotHost::new(true),
        &store,
        true,
    );

    source.snapshotter.initiate_snapshot(20).unwrap();
    assert_eq!(source.exports.wait_until_done(), Ok(()));
    assert!(source.host.errors().is_empty());
    assert_eq!(source.host.snapshot_heights(), vec![20]);

    // Snapshots skip export data, it is already in chain state.
    let (initiate, _) = &source.controller.actions()[0];
    match &initiate.request {
        ExportRequest::Initiate {
            block_height,
            args: [options],
        } => {
            assert_eq!(*block_height, Some(20));
            assert_eq!(options.artifact_mode, ArtifactMode::Replay);
            assert_eq!(options.export_data_mode, ExportDataMode::Skip);
        }
        other => panic!("unexpected request: {:?}", other),
    }

    let written = decode_payloads(&source.host.payloads());
    assert_eq!(written.len(), artifacts().len() + 1);
    assert_eq!(&written[..3], artifacts().as_slice());
    let untrusted = &written[3];
    assert_eq!(untrusted.name, UNTRUSTED_EXPORT_DATA_ARTIFACT_NAME);
    assert_eq!(decode_jsonl(&untrusted.data), store_entries(&store, 20));

    // A fresh node restores from the payloads and its verified chain state.
    let target = node(MockController::new(), MockSnapshotHost::new(true), &store, false);
    let mut payloads = source.host.payload_reader();
    target
        .snapshotter
        .restore_extension(20, SNAPSHOT_FORMAT, &mut payloads)
        .unwrap();

    let restored = target.controller.restored();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].block_height(), 20);
    assert_eq!(restored[0].export_data(), Some(store_entries(&store, 20).as_slice()));
    assert_eq!(restored[0].artifacts().cloned().collect::<Vec<_>>(), artifacts());
    assert_eq!(
        target.controller.restored_untrusted_data(),
        vec![Some(untrusted.data.clone())]
    );

    let (restore, must_not_be_initialized) = target.controller.actions().pop().unwrap();
    assert!(must_not_be_initialized);
    match restore.request {
        ExportRequest::Restore {
            block_height,
            args: [options],
        } => {
            assert_eq!(block_height, 20);
            assert_eq!(options.artifact_mode, ArtifactMode::Replay);
            assert_eq!(options.export_data_mode, ExportDataMode::All);
        }
        other => panic!("unexpected request: {:?}", other),
    }
}

#[test]
fn test_snapshot_without_any_export_data_source() {
    let store = chain_store(5);
    let source = node(
        MockController::with_export(MemoryExportProvider::new(5, None, artifacts())),
        MockSnapshotHost::new(true),
        &store,
        false,
    );

    source.snapshotter.initiate_snapshot(5).unwrap();
    assert_eq!(source.exports.wait_until_done(), Ok(()));
    assert_eq!(decode_payloads(&source.host.payloads()), artifacts());
}

#[test]
fn test_snapshot_prefers_export_data_from_export() {
    let store = chain_store(6);
    let exported = vec![KVEntry::with_value("from.export", "1").unwrap()];
    let source = node(
        MockController::with_export(MemoryExportProvider::new(6, Some(exported.clone()), Vec::new())),
        MockSnapshotHost::new(true),
        &store,
        true,
    );

    source.snapshotter.initiate_snapshot(6).unwrap();
    assert_eq!(source.exports.wait_until_done(), Ok(()));
    let written = decode_payloads(&source.host.payloads());
    assert_eq!(written.len(), 1);
    assert_eq!(decode_jsonl(&written[0].data), exported);
}

// =============================================================================
// FAILURES
// =============================================================================

#[test]
fn test_initiate_snapshot_preconditions() {
    let store = chain_store(1);
    let unconfigured = node(MockController::new(), MockSnapshotHost::new(false), &store, true);
    assert_eq!(
        unconfigured.snapshotter.initiate_snapshot(1),
        Err(ExportError::SnapshotNotConfigured)
    );

    let configured = node(MockController::new(), MockSnapshotHost::new(true), &store, true);
    assert_eq!(
        configured.snapshotter.initiate_snapshot(0),
        Err(ExportError::InvalidSnapshotHeight)
    );
    assert!(unconfigured.controller.requests().is_empty());
    assert!(configured.controller.requests().is_empty());
}

#[test]
fn test_rejected_snapshots_are_logged() {
    let store = chain_store(1);
    let unconfigured = node(MockController::new(), MockSnapshotHost::new(false), &store, true);
    let busy_controller =
        MockController::with_export(MemoryExportProvider::new(1, None, Vec::new()));
    let gate = busy_controller.gate("initiate");
    let busy = node(busy_controller, MockSnapshotHost::new(true), &store, true);
    busy.snapshotter.initiate_snapshot(1).unwrap();

    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        assert_eq!(
            unconfigured.snapshotter.initiate_snapshot(1),
            Err(ExportError::SnapshotNotConfigured)
        );
        assert_eq!(
            busy.snapshotter.initiate_snapshot(0),
            Err(ExportError::InvalidSnapshotHeight)
        );
        assert!(matches!(
            busy.snapshotter.initiate_snapshot(2),
            Err(ExportError::OperationInProgress { .. })
        ));
    });
    gate.open();
    assert_eq!(busy.exports.wait_until_done(), Ok(()));

    let logged = logs.contents();
    assert_eq!(logged.matches("swingset snapshot extension failed").count(), 3);
    assert!(logged.contains(&ExportError::SnapshotNotConfigured.to_string()));
}

#[test]
fn test_extension_height_mismatch_discards_export() {
    let store = chain_store(20);
    let source = node(
        MockController::with_export(MemoryExportProvider::new(20, None, artifacts())),
        MockSnapshotHost::new(true).with_extension_height(21),
        &store,
        true,
    );

    source.snapshotter.initiate_snapshot(20).unwrap();
    assert_eq!(source.exports.wait_until_done(), Ok(()));
    assert_eq!(
        source.host.errors(),
        vec![ExportError::SnapshotHeightMismatch {
            requested: 21,
            active: 20
        }]
    );
    assert_eq!(source.controller.requests(), vec!["initiate", "discard"]);
    assert!(source.host.payloads().is_empty());
}

#[test]
fn test_retrieve_failure_reaches_done_result() {
    let store = chain_store(20);
    let controller = MockController::with_export(MemoryExportProvider::new(20, None, artifacts()));
    controller.fail_on("retrieve", "export failed");
    let source = node(controller, MockSnapshotHost::new(true), &store, true);

    source.snapshotter.initiate_snapshot(20).unwrap();
    let expected = ExportError::Controller("export failed".to_string());
    assert_eq!(source.exports.wait_until_done(), Err(expected.clone()));
    assert_eq!(source.host.errors(), vec![expected]);
    assert_eq!(
        source.controller.requests(),
        vec!["initiate", "retrieve", "discard"]
    );
}

#[test]
fn test_snapshot_extension_without_active_snapshot() {
    let store = chain_store(1);
    let idle = node(MockController::new(), MockSnapshotHost::new(true), &store, true);
    let writer = VecPayloadWriter::default();
    assert_eq!(
        idle.snapshotter.snapshot_extension(1, Box::new(writer)),
        Err(ExportError::NoActiveSnapshot)
    );
}

#[test]
fn test_restore_rejects_unknown_format() {
    let store = chain_store(1);
    let target = node(MockController::new(), MockSnapshotHost::new(true), &store, false);
    assert_eq!(target.snapshotter.snapshot_name(), "swingset");
    assert_eq!(target.snapshotter.supported_formats(), &[SNAPSHOT_FORMAT]);

    let mut payloads = VecPayloadReader::new(Vec::new());
    assert_eq!(
        target.snapshotter.restore_extension(1, 2, &mut payloads),
        Err(ExportError::UnsupportedFormat(2))
    );
    assert!(target.controller.requests().is_empty());
}

#[test]
fn test_restore_requires_verified_export_data() {
    let store = chain_store(1);
    let target = node(MockController::new(), MockSnapshotHost::new(true), &store, false);
    let payloads: Vec<Vec<u8>> = artifacts()
        .iter()
        .map(|artifact| artifact.to_payload().unwrap())
        .collect();

    let mut payloads = VecPayloadReader::new(payloads);
    assert_eq!(
        target
            .snapshotter
            .restore_extension(30, SNAPSHOT_FORMAT, &mut payloads),
        Err(ExportError::MissingExportData(30))
    );
    assert!(target.controller.restored().is_empty());
    assert_eq!(target.exports.active_operation(), None);
}
