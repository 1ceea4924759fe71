//! Test doubles for the export subsystem: a scripted controller, event
//! handlers, a snapshot host and payload buffers.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::adapters::{
    open_swing_store_export_directory, write_swing_store_export_to_directory, MemoryExportProvider,
};
use crate::domain::{
    ExportError, ExportRequest, OneShot, SwingStoreExportAction, UNTRUSTED_EXPORT_DATA_FILENAME,
};
use crate::ports::{
    BlockCommitter, ControllerPort, ExportEventHandler, ExtensionPayloadReader,
    ExtensionPayloadWriter, SnapshotExtension, SnapshotHost, SnapshotInitiator,
    SwingStoreExportProvider,
};
use crate::service::ExportRetriever;

/// Barrier opened once by the test.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    opened: Arc<OneShot<()>>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.opened.resolve(());
    }

    pub fn wait(&self) {
        self.opened.wait();
    }
}

static NEXT_EXPORT_DIR: AtomicU64 = AtomicU64::new(0);

fn fresh_export_dir() -> Result<PathBuf, ExportError> {
    let dir = std::env::temp_dir().join(format!(
        "mock-swing-store-export-{}-{}",
        std::process::id(),
        NEXT_EXPORT_DIR.fetch_add(1, Ordering::SeqCst)
    ));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

// =============================================================================
// CONTROLLER
// =============================================================================

#[derive(Debug, Default)]
struct ControllerState {
    actions: Vec<(SwingStoreExportAction, bool)>,
    failures: HashMap<&'static str, String>,
    gates: HashMap<&'static str, Gate>,
    export: Option<MemoryExportProvider>,
    retrieved_dirs: Vec<PathBuf>,
    restored: Vec<MemoryExportProvider>,
    restored_untrusted_data: Vec<Option<Vec<u8>>>,
}

/// Controller double. Records every decoded action, serves `export` on
/// retrieve by writing it to a fresh directory, and reads restores back into
/// memory.
#[derive(Debug, Default)]
pub struct MockController {
    state: Mutex<ControllerState>,
}

impl MockController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller serving `export` on retrieve.
    pub fn with_export(export: MemoryExportProvider) -> Self {
        let controller = Self::new();
        controller.set_export(export);
        controller
    }

    pub fn set_export(&self, export: MemoryExportProvider) {
        self.state.lock().export = Some(export);
    }

    /// Fail every `request` action with `message`.
    pub fn fail_on(&self, request: &'static str, message: impl Into<String>) {
        self.state.lock().failures.insert(request, message.into());
    }

    /// Hold every `request` action until the returned gate opens.
    pub fn gate(&self, request: &'static str) -> Gate {
        let gate = Gate::new();
        self.state.lock().gates.insert(request, gate.clone());
        gate
    }

    /// Actions received, with their `must_not_be_initialized` flag.
    pub fn actions(&self) -> Vec<(SwingStoreExportAction, bool)> {
        self.state.lock().actions.clone()
    }

    /// Names of the requests received, in order.
    pub fn requests(&self) -> Vec<&'static str> {
        self.state
            .lock()
            .actions
            .iter()
            .map(|(action, _)| action.request.name())
            .collect()
    }

    /// Directories handed out on retrieve.
    pub fn retrieved_dirs(&self) -> Vec<PathBuf> {
        self.state.lock().retrieved_dirs.clone()
    }

    /// Exports received through restore requests.
    pub fn restored(&self) -> Vec<MemoryExportProvider> {
        self.state.lock().restored.clone()
    }

    /// Untrusted export data file content of each restore, if present.
    pub fn restored_untrusted_data(&self) -> Vec<Option<Vec<u8>>> {
        self.state.lock().restored_untrusted_data.clone()
    }

    fn serve_retrieve(&self) -> Result<String, ExportError> {
        let mut export = self
            .state
            .lock()
            .export
            .clone()
            .ok_or_else(|| ExportError::Controller("no export available".into()))?;
        let dir = fresh_export_dir()?;
        write_swing_store_export_to_directory(&mut export, &dir)?;
        self.state.lock().retrieved_dirs.push(dir.clone());
        Ok(serde_json::to_string(&dir.to_string_lossy())?)
    }

    fn serve_restore(&self, export_dir: PathBuf) -> Result<String, ExportError> {
        let mut provider = open_swing_store_export_directory(&export_dir)?;
        let restored = MemoryExportProvider::collect(&mut provider)?;
        let untrusted = fs::read(export_dir.join(UNTRUSTED_EXPORT_DATA_FILENAME)).ok();

        let mut state = self.state.lock();
        state.restored.push(restored);
        state.restored_untrusted_data.push(untrusted);
        Ok("null".to_string())
    }
}

impl ControllerPort for MockController {
    fn blocking_send(&self, action: &str, must_not_be_initialized: bool) -> Result<String, ExportError> {
        let action = SwingStoreExportAction::from_json(action)?;
        let name = action.request.name();

        let gate = {
            let mut state = self.state.lock();
            state.actions.push((action.clone(), must_not_be_initialized));
            state.gates.get(name).cloned()
        };
        if let Some(gate) = gate {
            gate.wait();
        }

        let failure = self.state.lock().failures.get(name).cloned();
        if let Some(message) = failure {
            return Err(ExportError::Controller(message));
        }

        match action.request {
            ExportRequest::Initiate { .. } | ExportRequest::Discard => Ok("null".to_string()),
            ExportRequest::Retrieve => self.serve_retrieve(),
            ExportRequest::Restore { args: [options], .. } => self.serve_restore(options.export_dir),
        }
    }
}

// =============================================================================
// EVENT HANDLER
// =============================================================================

/// What a [`TestEventHandler`] does with the retriever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieveMode {
    /// Retrieve and return the retrieve result.
    Retrieve,
    /// Retrieve and return `Ok` whatever happened.
    RetrieveAndSwallow,
    /// Never retrieve.
    Skip,
}

/// Event handler recording what it sees.
#[derive(Debug)]
pub struct TestEventHandler {
    mode: RetrieveMode,
    gate: Option<Gate>,
    retrieved_error: Option<ExportError>,
    started_heights: Mutex<Vec<Option<u64>>>,
    retrieved: Mutex<Vec<MemoryExportProvider>>,
}

impl TestEventHandler {
    pub fn new(mode: RetrieveMode) -> Self {
        Self {
            mode,
            gate: None,
            retrieved_error: None,
            started_heights: Mutex::new(Vec::new()),
            retrieved: Mutex::new(Vec::new()),
        }
    }

    pub fn retrieving() -> Self {
        Self::new(RetrieveMode::Retrieve)
    }

    /// Block `on_export_started` until `gate` opens.
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Fail `on_export_retrieved` with `err` after consuming the export.
    pub fn failing_retrieved(mut self, err: ExportError) -> Self {
        self.retrieved_error = Some(err);
        self
    }

    pub fn started_heights(&self) -> Vec<Option<u64>> {
        self.started_heights.lock().clone()
    }

    pub fn retrieved(&self) -> Vec<MemoryExportProvider> {
        self.retrieved.lock().clone()
    }
}

impl ExportEventHandler for TestEventHandler {
    fn on_export_started(
        &self,
        block_height: Option<u64>,
        retriever: ExportRetriever,
    ) -> Result<(), ExportError> {
        self.started_heights.lock().push(block_height);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        match self.mode {
            RetrieveMode::Retrieve => retriever.retrieve(),
            RetrieveMode::RetrieveAndSwallow => {
                let _ = retriever.retrieve();
                Ok(())
            }
            RetrieveMode::Skip => Ok(()),
        }
    }

    fn on_export_retrieved(
        &self,
        provider: &mut dyn SwingStoreExportProvider,
    ) -> Result<(), ExportError> {
        let collected = MemoryExportProvider::collect(provider)?;
        self.retrieved.lock().push(collected);
        match &self.retrieved_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

// =============================================================================
// SNAPSHOT HOST
// =============================================================================

/// Payload sink appending to a shared buffer.
#[derive(Debug, Clone, Default)]
pub struct VecPayloadWriter {
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl VecPayloadWriter {
    pub fn new(payloads: Arc<Mutex<Vec<Vec<u8>>>>) -> Self {
        Self { payloads }
    }
}

impl ExtensionPayloadWriter for VecPayloadWriter {
    fn write_payload(&mut self, payload: &[u8]) -> Result<(), ExportError> {
        self.payloads.lock().push(payload.to_vec());
        Ok(())
    }
}

/// Payload source over a list of payloads.
#[derive(Debug, Clone, Default)]
pub struct VecPayloadReader {
    payloads: VecDeque<Vec<u8>>,
}

impl VecPayloadReader {
    pub fn new(payloads: Vec<Vec<u8>>) -> Self {
        Self {
            payloads: payloads.into(),
        }
    }
}

impl ExtensionPayloadReader for VecPayloadReader {
    fn read_payload(&mut self) -> Result<Option<Vec<u8>>, ExportError> {
        Ok(self.payloads.pop_front())
    }
}

/// Snapshot manager double calling back the registered extension, and
/// keeping the errors it returns.
#[derive(Default)]
pub struct MockSnapshotHost {
    configured: bool,
    extension_height_override: Option<u64>,
    extension: Mutex<Option<Weak<dyn SnapshotExtension>>>,
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    errors: Mutex<Vec<ExportError>>,
    snapshot_heights: Mutex<Vec<u64>>,
}

impl MockSnapshotHost {
    pub fn new(configured: bool) -> Self {
        Self {
            configured,
            ..Self::default()
        }
    }

    /// Call the extension with `height` instead of the snapshot height.
    pub fn with_extension_height(mut self, height: u64) -> Self {
        self.extension_height_override = Some(height);
        self
    }

    pub fn register<E: SnapshotExtension + 'static>(&self, extension: &Arc<E>) {
        let strong: Arc<dyn SnapshotExtension> = extension.clone();
        *self.extension.lock() = Some(Arc::downgrade(&strong));
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().clone()
    }

    pub fn payload_reader(&self) -> VecPayloadReader {
        VecPayloadReader::new(self.payloads())
    }

    pub fn errors(&self) -> Vec<ExportError> {
        self.errors.lock().clone()
    }

    pub fn snapshot_heights(&self) -> Vec<u64> {
        self.snapshot_heights.lock().clone()
    }
}

impl SnapshotHost for MockSnapshotHost {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn take_snapshot(&self, height: u64) {
        self.snapshot_heights.lock().push(height);
        let extension = self.extension.lock().as_ref().and_then(Weak::upgrade);
        let Some(extension) = extension else {
            return;
        };
        let writer = VecPayloadWriter::new(self.payloads.clone());
        let extension_height = self.extension_height_override.unwrap_or(height);
        if let Err(e) = extension.snapshot_extension(extension_height, Box::new(writer)) {
            self.errors.lock().push(e);
        }
    }
}

// =============================================================================
// COMMIT
// =============================================================================

/// Block committer recording commit steps as `controller:<h>` and
/// `chain:<h>`, reporting a snapshot every `snapshot_interval` blocks.
#[derive(Debug, Default)]
pub struct RecordingCommitter {
    snapshot_interval: u64,
    events: Mutex<Vec<String>>,
}

impl RecordingCommitter {
    pub fn new(snapshot_interval: u64) -> Self {
        Self {
            snapshot_interval,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl BlockCommitter for RecordingCommitter {
    fn commit_controller_block(&self, height: u64) -> Result<(), ExportError> {
        self.events.lock().push(format!("controller:{}", height));
        Ok(())
    }

    fn commit_chain(&self, height: u64) -> Result<Option<u64>, ExportError> {
        self.events.lock().push(format!("chain:{}", height));
        let due = self.snapshot_interval > 0 && height % self.snapshot_interval == 0;
        Ok(due.then_some(height))
    }
}

/// Snapshot initiator recording requested heights, optionally failing.
#[derive(Debug, Default)]
pub struct RecordingSnapshotInitiator {
    failure: Option<ExportError>,
    heights: Mutex<Vec<u64>>,
}

impl RecordingSnapshotInitiator {
    pub fn failing(err: ExportError) -> Self {
        Self {
            failure: Some(err),
            heights: Mutex::new(Vec::new()),
        }
    }

    pub fn heights(&self) -> Vec<u64> {
        self.heights.lock().clone()
    }
}

impl SnapshotInitiator for RecordingSnapshotInitiator {
    fn initiate_snapshot(&self, height: u64) -> Result<(), ExportError> {
        self.heights.lock().push(height);
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
