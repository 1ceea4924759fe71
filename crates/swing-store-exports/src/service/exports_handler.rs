//! # Swing-Store Exports Handler
//!
//! Orchestrates exports and restores of the controller's store.
//!
//! ## Operation Lifecycle
//!
//! ```text
//! initiate_export ──→ [worker] initiate ──→ started ──→ on_export_started
//!                                                          │
//!                             retrieve ──→ on_export_retrieved ──┤
//!                                        (or discard)            ↓
//!                                                              done
//! ```
//!
//! ## Synchronization
//!
//! | Call | Blocks until |
//! |------|--------------|
//! | `initiate_export` | never; the work runs on a dedicated thread |
//! | `wait_until_started` | the controller locked in the export's view |
//! | `wait_until_done` | the worker finished |
//! | `restore_export` | the restore finished |
//!
//! At most one operation is active. Starting another one while the active
//! operation is not done fails, it is never queued.
//!
//! The public methods must be called from a single logical caller context
//! (the chain's main flow). The active-operation slot is only locked for the
//! duration of a read or swap, never across a wait, and the worker never
//! touches it: results flow back only through the operation's signals.

use std::any::Any;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use node_telemetry::{record_outcome, EXPORTS_COMPLETED, EXPORTS_DISCARDED, EXPORTS_INITIATED, EXPORT_DURATION, RESTORES};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::adapters::{open_swing_store_export_directory, write_swing_store_export_to_directory_with_mode};
use crate::config::ExportsConfig;
use crate::domain::{
    merge_cleanup, ExportError, ExportOptions, Operation, OperationKind, OperationResult,
    RestoreOptions, SwingStoreExportAction,
};
use crate::ports::{ControllerPort, ExportEventHandler, SwingStoreExportProvider, SwingStoreExportsApi};

type ActiveSlot = Mutex<Option<Arc<Operation>>>;

fn send_action(
    controller: &dyn ControllerPort,
    action: &SwingStoreExportAction,
    must_not_be_initialized: bool,
) -> Result<String, ExportError> {
    let json = action.to_json()?;
    controller.blocking_send(&json, must_not_be_initialized)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run an event handler callback, turning a panic into an error.
fn call_handler<F>(callback: &str, f: F) -> OperationResult
where
    F: FnOnce() -> OperationResult,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(ExportError::handler(format!(
            "{} panicked: {}",
            callback,
            panic_message(payload.as_ref())
        )))
    })
}

/// Single-flight export and restore coordinator.
pub struct SwingStoreExportsHandler {
    controller: Arc<dyn ControllerPort>,
    config: ExportsConfig,
    active: ActiveSlot,
}

impl fmt::Debug for SwingStoreExportsHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwingStoreExportsHandler")
            .field("config", &self.config)
            .field("active", &self.active_operation())
            .finish_non_exhaustive()
    }
}

impl SwingStoreExportsHandler {
    pub fn new(controller: Arc<dyn ControllerPort>, config: ExportsConfig) -> Self {
        Self {
            controller,
            config,
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ExportsConfig {
        &self.config
    }

    /// Kind and height of the operation occupying the slot, if any.
    pub fn active_operation(&self) -> Option<(OperationKind, Option<u64>)> {
        self.active
            .lock()
            .as_ref()
            .map(|op| (op.kind(), op.block_height()))
    }

    /// Free the slot if its operation is done, fail otherwise.
    fn check_not_active(slot: &mut Option<Arc<Operation>>) -> Result<(), ExportError> {
        if let Some(operation) = slot.as_ref() {
            if !operation.done().is_resolved() {
                return Err(operation.in_progress_error());
            }
            *slot = None;
        }
        Ok(())
    }

    fn current(&self) -> Option<Arc<Operation>> {
        self.active.lock().clone()
    }

    /// Start an export in the background. `None` exports the latest block
    /// committed by the controller.
    ///
    /// Returns once the worker is spawned. `event_handler` is only invoked
    /// from the worker.
    pub fn initiate_export(
        &self,
        block_height: Option<u64>,
        event_handler: Arc<dyn ExportEventHandler>,
        options: ExportOptions,
    ) -> Result<(), ExportError> {
        let mut slot = self.active.lock();
        Self::check_not_active(&mut slot)?;
        options.validate()?;

        let operation = Arc::new(Operation::export(block_height));
        let worker = ExportWorker {
            operation: operation.clone(),
            controller: self.controller.clone(),
            event_handler,
            options,
        };
        thread::Builder::new()
            .name(self.config.worker_thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| ExportError::WorkerSpawn(e.to_string()))?;

        EXPORTS_INITIATED.inc();
        *slot = Some(operation);
        Ok(())
    }

    /// Restore the controller's store from `provider`.
    ///
    /// Stages the export in a temporary directory, asks the controller to
    /// import it, and removes the directory. Blocks until done.
    pub fn restore_export(
        &self,
        provider: &mut dyn SwingStoreExportProvider,
        options: RestoreOptions,
    ) -> Result<(), ExportError> {
        let block_height = provider.block_height();
        let operation = {
            let mut slot = self.active.lock();
            Self::check_not_active(&mut slot)?;
            options.validate()?;
            let operation = Arc::new(Operation::restore(block_height));
            *slot = Some(operation.clone());
            operation
        };
        let _release = SlotRelease {
            slot: &self.active,
            operation: &operation,
        };

        let result = operation
            .span()
            .in_scope(|| self.stage_and_restore(provider, block_height, options));
        record_outcome(&RESTORES, &result);
        if let Err(e) = &result {
            error!(parent: operation.span(), error = %e, "swing-store restore failed");
        }
        operation.done().resolve(result.clone());
        result
    }

    fn stage_and_restore(
        &self,
        provider: &mut dyn SwingStoreExportProvider,
        block_height: u64,
        options: RestoreOptions,
    ) -> Result<(), ExportError> {
        let prefix = self.config.restore_dir_prefix_for(block_height);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let staging = match &self.config.restore_temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let export_dir = staging.path().to_path_buf();

        let result = self.restore_from_dir(provider, &export_dir, block_height, options);

        let cleanup = staging.close().map_err(|e| {
            warn!(export_dir = %export_dir.display(), error = %e, "failed to remove restore directory");
            ExportError::from(e)
        });
        merge_cleanup(result, cleanup, "failed to remove restore directory")
    }

    fn restore_from_dir(
        &self,
        provider: &mut dyn SwingStoreExportProvider,
        export_dir: &Path,
        block_height: u64,
        options: RestoreOptions,
    ) -> Result<(), ExportError> {
        info!(export_dir = %export_dir.display(), "creating swing-store restore");
        write_swing_store_export_to_directory_with_mode(
            provider,
            export_dir,
            self.config.exported_files_mode,
        )?;

        info!(export_dir = %export_dir.display(), "restoring swing-store");
        let action = SwingStoreExportAction::restore(block_height, export_dir.to_path_buf(), options);
        send_action(self.controller.as_ref(), &action, true)?;

        info!(export_dir = %export_dir.display(), "restored swing-store");
        Ok(())
    }

    /// Block until the active export has started or failed to.
    ///
    /// Returns `Ok` at once if nothing is active. Repeated calls return the
    /// same result without blocking.
    pub fn wait_until_started(&self) -> Result<(), ExportError> {
        match self.current() {
            Some(operation) => operation.started().wait(),
            None => Ok(()),
        }
    }

    /// Block until the active operation is done, then free the slot.
    ///
    /// Returns the operation's terminal result. Later calls return `Ok` at
    /// once.
    pub fn wait_until_done(&self) -> Result<(), ExportError> {
        let Some(operation) = self.current() else {
            return Ok(());
        };
        let result = operation.done().wait();

        let mut slot = self.active.lock();
        if slot.as_ref().is_some_and(|active| Arc::ptr_eq(active, &operation)) {
            *slot = None;
        }
        result
    }
}

impl SwingStoreExportsApi for SwingStoreExportsHandler {
    fn initiate_export(
        &self,
        block_height: Option<u64>,
        event_handler: Arc<dyn ExportEventHandler>,
        options: ExportOptions,
    ) -> Result<(), ExportError> {
        SwingStoreExportsHandler::initiate_export(self, block_height, event_handler, options)
    }

    fn restore_export(
        &self,
        provider: &mut dyn SwingStoreExportProvider,
        options: RestoreOptions,
    ) -> Result<(), ExportError> {
        SwingStoreExportsHandler::restore_export(self, provider, options)
    }

    fn wait_until_started(&self) -> Result<(), ExportError> {
        SwingStoreExportsHandler::wait_until_started(self)
    }

    fn wait_until_done(&self) -> Result<(), ExportError> {
        SwingStoreExportsHandler::wait_until_done(self)
    }
}

/// Clears the slot when a restore returns, whatever the outcome.
struct SlotRelease<'a> {
    slot: &'a ActiveSlot,
    operation: &'a Arc<Operation>,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, self.operation))
        {
            *slot = None;
        }
    }
}

// =============================================================================
// EXPORT WORKER
// =============================================================================

struct ExportWorker {
    operation: Arc<Operation>,
    controller: Arc<dyn ControllerPort>,
    event_handler: Arc<dyn ExportEventHandler>,
    options: ExportOptions,
}

impl ExportWorker {
    fn run(self) {
        let span = self.operation.span().clone();
        let _entered = span.enter();
        let _unwind = WorkerUnwind {
            operation: self.operation.as_ref(),
        };

        let result = self.export();

        EXPORT_DURATION.observe(self.operation.elapsed().as_secs_f64());
        record_outcome(&EXPORTS_COMPLETED, &result);
        match &result {
            Ok(()) => info!("swing-store export done"),
            Err(e) => error!(error = %e, "swing-store export failed"),
        }

        // Done first: a waiter woken by a start failure must find the
        // operation finished.
        self.operation.done().resolve(result.clone());
        self.operation.started().resolve(result);
    }

    fn export(&self) -> OperationResult {
        let initiate = SwingStoreExportAction::initiate(self.operation.block_height(), self.options);
        if let Err(e) = send_action(self.controller.as_ref(), &initiate, false) {
            error!(error = %e, "failed to initiate swing-store export");
            return Err(e);
        }
        self.operation.started().resolve(Ok(()));
        info!("swing-store export started");

        let retriever = ExportRetriever {
            operation: self.operation.clone(),
            controller: self.controller.clone(),
            event_handler: self.event_handler.clone(),
            retrieve_error: Arc::new(Mutex::new(None)),
        };
        let retrieve_error = retriever.retrieve_error.clone();

        let block_height = self.operation.block_height();
        let mut result = call_handler("on_export_started", || {
            self.event_handler.on_export_started(block_height, retriever)
        });
        // The handler may have swallowed a retrieve failure.
        if result.is_ok() {
            if let Some(e) = retrieve_error.lock().take() {
                result = Err(e);
            }
        }
        if let Err(e) = &result {
            error!(error = %e, "failed to process swing-store export");
        }

        // Marking it retrieved also invalidates any retriever still held.
        if self.operation.mark_retrieved() {
            return result;
        }

        EXPORTS_DISCARDED.inc();
        let discard = send_action(self.controller.as_ref(), &SwingStoreExportAction::discard(), false)
            .map(|_| ());
        if let Err(e) = &discard {
            error!(error = %e, "failed to discard swing-store export");
        }
        merge_cleanup(
            result,
            discard,
            "failed to discard swing-store export after failing to process export",
        )
    }
}

/// Finishes the operation if the worker unwinds before resolving its
/// signals. No-op after a normal return.
struct WorkerUnwind<'a> {
    operation: &'a Operation,
}

impl Drop for WorkerUnwind<'_> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        let err = ExportError::handler("swing-store export worker panicked");
        error!(error = %err, "swing-store export aborted");
        self.operation.done().resolve(Err(err.clone()));
        self.operation.started().resolve(Err(err));
    }
}

// =============================================================================
// RETRIEVER
// =============================================================================

/// Handle given to `on_export_started` to fetch the export.
#[derive(Clone)]
pub struct ExportRetriever {
    operation: Arc<Operation>,
    controller: Arc<dyn ControllerPort>,
    event_handler: Arc<dyn ExportEventHandler>,
    retrieve_error: Arc<Mutex<Option<ExportError>>>,
}

impl fmt::Debug for ExportRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportRetriever")
            .field("block_height", &self.operation.block_height())
            .field("retrieved", &self.operation.is_retrieved())
            .finish_non_exhaustive()
    }
}

impl ExportRetriever {
    /// Height requested for the export, `None` for the latest.
    pub fn block_height(&self) -> Option<u64> {
        self.operation.block_height()
    }

    /// Fetch the export and hand it to `on_export_retrieved`.
    ///
    /// Blocks until the controller finished writing the export. Fails if the
    /// export was already retrieved or discarded.
    pub fn retrieve(&self) -> Result<(), ExportError> {
        if self.operation.done().is_resolved() {
            return Err(ExportError::OperationNotActive);
        }
        if self.operation.is_retrieved() {
            return Err(ExportError::AlreadyRetrieved);
        }

        let result = self.operation.span().in_scope(|| self.retrieve_export());
        *self.retrieve_error.lock() = result.clone().err();
        result
    }

    fn retrieve_export(&self) -> OperationResult {
        let reply = send_action(self.controller.as_ref(), &SwingStoreExportAction::retrieve(), false)?;
        self.operation.mark_retrieved();

        let export_dir = PathBuf::from(serde_json::from_str::<String>(&reply)?);
        let result = self.consume_export_dir(&export_dir);

        let cleanup = fs::remove_dir_all(&export_dir).map_err(|e| {
            warn!(export_dir = %export_dir.display(), error = %e, "failed to remove export directory");
            ExportError::from(e)
        });
        merge_cleanup(result, cleanup, "failed to remove export directory")
    }

    fn consume_export_dir(&self, export_dir: &Path) -> OperationResult {
        let mut provider = open_swing_store_export_directory(export_dir)?;

        if let Some(expected) = self.operation.block_height() {
            let actual = provider.block_height();
            if actual != expected {
                return Err(ExportError::HeightMismatch { expected, actual });
            }
        }

        call_handler("on_export_retrieved", || {
            self.event_handler.on_export_retrieved(&mut provider)
        })?;
        info!(export_dir = %export_dir.display(), "retrieved swing-store export");
        Ok(())
    }
}
