//! Exports handler tests against the scripted controller.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use shared_types::KVEntry;

use super::*;
use crate::adapters::MemoryExportProvider;
use crate::config::ExportsConfig;
use crate::domain::{
    ArtifactMode, ExportDataMode, ExportError, ExportOptions, ExportRequest, OperationKind,
    RestoreOptions, SwingStoreArtifact,
};
use crate::ports::{ExportEventHandler, SwingStoreExportProvider};
use crate::test_utils::{Gate, MockController, RetrieveMode, TestEventHandler};

// =============================================================================
// HELPERS
// =============================================================================

fn sample_data() -> Vec<KVEntry> {
    vec![
        KVEntry::with_value("kv.v1.vs.c", "1").unwrap(),
        KVEntry::without_value("kv.v1.vs.d").unwrap(),
    ]
}

fn sample_artifacts() -> Vec<SwingStoreArtifact> {
    vec![
        SwingStoreArtifact::new("bundle.b0-1", b"bundle".to_vec()),
        SwingStoreArtifact::new("transcript.v1.1", vec![1, 2, 3]),
    ]
}

fn sample_export(height: u64) -> MemoryExportProvider {
    MemoryExportProvider::new(height, Some(sample_data()), sample_artifacts())
}

fn handler_for(controller: &Arc<MockController>) -> SwingStoreExportsHandler {
    SwingStoreExportsHandler::new(controller.clone(), ExportsConfig::default())
}

fn controller_error(message: &str) -> ExportError {
    ExportError::Controller(message.to_string())
}

fn assert_matches_sample(export: &MemoryExportProvider, height: u64) {
    assert_eq!(export.block_height(), height);
    assert_eq!(export.export_data(), Some(sample_data().as_slice()));
    assert_eq!(
        export.artifacts().cloned().collect::<Vec<_>>(),
        sample_artifacts()
    );
}

// =============================================================================
// SINGLE FLIGHT
// =============================================================================

#[test]
fn test_gated_export_blocks_second_export() {
    let controller = Arc::new(MockController::with_export(sample_export(123)));
    let exports = handler_for(&controller);
    let gate = Gate::new();
    let handler = Arc::new(TestEventHandler::retrieving().with_gate(gate.clone()));

    exports
        .initiate_export(Some(123), handler.clone(), ExportOptions::default())
        .unwrap();
    assert_eq!(exports.wait_until_started(), Ok(()));

    let err = exports
        .initiate_export(
            Some(456),
            Arc::new(TestEventHandler::retrieving()),
            ExportOptions::default(),
        )
        .unwrap_err();
    assert_eq!(
        err,
        ExportError::OperationInProgress {
            kind: OperationKind::Export,
            height: Some(123),
        }
    );
    assert_eq!(
        exports.active_operation(),
        Some((OperationKind::Export, Some(123)))
    );

    gate.open();
    assert_eq!(exports.wait_until_done(), Ok(()));
    assert_eq!(exports.active_operation(), None);
    assert_eq!(handler.started_heights(), vec![Some(123)]);
    assert_eq!(handler.retrieved().len(), 1);
    assert_matches_sample(&handler.retrieved()[0], 123);
    assert_eq!(controller.requests(), vec!["initiate", "retrieve"]);
    assert!(controller.retrieved_dirs().iter().all(|dir| !dir.exists()));

    controller.set_export(sample_export(456));
    exports
        .initiate_export(
            Some(456),
            Arc::new(TestEventHandler::retrieving()),
            ExportOptions::default(),
        )
        .unwrap();
    assert_eq!(exports.wait_until_done(), Ok(()));
}

#[test]
fn test_finished_export_frees_slot_without_waiting() {
    let controller = Arc::new(MockController::with_export(sample_export(1)));
    let exports = handler_for(&controller);

    exports
        .initiate_export(
            Some(1),
            Arc::new(TestEventHandler::retrieving()),
            ExportOptions::default(),
        )
        .unwrap();

    // No wait_until_done: the next initiate clears the finished operation.
    for _ in 0..1000 {
        let next = exports.initiate_export(
            Some(2),
            Arc::new(TestEventHandler::new(RetrieveMode::Skip)),
            ExportOptions::default(),
        );
        match next {
            Ok(()) => {
                assert_eq!(exports.wait_until_done(), Ok(()));
                assert_eq!(
                    controller.requests(),
                    vec!["initiate", "retrieve", "initiate", "discard"]
                );
                return;
            }
            Err(ExportError::OperationInProgress { .. }) => thread::sleep(Duration::from_millis(1)),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    panic!("slot never freed");
}

#[test]
fn test_wait_without_operation() {
    let controller = Arc::new(MockController::new());
    let exports = handler_for(&controller);
    assert_eq!(exports.wait_until_started(), Ok(()));
    assert_eq!(exports.wait_until_done(), Ok(()));
    assert!(controller.requests().is_empty());
}

#[test]
fn test_invalid_options_rejected_before_spawn() {
    let controller = Arc::new(MockController::new());
    let exports = handler_for(&controller);

    let err = exports
        .initiate_export(
            None,
            Arc::new(TestEventHandler::retrieving()),
            ExportOptions::new(ArtifactMode::None, ExportDataMode::Skip),
        )
        .unwrap_err();
    assert!(matches!(err, ExportError::InvalidOptions(_)));
    assert_eq!(exports.active_operation(), None);
    assert!(controller.requests().is_empty());
}

// =============================================================================
// EXPORT FAILURES
// =============================================================================

#[test]
fn test_initiate_failure() {
    let controller = Arc::new(MockController::with_export(sample_export(5)));
    controller.fail_on("initiate", "initiate refused");
    let exports = handler_for(&controller);
    let handler = Arc::new(TestEventHandler::retrieving());

    assert_eq!(
        exports.initiate_export(Some(5), handler.clone(), ExportOptions::default()),
        Ok(())
    );

    let expected = Err(controller_error("initiate refused"));
    assert_eq!(exports.wait_until_started(), expected);
    assert_eq!(exports.wait_until_started(), expected);
    assert_eq!(exports.wait_until_done(), expected);
    assert_eq!(exports.wait_until_done(), Ok(()));
    assert_eq!(exports.wait_until_started(), Ok(()));

    assert!(handler.started_heights().is_empty());
    assert_eq!(controller.requests(), vec!["initiate"]);
}

#[test]
fn test_unretrieved_export_is_discarded() {
    let controller = Arc::new(MockController::with_export(sample_export(9)));
    let exports = handler_for(&controller);
    let handler = Arc::new(TestEventHandler::new(RetrieveMode::Skip));

    exports
        .initiate_export(Some(9), handler.clone(), ExportOptions::default())
        .unwrap();
    assert_eq!(exports.wait_until_done(), Ok(()));

    assert_eq!(controller.requests(), vec!["initiate", "discard"]);
    assert!(handler.retrieved().is_empty());
}

#[test]
fn test_discard_failure_is_reported() {
    let controller = Arc::new(MockController::with_export(sample_export(9)));
    controller.fail_on("discard", "discard refused");
    let exports = handler_for(&controller);

    exports
        .initiate_export(
            Some(9),
            Arc::new(TestEventHandler::new(RetrieveMode::Skip)),
            ExportOptions::default(),
        )
        .unwrap();
    assert_eq!(exports.wait_until_started(), Ok(()));
    assert_eq!(exports.wait_until_done(), Err(controller_error("discard refused")));
}

#[test]
fn test_retrieve_failure_still_discards() {
    let controller = Arc::new(MockController::with_export(sample_export(4)));
    controller.fail_on("retrieve", "export failed");
    let exports = handler_for(&controller);

    exports
        .initiate_export(
            Some(4),
            Arc::new(TestEventHandler::retrieving()),
            ExportOptions::default(),
        )
        .unwrap();
    assert_eq!(exports.wait_until_done(), Err(controller_error("export failed")));
    assert_eq!(controller.requests(), vec!["initiate", "retrieve", "discard"]);
}

#[test]
fn test_retrieve_and_discard_failures_are_combined() {
    let controller = Arc::new(MockController::with_export(sample_export(4)));
    controller.fail_on("retrieve", "export failed");
    controller.fail_on("discard", "discard refused");
    let exports = handler_for(&controller);

    exports
        .initiate_export(
            Some(4),
            Arc::new(TestEventHandler::retrieving()),
            ExportOptions::default(),
        )
        .unwrap();
    match exports.wait_until_done() {
        Err(ExportError::Combined {
            primary, secondary, ..
        }) => {
            assert_eq!(*primary, controller_error("export failed"));
            assert_eq!(*secondary, controller_error("discard refused"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_swallowed_retrieve_error_is_reported() {
    let controller = Arc::new(MockController::with_export(sample_export(3)));
    let exports = handler_for(&controller);
    let handler = Arc::new(
        TestEventHandler::new(RetrieveMode::RetrieveAndSwallow)
            .failing_retrieved(ExportError::Handler("consumer failed".into())),
    );

    exports
        .initiate_export(Some(3), handler.clone(), ExportOptions::default())
        .unwrap();
    assert_eq!(
        exports.wait_until_done(),
        Err(ExportError::Handler("consumer failed".into()))
    );
    // Retrieved, so nothing to discard.
    assert_eq!(controller.requests(), vec!["initiate", "retrieve"]);
    assert!(controller.retrieved_dirs().iter().all(|dir| !dir.exists()));
}

#[test]
fn test_retrieved_height_must_match() {
    let controller = Arc::new(MockController::with_export(sample_export(7)));
    let exports = handler_for(&controller);
    let handler = Arc::new(TestEventHandler::retrieving());

    exports
        .initiate_export(Some(8), handler.clone(), ExportOptions::default())
        .unwrap();
    assert_eq!(
        exports.wait_until_done(),
        Err(ExportError::HeightMismatch {
            expected: 8,
            actual: 7
        })
    );
    assert!(handler.retrieved().is_empty());
    assert!(controller.retrieved_dirs().iter().all(|dir| !dir.exists()));
}

#[test]
fn test_latest_export_accepts_any_height() {
    let controller = Arc::new(MockController::with_export(sample_export(99)));
    let exports = handler_for(&controller);
    let handler = Arc::new(TestEventHandler::retrieving());

    exports
        .initiate_export(None, handler.clone(), ExportOptions::default())
        .unwrap();
    assert_eq!(exports.wait_until_done(), Ok(()));

    assert_eq!(handler.started_heights(), vec![None]);
    assert_matches_sample(&handler.retrieved()[0], 99);
    let (initiate, flag) = &controller.actions()[0];
    assert!(!flag);
    assert!(matches!(
        initiate.request,
        ExportRequest::Initiate {
            block_height: None,
            ..
        }
    ));
}

/// Handler retrieving twice and keeping the retriever for later.
#[derive(Default)]
struct KeepingHandler {
    second_retrieve: Mutex<Option<Result<(), ExportError>>>,
    kept: Mutex<Option<ExportRetriever>>,
}

impl ExportEventHandler for KeepingHandler {
    fn on_export_started(
        &self,
        _block_height: Option<u64>,
        retriever: ExportRetriever,
    ) -> Result<(), ExportError> {
        let first = retriever.retrieve();
        *self.second_retrieve.lock() = Some(retriever.retrieve());
        *self.kept.lock() = Some(retriever);
        first
    }

    fn on_export_retrieved(
        &self,
        provider: &mut dyn SwingStoreExportProvider,
    ) -> Result<(), ExportError> {
        MemoryExportProvider::collect(provider).map(|_| ())
    }
}

#[test]
fn test_retriever_is_single_use() {
    let controller = Arc::new(MockController::with_export(sample_export(2)));
    let exports = handler_for(&controller);
    let handler = Arc::new(KeepingHandler::default());

    exports
        .initiate_export(Some(2), handler.clone(), ExportOptions::default())
        .unwrap();
    assert_eq!(exports.wait_until_done(), Ok(()));

    assert_eq!(
        *handler.second_retrieve.lock(),
        Some(Err(ExportError::AlreadyRetrieved))
    );
    let kept = handler.kept.lock().clone().unwrap();
    assert_eq!(kept.retrieve(), Err(ExportError::OperationNotActive));
    assert_eq!(controller.requests(), vec!["initiate", "retrieve"]);
}

/// Handler panicking in one of its callbacks.
struct PanickingHandler {
    in_retrieved: bool,
}

impl ExportEventHandler for PanickingHandler {
    fn on_export_started(
        &self,
        _block_height: Option<u64>,
        retriever: ExportRetriever,
    ) -> Result<(), ExportError> {
        if !self.in_retrieved {
            panic!("handler bug");
        }
        retriever.retrieve()
    }

    fn on_export_retrieved(
        &self,
        _provider: &mut dyn SwingStoreExportProvider,
    ) -> Result<(), ExportError> {
        panic!("cannot write export");
    }
}

#[test]
fn test_panicking_handler_still_finishes_export() {
    let controller = Arc::new(MockController::with_export(sample_export(1)));
    let exports = handler_for(&controller);

    exports
        .initiate_export(
            Some(1),
            Arc::new(PanickingHandler { in_retrieved: false }),
            ExportOptions::default(),
        )
        .unwrap();
    assert_eq!(
        exports.wait_until_done(),
        Err(ExportError::Handler(
            "on_export_started panicked: handler bug".to_string()
        ))
    );
    assert_eq!(controller.requests(), vec!["initiate", "discard"]);

    // The slot is free again.
    exports
        .initiate_export(
            Some(2),
            Arc::new(TestEventHandler::retrieving()),
            ExportOptions::default(),
        )
        .unwrap();
    assert_eq!(exports.wait_until_done(), Ok(()));
}

#[test]
fn test_panic_while_consuming_export_removes_directory() {
    let controller = Arc::new(MockController::with_export(sample_export(1)));
    let exports = handler_for(&controller);

    exports
        .initiate_export(
            Some(1),
            Arc::new(PanickingHandler { in_retrieved: true }),
            ExportOptions::default(),
        )
        .unwrap();
    assert_eq!(
        exports.wait_until_done(),
        Err(ExportError::Handler(
            "on_export_retrieved panicked: cannot write export".to_string()
        ))
    );
    assert_eq!(controller.requests(), vec!["initiate", "retrieve"]);
    assert!(!controller.retrieved_dirs()[0].exists());
    assert_eq!(exports.active_operation(), None);
}

// =============================================================================
// RESTORE
// =============================================================================

#[test]
fn test_restore_export() {
    let temp_root = tempfile::tempdir().unwrap();
    let controller = Arc::new(MockController::new());
    let exports =
        SwingStoreExportsHandler::new(controller.clone(), ExportsConfig::for_testing(temp_root.path()));

    let mut provider = sample_export(10);
    exports
        .restore_export(&mut provider, RestoreOptions::default())
        .unwrap();

    let restored = controller.restored();
    assert_eq!(restored.len(), 1);
    assert_matches_sample(&restored[0], 10);

    let (action, must_not_be_initialized) = controller.actions().pop().unwrap();
    assert!(must_not_be_initialized);
    match action.request {
        ExportRequest::Restore {
            block_height,
            args: [options],
        } => {
            assert_eq!(block_height, 10);
            assert_eq!(options.artifact_mode, ArtifactMode::Operational);
            assert_eq!(options.export_data_mode, ExportDataMode::All);
            assert!(options.export_dir.starts_with(temp_root.path()));
            let dir_name = options.export_dir.file_name().unwrap().to_string_lossy().into_owned();
            assert!(dir_name.starts_with("test-swing-store-restore-10-"));
            assert!(!options.export_dir.exists());
        }
        other => panic!("unexpected request: {:?}", other),
    }
    assert_eq!(exports.active_operation(), None);
}

#[test]
fn test_restore_failure_frees_slot() {
    let temp_root = tempfile::tempdir().unwrap();
    let controller = Arc::new(MockController::with_export(sample_export(11)));
    controller.fail_on("restore", "store already initialized");
    let exports =
        SwingStoreExportsHandler::new(controller.clone(), ExportsConfig::for_testing(temp_root.path()));

    let mut provider = sample_export(11);
    assert_eq!(
        exports.restore_export(&mut provider, RestoreOptions::default()),
        Err(controller_error("store already initialized"))
    );
    assert_eq!(exports.active_operation(), None);
    assert_eq!(std::fs::read_dir(temp_root.path()).unwrap().count(), 0);

    exports
        .initiate_export(
            Some(11),
            Arc::new(TestEventHandler::retrieving()),
            ExportOptions::default(),
        )
        .unwrap();
    assert_eq!(exports.wait_until_done(), Ok(()));
}

#[test]
fn test_restore_rejected_during_export() {
    let controller = Arc::new(MockController::with_export(sample_export(1)));
    let exports = handler_for(&controller);
    let gate = Gate::new();

    exports
        .initiate_export(
            Some(1),
            Arc::new(TestEventHandler::retrieving().with_gate(gate.clone())),
            ExportOptions::default(),
        )
        .unwrap();

    let mut provider = sample_export(1);
    assert_eq!(
        exports.restore_export(&mut provider, RestoreOptions::default()),
        Err(ExportError::OperationInProgress {
            kind: OperationKind::Export,
            height: Some(1),
        })
    );

    gate.open();
    assert_eq!(exports.wait_until_done(), Ok(()));
    assert!(controller.restored().is_empty());
}

#[test]
fn test_export_rejected_during_restore() {
    let temp_root = tempfile::tempdir().unwrap();
    let controller = Arc::new(MockController::new());
    let gate = controller.gate("restore");
    let exports = Arc::new(SwingStoreExportsHandler::new(
        controller.clone(),
        ExportsConfig::for_testing(temp_root.path()),
    ));

    let restoring = {
        let exports = exports.clone();
        thread::spawn(move || {
            let mut provider = sample_export(3);
            exports.restore_export(&mut provider, RestoreOptions::default())
        })
    };
    while exports.active_operation().is_none() {
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(exports.wait_until_started(), Ok(()));
    assert_eq!(
        exports.initiate_export(
            Some(4),
            Arc::new(TestEventHandler::retrieving()),
            ExportOptions::default(),
        ),
        Err(ExportError::OperationInProgress {
            kind: OperationKind::Restore,
            height: Some(3),
        })
    );

    gate.open();
    assert_eq!(restoring.join().unwrap(), Ok(()));
    assert_eq!(exports.active_operation(), None);
    assert_eq!(controller.restored().len(), 1);
}
