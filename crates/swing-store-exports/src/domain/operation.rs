//! # Operation
//!
//! One in-flight export or restore.
//!
//! | Field | Written by |
//! |-------|------------|
//! | `started` | the worker, once the controller confirmed or refused the export |
//! | `done` | the worker, with the terminal result |
//! | `retrieved` | the retrieve closure |
//!
//! A restore has no "started" phase distinct from its call: its `started`
//! signal is resolved on creation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::Span;

use super::errors::ExportError;
use super::signal::OneShot;

/// Terminal or start result of an operation.
pub type OperationResult = Result<(), ExportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Export,
    Restore,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Export => write!(f, "export"),
            OperationKind::Restore => write!(f, "restore"),
        }
    }
}

/// Human-readable height, `None` meaning the controller's latest block.
pub fn height_label(height: &Option<u64>) -> String {
    match height {
        Some(height) => height.to_string(),
        None => "latest".to_string(),
    }
}

#[derive(Debug)]
pub struct Operation {
    kind: OperationKind,
    block_height: Option<u64>,
    span: Span,
    started: OneShot<OperationResult>,
    done: OneShot<OperationResult>,
    retrieved: AtomicBool,
    created_at: Instant,
}

impl Operation {
    /// New export. `None` exports the latest block the controller committed.
    pub fn export(block_height: Option<u64>) -> Self {
        let span = tracing::info_span!(
            "swing_store_export",
            height = %height_label(&block_height)
        );
        Self {
            kind: OperationKind::Export,
            block_height,
            span,
            started: OneShot::new(),
            done: OneShot::new(),
            retrieved: AtomicBool::new(false),
            created_at: Instant::now(),
        }
    }

    /// New restore of an export taken at `block_height`.
    pub fn restore(block_height: u64) -> Self {
        let span = tracing::info_span!("swing_store_restore", height = block_height);
        Self {
            kind: OperationKind::Restore,
            block_height: Some(block_height),
            span,
            started: OneShot::resolved(Ok(())),
            done: OneShot::new(),
            retrieved: AtomicBool::new(false),
            created_at: Instant::now(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn is_restore(&self) -> bool {
        self.kind == OperationKind::Restore
    }

    pub fn block_height(&self) -> Option<u64> {
        self.block_height
    }

    /// Span carrying the operation's kind and height on every log line.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn started(&self) -> &OneShot<OperationResult> {
        &self.started
    }

    pub fn done(&self) -> &OneShot<OperationResult> {
        &self.done
    }

    /// Mark the export as retrieved. Returns whether it already was.
    pub fn mark_retrieved(&self) -> bool {
        self.retrieved.swap(true, Ordering::SeqCst)
    }

    pub fn is_retrieved(&self) -> bool {
        self.retrieved.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// The in-progress error reported to anyone trying to start another
    /// operation while this one is active.
    pub fn in_progress_error(&self) -> ExportError {
        ExportError::OperationInProgress {
            kind: self.kind,
            height: self.block_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_starts_unresolved() {
        let op = Operation::export(Some(5));
        assert_eq!(op.kind(), OperationKind::Export);
        assert!(!op.started().is_resolved());
        assert!(!op.done().is_resolved());
        assert!(!op.is_retrieved());
    }

    #[test]
    fn test_restore_is_started_on_creation() {
        let op = Operation::restore(9);
        assert!(op.is_restore());
        assert_eq!(op.started().try_get(), Some(Ok(())));
        assert!(!op.done().is_resolved());
    }

    #[test]
    fn test_mark_retrieved_reports_previous_state() {
        let op = Operation::export(None);
        assert!(!op.mark_retrieved());
        assert!(op.mark_retrieved());
        assert!(op.is_retrieved());
    }

    #[test]
    fn test_height_label() {
        assert_eq!(height_label(&Some(42)), "42");
        assert_eq!(height_label(&None), "latest");
    }
}
