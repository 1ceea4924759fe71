//! # Service Layer
//!
//! - `exports_handler` - single-flight export and restore orchestration
//! - `extension_snapshotter` - snapshot extension backed by exports
//! - `directory_exporter` - genesis export and restore through a directory
//! - `commit_boundary` - block commit sequencing around exports

mod commit_boundary;
mod directory_exporter;
mod exports_handler;
mod extension_snapshotter;
#[cfg(test)]
mod tests;

pub use commit_boundary::CommitBoundary;
pub use directory_exporter::{
    export_to_directory, restore_from_directory, restore_from_directory_with_shadow_copy,
    DirectoryExporter,
};
pub use exports_handler::{ExportRetriever, SwingStoreExportsHandler};
pub use extension_snapshotter::{ExtensionSnapshotter, SNAPSHOT_EXTENSION_NAME, SNAPSHOT_FORMAT};
