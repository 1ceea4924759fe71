//! Exports to, and restores from, a caller-chosen directory.
//!
//! Used for genesis: exporting the store alongside the chain's genesis
//! state, and restoring it when a chain starts from such a genesis.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shared_types::{KVEntryError, KVEntryReader, KVHookReader};
use tracing::info;

use crate::adapters::{
    open_swing_store_export_directory, write_swing_store_export_to_directory_with_mode,
    EXPORTED_FILES_MODE,
};
use crate::domain::{ExportError, ExportOptions, RestoreOptions, SwingStoreArtifact};
use crate::ports::{
    ExportDataSink, ExportEventHandler, SwingStoreExportProvider, SwingStoreExportsApi,
};
use crate::service::ExportRetriever;

/// Event handler writing the retrieved export into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryExporter {
    export_dir: PathBuf,
    file_mode: u32,
}

impl DirectoryExporter {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            file_mode: EXPORTED_FILES_MODE,
        }
    }

    pub fn with_file_mode(mut self, file_mode: u32) -> Self {
        self.file_mode = file_mode;
        self
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }
}

impl ExportEventHandler for DirectoryExporter {
    fn on_export_started(
        &self,
        _block_height: Option<u64>,
        retriever: ExportRetriever,
    ) -> Result<(), ExportError> {
        retriever.retrieve()
    }

    fn on_export_retrieved(
        &self,
        provider: &mut dyn SwingStoreExportProvider,
    ) -> Result<(), ExportError> {
        write_swing_store_export_to_directory_with_mode(provider, &self.export_dir, self.file_mode)
    }
}

/// Export the store at `block_height` into `export_dir` and wait for it.
///
/// `export_dir` is created if missing.
pub fn export_to_directory(
    exports: &dyn SwingStoreExportsApi,
    block_height: Option<u64>,
    export_dir: &Path,
    options: ExportOptions,
) -> Result<(), ExportError> {
    fs::create_dir_all(export_dir)?;
    exports.initiate_export(
        block_height,
        Arc::new(DirectoryExporter::new(export_dir)),
        options,
    )?;
    exports.wait_until_done()
}

/// Restore the store from the export saved in `export_dir`.
pub fn restore_from_directory(
    exports: &dyn SwingStoreExportsApi,
    export_dir: &Path,
    options: RestoreOptions,
) -> Result<(), ExportError> {
    let mut provider = open_swing_store_export_directory(export_dir)?;
    exports.restore_export(&mut provider, options)
}

/// Restore from `export_dir`, copying the export data into `shadow_copy` as
/// it streams to the controller. The shadow copy is committed at the export
/// height once the export data is fully read.
pub fn restore_from_directory_with_shadow_copy(
    exports: &dyn SwingStoreExportsApi,
    export_dir: &Path,
    options: RestoreOptions,
    shadow_copy: Arc<dyn ExportDataSink>,
) -> Result<(), ExportError> {
    let inner = open_swing_store_export_directory(export_dir)?;
    let mut provider = ShadowCopyProvider { inner, shadow_copy };
    exports.restore_export(&mut provider, options)
}

/// Provider teeing its export data into a sink.
struct ShadowCopyProvider<P> {
    inner: P,
    shadow_copy: Arc<dyn ExportDataSink>,
}

fn hook_error(err: ExportError) -> KVEntryError {
    KVEntryError::Hook(err.to_string())
}

impl<P: SwingStoreExportProvider> SwingStoreExportProvider for ShadowCopyProvider<P> {
    fn block_height(&self) -> u64 {
        self.inner.block_height()
    }

    fn export_data_reader(&mut self) -> Result<Option<Box<dyn KVEntryReader>>, ExportError> {
        let Some(reader) = self.inner.export_data_reader()? else {
            return Ok(None);
        };
        let height = self.inner.block_height();
        let on_read = self.shadow_copy.clone();
        let on_close = self.shadow_copy.clone();
        let tee = KVHookReader::new(
            reader,
            move |entry| on_read.apply(entry).map_err(hook_error),
            move || {
                on_close.commit(height).map_err(hook_error)?;
                info!(height, "committed export data shadow copy");
                Ok(())
            },
        );
        Ok(Some(Box::new(tee)))
    }

    fn read_next_artifact(&mut self) -> Result<Option<SwingStoreArtifact>, ExportError> {
        self.inner.read_next_artifact()
    }
}
