//! # Export Directory Codec
//!
//! Reads and writes store exports laid out on disk as described in
//! [`crate::domain::manifest`]. The layout is shared with the controller,
//! which produces directories for retrieval and consumes them on restore.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use shared_types::{encode_kv_entry_reader_to_jsonl, JsonlKVEntryReader, KVEntryReader};

use crate::domain::{
    merge_cleanup, ExportError, ExportManifest, SwingStoreArtifact, EXPORT_DATA_FILENAME,
    EXPORT_MANIFEST_FILENAME, UNTRUSTED_EXPORT_DATA_ARTIFACT_NAME, UNTRUSTED_EXPORT_DATA_FILENAME,
};
use crate::ports::SwingStoreExportProvider;

/// Permissions of every exported file.
pub const EXPORTED_FILES_MODE: u32 = 0o644;

fn create_export_file(path: &Path, mode: u32) -> Result<File, ExportError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(options.open(path)?)
}

fn write_export_file(dir: &Path, filename: &str, data: &[u8], mode: u32) -> Result<(), ExportError> {
    let mut file = create_export_file(&dir.join(filename), mode)?;
    file.write_all(data)?;
    Ok(())
}

/// Consume `provider` and save its content into the existing directory
/// `dir`, with files created as `0644`.
pub fn write_swing_store_export_to_directory(
    provider: &mut dyn SwingStoreExportProvider,
    dir: &Path,
) -> Result<(), ExportError> {
    write_swing_store_export_to_directory_with_mode(provider, dir, EXPORTED_FILES_MODE)
}

/// Same as [`write_swing_store_export_to_directory`] with explicit file
/// permissions.
pub fn write_swing_store_export_to_directory_with_mode(
    provider: &mut dyn SwingStoreExportProvider,
    dir: &Path,
    mode: u32,
) -> Result<(), ExportError> {
    let mut manifest = ExportManifest::new(provider.block_height());

    if let Some(mut reader) = provider.export_data_reader()? {
        let written = write_export_data(reader.as_mut(), &dir.join(EXPORT_DATA_FILENAME), mode);
        let closed = reader.close().map_err(ExportError::from);
        merge_cleanup(written, closed, "failed to close export data reader")?;
        manifest.data = Some(EXPORT_DATA_FILENAME.to_string());
    }

    let mut untrusted_written = false;
    while let Some(artifact) = provider.read_next_artifact()? {
        if artifact.name == UNTRUSTED_EXPORT_DATA_ARTIFACT_NAME {
            // Diagnostic copy of unverified export data, never listed.
            write_export_file(dir, UNTRUSTED_EXPORT_DATA_FILENAME, &artifact.data, mode)?;
            untrusted_written = true;
        } else {
            let filename = manifest.push_artifact(&artifact.name);
            write_export_file(dir, &filename, &artifact.data, mode)?;
        }
    }

    tracing::debug!(
        dir = %dir.display(),
        height = manifest.block_height,
        artifacts = manifest.artifacts.len(),
        has_data = manifest.data.is_some(),
        untrusted_export_data = untrusted_written,
        "wrote swing-store export directory"
    );

    write_export_file(dir, EXPORT_MANIFEST_FILENAME, &manifest.to_json_pretty()?, mode)
}

fn write_export_data(
    reader: &mut dyn KVEntryReader,
    path: &Path,
    mode: u32,
) -> Result<(), ExportError> {
    let file = create_export_file(path, mode)?;
    let mut writer = BufWriter::new(file);
    encode_kv_entry_reader_to_jsonl(reader, &mut writer)?;
    let file = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.error().to_string()))?;
    file.sync_all()?;
    Ok(())
}

/// Open the export saved in `dir`. Files are only read when the returned
/// provider is asked for them.
pub fn open_swing_store_export_directory(dir: &Path) -> Result<DirectoryExportProvider, ExportError> {
    let raw = fs::read(dir.join(EXPORT_MANIFEST_FILENAME))?;
    let manifest = ExportManifest::from_json(&raw)?;
    manifest.validate()?;
    Ok(DirectoryExportProvider {
        dir: dir.to_path_buf(),
        manifest,
        next_artifact: 0,
    })
}

/// Provider over an export directory, reading artifacts in manifest order.
#[derive(Debug)]
pub struct DirectoryExportProvider {
    dir: PathBuf,
    manifest: ExportManifest,
    next_artifact: usize,
}

impl DirectoryExportProvider {
    pub fn manifest(&self) -> &ExportManifest {
        &self.manifest
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SwingStoreExportProvider for DirectoryExportProvider {
    fn block_height(&self) -> u64 {
        self.manifest.block_height
    }

    fn export_data_reader(&mut self) -> Result<Option<Box<dyn KVEntryReader>>, ExportError> {
        match &self.manifest.data {
            Some(filename) => {
                let reader = JsonlKVEntryReader::open(self.dir.join(filename))?;
                Ok(Some(Box::new(reader)))
            }
            None => Ok(None),
        }
    }

    fn read_next_artifact(&mut self) -> Result<Option<SwingStoreArtifact>, ExportError> {
        let expected = self.manifest.artifacts.len();
        if self.next_artifact >= expected {
            let read = self.next_artifact;
            self.next_artifact += 1;
            if read == expected {
                return Ok(None);
            }
            return Err(ExportError::ArtifactCountExceeded { read, expected });
        }

        let (name, filename) = &self.manifest.artifacts[self.next_artifact];
        self.next_artifact += 1;
        if name == UNTRUSTED_EXPORT_DATA_ARTIFACT_NAME {
            return Err(ExportError::ReservedArtifactName(name.clone()));
        }
        let data = fs::read(self.dir.join(filename))?;
        Ok(Some(SwingStoreArtifact::new(name.clone(), data)))
    }
}
