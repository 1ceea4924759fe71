//! In-memory export provider and ordered store.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::{
    KVEntry, KVEntryError, KVEntryReader, KVEntryVecReader, KVIteratorReader, OrderedIterator,
};

use crate::domain::{ExportError, SwingStoreArtifact};
use crate::ports::{ExportDataSink, ExportDataSource, SwingStoreExportProvider};

/// Provider over export content held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryExportProvider {
    block_height: u64,
    export_data: Option<Vec<KVEntry>>,
    artifacts: VecDeque<SwingStoreArtifact>,
}

impl MemoryExportProvider {
    pub fn new(
        block_height: u64,
        export_data: Option<Vec<KVEntry>>,
        artifacts: Vec<SwingStoreArtifact>,
    ) -> Self {
        Self {
            block_height,
            export_data,
            artifacts: artifacts.into(),
        }
    }

    /// Drain another provider into memory.
    pub fn collect(provider: &mut dyn SwingStoreExportProvider) -> Result<Self, ExportError> {
        let export_data = match provider.export_data_reader()? {
            Some(mut reader) => {
                let mut entries = Vec::new();
                while let Some(entry) = reader.read()? {
                    entries.push(entry);
                }
                reader.close()?;
                Some(entries)
            }
            None => None,
        };
        let mut artifacts = VecDeque::new();
        while let Some(artifact) = provider.read_next_artifact()? {
            artifacts.push_back(artifact);
        }
        Ok(Self {
            block_height: provider.block_height(),
            export_data,
            artifacts,
        })
    }

    pub fn export_data(&self) -> Option<&[KVEntry]> {
        self.export_data.as_deref()
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &SwingStoreArtifact> {
        self.artifacts.iter()
    }
}

impl SwingStoreExportProvider for MemoryExportProvider {
    fn block_height(&self) -> u64 {
        self.block_height
    }

    fn export_data_reader(&mut self) -> Result<Option<Box<dyn KVEntryReader>>, ExportError> {
        Ok(self
            .export_data
            .clone()
            .map(|entries| Box::new(KVEntryVecReader::from_entries(entries)) as Box<dyn KVEntryReader>))
    }

    fn read_next_artifact(&mut self) -> Result<Option<SwingStoreArtifact>, ExportError> {
        Ok(self.artifacts.pop_front())
    }
}

// =============================================================================
// ORDERED STORE
// =============================================================================

type Version = Arc<BTreeMap<String, String>>;

/// Ordered key/value store keeping an immutable copy of every committed
/// height, like the chain's multi-version store.
///
/// Versions are kept until `prune_below` drops them. Each one is a full copy,
/// so this store suits small states: tests, and local shadow copies.
#[derive(Debug, Default)]
pub struct MemoryKVStore {
    working: RwLock<BTreeMap<String, String>>,
    versions: RwLock<BTreeMap<u64, Version>>,
}

impl MemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.working.write().insert(key.into(), value.into());
    }

    pub fn delete(&self, key: &str) {
        self.working.write().remove(key);
    }

    /// Freeze the working set as the state at `height`.
    pub fn commit(&self, height: u64) {
        let snapshot = Arc::new(self.working.read().clone());
        self.versions.write().insert(height, snapshot);
    }

    /// Drop every version committed below `height`. Returns how many were
    /// dropped.
    pub fn prune_below(&self, height: u64) -> usize {
        let mut versions = self.versions.write();
        let kept = versions.split_off(&height);
        let pruned = versions.len();
        *versions = kept;
        pruned
    }

    pub fn latest_height(&self) -> Option<u64> {
        self.versions.read().keys().next_back().copied()
    }

    /// Cursor over the state committed at `height`.
    pub fn iterator(&self, height: u64) -> Option<MemoryIterator> {
        let version = self.versions.read().get(&height).cloned()?;
        Some(MemoryIterator {
            entries: version
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            pos: 0,
        })
    }
}

impl ExportDataSource for MemoryKVStore {
    fn export_data_reader(&self, height: u64) -> Result<Option<Box<dyn KVEntryReader>>, ExportError> {
        Ok(self
            .iterator(height)
            .map(|iter| Box::new(KVIteratorReader::new(iter)) as Box<dyn KVEntryReader>))
    }
}

impl ExportDataSink for MemoryKVStore {
    fn apply(&self, entry: &KVEntry) -> Result<(), ExportError> {
        match entry.value() {
            Some(value) => self.set(entry.key(), value),
            None => self.delete(entry.key()),
        }
        Ok(())
    }

    fn commit(&self, height: u64) -> Result<(), ExportError> {
        MemoryKVStore::commit(self, height);
        Ok(())
    }
}

/// Cursor over one committed version of a [`MemoryKVStore`].
#[derive(Debug)]
pub struct MemoryIterator {
    entries: Vec<(String, String)>,
    pos: usize,
}

impl OrderedIterator for MemoryIterator {
    fn valid(&self) -> bool {
        self.pos < self.entries.len()
    }

    fn key(&self) -> &[u8] {
        self.entries
            .get(self.pos)
            .map(|(k, _)| k.as_bytes())
            .unwrap_or_default()
    }

    fn value(&self) -> &[u8] {
        self.entries
            .get(self.pos)
            .map(|(_, v)| v.as_bytes())
            .unwrap_or_default()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn close(&mut self) -> Result<(), KVEntryError> {
        self.entries.clear();
        self.pos = 0;
        Ok(())
    }
}
