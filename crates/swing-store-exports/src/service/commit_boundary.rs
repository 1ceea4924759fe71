//! # Commit Boundary
//!
//! The chain's block commit, sequenced around exports:
//!
//! 1. wait until any initiated export has started, so its view of the store
//!    is pinned before this block's mutations
//! 2. commit the block in the controller
//! 3. commit chain state
//! 4. initiate a snapshot if one is due
//!
//! Export and snapshot failures are logged and never fail the commit.

use std::sync::Arc;

use tracing::{debug, error};

use crate::domain::ExportError;
use crate::ports::{BlockCommitter, SnapshotInitiator, SwingStoreExportsApi};

pub struct CommitBoundary {
    exports: Arc<dyn SwingStoreExportsApi>,
    committer: Arc<dyn BlockCommitter>,
    snapshots: Option<Arc<dyn SnapshotInitiator>>,
}

impl CommitBoundary {
    pub fn new(
        exports: Arc<dyn SwingStoreExportsApi>,
        committer: Arc<dyn BlockCommitter>,
        snapshots: Option<Arc<dyn SnapshotInitiator>>,
    ) -> Self {
        Self {
            exports,
            committer,
            snapshots,
        }
    }

    /// Commit the block at `height`.
    pub fn commit(&self, height: u64) -> Result<(), ExportError> {
        if let Err(e) = self.exports.wait_until_started() {
            error!(height, error = %e, "swing-store export failed to start");
        }

        self.committer.commit_controller_block(height)?;
        let snapshot_height = self.committer.commit_chain(height)?;

        match (snapshot_height, &self.snapshots) {
            (Some(snapshot_height), Some(snapshots)) => {
                if let Err(e) = snapshots.initiate_snapshot(snapshot_height) {
                    error!(height = snapshot_height, error = %e, "failed to initiate snapshot");
                }
            }
            (Some(snapshot_height), None) => {
                debug!(height = snapshot_height, "snapshot due but no snapshotter configured");
            }
            (None, _) => {}
        }
        Ok(())
    }
}
