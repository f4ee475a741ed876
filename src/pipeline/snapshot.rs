//! Snapshot lifecycle: create, wait, release.

use tracing::{debug, info, warn};

use crate::cloud::{BlockStorage, CloudError, Snapshot, SnapshotRequest};
use crate::poll::{Clock, Poller, SNAPSHOT_CREATE, SNAPSHOT_RELEASE};

use super::error::{PipelineError, is_absent};

/// Creates and removes the snapshots a backup run works from.
#[derive(Debug)]
pub struct SnapshotManager<'a, C, K> {
    cloud: &'a C,
    poller: &'a Poller<K>,
}

impl<'a, C, K> SnapshotManager<'a, C, K>
where
    C: BlockStorage,
    K: Clock,
{
    /// Creates a manager over `cloud`, waiting with `poller`.
    #[must_use]
    pub const fn new(cloud: &'a C, poller: &'a Poller<K>) -> Self {
        Self { cloud, poller }
    }

    /// Requests a forced snapshot of `volume_id`, which may be attached.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cloud`] when the provider rejects the request.
    pub async fn create(
        &self,
        volume_id: &str,
        name: &str,
    ) -> Result<Snapshot, PipelineError<C::Error>> {
        info!(volume_id, name, "creating snapshot");
        let request = SnapshotRequest {
            volume_id: volume_id.to_owned(),
            name: name.to_owned(),
            description: None,
            force: true,
        };
        let snapshot = self
            .cloud
            .create_snapshot(&request)
            .await
            .map_err(PipelineError::cloud("create snapshot"))?;
        debug!(snapshot_id = %snapshot.id, status = %snapshot.status, "snapshot requested");
        Ok(snapshot)
    }

    /// Waits until the snapshot is `available`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Poll`] when the snapshot enters `error` or
    /// the wait is bounded out or cancelled.
    pub async fn await_ready(&self, snapshot_id: &str) -> Result<Snapshot, PipelineError<C::Error>> {
        let cloud = self.cloud;
        let snapshot = self
            .poller
            .wait_for(&SNAPSHOT_CREATE, snapshot_id, move || {
                cloud.get_snapshot(snapshot_id)
            })
            .await?;
        info!(snapshot_id, size_gb = snapshot.size_gb, "snapshot available");
        Ok(snapshot)
    }

    /// Waits for the snapshot to settle, then deletes it.
    ///
    /// A snapshot that is already gone counts as released.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Poll`] when the snapshot never settles and
    /// [`PipelineError::Cloud`] when the delete call fails.
    pub async fn release(&self, snapshot_id: &str) -> Result<(), PipelineError<C::Error>> {
        let cloud = self.cloud;
        match self
            .poller
            .wait_for(&SNAPSHOT_RELEASE, snapshot_id, move || {
                cloud.get_snapshot(snapshot_id)
            })
            .await
        {
            Ok(_) => {}
            Err(err) if is_absent(&err) => {
                warn!(snapshot_id, "snapshot already deleted");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        match self.cloud.delete_snapshot(snapshot_id).await {
            Ok(()) => info!(snapshot_id, "deleted snapshot"),
            Err(err) if err.is_not_found() => warn!(snapshot_id, "snapshot already deleted"),
            Err(err) => return Err(PipelineError::cloud("delete snapshot")(err)),
        }
        Ok(())
    }
}
