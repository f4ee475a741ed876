//! Backup lifecycle: create, restore, delete.

use tracing::{debug, error, info, warn};

use crate::cloud::{Backup, BackupRequest, BlockStorage, CloudError, Volume};
use crate::poll::{BACKUP_CREATE, BACKUP_RESTORABLE, Clock, Poller, RESTORED_VOLUME};

use super::error::PipelineError;

/// Status a backup must report before it may be restored or deleted.
const AVAILABLE: &str = "available";

/// What happened to one backup handed to [`BackupManager::delete`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The delete request was accepted.
    Deleted,
    /// The backup was not `available`, so no delete was issued.
    Skipped {
        /// Status the backup reported.
        status: String,
    },
    /// The provider no longer knows the backup.
    Missing,
}

/// Creates, restores and deletes Cinder backups.
#[derive(Debug)]
pub struct BackupManager<'a, C, K> {
    cloud: &'a C,
    poller: &'a Poller<K>,
}

impl<'a, C, K> BackupManager<'a, C, K>
where
    C: BlockStorage,
    K: Clock,
{
    /// Creates a manager over `cloud`, waiting with `poller`.
    #[must_use]
    pub const fn new(cloud: &'a C, poller: &'a Poller<K>) -> Self {
        Self { cloud, poller }
    }

    /// Requests a full backup of `volume_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cloud`] when the provider rejects the request.
    pub async fn create(
        &self,
        volume_id: &str,
        name: &str,
        description: String,
    ) -> Result<Backup, PipelineError<C::Error>> {
        info!(volume_id, name, "creating backup");
        let request = BackupRequest {
            volume_id: volume_id.to_owned(),
            name: name.to_owned(),
            description: Some(description),
        };
        let backup = self
            .cloud
            .create_backup(&request)
            .await
            .map_err(PipelineError::cloud("create backup"))?;
        debug!(backup_id = %backup.id, "backup requested");
        Ok(backup)
    }

    /// Waits until the backup is `available`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Poll`] when the backup enters `error` or the
    /// wait is bounded out or cancelled.
    pub async fn await_ready(&self, backup_id: &str) -> Result<Backup, PipelineError<C::Error>> {
        let cloud = self.cloud;
        let backup = self
            .poller
            .wait_for(&BACKUP_CREATE, backup_id, move || cloud.get_backup(backup_id))
            .await?;
        info!(backup_id, "backup available");
        Ok(backup)
    }

    /// Restores `backup_id` into a new volume and waits for it to fill.
    ///
    /// The backup itself must first settle into `available`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Poll`] when the backup or the new volume
    /// enters a failure status, and [`PipelineError::Cloud`] when the restore
    /// call fails.
    pub async fn restore(
        &self,
        backup_id: &str,
        volume_name: &str,
    ) -> Result<Volume, PipelineError<C::Error>> {
        let cloud = self.cloud;
        self.poller
            .wait_for(&BACKUP_RESTORABLE, backup_id, move || {
                cloud.get_backup(backup_id)
            })
            .await?;

        info!(backup_id, volume_name, "restoring backup");
        let restore = self
            .cloud
            .restore_backup(backup_id, volume_name)
            .await
            .map_err(PipelineError::cloud("restore backup"))?;
        let volume_id = restore.volume_id;
        debug!(backup_id, volume_id = %volume_id, "restore accepted");

        let volume = self
            .poller
            .wait_for(&RESTORED_VOLUME, &volume_id, || cloud.get_volume(&volume_id))
            .await?;
        info!(backup_id, volume_id = %volume.id, "backup restored");
        Ok(volume)
    }

    /// Deletes `backup_id` when it is `available`.
    ///
    /// Any other status is logged and left alone; a backup the provider no
    /// longer knows is reported as [`DeleteOutcome::Missing`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cloud`] when the lookup or delete call fails
    /// for a reason other than not-found.
    pub async fn delete(&self, backup_id: &str) -> Result<DeleteOutcome, PipelineError<C::Error>> {
        let backup = match self.cloud.get_backup(backup_id).await {
            Ok(backup) => backup,
            Err(err) if err.is_not_found() => {
                warn!(backup_id, "backup not found; nothing to delete");
                return Ok(DeleteOutcome::Missing);
            }
            Err(err) => return Err(PipelineError::cloud("look up backup")(err)),
        };

        if backup.status != AVAILABLE {
            error!(
                backup_id,
                status = %backup.status,
                "backup is not available; refusing to delete it"
            );
            return Ok(DeleteOutcome::Skipped {
                status: backup.status,
            });
        }

        match self.cloud.delete_backup(backup_id).await {
            Ok(()) => {
                info!(backup_id, "deleting backup");
                Ok(DeleteOutcome::Deleted)
            }
            Err(err) if err.is_not_found() => {
                warn!(backup_id, "backup disappeared before delete");
                Ok(DeleteOutcome::Missing)
            }
            Err(err) => Err(PipelineError::cloud("delete backup")(err)),
        }
    }
}
