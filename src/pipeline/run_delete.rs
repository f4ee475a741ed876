//! Delete workflow for backups.

use tracing::{debug, info};

use crate::cloud::BlockStorage;
use crate::ledger::BackupLedger;
use crate::poll::{Clock, Poller, TokioClock};

use super::backup::{BackupManager, DeleteOutcome};
use super::error::PipelineError;

/// Backup that was left in place because of its status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedBackup {
    /// Backup identifier.
    pub backup_id: String,
    /// Status that prevented the delete.
    pub status: String,
}

/// Per-backup results of a delete run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// Backups whose delete was accepted.
    pub deleted: Vec<String>,
    /// Backups left alone because they were not `available`.
    pub skipped: Vec<SkippedBackup>,
    /// Backups the provider no longer knows.
    pub missing: Vec<String>,
}

/// Deletes backups and keeps the ledger in step.
#[derive(Debug)]
pub struct DeleteOrchestrator<C, L, K = TokioClock> {
    cloud: C,
    ledger: L,
    poller: Poller<K>,
}

impl<C, L, K> DeleteOrchestrator<C, L, K>
where
    C: BlockStorage,
    L: BackupLedger,
    K: Clock,
{
    /// Creates a new delete orchestrator.
    #[must_use]
    pub const fn new(cloud: C, ledger: L, poller: Poller<K>) -> Self {
        Self {
            cloud,
            ledger,
            poller,
        }
    }

    /// Deletes each `available` backup in `backup_ids`.
    ///
    /// Backups in any other status are logged and skipped without a delete
    /// call. Ledger records are removed for deleted and missing backups.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyRequest`] for an empty list,
    /// [`PipelineError::Cloud`] when a lookup or delete fails and
    /// [`PipelineError::Ledger`] when the ledger cannot be updated.
    pub async fn execute(
        &self,
        backup_ids: &[String],
    ) -> Result<DeleteSummary, PipelineError<C::Error>> {
        if backup_ids.is_empty() {
            return Err(PipelineError::EmptyRequest);
        }

        let backups = BackupManager::new(&self.cloud, &self.poller);
        let mut summary = DeleteSummary::default();
        for backup_id in backup_ids {
            match backups.delete(backup_id).await? {
                DeleteOutcome::Deleted => {
                    self.ledger.forget(backup_id)?;
                    summary.deleted.push(backup_id.clone());
                }
                DeleteOutcome::Skipped { status } => summary.skipped.push(SkippedBackup {
                    backup_id: backup_id.clone(),
                    status,
                }),
                DeleteOutcome::Missing => {
                    if self.ledger.forget(backup_id)? {
                        debug!(backup_id = %backup_id, "dropped stale ledger record");
                    }
                    summary.missing.push(backup_id.clone());
                }
            }
        }
        info!(
            deleted = summary.deleted.len(),
            skipped = summary.skipped.len(),
            missing = summary.missing.len(),
            "delete finished"
        );
        Ok(summary)
    }
}
