//! Backup workflow: snapshot, temporary volume, backup, cleanup.

use std::fmt::Display;

use chrono::Utc;
use tracing::{info, warn};

use crate::cloud::{BlockStorage, Compute};
use crate::ledger::{BackupLedger, BackupRecord};
use crate::poll::{Clock, Poller, TokioClock};

use super::backup::BackupManager;
use super::error::PipelineError;
use super::inspector::{AttachedVolume, VolumeInspector};
use super::naming::{RunLabel, backup_description};
use super::snapshot::SnapshotManager;
use super::temp_volume::TempVolumeManager;

/// Outcome of a successful backup run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupReport {
    /// Server whose volumes were backed up.
    pub server_id: String,
    /// Label embedded in the names of the run's resources.
    pub run_label: RunLabel,
    /// One ledger record per attached volume, in device order.
    pub records: Vec<BackupRecord>,
}

impl BackupReport {
    /// Backup ids in device order.
    pub fn backup_ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.backup_id.as_str())
    }
}

/// Resources created by a run that have not been cleaned up yet, plus the
/// backups it already finished.
#[derive(Debug, Default)]
struct Leftovers {
    snapshots: Vec<String>,
    volumes: Vec<String>,
    backups: Vec<String>,
    completed: Vec<String>,
}

impl Leftovers {
    fn settle(list: &mut Vec<String>, id: &str) {
        list.retain(|entry| entry != id);
    }

    /// Moves a backup whose ledger record is written to the completed list.
    fn backup_recorded(&mut self, backup_id: &str) {
        Self::settle(&mut self.backups, backup_id);
        self.completed.push(backup_id.to_owned());
    }

    const fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
            && self.volumes.is_empty()
            && self.backups.is_empty()
            && self.completed.is_empty()
    }

    fn report(&self, err: &dyn Display) {
        if self.is_empty() {
            return;
        }
        warn!(
            completed_backups = ?self.completed,
            snapshots = ?self.snapshots,
            volumes = ?self.volumes,
            backups = ?self.backups,
            error = %err,
            "backup aborted; completed backups are in the ledger, the rest need manual cleanup"
        );
    }
}

/// Backs up every volume attached to a server.
#[derive(Debug)]
pub struct BackupOrchestrator<C, L, K = TokioClock> {
    cloud: C,
    ledger: L,
    poller: Poller<K>,
    run_label: Option<RunLabel>,
}

impl<C, L, K> BackupOrchestrator<C, L, K>
where
    C: BlockStorage + Compute,
    L: BackupLedger,
    K: Clock,
{
    /// Creates a new backup orchestrator.
    #[must_use]
    pub const fn new(cloud: C, ledger: L, poller: Poller<K>) -> Self {
        Self {
            cloud,
            ledger,
            poller,
            run_label: None,
        }
    }

    /// Uses a fixed run label instead of generating one per run.
    #[must_use]
    pub fn with_run_label(mut self, label: RunLabel) -> Self {
        self.run_label = Some(label);
        self
    }

    /// Backs up each attached volume in device order.
    ///
    /// Every completed backup is written to the ledger before its temporary
    /// resources are removed. The run stops at the first failure; resources
    /// created so far are logged, not rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when inspection, any provider call, any wait
    /// or the ledger write fails.
    pub async fn execute(&self, server_id: &str) -> Result<BackupReport, PipelineError<C::Error>> {
        let label = self.run_label.clone().unwrap_or_else(RunLabel::generate);
        info!(server_id, run = label.as_str(), "starting backup");

        let volumes = VolumeInspector::new(&self.cloud)
            .attached_volumes(server_id)
            .await?;

        let mut leftovers = Leftovers::default();
        let mut records = Vec::with_capacity(volumes.len());
        for attached in &volumes {
            match self
                .back_up_volume(server_id, attached, &label, &mut leftovers)
                .await
            {
                Ok(record) => records.push(record),
                Err(err) => {
                    leftovers.report(&err);
                    return Err(err);
                }
            }
        }

        info!(server_id, backups = records.len(), "backup finished");
        Ok(BackupReport {
            server_id: server_id.to_owned(),
            run_label: label,
            records,
        })
    }

    async fn back_up_volume(
        &self,
        server_id: &str,
        attached: &AttachedVolume,
        label: &RunLabel,
        leftovers: &mut Leftovers,
    ) -> Result<BackupRecord, PipelineError<C::Error>> {
        let snapshots = SnapshotManager::new(&self.cloud, &self.poller);
        let temp_volumes = TempVolumeManager::new(&self.cloud, &self.poller);
        let backups = BackupManager::new(&self.cloud, &self.poller);
        let source = &attached.volume;
        info!(device = %attached.device, volume_id = %source.id, "backing up volume");

        let requested_snapshot = snapshots
            .create(&source.id, &label.snapshot_name(&source.id))
            .await?;
        leftovers.snapshots.push(requested_snapshot.id.clone());
        let snapshot = snapshots.await_ready(&requested_snapshot.id).await?;

        let size_gb = if snapshot.size_gb == 0 {
            source.size_gb
        } else {
            snapshot.size_gb
        };
        let requested_volume = temp_volumes
            .create_from(&snapshot.id, size_gb, &label.temp_volume_name(&source.id))
            .await?;
        leftovers.volumes.push(requested_volume.id.clone());
        let temp_volume = temp_volumes.await_ready(&requested_volume.id).await?;

        let requested_backup = backups
            .create(
                &temp_volume.id,
                &label.backup_name(server_id, &attached.device),
                backup_description(server_id, &source.id, &attached.device),
            )
            .await?;
        leftovers.backups.push(requested_backup.id.clone());
        let backup = backups.await_ready(&requested_backup.id).await?;

        let record = BackupRecord {
            backup_id: backup.id,
            server_id: server_id.to_owned(),
            source_volume_id: source.id.clone(),
            device: attached.device.clone(),
            bootable: source.bootable,
            size_gb: source.size_gb,
            created_at: Utc::now(),
        };
        self.ledger.record(&record)?;
        leftovers.backup_recorded(&record.backup_id);

        temp_volumes.release(&temp_volume.id).await?;
        Leftovers::settle(&mut leftovers.volumes, &temp_volume.id);
        snapshots.release(&snapshot.id).await?;
        Leftovers::settle(&mut leftovers.snapshots, &snapshot.id);

        info!(
            device = %record.device,
            backup_id = %record.backup_id,
            "volume backed up"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_backups_stay_visible_after_cleanup() {
        let mut leftovers = Leftovers::default();
        leftovers.snapshots.push("snap-1".to_owned());
        leftovers.volumes.push("vol-2".to_owned());
        leftovers.backups.push("backup-3".to_owned());

        leftovers.backup_recorded("backup-3");
        Leftovers::settle(&mut leftovers.volumes, "vol-2");
        Leftovers::settle(&mut leftovers.snapshots, "snap-1");

        assert!(leftovers.backups.is_empty());
        assert_eq!(leftovers.completed, vec!["backup-3".to_owned()]);
        assert!(!leftovers.is_empty(), "abort report must name completed backups");
    }

    #[test]
    fn nothing_to_report_before_the_first_create() {
        assert!(Leftovers::default().is_empty());
    }
}
