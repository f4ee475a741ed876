//! Restore workflow: backups to volumes, volumes to a replacement server.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::cloud::{BlockStorage, Compute, Server, ServerRequest};
use crate::ledger::{BackupLedger, BackupRecord};
use crate::poll::{Clock, Poller, TokioClock};

use super::backup::BackupManager;
use super::device_map::DeviceMap;
use super::error::PipelineError;
use super::instance::InstanceManager;
use super::naming::{RunLabel, restored_server_name};

/// Outcome of a successful restore.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoreReport {
    /// Server whose name and flavor were copied.
    pub source_server_id: String,
    /// Replacement server, as observed once `ACTIVE`.
    pub server: Server,
    /// Restored volumes keyed by their original device path.
    pub devices: DeviceMap,
}

/// Restores a set of backups into a replacement server.
#[derive(Debug)]
pub struct RestoreOrchestrator<C, L, K = TokioClock> {
    cloud: C,
    ledger: L,
    poller: Poller<K>,
    run_label: Option<RunLabel>,
}

impl<C, L, K> RestoreOrchestrator<C, L, K>
where
    C: BlockStorage + Compute,
    L: BackupLedger,
    K: Clock,
{
    /// Creates a new restore orchestrator.
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

    /// Restores `backup_ids` and boots `Restored_<name>` from them with the
    /// flavor of `server_id`.
    ///
    /// Ledger records and the source server are checked before anything is
    /// created.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyRequest`], [`PipelineError::MissingRecord`]
    /// or [`PipelineError::DuplicateDevice`] before any mutation, and
    /// [`PipelineError::Cloud`] or [`PipelineError::Poll`] when a provider
    /// call or wait fails.
    pub async fn execute(
        &self,
        server_id: &str,
        backup_ids: &[String],
    ) -> Result<RestoreReport, PipelineError<C::Error>> {
        let records = self.plan(server_id, backup_ids)?;
        let instances = InstanceManager::new(&self.cloud, &self.poller);
        let source = instances.source(server_id).await?;

        let label = self.run_label.clone().unwrap_or_else(RunLabel::generate);
        info!(
            server_id,
            run = label.as_str(),
            backups = records.len(),
            "starting restore"
        );

        let backups = BackupManager::new(&self.cloud, &self.poller);
        let mut devices = DeviceMap::new();
        for record in &records {
            let volume = backups
                .restore(&record.backup_id, &label.restored_volume_name(&record.device))
                .await
                .inspect_err(|err| {
                    if !devices.is_empty() {
                        warn!(
                            restored = ?devices.iter().collect::<Vec<_>>(),
                            error = %err,
                            "restore aborted; restored volumes were left in place"
                        );
                    }
                })?;
            info!(
                device = %record.device,
                backup_id = %record.backup_id,
                volume_id = %volume.id,
                "device restored"
            );
            devices.insert(record.device.clone(), volume.id, record.bootable);
        }

        let request = ServerRequest {
            name: restored_server_name(&source.name),
            flavor_id: source.flavor_id,
            block_devices: devices.block_devices(),
        };
        let server = instances.launch(&request).await?;
        info!(
            source_server_id = server_id,
            server_id = %server.id,
            "restore finished"
        );
        Ok(RestoreReport {
            source_server_id: server_id.to_owned(),
            server,
            devices,
        })
    }

    /// Resolves every backup to its ledger record and rejects clashing slots.
    fn plan(
        &self,
        server_id: &str,
        backup_ids: &[String],
    ) -> Result<Vec<BackupRecord>, PipelineError<C::Error>> {
        if backup_ids.is_empty() {
            return Err(PipelineError::EmptyRequest);
        }

        let mut claimed: BTreeMap<String, String> = BTreeMap::new();
        let mut records = Vec::with_capacity(backup_ids.len());
        for backup_id in backup_ids {
            let record =
                self.ledger
                    .lookup(backup_id)?
                    .ok_or_else(|| PipelineError::MissingRecord {
                        backup_id: backup_id.clone(),
                    })?;
            if let Some(first) = claimed.insert(record.device.clone(), backup_id.clone()) {
                return Err(PipelineError::DuplicateDevice {
                    device: record.device,
                    first,
                    second: backup_id.clone(),
                });
            }
            if record.server_id != server_id {
                warn!(
                    backup_id = %record.backup_id,
                    recorded_server = %record.server_id,
                    server_id,
                    "backup was taken from a different server"
                );
            }
            records.push(record);
        }
        Ok(records)
    }
}
