//! Backup, restore and delete pipelines.
//!
//! Each pipeline is an orchestrator generic over the cloud backend, the
//! backup ledger and the poll clock. The orchestrators compose small
//! managers, one per resource kind, so every step can be exercised against
//! a scripted backend without touching a real cloud.
//!
//! A backup run takes each attached volume through the same sequence:
//! forced snapshot, temporary volume cloned from the snapshot, backup of the
//! temporary volume, ledger record, then removal of the temporary volume and
//! the snapshot. A restore resolves each backup through the ledger, restores
//! it into a fresh volume and boots `Restored_<name>` with the source
//! server's flavor and the rebuilt device map.

mod backup;
mod device_map;
mod error;
mod inspector;
mod instance;
mod naming;
mod run_backup;
mod run_delete;
mod run_restore;
mod snapshot;
mod temp_volume;

pub use backup::{BackupManager, DeleteOutcome};
pub use device_map::{DeviceMap, DeviceSlot};
pub use error::PipelineError;
pub use inspector::{AttachedVolume, VolumeInspector};
pub use instance::InstanceManager;
pub use naming::{RunLabel, backup_description, restored_server_name};
pub use run_backup::{BackupOrchestrator, BackupReport};
pub use run_delete::{DeleteOrchestrator, DeleteSummary, SkippedBackup};
pub use run_restore::{RestoreOrchestrator, RestoreReport};
pub use snapshot::SnapshotManager;
pub use temp_volume::TempVolumeManager;
