//! Provider-neutral view of the block-storage and compute services.
//!
//! The pipelines only speak to these traits. [`crate::openstack`] implements
//! them against Cinder and Nova; [`crate::test_support`] provides scripted
//! in-memory doubles.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::poll::StatusReport;

/// Future type returned by cloud trait methods.
pub type CloudFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Error type produced by a cloud backend.
pub trait CloudError: std::error::Error + Send + Sync + 'static {
    /// Returns `true` when the provider reported the resource as absent.
    fn is_not_found(&self) -> bool;
}

/// Common supertrait naming the backend error type.
pub trait Cloud {
    /// Error type surfaced by every call.
    type Error: CloudError;
}

/// Block-storage operations (volumes, snapshots and backups).
pub trait BlockStorage: Cloud {
    /// Fetches a volume by id.
    fn get_volume<'a>(&'a self, volume_id: &'a str) -> CloudFuture<'a, Volume, Self::Error>;

    /// Creates a volume, optionally from a snapshot.
    fn create_volume<'a>(
        &'a self,
        request: &'a VolumeRequest,
    ) -> CloudFuture<'a, Volume, Self::Error>;

    /// Requests deletion of a volume.
    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> CloudFuture<'a, (), Self::Error>;

    /// Creates a snapshot of a volume.
    fn create_snapshot<'a>(
        &'a self,
        request: &'a SnapshotRequest,
    ) -> CloudFuture<'a, Snapshot, Self::Error>;

    /// Fetches a snapshot by id.
    fn get_snapshot<'a>(&'a self, snapshot_id: &'a str)
    -> CloudFuture<'a, Snapshot, Self::Error>;

    /// Requests deletion of a snapshot.
    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> CloudFuture<'a, (), Self::Error>;

    /// Creates a backup of a volume.
    fn create_backup<'a>(
        &'a self,
        request: &'a BackupRequest,
    ) -> CloudFuture<'a, Backup, Self::Error>;

    /// Fetches a backup by id.
    fn get_backup<'a>(&'a self, backup_id: &'a str) -> CloudFuture<'a, Backup, Self::Error>;

    /// Requests deletion of a backup.
    fn delete_backup<'a>(&'a self, backup_id: &'a str) -> CloudFuture<'a, (), Self::Error>;

    /// Restores a backup into a newly created volume.
    fn restore_backup<'a>(
        &'a self,
        backup_id: &'a str,
        volume_name: &'a str,
    ) -> CloudFuture<'a, BackupRestore, Self::Error>;
}

/// Compute operations (servers and their volume attachments).
pub trait Compute: Cloud {
    /// Fetches a server by id.
    fn get_server<'a>(&'a self, server_id: &'a str) -> CloudFuture<'a, Server, Self::Error>;

    /// Lists the volumes attached to a server.
    fn list_volume_attachments<'a>(
        &'a self,
        server_id: &'a str,
    ) -> CloudFuture<'a, Vec<VolumeAttachment>, Self::Error>;

    /// Boots a server from existing volumes.
    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> CloudFuture<'a, Server, Self::Error>;
}

/// Block-storage volume.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Volume {
    /// Provider identifier.
    pub id: String,
    /// Display name, when set.
    pub name: Option<String>,
    /// Provider status (`creating`, `available`, `in-use`, ...).
    pub status: String,
    /// Size in GiB.
    pub size_gb: u64,
    /// Whether the volume can boot a server.
    pub bootable: bool,
    /// Snapshot the volume was created from.
    pub snapshot_id: Option<String>,
    /// Current attachments.
    pub attachments: Vec<VolumeAttachment>,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, String>,
}

/// Point-in-time copy of a volume.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Provider identifier.
    pub id: String,
    /// Provider status.
    pub status: String,
    /// Size in GiB.
    pub size_gb: u64,
    /// Volume the snapshot was taken from.
    pub volume_id: String,
    /// Creation timestamp as reported by the provider.
    pub created_at: Option<String>,
}

/// Durable copy of a volume's data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Backup {
    /// Provider identifier.
    pub id: String,
    /// Display name, when set.
    pub name: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Provider status.
    pub status: String,
    /// Size in GiB, once known.
    pub size_gb: Option<u64>,
    /// Volume the backup was taken from.
    pub volume_id: Option<String>,
}

/// Result of a restore request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupRestore {
    /// Backup being restored.
    pub backup_id: String,
    /// Volume receiving the data.
    pub volume_id: String,
}

/// Compute server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Server {
    /// Provider identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Flavor the server runs with.
    pub flavor_id: String,
    /// Provider status (`BUILD`, `ACTIVE`, `ERROR`, ...).
    pub status: String,
}

/// Volume attached to a server at a device path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeAttachment {
    /// Device path inside the guest (for example `/dev/vdb`).
    pub device: String,
    /// Attached volume.
    pub volume_id: String,
    /// Server holding the attachment.
    pub server_id: String,
}

/// Parameters for a new snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Volume to snapshot.
    pub volume_id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Snapshot even when the volume is attached.
    pub force: bool,
}

/// Parameters for a new volume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeRequest {
    /// Display name.
    pub name: String,
    /// Size in GiB.
    pub size_gb: u64,
    /// Snapshot to populate the volume from.
    pub snapshot_id: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

/// Parameters for a new backup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupRequest {
    /// Volume to back up.
    pub volume_id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
}

/// One entry of a server's block-device mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockDevice {
    /// Volume to attach.
    pub volume_id: String,
    /// Device path inside the guest.
    pub device_name: String,
    /// Boot order; `Some(0)` marks the boot volume.
    pub boot_index: Option<u32>,
    /// Whether the volume is deleted together with the server.
    pub delete_on_termination: bool,
}

/// Parameters for a server booted from volumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerRequest {
    /// Display name.
    pub name: String,
    /// Flavor to run with.
    pub flavor_id: String,
    /// Volumes to attach, boot volume included.
    pub block_devices: Vec<BlockDevice>,
}

/// Reasons a [`ServerRequest`] cannot be sent.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidRequest {
    /// A required field is empty.
    #[error("server request is missing {0}")]
    MissingField(&'static str),
    /// The mapping does not contain exactly one boot volume.
    #[error("server request must name exactly one boot volume, found {0}")]
    BootVolumes(usize),
}

impl ServerRequest {
    /// Checks the request before it is sent to the provider.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequest`] when the name, flavor or mapping is empty,
    /// or when the mapping does not carry exactly one `boot_index` of 0.
    pub fn validate(&self) -> Result<(), InvalidRequest> {
        if self.name.trim().is_empty() {
            return Err(InvalidRequest::MissingField("name"));
        }
        if self.flavor_id.trim().is_empty() {
            return Err(InvalidRequest::MissingField("flavor_id"));
        }
        if self.block_devices.is_empty() {
            return Err(InvalidRequest::MissingField("block_devices"));
        }
        let boot_volumes = self
            .block_devices
            .iter()
            .filter(|device| device.boot_index == Some(0))
            .count();
        if boot_volumes != 1 {
            return Err(InvalidRequest::BootVolumes(boot_volumes));
        }
        Ok(())
    }
}

impl StatusReport for Volume {
    fn status(&self) -> &str {
        &self.status
    }
}

impl StatusReport for Snapshot {
    fn status(&self) -> &str {
        &self.status
    }
}

impl StatusReport for Backup {
    fn status(&self) -> &str {
        &self.status
    }
}

impl StatusReport for Server {
    fn status(&self) -> &str {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn request() -> ServerRequest {
        ServerRequest {
            name: "Restored_web".to_owned(),
            flavor_id: "m1.small".to_owned(),
            block_devices: vec![
                BlockDevice {
                    volume_id: "vol-1".to_owned(),
                    device_name: "/dev/vda".to_owned(),
                    boot_index: Some(0),
                    delete_on_termination: false,
                },
                BlockDevice {
                    volume_id: "vol-2".to_owned(),
                    device_name: "/dev/vdb".to_owned(),
                    boot_index: None,
                    delete_on_termination: false,
                },
            ],
        }
    }

    #[rstest]
    fn accepts_a_single_boot_volume(request: ServerRequest) {
        assert_eq!(request.validate(), Ok(()));
    }

    #[rstest]
    fn rejects_blank_name(mut request: ServerRequest) {
        request.name = "  ".to_owned();
        assert_eq!(
            request.validate(),
            Err(InvalidRequest::MissingField("name"))
        );
    }

    #[rstest]
    fn rejects_missing_boot_volume(mut request: ServerRequest) {
        for device in &mut request.block_devices {
            device.boot_index = None;
        }
        assert_eq!(request.validate(), Err(InvalidRequest::BootVolumes(0)));
    }

    #[rstest]
    fn rejects_two_boot_volumes(mut request: ServerRequest) {
        for device in &mut request.block_devices {
            device.boot_index = Some(0);
        }
        assert_eq!(request.validate(), Err(InvalidRequest::BootVolumes(2)));
    }
}
