//! Cinder v3 calls.

use reqwest::Method;
use tracing::debug;

use crate::cloud::{
    Backup, BackupRequest, BackupRestore, BlockStorage, CloudFuture, Snapshot, SnapshotRequest,
    Volume, VolumeRequest,
};

use super::error::Call;
use super::types::{
    BackupEnvelope, CreateBackupEnvelope, CreateSnapshotEnvelope, CreateVolumeEnvelope,
    RestoreEnvelope, RestoreRequestEnvelope, SnapshotEnvelope, VolumeEnvelope,
};
use super::{OpenStackBackend, Service, send, send_json};

impl BlockStorage for OpenStackBackend {
    fn get_volume<'a>(&'a self, volume_id: &'a str) -> CloudFuture<'a, Volume, Self::Error> {
        Box::pin(async move {
            let call = Call::new("get volume", "volume", volume_id);
            let request = self
                .request(Method::GET, Service::BlockStorage, &format!("/volumes/{volume_id}"))
                .await?;
            let envelope: VolumeEnvelope = send_json(call, request).await?;
            Ok(envelope.volume.into())
        })
    }

    fn create_volume<'a>(
        &'a self,
        request: &'a VolumeRequest,
    ) -> CloudFuture<'a, Volume, Self::Error> {
        Box::pin(async move {
            let source = request.snapshot_id.as_deref().unwrap_or_default();
            let call = Call::new("create volume", "snapshot", source);
            let http = self
                .request(Method::POST, Service::BlockStorage, "/volumes")
                .await?
                .json(&CreateVolumeEnvelope::from(request));
            let envelope: VolumeEnvelope = send_json(call, http).await?;
            Ok(envelope.volume.into())
        })
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> CloudFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let call = Call::new("delete volume", "volume", volume_id);
            let request = self
                .request(Method::DELETE, Service::BlockStorage, &format!("/volumes/{volume_id}"))
                .await?;
            send(call, request).await?;
            debug!(volume_id, "volume delete accepted");
            Ok(())
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        request: &'a SnapshotRequest,
    ) -> CloudFuture<'a, Snapshot, Self::Error> {
        Box::pin(async move {
            let call = Call::new("create snapshot", "volume", &request.volume_id);
            let http = self
                .request(Method::POST, Service::BlockStorage, "/snapshots")
                .await?
                .json(&CreateSnapshotEnvelope::from(request));
            let envelope: SnapshotEnvelope = send_json(call, http).await?;
            Ok(envelope.snapshot.into())
        })
    }

    fn get_snapshot<'a>(
        &'a self,
        snapshot_id: &'a str,
    ) -> CloudFuture<'a, Snapshot, Self::Error> {
        Box::pin(async move {
            let call = Call::new("get snapshot", "snapshot", snapshot_id);
            let request = self
                .request(
                    Method::GET,
                    Service::BlockStorage,
                    &format!("/snapshots/{snapshot_id}"),
                )
                .await?;
            let envelope: SnapshotEnvelope = send_json(call, request).await?;
            Ok(envelope.snapshot.into())
        })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> CloudFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let call = Call::new("delete snapshot", "snapshot", snapshot_id);
            let request = self
                .request(
                    Method::DELETE,
                    Service::BlockStorage,
                    &format!("/snapshots/{snapshot_id}"),
                )
                .await?;
            send(call, request).await?;
            debug!(snapshot_id, "snapshot delete accepted");
            Ok(())
        })
    }

    fn create_backup<'a>(
        &'a self,
        request: &'a BackupRequest,
    ) -> CloudFuture<'a, Backup, Self::Error> {
        Box::pin(async move {
            let call = Call::new("create backup", "volume", &request.volume_id);
            let http = self
                .request(Method::POST, Service::BlockStorage, "/backups")
                .await?
                .json(&CreateBackupEnvelope::from(request));
            let envelope: BackupEnvelope = send_json(call, http).await?;
            Ok(envelope.backup.into())
        })
    }

    fn get_backup<'a>(&'a self, backup_id: &'a str) -> CloudFuture<'a, Backup, Self::Error> {
        Box::pin(async move {
            let call = Call::new("get backup", "backup", backup_id);
            let request = self
                .request(Method::GET, Service::BlockStorage, &format!("/backups/{backup_id}"))
                .await?;
            let envelope: BackupEnvelope = send_json(call, request).await?;
            Ok(envelope.backup.into())
        })
    }

    fn delete_backup<'a>(&'a self, backup_id: &'a str) -> CloudFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let call = Call::new("delete backup", "backup", backup_id);
            let request = self
                .request(
                    Method::DELETE,
                    Service::BlockStorage,
                    &format!("/backups/{backup_id}"),
                )
                .await?;
            send(call, request).await?;
            debug!(backup_id, "backup delete accepted");
            Ok(())
        })
    }

    fn restore_backup<'a>(
        &'a self,
        backup_id: &'a str,
        volume_name: &'a str,
    ) -> CloudFuture<'a, BackupRestore, Self::Error> {
        Box::pin(async move {
            let call = Call::new("restore backup", "backup", backup_id);
            let request = self
                .request(
                    Method::POST,
                    Service::BlockStorage,
                    &format!("/backups/{backup_id}/restore"),
                )
                .await?
                .json(&RestoreRequestEnvelope::named(volume_name));
            let envelope: RestoreEnvelope = send_json(call, request).await?;
            Ok(BackupRestore {
                backup_id: envelope.restore.backup_id,
                volume_id: envelope.restore.volume_id,
            })
        })
    }
}

