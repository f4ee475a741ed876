//! Wire representations of Cinder and Nova payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::cloud::{
    Backup, BackupRequest, BlockDevice, ServerRequest, Snapshot, SnapshotRequest, Volume,
    VolumeAttachment, VolumeRequest,
};

/// Cinder reports `bootable` as the string `"true"`/`"false"`; accept both
/// that and a JSON boolean.
fn bool_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Text(text) => text.eq_ignore_ascii_case("true"),
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumeEnvelope {
    pub(super) volume: VolumeBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumeBody {
    id: String,
    #[serde(default)]
    name: Option<String>,
    status: String,
    #[serde(default)]
    size: u64,
    #[serde(default, deserialize_with = "bool_flag")]
    bootable: bool,
    #[serde(default)]
    snapshot_id: Option<String>,
    #[serde(default)]
    attachments: Vec<CinderAttachment>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CinderAttachment {
    #[serde(default)]
    device: Option<String>,
    server_id: String,
    volume_id: String,
}

impl From<VolumeBody> for Volume {
    fn from(value: VolumeBody) -> Self {
        Self {
            id: value.id,
            name: value.name,
            status: value.status,
            size_gb: value.size,
            bootable: value.bootable,
            snapshot_id: value.snapshot_id,
            attachments: value
                .attachments
                .into_iter()
                .filter_map(|attachment| {
                    Some(VolumeAttachment {
                        device: attachment.device?,
                        volume_id: attachment.volume_id,
                        server_id: attachment.server_id,
                    })
                })
                .collect(),
            metadata: value.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CreateVolumeEnvelope<'a> {
    volume: CreateVolume<'a>,
}

#[derive(Debug, Serialize)]
struct CreateVolume<'a> {
    size: u64,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl<'a> From<&'a VolumeRequest> for CreateVolumeEnvelope<'a> {
    fn from(value: &'a VolumeRequest) -> Self {
        Self {
            volume: CreateVolume {
                size: value.size_gb,
                name: &value.name,
                snapshot_id: value.snapshot_id.as_deref(),
                description: value.description.as_deref(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotEnvelope {
    pub(super) snapshot: SnapshotBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotBody {
    id: String,
    status: String,
    #[serde(default)]
    size: u64,
    volume_id: String,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<SnapshotBody> for Snapshot {
    fn from(value: SnapshotBody) -> Self {
        Self {
            id: value.id,
            status: value.status,
            size_gb: value.size,
            volume_id: value.volume_id,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CreateSnapshotEnvelope<'a> {
    snapshot: CreateSnapshot<'a>,
}

#[derive(Debug, Serialize)]
struct CreateSnapshot<'a> {
    volume_id: &'a str,
    name: &'a str,
    force: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl<'a> From<&'a SnapshotRequest> for CreateSnapshotEnvelope<'a> {
    fn from(value: &'a SnapshotRequest) -> Self {
        Self {
            snapshot: CreateSnapshot {
                volume_id: &value.volume_id,
                name: &value.name,
                force: value.force,
                description: value.description.as_deref(),
            },
        }
    }
}

fn creating() -> String {
    "creating".to_owned()
}

#[derive(Debug, Deserialize)]
pub(super) struct BackupEnvelope {
    pub(super) backup: BackupBody,
}

/// Backup as returned by `GET /backups/{id}`.
///
/// The create response only carries `id`, `name` and `links`, so the
/// remaining fields default.
#[derive(Debug, Deserialize)]
pub(super) struct BackupBody {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "creating")]
    status: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    volume_id: Option<String>,
}

impl From<BackupBody> for Backup {
    fn from(value: BackupBody) -> Self {
        Self {
            id: value.id,
            name: value.name,
            description: value.description,
            status: value.status,
            size_gb: value.size,
            volume_id: value.volume_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CreateBackupEnvelope<'a> {
    backup: CreateBackup<'a>,
}

#[derive(Debug, Serialize)]
struct CreateBackup<'a> {
    volume_id: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    incremental: bool,
}

impl<'a> From<&'a BackupRequest> for CreateBackupEnvelope<'a> {
    fn from(value: &'a BackupRequest) -> Self {
        Self {
            backup: CreateBackup {
                volume_id: &value.volume_id,
                name: &value.name,
                description: value.description.as_deref(),
                incremental: false,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct RestoreRequestEnvelope<'a> {
    restore: RestoreRequest<'a>,
}

#[derive(Debug, Serialize)]
struct RestoreRequest<'a> {
    name: &'a str,
}

impl<'a> RestoreRequestEnvelope<'a> {
    pub(super) const fn named(name: &'a str) -> Self {
        Self {
            restore: RestoreRequest { name },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct RestoreEnvelope {
    pub(super) restore: RestoreBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct RestoreBody {
    pub(super) backup_id: String,
    pub(super) volume_id: String,
}

fn building() -> String {
    "BUILD".to_owned()
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerEnvelope {
    pub(super) server: ServerBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerBody {
    pub(super) id: String,
    #[serde(default)]
    pub(super) name: Option<String>,
    #[serde(default = "building")]
    pub(super) status: String,
    #[serde(default)]
    pub(super) flavor: Option<FlavorRef>,
}

/// Flavor reference as returned without a compute microversion header.
///
/// Newer microversions embed the flavor by name only, which `flavorRef`
/// does not accept, so only the id is kept.
#[derive(Debug, Deserialize)]
pub(super) struct FlavorRef {
    #[serde(default)]
    id: Option<String>,
}

impl FlavorRef {
    pub(super) fn into_id(self) -> Option<String> {
        self.id
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct AttachmentsEnvelope {
    #[serde(rename = "volumeAttachments", default)]
    pub(super) volume_attachments: Vec<NovaAttachment>,
}

#[derive(Debug, Deserialize)]
pub(super) struct NovaAttachment {
    #[serde(default)]
    pub(super) device: Option<String>,
    #[serde(rename = "volumeId")]
    pub(super) volume_id: String,
    #[serde(rename = "serverId")]
    pub(super) server_id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateServerEnvelope<'a> {
    server: CreateServer<'a>,
}

#[derive(Debug, Serialize)]
struct CreateServer<'a> {
    name: &'a str,
    #[serde(rename = "flavorRef")]
    flavor_ref: &'a str,
    block_device_mapping_v2: Vec<BlockDeviceMapping<'a>>,
}

#[derive(Debug, Serialize)]
struct BlockDeviceMapping<'a> {
    uuid: &'a str,
    source_type: &'static str,
    destination_type: &'static str,
    device_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    boot_index: Option<u32>,
    delete_on_termination: bool,
}

impl<'a> From<&'a BlockDevice> for BlockDeviceMapping<'a> {
    fn from(value: &'a BlockDevice) -> Self {
        Self {
            uuid: &value.volume_id,
            source_type: "volume",
            destination_type: "volume",
            device_name: &value.device_name,
            boot_index: value.boot_index,
            delete_on_termination: value.delete_on_termination,
        }
    }
}

impl<'a> From<&'a ServerRequest> for CreateServerEnvelope<'a> {
    fn from(value: &'a ServerRequest) -> Self {
        Self {
            server: CreateServer {
                name: &value.name,
                flavor_ref: &value.flavor_id,
                block_device_mapping_v2: value
                    .block_devices
                    .iter()
                    .map(BlockDeviceMapping::from)
                    .collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::{Value, json};

    fn to_value<T: Serialize>(payload: &T) -> Value {
        serde_json::to_value(payload).unwrap_or_else(|err| panic!("serialise: {err}"))
    }

    #[rstest]
    #[case(json!("true"), true)]
    #[case(json!("false"), false)]
    #[case(json!(true), true)]
    fn volume_bootable_accepts_strings_and_booleans(#[case] flag: Value, #[case] expected: bool) {
        let body = json!({"volume": {"id": "vol-1", "status": "in-use", "size": 10, "bootable": flag}});
        let envelope: VolumeEnvelope =
            serde_json::from_value(body).unwrap_or_else(|err| panic!("decode: {err}"));
        assert_eq!(Volume::from(envelope.volume).bootable, expected);
    }

    #[test]
    fn volume_attachments_without_device_are_dropped() {
        let body = json!({"volume": {
            "id": "vol-1", "status": "in-use", "size": 10,
            "attachments": [
                {"device": "/dev/vdb", "server_id": "srv-1", "volume_id": "vol-1"},
                {"device": null, "server_id": "srv-2", "volume_id": "vol-1"}
            ]
        }});
        let envelope: VolumeEnvelope =
            serde_json::from_value(body).unwrap_or_else(|err| panic!("decode: {err}"));
        let volume = Volume::from(envelope.volume);
        assert_eq!(volume.attachments.len(), 1);
        assert_eq!(volume.attachments.first().map(|a| a.device.as_str()), Some("/dev/vdb"));
    }

    #[test]
    fn backup_create_response_defaults_to_creating() {
        let body = json!({"backup": {"id": "bkp-1", "name": "nightly", "links": []}});
        let envelope: BackupEnvelope =
            serde_json::from_value(body).unwrap_or_else(|err| panic!("decode: {err}"));
        assert_eq!(Backup::from(envelope.backup).status, "creating");
    }

    #[test]
    fn snapshot_request_is_forced() {
        let request = SnapshotRequest {
            volume_id: "vol-1".to_owned(),
            name: "snap".to_owned(),
            description: None,
            force: true,
        };
        let value = to_value(&CreateSnapshotEnvelope::from(&request));
        assert_eq!(
            value,
            json!({"snapshot": {"volume_id": "vol-1", "name": "snap", "force": true}})
        );
    }

    #[test]
    fn server_request_carries_block_device_mapping() {
        let request = ServerRequest {
            name: "Restored_web".to_owned(),
            flavor_id: "flavor-1".to_owned(),
            block_devices: vec![
                BlockDevice {
                    volume_id: "vol-new-a".to_owned(),
                    device_name: "/dev/vda".to_owned(),
                    boot_index: Some(0),
                    delete_on_termination: false,
                },
                BlockDevice {
                    volume_id: "vol-new-b".to_owned(),
                    device_name: "/dev/vdb".to_owned(),
                    boot_index: None,
                    delete_on_termination: false,
                },
            ],
        };
        let value = to_value(&CreateServerEnvelope::from(&request));
        assert_eq!(
            value,
            json!({"server": {
                "name": "Restored_web",
                "flavorRef": "flavor-1",
                "block_device_mapping_v2": [
                    {"uuid": "vol-new-a", "source_type": "volume", "destination_type": "volume",
                     "device_name": "/dev/vda", "boot_index": 0, "delete_on_termination": false},
                    {"uuid": "vol-new-b", "source_type": "volume", "destination_type": "volume",
                     "device_name": "/dev/vdb", "delete_on_termination": false}
                ]
            }})
        );
    }

    #[rstest]
    #[case(json!({"id": "f1"}), Some("f1"))]
    #[case(json!({"id": "f1", "links": []}), Some("f1"))]
    #[case(json!({"original_name": "m1.small", "vcpus": 1}), None)]
    #[case(json!({}), None)]
    fn flavor_reference_keeps_only_the_id(
        #[case] flavor: Value,
        #[case] expected: Option<&str>,
    ) {
        let parsed: FlavorRef =
            serde_json::from_value(flavor).unwrap_or_else(|err| panic!("decode: {err}"));
        assert_eq!(parsed.into_id().as_deref(), expected);
    }
}
