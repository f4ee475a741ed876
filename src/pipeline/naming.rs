//! Names given to the resources a run creates.
//!
//! Names only help operators spot a run's leftovers in the dashboard. The
//! restore path reads device slots from the ledger and never parses them.

use uuid::Uuid;

const RUN_LABEL_LEN: usize = 8;

/// Short identifier shared by every resource created in one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunLabel(String);

impl RunLabel {
    /// Generates a fresh random label.
    #[must_use]
    pub fn generate() -> Self {
        Self(
            Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(RUN_LABEL_LEN)
                .collect(),
        )
    }

    /// Uses a caller-supplied label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the label text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name for the snapshot of `volume_id`.
    #[must_use]
    pub fn snapshot_name(&self, volume_id: &str) -> String {
        format!("vmvault-snap-{volume_id}-{}", self.0)
    }

    /// Name for the temporary volume built from `volume_id`'s snapshot.
    #[must_use]
    pub fn temp_volume_name(&self, volume_id: &str) -> String {
        format!("vmvault-tmp-{volume_id}-{}", self.0)
    }

    /// Name for the backup of the volume at `device` on `server_id`.
    #[must_use]
    pub fn backup_name(&self, server_id: &str, device: &str) -> String {
        format!("vmvault-{server_id}-{}-{}", device_slug(device), self.0)
    }

    /// Name for the volume restored into `device`.
    #[must_use]
    pub fn restored_volume_name(&self, device: &str) -> String {
        format!("vmvault-restore-{}-{}", device_slug(device), self.0)
    }
}

/// Free-form description stored on each backup.
#[must_use]
pub fn backup_description(server_id: &str, volume_id: &str, device: &str) -> String {
    format!("vmvault backup of volume {volume_id} at {device} on server {server_id}")
}

/// Name of the server launched by a restore.
#[must_use]
pub fn restored_server_name(original: &str) -> String {
    format!("Restored_{original}")
}

fn device_slug(device: &str) -> &str {
    device.rsplit('/').next().unwrap_or(device)
}
