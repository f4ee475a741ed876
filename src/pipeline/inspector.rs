//! Discovery of the volumes attached to a server.

use tracing::{debug, info};

use crate::cloud::{BlockStorage, Compute, Volume};

use super::error::PipelineError;

/// Attached volume together with its slot on the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachedVolume {
    /// Device path inside the guest.
    pub device: String,
    /// Volume details from block storage.
    pub volume: Volume,
}

/// Joins the compute attachment list with block-storage volume details.
#[derive(Debug)]
pub struct VolumeInspector<'a, C> {
    cloud: &'a C,
}

impl<'a, C> VolumeInspector<'a, C>
where
    C: BlockStorage + Compute,
{
    /// Creates an inspector over `cloud`.
    #[must_use]
    pub const fn new(cloud: &'a C) -> Self {
        Self { cloud }
    }

    /// Returns every volume attached to `server_id`, ordered by device path.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoAttachedVolumes`] when nothing is attached
    /// and [`PipelineError::Cloud`] when a lookup fails.
    pub async fn attached_volumes(
        &self,
        server_id: &str,
    ) -> Result<Vec<AttachedVolume>, PipelineError<C::Error>> {
        let attachments = self
            .cloud
            .list_volume_attachments(server_id)
            .await
            .map_err(PipelineError::cloud("list volume attachments"))?;
        if attachments.is_empty() {
            return Err(PipelineError::NoAttachedVolumes {
                server_id: server_id.to_owned(),
            });
        }

        let mut volumes = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let volume = self
                .cloud
                .get_volume(&attachment.volume_id)
                .await
                .map_err(PipelineError::cloud("look up attached volume"))?;
            debug!(
                device = %attachment.device,
                volume_id = %volume.id,
                size_gb = volume.size_gb,
                bootable = volume.bootable,
                "found attached volume"
            );
            volumes.push(AttachedVolume {
                device: attachment.device,
                volume,
            });
        }
        volumes.sort_by(|left, right| left.device.cmp(&right.device));
        info!(server_id, count = volumes.len(), "inspected attached volumes");
        Ok(volumes)
    }
}
