//! Temporary volumes materialised from snapshots.

use tracing::{debug, info, warn};

use crate::cloud::{BlockStorage, CloudError, Volume, VolumeRequest};
use crate::poll::{Clock, Poller, TEMP_VOLUME_CREATE, VOLUME_RELEASE, VOLUME_REMOVAL};

use super::error::{PipelineError, is_absent};

/// Creates the writable copy a backup is taken from, and removes it again.
#[derive(Debug)]
pub struct TempVolumeManager<'a, C, K> {
    cloud: &'a C,
    poller: &'a Poller<K>,
}

impl<'a, C, K> TempVolumeManager<'a, C, K>
where
    C: BlockStorage,
    K: Clock,
{
    /// Creates a manager over `cloud`, waiting with `poller`.
    #[must_use]
    pub const fn new(cloud: &'a C, poller: &'a Poller<K>) -> Self {
        Self { cloud, poller }
    }

    /// Requests a volume of `size_gb` populated from `snapshot_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cloud`] when the provider rejects the request.
    pub async fn create_from(
        &self,
        snapshot_id: &str,
        size_gb: u64,
        name: &str,
    ) -> Result<Volume, PipelineError<C::Error>> {
        info!(snapshot_id, size_gb, name, "creating temporary volume");
        let request = VolumeRequest {
            name: name.to_owned(),
            size_gb,
            snapshot_id: Some(snapshot_id.to_owned()),
            description: None,
        };
        let volume = self
            .cloud
            .create_volume(&request)
            .await
            .map_err(PipelineError::cloud("create temporary volume"))?;
        debug!(volume_id = %volume.id, "temporary volume requested");
        Ok(volume)
    }

    /// Waits until the temporary volume is `available`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Poll`] when the volume enters `error` or the
    /// wait is bounded out or cancelled.
    pub async fn await_ready(&self, volume_id: &str) -> Result<Volume, PipelineError<C::Error>> {
        let cloud = self.cloud;
        let volume = self
            .poller
            .wait_for(&TEMP_VOLUME_CREATE, volume_id, move || {
                cloud.get_volume(volume_id)
            })
            .await?;
        info!(volume_id, "temporary volume available");
        Ok(volume)
    }

    /// Waits for the volume to settle, deletes it and waits until it is gone.
    ///
    /// A volume that is already gone counts as released.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Poll`] when the volume never settles or its
    /// deletion fails, and [`PipelineError::Cloud`] when the delete call fails.
    pub async fn release(&self, volume_id: &str) -> Result<(), PipelineError<C::Error>> {
        let cloud = self.cloud;
        match self
            .poller
            .wait_for(&VOLUME_RELEASE, volume_id, move || cloud.get_volume(volume_id))
            .await
        {
            Ok(_) => {}
            Err(err) if is_absent(&err) => {
                warn!(volume_id, "temporary volume already deleted");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        match self.cloud.delete_volume(volume_id).await {
            Ok(()) => debug!(volume_id, "temporary volume delete requested"),
            Err(err) if err.is_not_found() => {
                warn!(volume_id, "temporary volume already deleted");
                return Ok(());
            }
            Err(err) => return Err(PipelineError::cloud("delete temporary volume")(err)),
        }

        self.poller
            .wait_until_gone(&VOLUME_REMOVAL, volume_id, move || async move {
                match cloud.get_volume(volume_id).await {
                    Ok(volume) => Ok(Some(volume)),
                    Err(err) if err.is_not_found() => Ok(None),
                    Err(err) => Err(err),
                }
            })
            .await?;
        info!(volume_id, "deleted temporary volume");
        Ok(())
    }
}
