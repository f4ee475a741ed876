//! Server lookup and replacement launch.

use tracing::{debug, info};

use crate::cloud::{Compute, Server, ServerRequest};
use crate::poll::{Clock, Poller, SERVER_BUILD};

use super::error::PipelineError;

/// Reads the original server and boots its replacement.
#[derive(Debug)]
pub struct InstanceManager<'a, C, K> {
    cloud: &'a C,
    poller: &'a Poller<K>,
}

impl<'a, C, K> InstanceManager<'a, C, K>
where
    C: Compute,
    K: Clock,
{
    /// Creates a manager over `cloud`, waiting with `poller`.
    #[must_use]
    pub const fn new(cloud: &'a C, poller: &'a Poller<K>) -> Self {
        Self { cloud, poller }
    }

    /// Fetches the server whose name and flavor the replacement copies.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cloud`] when the lookup fails.
    pub async fn source(&self, server_id: &str) -> Result<Server, PipelineError<C::Error>> {
        let server = self
            .cloud
            .get_server(server_id)
            .await
            .map_err(PipelineError::cloud("look up source server"))?;
        debug!(server_id, name = %server.name, flavor = %server.flavor_id, "found source server");
        Ok(server)
    }

    /// Boots a server from `request` and waits until it is `ACTIVE`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cloud`] when the create call fails and
    /// [`PipelineError::Poll`] when the build ends in `ERROR` or the wait is
    /// bounded out or cancelled.
    pub async fn launch(&self, request: &ServerRequest) -> Result<Server, PipelineError<C::Error>> {
        info!(
            name = %request.name,
            flavor = %request.flavor_id,
            volumes = request.block_devices.len(),
            "creating server"
        );
        let created = self
            .cloud
            .create_server(request)
            .await
            .map_err(PipelineError::cloud("create server"))?;

        let cloud = self.cloud;
        let created_id = created.id.as_str();
        let server = self
            .poller
            .wait_for(&SERVER_BUILD, created_id, move || {
                cloud.get_server(created_id)
            })
            .await?;
        info!(server_id = %server.id, name = %server.name, "server active");
        Ok(server)
    }
}
