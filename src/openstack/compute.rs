//! Nova v2.1 calls.

use reqwest::Method;
use tracing::warn;

use crate::cloud::{CloudFuture, Compute, Server, ServerRequest, VolumeAttachment};

use super::error::Call;
use super::types::{AttachmentsEnvelope, CreateServerEnvelope, FlavorRef, ServerEnvelope};
use super::{OpenStackBackend, Service, send_json};

impl Compute for OpenStackBackend {
    fn get_server<'a>(&'a self, server_id: &'a str) -> CloudFuture<'a, Server, Self::Error> {
        Box::pin(async move {
            let call = Call::new("get server", "server", server_id);
            let request = self
                .request(Method::GET, Service::Compute, &format!("/servers/{server_id}"))
                .await?;
            let envelope: ServerEnvelope = send_json(call, request).await?;
            let server = envelope.server;
            Ok(Server {
                name: server.name.unwrap_or_default(),
                flavor_id: server
                    .flavor
                    .and_then(FlavorRef::into_id)
                    .unwrap_or_default(),
                status: server.status,
                id: server.id,
            })
        })
    }

    fn list_volume_attachments<'a>(
        &'a self,
        server_id: &'a str,
    ) -> CloudFuture<'a, Vec<VolumeAttachment>, Self::Error> {
        Box::pin(async move {
            let call = Call::new("list volume attachments", "server", server_id);
            let request = self
                .request(
                    Method::GET,
                    Service::Compute,
                    &format!("/servers/{server_id}/os-volume_attachments"),
                )
                .await?;
            let envelope: AttachmentsEnvelope = send_json(call, request).await?;
            Ok(envelope
                .volume_attachments
                .into_iter()
                .filter_map(|attachment| {
                    let Some(device) = attachment.device else {
                        warn!(
                            server_id,
                            volume_id = %attachment.volume_id,
                            "attachment has no device path; skipping"
                        );
                        return None;
                    };
                    Some(VolumeAttachment {
                        device,
                        volume_id: attachment.volume_id,
                        server_id: attachment.server_id,
                    })
                })
                .collect())
        })
    }

    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> CloudFuture<'a, Server, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            let call = Call::new("create server", "flavor", &request.flavor_id);
            let http = self
                .request(Method::POST, Service::Compute, "/servers")
                .await?
                .json(&CreateServerEnvelope::from(request));
            let envelope: ServerEnvelope = send_json(call, http).await?;
            let server = envelope.server;
            Ok(Server {
                id: server.id,
                name: server.name.unwrap_or_else(|| request.name.clone()),
                flavor_id: request.flavor_id.clone(),
                status: server.status,
            })
        })
    }
}
