//! OpenStack backend: Keystone authentication plus the Cinder and Nova calls
//! the pipelines need.

mod auth;
mod block_storage;
mod compute;
mod error;
mod types;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::cloud::Cloud;
use crate::config::OpenStackConfig;
use auth::Session;
use error::Call;

pub use error::OpenStackError;

/// Per-request timeout applied by the HTTP client.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend that talks to Cinder and Nova with a Keystone v3 token.
#[derive(Clone, Debug)]
pub struct OpenStackBackend {
    client: Client,
    config: OpenStackConfig,
    session: Arc<Mutex<Option<Session>>>,
}

impl OpenStackBackend {
    /// Constructs a backend from validated credentials.
    ///
    /// No network call is made until the first request; the token and the
    /// service endpoints are resolved lazily and cached.
    ///
    /// # Errors
    ///
    /// Returns [`OpenStackError::Config`] when the configuration fails
    /// validation and [`OpenStackError::Transport`] when the HTTP client
    /// cannot be built.
    pub fn new(config: OpenStackConfig) -> Result<Self, OpenStackError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| OpenStackError::Transport {
                action: "build http client".to_owned(),
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            config,
            session: Arc::new(Mutex::new(None)),
        })
    }

    /// Starts an authenticated request against `service` at `path`.
    async fn request(
        &self,
        method: Method,
        service: Service,
        path: &str,
    ) -> Result<RequestBuilder, OpenStackError> {
        let session = self.session().await?;
        let base = match service {
            Service::BlockStorage => &session.block_storage_url,
            Service::Compute => &session.compute_url,
        };
        Ok(self
            .client
            .request(method, format!("{base}{path}"))
            .header("X-Auth-Token", &session.token))
    }
}

#[derive(Clone, Copy, Debug)]
enum Service {
    BlockStorage,
    Compute,
}

/// Sends `request` and decodes the JSON response body.
async fn send_json<T>(call: Call<'_>, request: RequestBuilder) -> Result<T, OpenStackError>
where
    T: DeserializeOwned,
{
    let body = send(call, request).await?;
    serde_json::from_slice(&body).map_err(|err| call.decode(&err))
}

/// Sends `request` and returns the raw body of a successful response.
async fn send(call: Call<'_>, request: RequestBuilder) -> Result<Vec<u8>, OpenStackError> {
    let response = request.send().await.map_err(|err| call.transport(&err))?;
    let status = response.status();
    let body = response.bytes().await.map_err(|err| call.transport(&err))?;
    if status.is_success() {
        return Ok(body.to_vec());
    }
    Err(call.failure(status, &String::from_utf8_lossy(&body)))
}

impl Cloud for OpenStackBackend {
    type Error = OpenStackError;
}
