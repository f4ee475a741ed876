//! Error types for the OpenStack backend.

use reqwest::StatusCode;
use thiserror::Error;

use crate::cloud::{CloudError, InvalidRequest};
use crate::config::ConfigError;

/// Errors raised by the OpenStack backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OpenStackError {
    /// Raised when the credentials or endpoints are incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when Keystone rejects the credentials or the token expires.
    #[error("authentication failed: {message}")]
    Auth {
        /// Message returned by Keystone.
        message: String,
    },
    /// Raised when the service catalog lacks a required service.
    #[error("service catalog has no {interface} endpoint for {service}")]
    MissingEndpoint {
        /// Service type that was looked up.
        service: String,
        /// Endpoint interface that was requested.
        interface: String,
    },
    /// Raised when the provider reports a resource as absent.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Resource kind.
        resource: String,
        /// Identifier that was looked up.
        id: String,
    },
    /// Raised when a create call exceeds the project quota.
    #[error("quota exceeded while trying to {action}: {message}")]
    OverLimit {
        /// Call that hit the quota.
        action: String,
        /// Message returned by the provider.
        message: String,
    },
    /// Raised for any other non-success HTTP status.
    #[error("{action} rejected with HTTP {status}: {message}")]
    Api {
        /// Call that failed.
        action: String,
        /// HTTP status code.
        status: u16,
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when the request never produced a response.
    #[error("transport error during {action}: {message}")]
    Transport {
        /// Call that failed.
        action: String,
        /// Underlying client error.
        message: String,
    },
    /// Raised when a response body cannot be decoded.
    #[error("failed to decode response to {action}: {message}")]
    Decode {
        /// Call whose response was malformed.
        action: String,
        /// Decoder error.
        message: String,
    },
    /// Raised when a request fails local validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CloudError for OpenStackError {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<ConfigError> for OpenStackError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<InvalidRequest> for OpenStackError {
    fn from(value: InvalidRequest) -> Self {
        Self::InvalidRequest(value.to_string())
    }
}

/// Describes one HTTP call for error reporting.
#[derive(Clone, Copy, Debug)]
pub(super) struct Call<'a> {
    pub(super) action: &'static str,
    pub(super) resource: &'static str,
    pub(super) id: &'a str,
}

impl<'a> Call<'a> {
    pub(super) const fn new(action: &'static str, resource: &'static str, id: &'a str) -> Self {
        Self {
            action,
            resource,
            id,
        }
    }

    pub(super) fn transport(&self, err: &reqwest::Error) -> OpenStackError {
        OpenStackError::Transport {
            action: self.action.to_owned(),
            message: err.to_string(),
        }
    }

    pub(super) fn decode(&self, err: &serde_json::Error) -> OpenStackError {
        OpenStackError::Decode {
            action: self.action.to_owned(),
            message: err.to_string(),
        }
    }

    /// Maps a non-success response onto the error taxonomy.
    pub(super) fn failure(&self, status: StatusCode, body: &str) -> OpenStackError {
        let message = extract_message(body);
        match status {
            StatusCode::NOT_FOUND => OpenStackError::NotFound {
                resource: self.resource.to_owned(),
                id: self.id.to_owned(),
            },
            StatusCode::PAYLOAD_TOO_LARGE => OpenStackError::OverLimit {
                action: self.action.to_owned(),
                message,
            },
            StatusCode::FORBIDDEN if mentions_quota(&message) => OpenStackError::OverLimit {
                action: self.action.to_owned(),
                message,
            },
            StatusCode::UNAUTHORIZED => OpenStackError::Auth { message },
            other => OpenStackError::Api {
                action: self.action.to_owned(),
                status: other.as_u16(),
                message,
            },
        }
    }
}

fn mentions_quota(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("quota") || lowered.contains("limit exceeded")
}

/// Pulls the human message out of an OpenStack fault body.
///
/// Faults are wrapped in a single keyed object, for example
/// `{"itemNotFound": {"message": "...", "code": 404}}`.
fn extract_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        value
            .as_object()?
            .values()
            .find_map(|fault| fault.get("message")?.as_str())
            .map(str::to_owned)
    });
    message.unwrap_or_else(|| body.trim().to_owned())
}
