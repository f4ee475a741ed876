//! Keystone v3 password authentication and service catalog lookup.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::{Call, OpenStackError};
use super::OpenStackBackend;

/// Service types accepted for block storage, in order of preference.
const BLOCK_STORAGE_SERVICES: &[&str] = &["volumev3", "block-storage", "volume"];
/// Service types accepted for compute.
const COMPUTE_SERVICES: &[&str] = &["compute"];
/// Tokens this close to expiry are renewed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Authenticated token plus the endpoints resolved from its catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Session {
    pub(super) token: String,
    pub(super) expires_at: Option<DateTime<Utc>>,
    pub(super) block_storage_url: String,
    pub(super) compute_url: String,
}

impl Session {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_none_or(|expiry| expiry > now + TimeDelta::seconds(REFRESH_MARGIN_SECS))
    }
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    auth: Auth<'a>,
}

#[derive(Serialize)]
struct Auth<'a> {
    identity: Identity<'a>,
    scope: Scope<'a>,
}

#[derive(Serialize)]
struct Identity<'a> {
    methods: [&'static str; 1],
    password: PasswordMethod<'a>,
}

#[derive(Serialize)]
struct PasswordMethod<'a> {
    user: User<'a>,
}

#[derive(Serialize)]
struct User<'a> {
    name: &'a str,
    domain: Domain<'a>,
    password: &'a str,
}

#[derive(Serialize)]
struct Domain<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct Scope<'a> {
    project: Project<'a>,
}

#[derive(Serialize)]
struct Project<'a> {
    name: &'a str,
    domain: Domain<'a>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    url: String,
    #[serde(default)]
    region_id: Option<String>,
    #[serde(default)]
    region: Option<String>,
}

/// Normalises `OS_AUTH_URL` to the Keystone v3 root.
///
/// Legacy `.../v2.0` URLs are rewritten to `.../v3`, and bare service roots
/// gain the `/v3` suffix.
pub(super) fn identity_root(auth_url: &str) -> String {
    let trimmed = auth_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/v3") {
        trimmed.to_owned()
    } else if let Some(base) = trimmed.strip_suffix("/v2.0") {
        format!("{base}/v3")
    } else {
        format!("{trimmed}/v3")
    }
}

fn find_endpoint(
    catalog: &[CatalogEntry],
    services: &[&str],
    interface: &str,
    region: Option<&str>,
) -> Result<String, OpenStackError> {
    services
        .iter()
        .filter_map(|service| {
            catalog
                .iter()
                .find(|entry| entry.service_type == *service)
        })
        .flat_map(|entry| entry.endpoints.iter())
        .find(|endpoint| {
            endpoint.interface == interface
                && region.is_none_or(|wanted| {
                    endpoint.region_id.as_deref() == Some(wanted)
                        || endpoint.region.as_deref() == Some(wanted)
                })
        })
        .map(|endpoint| endpoint.url.trim_end_matches('/').to_owned())
        .ok_or_else(|| OpenStackError::MissingEndpoint {
            service: services.join("|"),
            interface: interface.to_owned(),
        })
}

impl OpenStackBackend {
    /// Returns a valid session, authenticating when none is cached or the
    /// cached token is about to expire.
    pub(super) async fn session(&self) -> Result<Session, OpenStackError> {
        let mut cached = self.session.lock().await;
        if let Some(current) = cached.as_ref().filter(|current| current.is_fresh(Utc::now())) {
            return Ok(current.clone());
        }
        let session = self.authenticate().await?;
        *cached = Some(session.clone());
        Ok(session)
    }

    async fn authenticate(&self) -> Result<Session, OpenStackError> {
        let config = &self.config;
        let call = Call::new("authenticate", "project", &config.tenant_name);
        let url = format!("{}/auth/tokens", identity_root(&config.auth_url));
        let body = AuthRequest {
            auth: Auth {
                identity: Identity {
                    methods: ["password"],
                    password: PasswordMethod {
                        user: User {
                            name: &config.username,
                            domain: Domain {
                                name: &config.user_domain_name,
                            },
                            password: &config.password,
                        },
                    },
                },
                scope: Scope {
                    project: Project {
                        name: &config.tenant_name,
                        domain: Domain {
                            name: &config.project_domain_name,
                        },
                    },
                },
            },
        };

        debug!(url = %url, user = %config.username, "requesting keystone token");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| call.transport(&err))?;

        let status = response.status();
        let subject_token = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await.map_err(|err| call.transport(&err))?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(match call.failure(status, &text) {
                OpenStackError::NotFound { .. } => OpenStackError::Auth {
                    message: format!("identity endpoint {url} not found"),
                },
                other => other,
            });
        }
        let token = subject_token.ok_or_else(|| OpenStackError::Auth {
            message: "response carried no X-Subject-Token header".to_owned(),
        })?;
        let parsed: TokenResponse =
            serde_json::from_slice(&bytes).map_err(|err| call.decode(&err))?;

        let region = config.region_name.as_deref();
        let session = Session {
            token,
            expires_at: parsed.token.expires_at,
            block_storage_url: find_endpoint(
                &parsed.token.catalog,
                BLOCK_STORAGE_SERVICES,
                &config.interface,
                region,
            )?,
            compute_url: find_endpoint(
                &parsed.token.catalog,
                COMPUTE_SERVICES,
                &config.interface,
                region,
            )?,
        };
        info!(project = %config.tenant_name, "authenticated with keystone");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CATALOG: &str = r#"{
        "token": {
            "expires_at": "2030-01-01T00:00:00.000000Z",
            "catalog": [
                {"type": "compute", "endpoints": [
                    {"interface": "internal", "region_id": "RegionOne", "url": "http://nova.internal:8774/v2.1"},
                    {"interface": "public", "region_id": "RegionOne", "url": "https://nova.example:8774/v2.1/"}
                ]},
                {"type": "volumev3", "endpoints": [
                    {"interface": "public", "region_id": "RegionTwo", "url": "https://cinder2.example:8776/v3/p1"},
                    {"interface": "public", "region_id": "RegionOne", "url": "https://cinder.example:8776/v3/p1"}
                ]}
            ]
        }
    }"#;

    fn catalog() -> Vec<CatalogEntry> {
        let parsed: TokenResponse = serde_json::from_str(CATALOG)
            .unwrap_or_else(|err| panic!("catalog fixture should parse: {err}"));
        parsed.token.catalog
    }

    #[rstest]
    #[case("https://keystone.example:5000/v3", "https://keystone.example:5000/v3")]
    #[case("https://keystone.example:5000/v3/", "https://keystone.example:5000/v3")]
    #[case("https://keystone.example:5000/v2.0", "https://keystone.example:5000/v3")]
    #[case("https://keystone.example:5000", "https://keystone.example:5000/v3")]
    fn normalises_identity_root(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(identity_root(input), expected);
    }

    #[test]
    fn selects_endpoint_by_interface_and_region() {
        let url = find_endpoint(&catalog(), BLOCK_STORAGE_SERVICES, "public", Some("RegionOne"))
            .unwrap_or_else(|err| panic!("endpoint lookup failed: {err}"));
        assert_eq!(url, "https://cinder.example:8776/v3/p1");
    }

    #[test]
    fn strips_trailing_slash_from_endpoint() {
        let url = find_endpoint(&catalog(), COMPUTE_SERVICES, "public", None)
            .unwrap_or_else(|err| panic!("endpoint lookup failed: {err}"));
        assert_eq!(url, "https://nova.example:8774/v2.1");
    }

    #[test]
    fn missing_service_is_reported() {
        let err = find_endpoint(&catalog(), &["image"], "public", None)
            .expect_err("image service is not in the catalog");
        assert_eq!(
            err,
            OpenStackError::MissingEndpoint {
                service: "image".to_owned(),
                interface: "public".to_owned(),
            }
        );
    }

    #[test]
    fn tokens_near_expiry_are_stale() {
        let now = Utc::now();
        let session = Session {
            token: "t".to_owned(),
            expires_at: Some(now + TimeDelta::seconds(30)),
            block_storage_url: String::new(),
            compute_url: String::new(),
        };
        assert!(!session.is_fresh(now));
        let renewed = Session {
            expires_at: Some(now + TimeDelta::hours(1)),
            ..session
        };
        assert!(renewed.is_fresh(now));
    }
}
