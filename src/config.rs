//! Configuration loading via `ortho-config`.
//!
//! Credentials follow the OpenStack `OS_*` environment convention so an
//! existing `openrc` file works unchanged. Pipeline tuning lives under the
//! `VMVAULT_*` prefix and may also come from `vmvault.toml`.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::poll::PollPolicy;

/// Default location of the backup ledger, relative to the working directory.
pub const DEFAULT_LEDGER_PATH: &str = "vmvault-ledger.json";

/// OpenStack credentials and endpoint selection.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OS",
    discovery(
        app_name = "vmvault",
        env_var = "VMVAULT_CONFIG_PATH",
        config_file_name = "vmvault.toml",
        dotfile_name = ".vmvault.toml",
        project_file_name = "vmvault.toml"
    )
)]
pub struct OpenStackConfig {
    /// Keystone user name.
    pub username: String,
    /// Keystone password.
    pub password: String,
    /// Project (tenant) the token is scoped to.
    pub tenant_name: String,
    /// Keystone endpoint, for example `https://keystone.example:5000/v3`.
    pub auth_url: String,
    /// Domain owning the user. Defaults to `Default`.
    #[ortho_config(default = "Default".to_owned())]
    pub user_domain_name: String,
    /// Domain owning the project. Defaults to `Default`.
    #[ortho_config(default = "Default".to_owned())]
    pub project_domain_name: String,
    /// Region used to pick catalog endpoints; any region when unset.
    pub region_name: Option<String>,
    /// Endpoint interface (`public`, `internal` or `admin`).
    #[ortho_config(default = "public".to_owned())]
    pub interface: String,
}

/// Polling and ledger settings for the pipelines.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VMVAULT",
    discovery(
        app_name = "vmvault",
        env_var = "VMVAULT_CONFIG_PATH",
        config_file_name = "vmvault.toml",
        dotfile_name = ".vmvault.toml",
        project_file_name = "vmvault.toml"
    )
)]
pub struct PipelineConfig {
    /// Seconds between status queries.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Seconds a single wait may take before it fails.
    #[ortho_config(default = 1800)]
    pub wait_timeout_secs: u64,
    /// Optional cap on status queries per wait.
    pub max_poll_attempts: Option<u32>,
    /// Path of the JSON backup ledger.
    #[ortho_config(default = DEFAULT_LEDGER_PATH.to_owned())]
    pub ledger_path: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to vmvault.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

impl OpenStackConfig {
    /// Loads credentials without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails, including when a
    /// required variable such as `OS_USERNAME` is absent.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("vmvault")]).map_err(ConfigError::from)
    }

    /// Performs semantic validation on required fields. Error messages name
    /// the environment variable to set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.username,
            &FieldMetadata::new("OpenStack user name", "OS_USERNAME", "username"),
        )?;
        require_field(
            &self.password,
            &FieldMetadata::new("OpenStack password", "OS_PASSWORD", "password"),
        )?;
        require_field(
            &self.tenant_name,
            &FieldMetadata::new("OpenStack project name", "OS_TENANT_NAME", "tenant_name"),
        )?;
        require_field(
            &self.auth_url,
            &FieldMetadata::new("Keystone URL", "OS_AUTH_URL", "auth_url"),
        )?;
        require_field(
            &self.user_domain_name,
            &FieldMetadata::new(
                "user domain",
                "OS_USER_DOMAIN_NAME",
                "user_domain_name",
            ),
        )?;
        require_field(
            &self.project_domain_name,
            &FieldMetadata::new(
                "project domain",
                "OS_PROJECT_DOMAIN_NAME",
                "project_domain_name",
            ),
        )?;
        require_field(
            &self.interface,
            &FieldMetadata::new("endpoint interface", "OS_INTERFACE", "interface"),
        )?;
        if !self.auth_url.starts_with("http://") && !self.auth_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "OS_AUTH_URL must be an http(s) URL, got '{}'",
                self.auth_url
            )));
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Loads pipeline settings without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("vmvault")]).map_err(ConfigError::from)
    }

    /// Rejects settings that would make every wait fail or spin.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero interval, timeout or
    /// attempt cap, and [`ConfigError::MissingField`] for a blank ledger path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "VMVAULT_POLL_INTERVAL_SECS must be greater than zero".to_owned(),
            ));
        }
        if self.wait_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "VMVAULT_WAIT_TIMEOUT_SECS must be greater than zero".to_owned(),
            ));
        }
        if self.max_poll_attempts == Some(0) {
            return Err(ConfigError::Invalid(
                "VMVAULT_MAX_POLL_ATTEMPTS must be greater than zero when set".to_owned(),
            ));
        }
        require_field(
            &self.ledger_path,
            &FieldMetadata::new("ledger path", "VMVAULT_LEDGER_PATH", "ledger_path"),
        )
    }

    /// Builds the poll policy described by these settings.
    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Some(Duration::from_secs(self.wait_timeout_secs)),
            max_attempts: self.max_poll_attempts,
        }
    }

    /// Returns the ledger location as a UTF-8 path.
    #[must_use]
    pub fn ledger_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.ledger_path.trim())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value the pipelines cannot use.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<std::sync::Arc<ortho_config::OrthoError>> for ConfigError {
    fn from(value: std::sync::Arc<ortho_config::OrthoError>) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn credentials() -> OpenStackConfig {
        OpenStackConfig {
            username: "demo".to_owned(),
            password: "secret".to_owned(),
            tenant_name: "demo-project".to_owned(),
            auth_url: "https://keystone.example:5000/v3".to_owned(),
            user_domain_name: "Default".to_owned(),
            project_domain_name: "Default".to_owned(),
            region_name: None,
            interface: "public".to_owned(),
        }
    }

    #[fixture]
    fn pipeline() -> PipelineConfig {
        PipelineConfig {
            poll_interval_secs: 5,
            wait_timeout_secs: 1800,
            max_poll_attempts: None,
            ledger_path: DEFAULT_LEDGER_PATH.to_owned(),
        }
    }

    #[rstest]
    fn complete_credentials_validate(credentials: OpenStackConfig) {
        assert_eq!(credentials.validate(), Ok(()));
    }

    #[rstest]
    fn blank_password_names_the_variable(mut credentials: OpenStackConfig) {
        credentials.password = "   ".to_owned();
        let err = credentials.validate().expect_err("blank password must fail");
        let ConfigError::MissingField(message) = err else {
            panic!("expected MissingField, got {err:?}");
        };
        assert!(message.contains("OS_PASSWORD"), "message: {message}");
    }

    #[rstest]
    fn non_http_auth_url_is_rejected(mut credentials: OpenStackConfig) {
        credentials.auth_url = "keystone.example:5000".to_owned();
        assert!(matches!(
            credentials.validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[rstest]
    fn policy_reflects_settings(mut pipeline: PipelineConfig) {
        pipeline.poll_interval_secs = 10;
        pipeline.max_poll_attempts = Some(12);
        let policy = pipeline.poll_policy();
        assert_eq!(policy.interval, Duration::from_secs(10));
        assert_eq!(policy.timeout, Some(Duration::from_secs(1800)));
        assert_eq!(policy.max_attempts, Some(12));
    }

    #[rstest]
    #[case::zero_interval(0, 1800, None)]
    #[case::zero_timeout(5, 0, None)]
    #[case::zero_attempts(5, 1800, Some(0))]
    fn degenerate_pipeline_settings_are_rejected(
        mut pipeline: PipelineConfig,
        #[case] interval: u64,
        #[case] timeout: u64,
        #[case] attempts: Option<u32>,
    ) {
        pipeline.poll_interval_secs = interval;
        pipeline.wait_timeout_secs = timeout;
        pipeline.max_poll_attempts = attempts;
        assert!(matches!(pipeline.validate(), Err(ConfigError::Invalid(_))));
    }

    #[rstest]
    fn ledger_path_is_trimmed(mut pipeline: PipelineConfig) {
        pipeline.ledger_path = " backups/ledger.json ".to_owned();
        assert_eq!(pipeline.ledger_path(), Utf8PathBuf::from("backups/ledger.json"));
    }
}
