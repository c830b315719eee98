use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::location::DeviceDefaults;

/// Provider-level settings: management endpoint, credentials and device defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Skip TLS verification and post-apply ordering verification.
    #[serde(default)]
    pub skip_verify: bool,
    #[serde(default)]
    pub panorama_device: Option<String>,
    #[serde(default)]
    pub ngfw_device: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read provider config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse provider config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("missing credentials: set an api key, or both username and password")]
    MissingCredentials,
    #[error("missing management hostname")]
    MissingHostname,
}

pub const ENV_HOSTNAME: &str = "PANOS_HOSTNAME";
pub const ENV_USERNAME: &str = "PANOS_USERNAME";
pub const ENV_PASSWORD: &str = "PANOS_PASSWORD";
pub const ENV_API_KEY: &str = "PANOS_API_KEY";
pub const ENV_SKIP_VERIFY: &str = "PANOS_SKIP_VERIFY";
pub const ENV_PANORAMA_DEVICE: &str = "PANOS_PANORAMA_DEVICE";
pub const ENV_NGFW_DEVICE: &str = "PANOS_NGFW_DEVICE";

impl ProviderConfig {
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Optional file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::load_file(path)?,
            None => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    /// Overlay environment values; `lookup` abstracts the environment for tests.
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(ENV_HOSTNAME) {
            self.hostname = Some(v);
        }
        if let Some(v) = non_empty(ENV_USERNAME) {
            self.username = Some(v);
        }
        if let Some(v) = non_empty(ENV_PASSWORD) {
            self.password = Some(v);
        }
        if let Some(v) = non_empty(ENV_API_KEY) {
            self.api_key = Some(v);
        }
        if let Some(v) = non_empty(ENV_PANORAMA_DEVICE) {
            self.panorama_device = Some(v);
        }
        if let Some(v) = non_empty(ENV_NGFW_DEVICE) {
            self.ngfw_device = Some(v);
        }
        if let Some(v) = non_empty(ENV_SKIP_VERIFY) {
            self.skip_verify = parse_flag(ENV_SKIP_VERIFY, &v)?;
        }
        Ok(self)
    }

    /// Fails before any resource operation when the endpoint is unusable.
    pub fn check(&self) -> Result<(), ConfigError> {
        if blank(&self.hostname) {
            return Err(ConfigError::MissingHostname);
        }
        let has_key = !blank(&self.api_key);
        let has_login = !blank(&self.username) && !blank(&self.password);
        if !has_key && !has_login {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(())
    }

    pub fn device_defaults(&self) -> DeviceDefaults {
        DeviceDefaults {
            panorama_device: self.panorama_device.clone(),
            ngfw_device: self.ngfw_device.clone(),
        }
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}
