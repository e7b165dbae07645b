//! Credentials loading, from a JSON secrets file or `SIGEN_*` environment variables.

use crate::api::Error;
use crate::model::Api;
use config::{Config, FileFormat};
use serde::Deserialize;

use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SECRETS_FILE: &str = "secrets.json";
const SECRETS_SECTION: &str = "sigen";
const ENV_PREFIX: &str = "SIGEN";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings as found in a single source, any of them may be missing.
#[derive(Clone, Default, Deserialize)]
pub struct RawSettings {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Request timeout in seconds
    pub timeout: Option<u64>,
}

#[derive(Clone, PartialEq)]
pub struct Settings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl RawSettings {
    /// `Some` only if base URL, username and password are all present and non-empty.
    pub fn complete(self) -> Option<Settings> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

        Some(Settings {
            base_url: non_empty(self.base_url)?,
            username: non_empty(self.username)?,
            password: non_empty(self.password)?,
            timeout: Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

impl Settings {
    pub fn into_api(self) -> Result<Api, Error> {
        Api::new(self.base_url, self.username, self.password, self.timeout)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"********")
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn config_err(error: config::ConfigError) -> Error {
    Error::Configuration(error.to_string())
}

/// Read the `sigen` section of a JSON secrets file.
pub fn load_from_secrets(path: &Path) -> Result<RawSettings, Error> {
    let mut settings = Config::default();
    settings
        .merge(config::File::from(path).format(FileFormat::Json))
        .map_err(config_err)?;

    settings.get(SECRETS_SECTION).map_err(config_err)
}

/// Read `SIGEN_BASE_URL`, `SIGEN_USERNAME`, `SIGEN_PASSWORD` and `SIGEN_TIMEOUT`.
pub fn load_from_env() -> Result<RawSettings, Error> {
    let mut settings = Config::default();
    settings
        .merge(config::Environment::with_prefix(ENV_PREFIX))
        .map_err(config_err)?;

    settings.try_into().map_err(config_err)
}

/// Secrets file first (when it exists and is complete), environment second.
pub fn get_config(secrets_file: Option<&Path>) -> Result<Settings, Error> {
    let path = secrets_file.unwrap_or_else(|| Path::new(DEFAULT_SECRETS_FILE));

    if path.exists() {
        match load_from_secrets(path) {
            Ok(raw) => {
                if let Some(settings) = raw.complete() {
                    log::debug!("using configuration from {}", path.display());
                    return Ok(settings);
                }
                log::warn!("{} is incomplete, trying environment", path.display());
            }
            Err(e) => log::warn!("ignoring {}: {}", path.display(), e),
        }
    }

    load_from_env()?.complete().ok_or_else(|| {
        Error::Configuration(format!(
            "no valid Sigen API configuration found: create {} with a `{}` section \
             or set {}_BASE_URL, {}_USERNAME and {}_PASSWORD",
            path.display(),
            SECRETS_SECTION,
            ENV_PREFIX,
            ENV_PREFIX,
            ENV_PREFIX
        ))
    })
}
