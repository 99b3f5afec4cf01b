// SPDX-License-Identifier: Apache-2.0

//! Engine configuration.
//!
//! Read from `entitlements.json` in the platform config directory, then
//! overridden from `VAULTSENTRY_*` environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::entitlement::FallbackPolicy;

pub const CONFIG_FILE_NAME: &str = "entitlements.json";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

pub const ENV_MODE: &str = "VAULTSENTRY_MODE";
pub const ENV_API_URL: &str = "VAULTSENTRY_API_URL";
pub const ENV_TIMEOUT_MS: &str = "VAULTSENTRY_TIMEOUT_MS";
pub const ENV_FALLBACK_POLICY: &str = "VAULTSENTRY_FALLBACK_POLICY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid API base URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Where subscription data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    #[default]
    Live,
    /// Local simulation of the subscription API.
    Demo,
}

impl BackendMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "live" => Some(Self::Live),
            "demo" => Some(Self::Demo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitlementConfig {
    pub mode: BackendMode,
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub fallback_policy: FallbackPolicy,
    pub log_filter: Option<String>,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::Live,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            fallback_policy: FallbackPolicy::default(),
            log_filter: None,
        }
    }
}

impl EntitlementConfig {
    /// `<config dir>/vaultsentry/entitlements.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vaultsentry").join(CONFIG_FILE_NAME))
    }

    /// Default file plus process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No entitlement config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.base_url()?;
        Ok(config)
    }

    /// Applies `VAULTSENTRY_*` values returned by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MODE) {
            self.mode = BackendMode::parse(&value).ok_or(ConfigError::InvalidValue {
                key: ENV_MODE,
                value,
            })?;
        }

        if let Some(value) = lookup(ENV_API_URL) {
            self.api_base_url = value.trim().to_string();
            self.base_url()?;
        }

        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            self.request_timeout_ms = match value.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => ms,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_TIMEOUT_MS,
                        value,
                    })
                }
            };
        }

        if let Some(value) = lookup(ENV_FALLBACK_POLICY) {
            self.fallback_policy =
                FallbackPolicy::parse(&value).ok_or(ConfigError::InvalidValue {
                    key: ENV_FALLBACK_POLICY,
                    value,
                })?;
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.api_base_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.api_base_url.clone(),
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.api_base_url.clone(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        if self.request_timeout_ms == 0 {
            warn!("request_timeout_ms is 0, using default");
            return Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS);
        }
        Duration::from_millis(self.request_timeout_ms)
    }
}
