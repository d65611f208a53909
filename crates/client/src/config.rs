//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const API_URL_ENV: &str = "HERALD_API_URL";
pub const REQUEST_TIMEOUT_ENV: &str = "HERALD_REQUEST_TIMEOUT_SECS";
pub const REFRESH_CHECK_ENV: &str = "HERALD_REFRESH_CHECK_SECS";
pub const REFRESH_LEAD_ENV: &str = "HERALD_REFRESH_LEAD_SECS";
pub const CREDENTIAL_PATH_ENV: &str = "HERALD_CREDENTIAL_PATH";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every relative href is joined onto.
    pub api_url: String,

    /// Upper bound for any single HTTP call.
    #[serde(with = "secs")]
    pub request_timeout: Duration,

    /// How often the background worker inspects the access token.
    #[serde(with = "secs")]
    pub refresh_check_interval: Duration,

    /// Renew once the token expires within this window.
    #[serde(with = "secs")]
    pub refresh_lead: Duration,

    /// Where the file credential store lives; `None` uses the OS data dir.
    pub credential_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(30),
            refresh_check_interval: Duration::from_secs(5 * 60),
            refresh_lead: Duration::from_secs(10 * 60),
            credential_path: None,
        }
    }
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `HERALD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(url) = lookup(API_URL_ENV) {
            let url = url.trim().to_string();
            if url.is_empty() {
                return Err(ConfigError::Invalid {
                    key: API_URL_ENV,
                    reason: "must not be empty".to_string(),
                });
            }
            cfg.api_url = url;
        }
        if let Some(v) = lookup(REQUEST_TIMEOUT_ENV) {
            cfg.request_timeout = parse_secs(REQUEST_TIMEOUT_ENV, &v)?;
        }
        if let Some(v) = lookup(REFRESH_CHECK_ENV) {
            cfg.refresh_check_interval = parse_secs(REFRESH_CHECK_ENV, &v)?;
        }
        if let Some(v) = lookup(REFRESH_LEAD_ENV) {
            cfg.refresh_lead = parse_secs(REFRESH_LEAD_ENV, &v)?;
        }
        if let Some(v) = lookup(CREDENTIAL_PATH_ENV) {
            cfg.credential_path = Some(PathBuf::from(v));
        }

        Ok(cfg)
    }
}

fn parse_secs(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{raw:?} is not a whole number of seconds ({e})"),
    })?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
