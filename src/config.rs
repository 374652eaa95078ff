//! Process configuration.
//!
//! Everything is read from `SONAE_*` environment variables once at startup.
//! The cron secret and the push credential pair are required: a server that
//! cannot authenticate its trigger or its provider refuses to start.

use std::env;

use secrecy::SecretString;
use thiserror::Error;

use crate::push::DEFAULT_PUSH_API_BASE;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_PATH: &str = "sqlite:sonae.db?mode=rwc";

/// Default public URL used for deep links in digests.
pub const DEFAULT_APP_URL: &str = "http://localhost:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable `{0}` is not set")]
    Missing(&'static str),
    #[error("invalid value for `{key}`: `{value}`")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub app_url: String,
    pub cron_secret: SecretString,
    pub push: PushConfig,
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub api_base: String,
    pub client_id: String,
    pub client_secret: SecretString,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &'static str| optional(key).ok_or(ConfigError::Missing(key));

        let port = match optional("SONAE_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "SONAE_PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            database_url: optional("SONAE_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            app_url: optional("SONAE_APP_URL")
                .unwrap_or_else(|| DEFAULT_APP_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            cron_secret: SecretString::from(required("SONAE_CRON_SECRET")?),
            push: PushConfig {
                api_base: optional("SONAE_PUSH_API_BASE")
                    .unwrap_or_else(|| DEFAULT_PUSH_API_BASE.to_string()),
                client_id: required("SONAE_PUSH_CLIENT_ID")?,
                client_secret: SecretString::from(required("SONAE_PUSH_CLIENT_SECRET")?),
            },
        })
    }
}
