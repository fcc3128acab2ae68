//! Configuration structures for Linode clients.
//!
//! This module provides the configuration a client needs to reach the API:
//! base URL, API key, and request timeout, with validation and the
//! `LINODE_KEY` environment fallback for the key.

use crate::client::{ClientConfig, API_KEY_ENV, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT};
use crate::Error;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Configuration for a Linode client instance.
#[derive(Debug, Deserialize, Validate)]
pub struct LinodeConfig {
    /// API base URL
    #[validate(url)]
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key; falls back to `LINODE_KEY` when absent
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|key| !key.is_empty())
        .map(SecretString::from))
}

impl LinodeConfig {
    /// Create a configuration pointing at `api_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or validation fails.
    pub fn new(api_url: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            api_url: api_url.into(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        };

        config.validate().map_err(|e| {
            Error::Config(format!("Invalid configuration: {e}"))
        })?;

        Ok(config)
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key: String = api_key.into();
        self.api_key = if key.is_empty() {
            None
        } else {
            Some(SecretString::from(key))
        };
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// HTTP client settings derived from this configuration.
    #[must_use]
    pub const fn http_config(&self) -> ClientConfig {
        ClientConfig::new().with_timeout(self.timeout())
    }

    /// Parse and validate the API URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn parse_api_url(&self) -> Result<Url, Error> {
        Url::parse(&self.api_url)
            .map_err(|e| Error::RequestBuild(format!("Invalid API URL `{}`: {e}", self.api_url)))
    }

    /// Resolve the API key, consulting `LINODE_KEY` if none was configured.
    ///
    /// # Errors
    ///
    /// Returns an error if no key is configured and the variable is unset or empty.
    pub fn resolve_api_key(&self) -> Result<SecretString, Error> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API key using `lookup` in place of the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if neither the configuration nor `lookup` yields a key.
    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Result<SecretString, Error>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        if let Some(key) = &self.api_key {
            return Ok(SecretString::from(key.expose_secret().to_owned()));
        }

        lookup(API_KEY_ENV)
            .filter(|key| !key.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| {
                Error::Config(format!(
                    "no API key supplied and {API_KEY_ENV} is not set"
                ))
            })
    }
}

impl Default for LinodeConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
