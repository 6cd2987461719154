// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge configuration.
//!
//! Supports both programmatic and file-based configuration.
//!
//! # Example
//!
//! ```toml
//! api = "https://twin.example.com"
//! application = "default"
//! root_thing = "/"
//!
//! [stream]
//! reconnect_delay_secs = 5
//!
//! [auth]
//! token_url = "https://sso.example.com/realms/twin/protocol/openid-connect/token"
//! client_id = "bridge"
//! client_secret = "secret"
//! ```

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Instance name (for identification in logs).
    #[serde(default = "default_name")]
    pub name: String,

    /// Base URL of the twin API.
    pub api: String,

    /// Twin application all things belong to.
    #[serde(default = "default_application")]
    pub application: String,

    /// Thing linked from the Objects folder.
    #[serde(default = "default_root_thing")]
    pub root_thing: String,

    /// Items resolved concurrently per batch read (1 = sequential).
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Change stream settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Credentials; no authentication when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
}

fn default_name() -> String {
    "twin-bridge".to_string()
}

fn default_api() -> String {
    "http://localhost:8080".to_string()
}

fn default_application() -> String {
    "default".to_string()
}

fn default_root_thing() -> String {
    "/".to_string()
}

fn default_read_concurrency() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_token_check_interval() -> u64 {
    5
}

fn default_refresh_window() -> u64 {
    30
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            api: default_api(),
            application: default_application(),
            root_thing: default_root_thing(),
            read_concurrency: default_read_concurrency(),
            log_level: default_log_level(),
            stream: StreamConfig::default(),
            auth: None,
        }
    }
}

impl BridgeConfig {
    /// Create a configuration for the given API endpoint.
    pub fn new(api: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the application (builder pattern).
    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    /// Set the root thing (builder pattern).
    pub fn with_root_thing(mut self, root_thing: impl Into<String>) -> Self {
        self.root_thing = root_thing.into();
        self
    }

    /// Set batch read concurrency (builder pattern).
    pub fn with_read_concurrency(mut self, concurrency: usize) -> Self {
        self.read_concurrency = concurrency;
        self
    }

    /// Set stream settings (builder pattern).
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Set credentials (builder pattern).
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Parsed API base URL.
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.api)
            .map_err(|e| ConfigError::Invalid(format!("Invalid api URL '{}': {}", self.api, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Invalid(format!(
                "Unsupported api URL scheme '{}'",
                other
            ))),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_url()?;

        if self.application.is_empty() {
            return Err(ConfigError::Invalid("Application must not be empty".into()));
        }
        if self.root_thing.is_empty() {
            return Err(ConfigError::Invalid("Root thing must not be empty".into()));
        }
        if self.read_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "read_concurrency must be at least 1".into(),
            ));
        }
        if self.stream.reconnect_delay_secs == 0 {
            return Err(ConfigError::Invalid(
                "stream.reconnect_delay_secs must be at least 1".into(),
            ));
        }
        if self.stream.token_check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "stream.token_check_interval_secs must be at least 1".into(),
            ));
        }
        if let Some(auth) = &self.auth {
            auth.validate()?;
        }

        Ok(())
    }

    /// Example configuration written by `gen-config`.
    pub fn example() -> Self {
        Self::new("https://twin.example.com").with_auth(AuthConfig::client_credentials(
            "https://sso.example.com/realms/twin/protocol/openid-connect/token",
            "twin-bridge",
            "change-me",
        ))
    }
}

/// Change stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Constant delay before reconnecting a dropped stream (seconds).
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Period of the credential expiry check (seconds).
    #[serde(default = "default_token_check_interval")]
    pub token_check_interval_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay(),
            token_check_interval_secs: default_token_check_interval(),
        }
    }
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn token_check_interval(&self) -> Duration {
        Duration::from_secs(self.token_check_interval_secs)
    }
}

/// Credential settings.
///
/// Either a fixed `token`, or the OAuth2 client-credentials triple.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Fixed bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// OAuth2 token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Refresh this long before the token expires (seconds).
    #[serde(default = "default_refresh_window")]
    pub refresh_window_secs: u64,

    /// Requested scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

impl AuthConfig {
    /// Fixed token credentials.
    pub fn static_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            refresh_window_secs: default_refresh_window(),
            ..Default::default()
        }
    }

    /// OAuth2 client-credentials grant.
    pub fn client_credentials(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url: Some(token_url.into()),
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            refresh_window_secs: default_refresh_window(),
            ..Default::default()
        }
    }

    pub fn refresh_window(&self) -> Duration {
        Duration::from_secs(self.refresh_window_secs)
    }

    /// Validate the auth section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.is_some() {
            return Ok(());
        }
        match (&self.token_url, &self.client_id, &self.client_secret) {
            (Some(url), Some(id), Some(_)) => {
                Url::parse(url).map_err(|e| {
                    ConfigError::Invalid(format!("Invalid auth.token_url '{}': {}", url, e))
                })?;
                if id.is_empty() {
                    return Err(ConfigError::Invalid("auth.client_id must not be empty".into()));
                }
                Ok(())
            }
            _ => Err(ConfigError::Invalid(
                "auth requires either token or token_url, client_id and client_secret".into(),
            )),
        }
    }
}
