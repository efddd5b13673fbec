//! Configuration types for Protos providers
//!
//! This module defines the configuration shared by the REST client and the
//! event loop, plus the identity lookup from the environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Name of the environment variable holding the app identity token
pub const APP_ID_ENV_VAR: &str = "APPID";

/// Header carrying the app identity on every request and on the handshake
pub const APP_ID_HEADER: &str = "Appid";

/// Path of the notification endpoint, relative to the base URL
pub const WS_PATH: &str = "ws";

/// Read the app identity from [`APP_ID_ENV_VAR`]
///
/// A missing or empty variable is a configuration error; it is reported at
/// startup rather than when the connection is attempted.
pub fn app_id_from_env() -> Result<String, crate::Error> {
    parse_app_id(std::env::var(APP_ID_ENV_VAR).ok())
}

fn parse_app_id(value: Option<String>) -> Result<String, crate::Error> {
    match value {
        Some(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        _ => Err(crate::Error::config(format!(
            "{} environment variable is not set",
            APP_ID_ENV_VAR
        ))),
    }
}

/// Main provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ProtosConfig {
    /// Base URL of the host API (e.g. `http://protos:8080/internal/`)
    pub base_url: String,

    /// App identity token
    /// ⚠️ NEVER log this value
    pub app_id: String,

    /// Interval between periodic Timer events (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Timeout for REST requests (in seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Capacity of the queue between the background reader and the loop
    #[serde(default = "default_inbound_queue_capacity")]
    pub inbound_queue_capacity: usize,

    /// Capacity of the loop state notification channel
    ///
    /// When full, state notifications are dropped (with a warning log).
    #[serde(default = "default_state_channel_capacity")]
    pub state_channel_capacity: usize,
}

impl ProtosConfig {
    /// Create a new configuration with defaults
    pub fn new(base_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: app_id.into(),
            poll_interval_secs: default_poll_interval_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            inbound_queue_capacity: default_inbound_queue_capacity(),
            state_channel_capacity: default_state_channel_capacity(),
        }
    }

    /// Create a configuration whose identity comes from the environment
    pub fn from_env(base_url: impl Into<String>) -> Result<Self, crate::Error> {
        Ok(Self::new(base_url, app_id_from_env()?))
    }

    /// Set the poll interval
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.app_id.trim().is_empty() {
            return Err(crate::Error::config("App ID cannot be empty"));
        }

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(crate::Error::config(format!(
                "Base URL must use the http or https scheme. Got: {}",
                self.base_url
            )));
        }

        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }

        if self.http_timeout_secs == 0 {
            return Err(crate::Error::config("HTTP timeout must be > 0"));
        }

        if self.inbound_queue_capacity == 0 || self.state_channel_capacity == 0 {
            return Err(crate::Error::config("Channel capacities must be > 0"));
        }

        Ok(())
    }

    /// Base URL with exactly one trailing slash
    pub fn api_base(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }

    /// URL of the notification endpoint
    ///
    /// `http://host/prefix/` becomes `ws://host/prefix/ws`, and `https`
    /// maps to `wss`.
    pub fn ws_url(&self) -> String {
        let base = self.api_base();
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base
        };
        format!("{}{}", base, WS_PATH)
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// REST timeout as a duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

// Custom Debug implementation that hides the app ID
impl fmt::Debug for ProtosConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtosConfig")
            .field("base_url", &self.base_url)
            .field("app_id", &"<REDACTED>")
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("inbound_queue_capacity", &self.inbound_queue_capacity)
            .field("state_channel_capacity", &self.state_channel_capacity)
            .finish()
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_inbound_queue_capacity() -> usize {
    64
}

fn default_state_channel_capacity() -> usize {
    16
}
