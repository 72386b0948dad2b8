// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Every field has a default, so a TOML file only needs to name the options
//! it overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Semantically invalid value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for a client and its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL of the server endpoint.
    pub url: String,
    /// Reconnection attempts after an unexpected drop (0 = never reconnect).
    pub max_reconnect_attempts: u32,
    /// Backoff added per reconnection attempt (milliseconds).
    pub reconnect_interval_increment_ms: u64,
    /// Upper bound on the delay between reconnection attempts (milliseconds).
    pub max_reconnect_interval_ms: u64,
    /// Default wait for an acknowledgement (milliseconds).
    pub ack_timeout_ms: u64,
    /// Default wait for an RPC response (milliseconds).
    pub rpc_response_timeout_ms: u64,
    /// Rejected logins tolerated before giving up (0 = leave it to the server).
    pub max_login_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            url: "ws://localhost:6020/deepstream".to_string(),
            max_reconnect_attempts: 5,
            reconnect_interval_increment_ms: 4000,
            max_reconnect_interval_ms: 180_000,
            ack_timeout_ms: 1000,
            rpc_response_timeout_ms: 10_000,
            max_login_attempts: 0,
        }
    }
}

impl ClientConfig {
    /// Parses a TOML document on top of the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Returns a copy pointing at another URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".to_string()));
        }
        if self.max_reconnect_interval_ms < self.reconnect_interval_increment_ms {
            return Err(ConfigError::Invalid(format!(
                "max_reconnect_interval_ms ({}) is smaller than reconnect_interval_increment_ms ({})",
                self.max_reconnect_interval_ms, self.reconnect_interval_increment_ms
            )));
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn rpc_response_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_response_timeout_ms)
    }

    /// Delay before reconnection attempt `attempt` (1-based): grows linearly
    /// and is capped at `max_reconnect_interval_ms`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let delay = self
            .reconnect_interval_increment_ms
            .saturating_mul(u64::from(attempt));
        Duration::from_millis(std::cmp::min(delay, self.max_reconnect_interval_ms))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
