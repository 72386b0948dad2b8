// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection states observable by applications.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of the single logical connection a client owns.
///
/// Only transport events and authentication results move a connection
/// between states. `Closed` after an explicit close and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Closed,
    Connecting,
    AwaitingAuthentication,
    Authenticating,
    Open,
    Error,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "CLOSED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::AwaitingAuthentication => "AWAITING_AUTHENTICATION",
            ConnectionState::Authenticating => "AUTHENTICATING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Error => "ERROR",
            ConnectionState::Reconnecting => "RECONNECTING",
        }
    }

    /// Compact encoding for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Closed => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::AwaitingAuthentication => 2,
            ConnectionState::Authenticating => 3,
            ConnectionState::Open => 4,
            ConnectionState::Error => 5,
            ConnectionState::Reconnecting => 6,
        }
    }

    /// Inverse of [`ConnectionState::to_u8`]. Unknown values map to `Error`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Closed,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::AwaitingAuthentication,
            3 => ConnectionState::Authenticating,
            4 => ConnectionState::Open,
            6 => ConnectionState::Reconnecting,
            _ => ConnectionState::Error,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
