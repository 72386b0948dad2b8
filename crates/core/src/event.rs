// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Event kinds reported by the server or raised by the client itself.
//!
//! Every diagnostic that reaches the error escalation policy carries one of
//! these. Names the client does not know are preserved verbatim in
//! [`Event::Other`] so server-side additions never break parsing.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Event {
    ConnectionError,
    ConnectionStateChanged,
    MaxReconnectionAttemptsReached,
    AckTimeout,
    ResponseTimeout,
    DeleteTimeout,
    NoRpcProvider,
    UnsolicitedMessage,
    MessageDenied,
    MessageParseError,
    MessagePermissionError,
    NotAuthenticated,
    InvalidAuthData,
    InvalidAuthMsg,
    TooManyAuthAttempts,
    IsClosed,
    DuplicateRequest,
    Other(String),
}

impl Event {
    pub fn as_str(&self) -> &str {
        match self {
            Event::ConnectionError => "CONNECTION_ERROR",
            Event::ConnectionStateChanged => "CONNECTION_STATE_CHANGED",
            Event::MaxReconnectionAttemptsReached => "MAX_RECONNECTION_ATTEMPTS_REACHED",
            Event::AckTimeout => "ACK_TIMEOUT",
            Event::ResponseTimeout => "RESPONSE_TIMEOUT",
            Event::DeleteTimeout => "DELETE_TIMEOUT",
            Event::NoRpcProvider => "NO_RPC_PROVIDER",
            Event::UnsolicitedMessage => "UNSOLICITED_MESSAGE",
            Event::MessageDenied => "MESSAGE_DENIED",
            Event::MessageParseError => "MESSAGE_PARSE_ERROR",
            Event::MessagePermissionError => "MESSAGE_PERMISSION_ERROR",
            Event::NotAuthenticated => "NOT_AUTHENTICATED",
            Event::InvalidAuthData => "INVALID_AUTH_DATA",
            Event::InvalidAuthMsg => "INVALID_AUTH_MSG",
            Event::TooManyAuthAttempts => "TOO_MANY_AUTH_ATTEMPTS",
            Event::IsClosed => "IS_CLOSED",
            Event::DuplicateRequest => "DUPLICATE_REQUEST",
            Event::Other(name) => name,
        }
    }

    /// Parses a wire name. Never fails.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "CONNECTION_ERROR" => Event::ConnectionError,
            "CONNECTION_STATE_CHANGED" => Event::ConnectionStateChanged,
            "MAX_RECONNECTION_ATTEMPTS_REACHED" => Event::MaxReconnectionAttemptsReached,
            "ACK_TIMEOUT" => Event::AckTimeout,
            "RESPONSE_TIMEOUT" => Event::ResponseTimeout,
            "DELETE_TIMEOUT" => Event::DeleteTimeout,
            "NO_RPC_PROVIDER" => Event::NoRpcProvider,
            "UNSOLICITED_MESSAGE" => Event::UnsolicitedMessage,
            "MESSAGE_DENIED" => Event::MessageDenied,
            "MESSAGE_PARSE_ERROR" => Event::MessageParseError,
            "MESSAGE_PERMISSION_ERROR" => Event::MessagePermissionError,
            "NOT_AUTHENTICATED" => Event::NotAuthenticated,
            "INVALID_AUTH_DATA" => Event::InvalidAuthData,
            "INVALID_AUTH_MSG" => Event::InvalidAuthMsg,
            "TOO_MANY_AUTH_ATTEMPTS" => Event::TooManyAuthAttempts,
            "IS_CLOSED" => Event::IsClosed,
            "DUPLICATE_REQUEST" => Event::DuplicateRequest,
            other => Event::Other(other.to_string()),
        }
    }

    /// Whether this event marks a missing acknowledgement or response.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Event::AckTimeout | Event::ResponseTimeout)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
