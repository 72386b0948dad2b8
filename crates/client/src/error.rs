// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for client operations.

use dw_core::{Event, Topic};
use thiserror::Error;

use crate::config::ConfigError;
use crate::connection::TransportError;

/// All possible errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    #[error("authentication rejected ({event}): {message}")]
    AuthenticationRejected { event: Event, message: String },

    #[error("too many login attempts\n  hint: create a new client to log in again")]
    AuthenticationExhausted,

    #[error("no acknowledgement received in time for {topic} '{token}'")]
    AckTimeout { topic: Topic, token: String },

    #[error("no response received in time for {topic} '{token}'")]
    ResponseTimeout { topic: Topic, token: String },

    #[error("duplicate request: {topic} '{token}' is already awaiting a reply")]
    DuplicateRequest { topic: Topic, token: String },

    #[error("client is closed")]
    IsClosed,

    #[error("no tokio runtime available\n  hint: create the client from within a tokio runtime")]
    NoRuntime,

    #[error("{topic} {event}: {message}")]
    Unhandled {
        topic: Topic,
        event: Event,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("protocol error: {0}")]
    Protocol(#[from] dw_core::Error),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
