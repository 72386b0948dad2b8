// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! deepwire - connection core of a realtime messaging client.
//!
//! Manages one long-lived connection to a realtime server: connection and
//! authentication state, buffering of work issued before authentication,
//! acknowledgement timeouts and error escalation. Sub-protocols (events,
//! RPC, records) sit on top as [`TopicEndpoint`]s.
//!
//! # Main Components
//!
//! - [`Client`] - Facade owning the connection, timeouts and error policy
//! - [`Connection`] - Connection/authentication state machine
//! - [`TimeoutRegistry`] - Ack and response timeouts keyed by correlation token
//! - [`ErrorPolicy`] - Single funnel for every client error
//! - [`ClientConfig`] - Connection and timeout settings
//!
//! # Usage
//!
//! ```rust,ignore
//! use deepwire::{Client, ClientConfig};
//!
//! let client = Client::new(ClientConfig::default().with_url("ws://localhost:6020/deepstream"))?;
//! client.login_with(serde_json::json!({"username": "ada"}), |result| {
//!     println!("login: {:?}", result.is_ok());
//! })?;
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod escalation;
pub mod handler;
pub mod timeout;

pub use client::Client;
pub use config::{ClientConfig, ConfigError};
pub use connection::{
    Connection, ConnectionStateListener, LoginCallback, LoginResult, MessageHandler,
    SharedConnectionState, Transport, TransportError, TransportFactory, WebSocketTransport,
};
pub use dw_core::{Action, ConnectionState, Event, Message, Topic};
pub use error::{ClientError, ClientResult};
pub use escalation::{ErrorPolicy, RuntimeErrorHandler};
pub use handler::TopicEndpoint;
pub use timeout::{correlation_token, TimeoutKind, TimeoutRegistry};

/// Locks a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a user callback, logging a panic instead of unwinding into the
/// caller.
pub(crate) fn isolate(what: &str, callback: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::warn!("{} panicked", what);
    }
}
