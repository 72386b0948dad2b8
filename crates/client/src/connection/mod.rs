// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection to the realtime server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Connection  │────►│  Session    │────►│  Transport  │────► server
//! │ (machine)   │◄────│  (task)     │◄────│   (trait)   │◄────
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │
//!        ├──► AuthQueue   (login + frames issued before OPEN)
//!        ├──► Listeners   (state change notifications)
//!        └──► handlers    (per-topic inbound dispatch)
//! ```
//!
//! # Features
//!
//! - Authentication handshake with last-writer-wins pending login
//! - FIFO buffering of outbound frames until authenticated
//! - Reconnect with linear backoff and redirect support
//! - Lock-free state reads through [`SharedConnectionState`]
//! - Injectable transport trait for testing

mod auth_queue;
mod listener;
mod machine;
mod shared;
mod transport;

pub use auth_queue::{AuthQueue, LoginCallback, LoginResult, PendingLogin};
pub use listener::ConnectionStateListener;
pub use machine::{Connection, MessageHandler};
pub use shared::SharedConnectionState;
pub use transport::{
    websocket_factory, Transport, TransportError, TransportFactory, TransportFuture,
    TransportResult, WebSocketTransport,
};

#[cfg(test)]
pub(crate) mod test_helpers;
