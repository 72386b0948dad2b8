// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! dw-core: Shared protocol vocabulary for the deepwire client
//!
//! This crate provides the frame envelope, topics, actions, event kinds and
//! connection states used by the client library and its tests.

pub mod error;
pub mod event;
pub mod protocol;
pub mod state;

pub use error::{Error, Result};
pub use event::Event;
pub use protocol::{Action, Message, Topic};
pub use state::ConnectionState;
