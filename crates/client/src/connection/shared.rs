// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Lock-free view of the connection state.
//!
//! The state machine writes here from inside its critical section; readers
//! (the escalation policy, `connection_state()`, status reporting) never take
//! the state machine lock.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use dw_core::ConnectionState;

/// Connection state visible to every component of a client.
pub struct SharedConnectionState {
    /// Current state, encoded with [`ConnectionState::to_u8`].
    state: AtomicU8,
    /// Reconnection attempt count (for status reporting).
    attempt: AtomicU32,
}

impl SharedConnectionState {
    /// Create a new shared state initialized to closed.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Closed.to_u8()),
            attempt: AtomicU32::new(0),
        }
    }

    /// Get the current state.
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    /// Get the current reconnection attempt count.
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    pub(crate) fn set_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Release);
    }

    /// Get a human-readable status string.
    pub fn status_string(&self) -> String {
        match self.get() {
            ConnectionState::Reconnecting => {
                let attempt = self.attempt();
                if attempt > 0 {
                    format!("reconnecting (attempt {})", attempt)
                } else {
                    "reconnecting".to_string()
                }
            }
            state => state.as_str().to_ascii_lowercase().replace('_', " "),
        }
    }
}

impl Default for SharedConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
