// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection state observers.

use std::sync::{Arc, Mutex};

use dw_core::ConnectionState;

use crate::{isolate, lock};

/// Notified with the new state after every transition.
pub trait ConnectionStateListener: Send + Sync {
    fn connection_state_changed(&self, state: ConnectionState);
}

impl<F> ConnectionStateListener for F
where
    F: Fn(ConnectionState) + Send + Sync,
{
    fn connection_state_changed(&self, state: ConnectionState) {
        self(state)
    }
}

/// Ordered listener set; identity is `Arc` pointer identity.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: Mutex<Vec<Arc<dyn ConnectionStateListener>>>,
}

impl Listeners {
    /// Adds a listener at the end. Adding the same instance twice is a no-op.
    pub fn add(&self, listener: Arc<dyn ConnectionStateListener>) {
        let mut entries = lock(&self.entries);
        if !entries.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            entries.push(listener);
        }
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove(&self, listener: &Arc<dyn ConnectionStateListener>) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|l| !Arc::ptr_eq(l, listener));
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Delivers `state` to every listener in insertion order.
    ///
    /// Runs on a snapshot, so listeners may add or remove listeners. A
    /// panicking listener is logged and skipped.
    pub fn notify(&self, state: ConnectionState) {
        let snapshot = lock(&self.entries).clone();
        for listener in snapshot {
            isolate("connection state listener", || {
                listener.connection_state_changed(state)
            });
        }
    }
}
