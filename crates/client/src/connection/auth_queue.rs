// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Holding area for work issued before the connection is authenticated.
//!
//! Two things wait here:
//! - the single most recent unsent login attempt
//! - outbound frames, in the order they were issued
//!
//! The state machine drains the frames once the connection opens and
//! discards everything on close or terminal error. Callers are not told
//! about discarded work; they observe the state change instead.

use std::collections::VecDeque;

use serde_json::Value;

use crate::error::ClientError;

/// Outcome of a login: optional client data sent by the server on success.
pub type LoginResult = Result<Option<Value>, ClientError>;

/// Invoked once with the outcome of a login attempt.
pub type LoginCallback = Box<dyn FnOnce(LoginResult) + Send>;

/// A login attempt that has not been sent yet.
pub struct PendingLogin {
    pub params: Value,
    pub callback: Option<LoginCallback>,
}

impl PendingLogin {
    pub fn new(params: Value, callback: Option<LoginCallback>) -> Self {
        PendingLogin { params, callback }
    }
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("params", &self.params)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Buffered login and outbound frames.
#[derive(Debug, Default)]
pub struct AuthQueue {
    login: Option<PendingLogin>,
    outbound: VecDeque<String>,
}

impl AuthQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a login attempt, returning the unsent one it replaces.
    pub fn replace_login(&mut self, login: PendingLogin) -> Option<PendingLogin> {
        self.login.replace(login)
    }

    pub fn take_login(&mut self) -> Option<PendingLogin> {
        self.login.take()
    }

    /// Appends a frame to be sent once the connection opens.
    pub fn enqueue(&mut self, frame: String) {
        self.outbound.push_back(frame);
    }

    /// Hands every buffered frame to `send` in FIFO order, including frames
    /// enqueued while draining. Returns the number drained.
    pub fn drain(&mut self, mut send: impl FnMut(String)) -> usize {
        let mut drained = 0;
        while let Some(frame) = self.outbound.pop_front() {
            send(frame);
            drained += 1;
        }
        drained
    }

    /// Drops all buffered frames and the pending login without notifying
    /// anyone. Returns the number of frames dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.outbound.len();
        self.outbound.clear();
        self.login = None;
        dropped
    }

    pub fn len(&self) -> usize {
        self.outbound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty()
    }
}
