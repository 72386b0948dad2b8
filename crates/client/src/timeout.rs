// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Acknowledgement and response timeout tracking.
//!
//! Each outstanding request is keyed by `(topic, kind, correlation token)`
//! and has its own timer task. A token is the request's name plus a
//! per-request correlation id, so concurrent requests for the same name
//! never collide and every reply, whatever its action, finds its request.
//!
//! Removing the entry from the map is the claim: the timer and
//! [`TimeoutRegistry::clear`] both try to remove it under the same lock, and
//! whichever succeeds first is the only one with an effect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dw_core::{Action, Event, Message, Topic};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{ClientError, ClientResult};
use crate::escalation::ErrorPolicy;
use crate::{isolate, lock};

/// What an outstanding request is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    /// A server acknowledgement.
    Ack,
    /// A response from another client (RPC).
    Response,
}

impl TimeoutKind {
    /// Event reported when this kind of timeout fires.
    pub fn event(&self) -> Event {
        match self {
            TimeoutKind::Ack => Event::AckTimeout,
            TimeoutKind::Response => Event::ResponseTimeout,
        }
    }
}

/// Invoked with `AckTimeout` or `ResponseTimeout` when an entry expires.
pub type TimeoutCallback = Box<dyn FnOnce(ClientError) + Send>;

type Key = (Topic, TimeoutKind, String);

const KINDS: [TimeoutKind; 2] = [TimeoutKind::Ack, TimeoutKind::Response];

struct Entry {
    id: u64,
    kind: TimeoutKind,
    deadline: Instant,
    on_timeout: TimeoutCallback,
    timer: JoinHandle<()>,
}

/// Builds the token a tracked request is registered under: the name it
/// addresses and its correlation id.
pub fn correlation_token(name: &str, id: &str) -> String {
    format!("{}|{}", name, id)
}

/// Registry of outstanding requests, shared by every sub-protocol handler.
#[derive(Clone)]
pub struct TimeoutRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    entries: Mutex<HashMap<Key, Entry>>,
    next_id: AtomicU64,
    errors: Arc<ErrorPolicy>,
    runtime: Handle,
    ack_timeout: Duration,
    response_timeout: Duration,
}

impl TimeoutRegistry {
    pub fn new(
        errors: Arc<ErrorPolicy>,
        runtime: Handle,
        ack_timeout: Duration,
        response_timeout: Duration,
    ) -> Self {
        TimeoutRegistry {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                errors,
                runtime,
                ack_timeout,
                response_timeout,
            }),
        }
    }

    /// Starts tracking a request.
    ///
    /// Fails with `DuplicateRequest` while an entry of the same kind and token
    /// is outstanding on `topic`.
    pub fn register(
        &self,
        topic: Topic,
        token: impl Into<String>,
        kind: TimeoutKind,
        duration: Duration,
        on_timeout: impl FnOnce(ClientError) + Send + 'static,
    ) -> ClientResult<()> {
        let key = (topic, kind, token.into());
        let mut entries = lock(&self.inner.entries);

        if entries.contains_key(&key) {
            return Err(ClientError::DuplicateRequest {
                topic: key.0,
                token: key.2,
            });
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::downgrade(&self.inner);
        let timer_key = key.clone();
        let timer = self.inner.runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            expire(registry, timer_key, id);
        });

        tracing::debug!("tracking {} '{}' for {:?}", key.0, key.2, duration);
        entries.insert(
            key,
            Entry {
                id,
                kind,
                deadline: Instant::now() + duration,
                on_timeout: Box::new(on_timeout),
                timer,
            },
        );
        Ok(())
    }

    /// Starts tracking a request with the configured default duration for
    /// its kind.
    pub fn register_default(
        &self,
        topic: Topic,
        token: impl Into<String>,
        kind: TimeoutKind,
        on_timeout: impl FnOnce(ClientError) + Send + 'static,
    ) -> ClientResult<()> {
        let duration = match kind {
            TimeoutKind::Ack => self.inner.ack_timeout,
            TimeoutKind::Response => self.inner.response_timeout,
        };
        self.register(topic, token, kind, duration, on_timeout)
    }

    /// Stops tracking a request of any kind. Returns whether this call
    /// claimed an entry; `false` means none was registered or it has
    /// already fired.
    pub fn clear(&self, topic: Topic, token: &str) -> bool {
        self.clear_kinds(topic, token, &KINDS)
    }

    /// Clears the entries an inbound message acknowledges or answers.
    ///
    /// An ack (`<acked action>|<name>|<id>`) only settles the wait for an
    /// acknowledgement. Any other message whose data starts with
    /// `<name>|<id>` is the reply itself and settles every wait for that
    /// request.
    pub fn clear_message(&self, message: &Message) -> bool {
        if message.action == Action::Ack {
            match (message.data(1), message.data(2)) {
                (Some(name), Some(id)) => self.clear_kinds(
                    message.topic,
                    &correlation_token(name, id),
                    &[TimeoutKind::Ack],
                ),
                _ => false,
            }
        } else {
            match (message.data(0), message.data(1)) {
                (Some(name), Some(id)) => self.clear(message.topic, &correlation_token(name, id)),
                _ => false,
            }
        }
    }

    fn clear_kinds(&self, topic: Topic, token: &str, kinds: &[TimeoutKind]) -> bool {
        let removed: Vec<Entry> = {
            let mut entries = lock(&self.inner.entries);
            kinds
                .iter()
                .filter_map(|kind| entries.remove(&(topic, *kind, token.to_string())))
                .collect()
        };
        for entry in &removed {
            entry.timer.abort();
        }
        !removed.is_empty()
    }

    /// Drops every entry without invoking callbacks. Returns how many were
    /// outstanding.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = lock(&self.inner.entries)
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in &drained {
            entry.timer.abort();
        }
        if !drained.is_empty() {
            tracing::debug!("cancelled {} outstanding timeouts", drained.len());
        }
        drained.len()
    }

    /// Deadline of an outstanding entry.
    pub fn deadline(&self, topic: Topic, kind: TimeoutKind, token: &str) -> Option<Instant> {
        lock(&self.inner.entries)
            .get(&(topic, kind, token.to_string()))
            .map(|entry| entry.deadline)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Timer side of the claim.
fn expire(registry: Weak<RegistryInner>, key: Key, id: u64) {
    let Some(inner) = registry.upgrade() else {
        return;
    };

    let entry = {
        let mut entries = lock(&inner.entries);
        let claimed = entries.get(&key).is_some_and(|entry| entry.id == id);
        if claimed {
            entries.remove(&key)
        } else {
            None
        }
    };
    let Some(entry) = entry else {
        return;
    };

    let (topic, _, token) = key;
    let event = entry.kind.event();
    let message = match entry.kind {
        TimeoutKind::Ack => format!("No ACK message received in time for {}", token),
        TimeoutKind::Response => format!("No response received in time for {}", token),
    };
    tracing::debug!("{} {} fired for '{}'", topic, event, token);

    let err = match entry.kind {
        TimeoutKind::Ack => ClientError::AckTimeout { topic, token },
        TimeoutKind::Response => ClientError::ResponseTimeout { topic, token },
    };
    let on_timeout = entry.on_timeout;
    isolate("timeout callback", move || on_timeout(err));
    inner.errors.report_background(topic, event, message);
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for entry in lock(&self.entries).values() {
            entry.timer.abort();
        }
    }
}

#[cfg(test)]
#[path = "timeout_tests.rs"]
mod tests;
