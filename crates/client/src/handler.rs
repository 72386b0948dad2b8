// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Generic sub-protocol endpoint.
//!
//! Event, RPC and record handling all talk to the core the same way: send a
//! message (buffered until authenticated), optionally track its
//! acknowledgement, and receive inbound messages for their topic. The
//! message formats themselves belong to the sub-protocols.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use dw_core::{Action, Message, Topic};

use crate::connection::{Connection, MessageHandler};
use crate::error::{ClientError, ClientResult};
use crate::isolate;
use crate::timeout::{correlation_token, TimeoutKind, TimeoutRegistry};

/// Callback for inbound messages on an endpoint's topic.
pub type Subscriber = Arc<dyn Fn(&Message) + Send + Sync>;

/// One topic's view of the connection.
pub struct TopicEndpoint {
    topic: Topic,
    connection: Connection,
    timeouts: TimeoutRegistry,
    inbound: Arc<EndpointInbound>,
    next_request: AtomicU64,
}

struct EndpointInbound {
    timeouts: TimeoutRegistry,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl MessageHandler for EndpointInbound {
    fn handle(&self, message: Message) {
        if self.timeouts.clear_message(&message) {
            tracing::debug!("acknowledged: {}", message);
        }
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in subscribers {
            isolate("topic subscriber", || subscriber(&message));
        }
    }
}

impl TopicEndpoint {
    /// Creates the endpoint and routes the topic's inbound messages to it.
    pub fn new(topic: Topic, connection: Connection, timeouts: TimeoutRegistry) -> Self {
        let inbound = Arc::new(EndpointInbound {
            timeouts: timeouts.clone(),
            subscribers: RwLock::new(Vec::new()),
        });
        connection.register_handler(topic, Arc::clone(&inbound) as Arc<dyn MessageHandler>);
        TopicEndpoint {
            topic,
            connection,
            timeouts,
            inbound,
            next_request: AtomicU64::new(1),
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Sends a message on this topic, buffering it until authenticated.
    pub fn send(&self, action: Action, data: Vec<String>) -> ClientResult<()> {
        self.connection
            .send_or_queue(&Message::new(self.topic, action, data))
    }

    /// Sends `action` for `name` and waits for its acknowledgement or reply.
    ///
    /// The message carries `name`, a fresh correlation id, then `data`.
    /// Acks echo `<action>|<name>|<id>` and replies start with `<name>|<id>`.
    /// If the awaited message does not arrive in time, `on_timeout` runs once
    /// and the timeout is escalated. Returns the correlation id.
    pub fn send_tracked(
        &self,
        action: Action,
        name: &str,
        data: Vec<String>,
        kind: TimeoutKind,
        on_timeout: impl FnOnce(ClientError) + Send + 'static,
    ) -> ClientResult<String> {
        let id = self.next_request.fetch_add(1, Ordering::Relaxed).to_string();
        let token = correlation_token(name, &id);
        self.timeouts
            .register_default(self.topic, token.clone(), kind, on_timeout)?;

        let mut parts = Vec::with_capacity(data.len() + 2);
        parts.push(name.to_string());
        parts.push(id.clone());
        parts.extend(data);

        if let Err(e) = self.send(action, parts) {
            self.timeouts.clear(self.topic, &token);
            return Err(e);
        }
        Ok(id)
    }

    /// Registers a callback for every inbound message on this topic.
    pub fn subscribe(&self, subscriber: impl Fn(&Message) + Send + Sync + 'static) {
        self.inbound
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(subscriber));
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
