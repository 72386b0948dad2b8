// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client facade.
//!
//! Owns one connection together with the timeout registry, error policy and
//! sub-protocol endpoints built on it. Every handle shares the same
//! per-client state; nothing here is global.

use std::sync::Arc;

use dw_core::{ConnectionState, Topic};
use serde_json::Value;
use tokio::runtime::Handle;

use crate::config::ClientConfig;
use crate::connection::{
    websocket_factory, Connection, ConnectionStateListener, LoginResult, SharedConnectionState,
    TransportFactory,
};
use crate::error::{ClientError, ClientResult};
use crate::escalation::{ErrorPolicy, RuntimeErrorHandler};
use crate::handler::TopicEndpoint;
use crate::timeout::TimeoutRegistry;

/// Entry point of the client library.
pub struct Client {
    config: ClientConfig,
    shared: Arc<SharedConnectionState>,
    errors: Arc<ErrorPolicy>,
    timeouts: TimeoutRegistry,
    connection: Connection,
    event: TopicEndpoint,
    rpc: TopicEndpoint,
    record: TopicEndpoint,
}

impl Client {
    /// Creates a client using WebSocket transports.
    ///
    /// Must be called from within a tokio runtime. Nothing is opened until
    /// [`Client::connect`] or [`Client::login`].
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::with_transport(config, websocket_factory())
    }

    /// Creates a client whose sessions use transports from `factory`.
    pub fn with_transport(config: ClientConfig, factory: TransportFactory) -> ClientResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let shared = Arc::new(SharedConnectionState::new());
        let errors = Arc::new(ErrorPolicy::new(Arc::clone(&shared)));
        let timeouts = TimeoutRegistry::new(
            Arc::clone(&errors),
            runtime.clone(),
            config.ack_timeout(),
            config.rpc_response_timeout(),
        );
        let connection = Connection::new(
            config.clone(),
            Arc::clone(&shared),
            timeouts.clone(),
            Arc::clone(&errors),
            factory,
            runtime,
        );

        let endpoint = |topic| TopicEndpoint::new(topic, connection.clone(), timeouts.clone());
        let event = endpoint(Topic::Event);
        let rpc = endpoint(Topic::Rpc);
        let record = endpoint(Topic::Record);

        tracing::debug!("client created for {}", config.url);
        Ok(Client {
            config,
            shared,
            errors,
            timeouts,
            connection,
            event,
            rpc,
            record,
        })
    }

    /// Logs in, connecting first if needed. The outcome is escalated like
    /// any other error since there is no callback to receive it.
    pub fn login(&self, params: Value) -> ClientResult<()> {
        self.connection.authenticate(params, None)
    }

    /// Logs in and reports the outcome to `callback`.
    ///
    /// Returns as soon as the request is sent or buffered. On success the
    /// callback receives the optional client data sent by the server.
    pub fn login_with(
        &self,
        params: Value,
        callback: impl FnOnce(LoginResult) + Send + 'static,
    ) -> ClientResult<()> {
        self.connection.authenticate(params, Some(Box::new(callback)))
    }

    /// Opens the connection without logging in.
    pub fn connect(&self) -> ClientResult<()> {
        self.connection.connect()
    }

    /// Closes the connection. Outstanding work is dropped without callbacks
    /// and the client cannot be reused.
    pub fn close(&self) {
        self.connection.close();
    }

    pub fn add_connection_state_listener(&self, listener: Arc<dyn ConnectionStateListener>) {
        self.connection.add_listener(listener);
    }

    pub fn remove_connection_state_listener(
        &self,
        listener: &Arc<dyn ConnectionStateListener>,
    ) -> bool {
        self.connection.remove_listener(listener)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.get()
    }

    /// Routes every escalated error to `handler` instead of failing.
    pub fn set_runtime_error_handler(&self, handler: impl RuntimeErrorHandler + 'static) {
        self.errors.set_handler(Arc::new(handler));
    }

    pub fn clear_runtime_error_handler(&self) {
        self.errors.clear_handler();
    }

    pub fn event(&self) -> &TopicEndpoint {
        &self.event
    }

    pub fn rpc(&self) -> &TopicEndpoint {
        &self.rpc
    }

    pub fn record(&self) -> &TopicEndpoint {
        &self.record
    }

    pub fn timeouts(&self) -> &TimeoutRegistry {
        &self.timeouts
    }

    pub fn errors(&self) -> &ErrorPolicy {
        &self.errors
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Human-readable connection status, e.g. `reconnecting (attempt 2)`.
    pub fn status(&self) -> String {
        self.shared.status_string()
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
