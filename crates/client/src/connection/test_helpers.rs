// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for connection tests.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dw_core::protocol::{MESSAGE_SEPARATOR, PART_SEPARATOR};
use dw_core::{ConnectionState, Event, Topic};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::{Connection, SharedConnectionState, Transport, TransportError, TransportFactory, TransportFuture};
use crate::config::ClientConfig;
use crate::escalation::ErrorPolicy;
use crate::timeout::TimeoutRegistry;

/// Builds one wire message from its parts.
pub fn frame(parts: &[&str]) -> String {
    let separator = PART_SEPARATOR.to_string();
    let mut out = parts.join(separator.as_str());
    out.push(MESSAGE_SEPARATOR);
    out
}

/// Lets spawned session tasks run until they are all idle.
///
/// Under a paused clock the runtime only advances time once every task is
/// blocked, so a short sleep returns after the sessions have settled.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[derive(Default)]
struct NetworkState {
    urls: Vec<String>,
    sent: Vec<String>,
    opens: usize,
    closes: usize,
    fail_opens: usize,
    severed: bool,
    inbound: Option<mpsc::UnboundedSender<Option<String>>>,
}

/// Scripted server side shared by every [`MockTransport`] a factory creates.
#[derive(Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> TransportFactory {
        let network = self.clone();
        Arc::new(move || {
            Box::new(MockTransport {
                network: network.clone(),
                inbound: None,
            }) as Box<dyn Transport>
        })
    }

    /// Delivers a raw frame to the live transport.
    pub fn push(&self, raw: impl Into<String>) {
        let state = self.state.lock().unwrap();
        if let Some(tx) = &state.inbound {
            let _ = tx.send(Some(raw.into()));
        }
    }

    /// Delivers one message built from parts.
    pub fn server(&self, parts: &[&str]) {
        self.push(frame(parts));
    }

    /// Closes the live transport from the server side.
    pub fn drop_connection(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(tx) = state.inbound.take() {
            let _ = tx.send(None);
        }
    }

    /// Breaks the live socket silently: nothing arrives and it reports
    /// itself closed, but the client only notices when it next writes.
    pub fn sever(&self) {
        self.state.lock().unwrap().severed = true;
    }

    /// Makes the next `n` opens fail.
    pub fn fail_next_opens(&self, n: usize) {
        self.state.lock().unwrap().fail_opens = n;
    }

    /// Every frame the client wrote, in order.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.state.lock().unwrap().sent.clear();
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    /// URLs of every open attempt, including failed ones.
    pub fn urls(&self) -> Vec<String> {
        self.state.lock().unwrap().urls.clone()
    }
}

/// Mock transport for testing without real sockets.
pub struct MockTransport {
    network: MockNetwork,
    inbound: Option<mpsc::UnboundedReceiver<Option<String>>>,
}

impl Transport for MockTransport {
    fn open(&mut self, url: &str) -> TransportFuture<'_, ()> {
        let url = url.to_string();
        Box::pin(async move {
            let rx = {
                let mut state = self.network.state.lock().unwrap();
                state.urls.push(url);
                if state.fail_opens > 0 {
                    state.fail_opens -= 1;
                    return Err(TransportError::ConnectionFailed("mock refused".into()));
                }
                let (tx, rx) = mpsc::unbounded_channel();
                state.inbound = Some(tx);
                state.severed = false;
                state.opens += 1;
                rx
            };
            self.inbound = Some(rx);
            Ok(())
        })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.inbound.take().is_some() {
                self.network.state.lock().unwrap().closes += 1;
            }
            Ok(())
        })
    }

    fn send(&mut self, frame: String) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.inbound.is_none() {
                return Err(TransportError::ConnectionClosed);
            }
            self.network.state.lock().unwrap().sent.push(frame);
            Ok(())
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<String>> {
        Box::pin(async move {
            let rx = self.inbound.as_mut().ok_or(TransportError::ConnectionClosed)?;
            match rx.recv().await {
                Some(Some(frame)) => Ok(Some(frame)),
                Some(None) | None => Ok(None),
            }
        })
    }

    fn is_open(&self) -> bool {
        self.inbound.is_some() && !self.network.state.lock().unwrap().severed
    }
}

pub type Recorded<T> = Arc<Mutex<Vec<T>>>;

/// A connection wired to a [`MockNetwork`], recording state changes and
/// escalations.
pub struct Harness {
    pub connection: Connection,
    pub network: MockNetwork,
    pub shared: Arc<SharedConnectionState>,
    pub timeouts: TimeoutRegistry,
    pub errors: Arc<ErrorPolicy>,
    pub states: Recorded<ConnectionState>,
    pub reports: Recorded<(Topic, Event, String)>,
}

/// Harness with a runtime error handler that records every escalation.
pub fn harness(config: ClientConfig) -> Harness {
    let h = harness_without_handler(config);
    let sink = Arc::clone(&h.reports);
    h.errors
        .set_handler(Arc::new(move |topic: Topic, event: &Event, message: &str| {
            sink.lock()
                .unwrap()
                .push((topic, event.clone(), message.to_string()));
        }));
    h
}

/// Harness where escalations are unhandled and therefore fatal.
pub fn harness_without_handler(config: ClientConfig) -> Harness {
    let network = MockNetwork::new();
    let shared = Arc::new(SharedConnectionState::new());
    let errors = Arc::new(ErrorPolicy::new(Arc::clone(&shared)));
    let timeouts = TimeoutRegistry::new(
        Arc::clone(&errors),
        Handle::current(),
        config.ack_timeout(),
        config.rpc_response_timeout(),
    );
    let connection = Connection::new(
        config,
        Arc::clone(&shared),
        timeouts.clone(),
        Arc::clone(&errors),
        network.factory(),
        Handle::current(),
    );

    let states: Recorded<ConnectionState> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    connection.add_listener(Arc::new(move |state: ConnectionState| {
        sink.lock().unwrap().push(state);
    }));

    Harness {
        connection,
        network,
        shared,
        timeouts,
        errors,
        states,
        reports: Arc::new(Mutex::new(Vec::new())),
    }
}

impl Harness {
    pub fn states(&self) -> Vec<ConnectionState> {
        self.states.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<(Topic, Event, String)> {
        self.reports.lock().unwrap().clone()
    }

    /// Connects and completes the challenge so the server awaits credentials.
    pub async fn awaiting_auth(&self) {
        self.connection.connect().unwrap();
        settle().await;
        assert_eq!(self.connection.state(), ConnectionState::AwaitingAuthentication);
    }

    /// Logs in and accepts, leaving the connection open.
    pub async fn open(&self) {
        self.awaiting_auth().await;
        self.connection
            .authenticate(serde_json::json!({"user": "ada"}), None)
            .unwrap();
        settle().await;
        self.network.server(&["A", "A"]);
        settle().await;
        assert_eq!(self.connection.state(), ConnectionState::Open);
    }
}

/// Test configuration: fast, predictable reconnects.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        url: "ws://mock/deepstream".to_string(),
        max_reconnect_attempts: 2,
        reconnect_interval_increment_ms: 100,
        max_reconnect_interval_ms: 1000,
        ack_timeout_ms: 500,
        rpc_response_timeout_ms: 2000,
        max_login_attempts: 0,
    }
}
