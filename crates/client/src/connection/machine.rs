// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection state machine.
//!
//! Owns the transport session, drives the authentication handshake and
//! broadcasts state changes. All state, the pending login, the in-flight
//! login and the outbound buffer live in one [`Core`] behind one mutex; each
//! event handler performs a single critical section and collects its side
//! effects (login callbacks, escalations) in [`Effects`], which run after the
//! lock is released.
//!
//! State changes are queued for listeners inside the same critical section
//! and delivered by whichever caller drains the queue first, so listeners see
//! transitions in the order they happened even across threads. A listener
//! that changes the state itself only queues the change; the drain already in
//! progress delivers it after the current one.
//!
//! Transport I/O happens in a spawned session task per connection attempt.
//! The task reports open/frame/close events back through `on_open`,
//! `on_frame` and `on_close`, tagged with the session epoch so events from a
//! superseded session are ignored.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use dw_core::protocol::{convert_typed, printable};
use dw_core::{Action, ConnectionState, Event, Message, Topic};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::auth_queue::{AuthQueue, LoginCallback, LoginResult, PendingLogin};
use super::listener::{ConnectionStateListener, Listeners};
use super::shared::SharedConnectionState;
use super::transport::TransportFactory;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::escalation::ErrorPolicy;
use crate::{isolate, lock};
use crate::timeout::TimeoutRegistry;

/// Receives inbound messages for one sub-protocol topic.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: Message);
}

/// Handle to the single logical connection of a client.
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    config: ClientConfig,
    shared: Arc<SharedConnectionState>,
    core: Mutex<Core>,
    /// Locked after `core`, never before it.
    notifications: Mutex<Notifications>,
    listeners: Listeners,
    handlers: RwLock<HashMap<Topic, Arc<dyn MessageHandler>>>,
    timeouts: TimeoutRegistry,
    errors: Arc<ErrorPolicy>,
    factory: TransportFactory,
    runtime: Handle,
}

struct Core {
    state: ConnectionState,
    url: String,
    queue: AuthQueue,
    /// An auth request has been sent and not yet answered.
    auth_in_flight: bool,
    in_flight_callback: Option<LoginCallback>,
    /// Credentials of the last sent login, re-sent after a reconnect.
    last_params: Option<Value>,
    failed_logins: u32,
    login_exhausted: bool,
    explicitly_closed: bool,
    reconnect_attempts: u32,
    session: Option<Session>,
    next_epoch: u64,
}

struct Session {
    epoch: u64,
    cancel: CancellationToken,
    writer: Option<mpsc::UnboundedSender<String>>,
}

/// Transitions waiting for delivery to listeners.
#[derive(Default)]
struct Notifications {
    pending: VecDeque<ConnectionState>,
    draining: bool,
}

/// Side effects collected inside a critical section.
#[derive(Default)]
struct Effects {
    logins: Vec<(LoginCallback, LoginResult)>,
    reports: Vec<(Topic, Event, String)>,
}

impl Core {
    fn is_current(&self, epoch: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.epoch == epoch)
    }

    /// Writes a frame to the live session. Returns false if there is none.
    fn write(&self, frame: String) -> bool {
        match self.session.as_ref().and_then(|s| s.writer.as_ref()) {
            Some(writer) => writer.send(frame).is_ok(),
            None => false,
        }
    }
}

impl Connection {
    pub(crate) fn new(
        config: ClientConfig,
        shared: Arc<SharedConnectionState>,
        timeouts: TimeoutRegistry,
        errors: Arc<ErrorPolicy>,
        factory: TransportFactory,
        runtime: Handle,
    ) -> Self {
        let url = config.url.clone();
        let inner = Arc::new(ConnectionInner {
            config,
            shared,
            core: Mutex::new(Core {
                state: ConnectionState::Closed,
                url,
                queue: AuthQueue::new(),
                auth_in_flight: false,
                in_flight_callback: None,
                last_params: None,
                failed_logins: 0,
                login_exhausted: false,
                explicitly_closed: false,
                reconnect_attempts: 0,
                session: None,
                next_epoch: 1,
            }),
            notifications: Mutex::new(Notifications::default()),
            listeners: Listeners::default(),
            handlers: RwLock::new(HashMap::new()),
            timeouts,
            errors,
            factory,
            runtime,
        });

        let weak = Arc::downgrade(&inner);
        inner.errors.set_fatal_hook(Arc::new(move |err: &ClientError| {
            if let Some(inner) = weak.upgrade() {
                inner.fail(err);
            }
        }));

        Connection { inner }
    }

    /// Current state, read without locking.
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.get()
    }

    /// URL of the current (or next) session.
    pub fn url(&self) -> String {
        lock(&self.inner.core).url.clone()
    }

    /// Opens the transport if the connection has never been started.
    pub fn connect(&self) -> ClientResult<()> {
        {
            let mut core = lock(&self.inner.core);
            self.inner.check_usable(&core)?;
            if core.state == ConnectionState::Closed {
                self.inner
                    .start_session(&mut core, Duration::ZERO, ConnectionState::Connecting);
            }
        }
        self.inner.deliver_transitions();
        Ok(())
    }

    /// Sends credentials now if the server is waiting for them, otherwise
    /// keeps them as the pending login.
    ///
    /// Never waits for the server's answer; that arrives through `callback`
    /// or, without one, through the escalation policy.
    pub fn authenticate(&self, params: Value, callback: Option<LoginCallback>) -> ClientResult<()> {
        let mut effects = Effects::default();
        {
            let mut core = lock(&self.inner.core);
            self.inner.check_usable(&core)?;

            let state = core.state;
            match state {
                ConnectionState::AwaitingAuthentication => {
                    self.inner.send_login(&mut core, &mut effects, params, callback);
                }
                ConnectionState::Open if !core.auth_in_flight => {
                    tracing::debug!("re-authenticating open connection");
                    self.inner.send_login(&mut core, &mut effects, params, callback);
                }
                ConnectionState::Closed => {
                    core.queue.replace_login(PendingLogin::new(params, callback));
                    self.inner
                        .start_session(&mut core, Duration::ZERO, ConnectionState::Connecting);
                }
                _ => {
                    if core.queue.replace_login(PendingLogin::new(params, callback)).is_some() {
                        tracing::debug!("replaced unsent login attempt");
                    }
                }
            }
        }
        self.inner.run(effects);
        Ok(())
    }

    /// Sends a frame if the connection is open, otherwise buffers it until
    /// authentication succeeds.
    pub fn send_or_queue(&self, message: &Message) -> ClientResult<()> {
        let frame = message.to_frame();
        let mut core = lock(&self.inner.core);
        self.inner.check_usable(&core)?;

        if core.state == ConnectionState::Open && core.queue.is_empty() && core.write(frame.clone()) {
            return Ok(());
        }
        tracing::debug!("queued {} until authenticated", message);
        core.queue.enqueue(frame);
        Ok(())
    }

    /// Moves to `CLOSED` from any state. Outstanding timeouts, the pending
    /// login and buffered frames are dropped without callbacks.
    pub fn close(&self) {
        {
            let mut core = lock(&self.inner.core);
            core.explicitly_closed = true;
            self.inner.terminate(&mut core, ConnectionState::Closed);
        }
        self.inner.deliver_transitions();
    }

    pub fn add_listener(&self, listener: Arc<dyn ConnectionStateListener>) {
        self.inner.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ConnectionStateListener>) -> bool {
        self.inner.listeners.remove(listener)
    }

    /// Routes inbound messages for `topic` to `handler`, replacing any
    /// previous handler.
    pub fn register_handler(&self, topic: Topic, handler: Arc<dyn MessageHandler>) {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic, handler);
    }

    /// Number of frames waiting for authentication.
    pub fn queued(&self) -> usize {
        lock(&self.inner.core).queue.len()
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl ConnectionInner {
    fn check_usable(&self, core: &Core) -> ClientResult<()> {
        if core.login_exhausted {
            return Err(ClientError::AuthenticationExhausted);
        }
        if core.explicitly_closed {
            return Err(ClientError::IsClosed);
        }
        if core.state == ConnectionState::Error {
            return Err(ClientError::ConnectionFailure(
                "connection is in a terminal error state".to_string(),
            ));
        }
        Ok(())
    }

    fn transition(&self, core: &mut Core, next: ConnectionState) {
        if core.state == next {
            return;
        }
        tracing::debug!("connection state {} -> {}", core.state, next);
        core.state = next;
        self.shared.set(next);
        lock(&self.notifications).pending.push_back(next);
    }

    fn start_session(self: &Arc<Self>, core: &mut Core, delay: Duration, state: ConnectionState) {
        if let Some(old) = core.session.take() {
            old.cancel.cancel();
        }

        let epoch = core.next_epoch;
        core.next_epoch += 1;
        let cancel = CancellationToken::new();
        core.session = Some(Session {
            epoch,
            cancel: cancel.clone(),
            writer: None,
        });
        self.transition(core, state);

        let url = core.url.clone();
        let factory = Arc::clone(&self.factory);
        let weak = Arc::downgrade(self);
        self.runtime
            .spawn(run_session(weak, factory, url, epoch, cancel, delay));
    }

    /// Discards everything in flight and moves to a terminal state.
    fn terminate(&self, core: &mut Core, state: ConnectionState) {
        let dropped = core.queue.discard();
        if dropped > 0 {
            tracing::debug!("discarded {} queued frames", dropped);
        }
        core.auth_in_flight = false;
        core.in_flight_callback = None;
        if let Some(session) = core.session.take() {
            session.cancel.cancel();
        }
        self.timeouts.cancel_all();
        self.transition(core, state);
    }

    /// Fatal hook target: an escalated background condition had no handler.
    fn fail(&self, err: &ClientError) {
        {
            let mut core = lock(&self.core);
            if core.explicitly_closed || core.state == ConnectionState::Error {
                return;
            }
            tracing::error!("terminating connection: {}", err);
            self.terminate(&mut core, ConnectionState::Error);
        }
        self.deliver_transitions();
    }

    fn send_login(
        &self,
        core: &mut Core,
        effects: &mut Effects,
        params: Value,
        callback: Option<LoginCallback>,
    ) {
        let message = match Message::auth_request(&params) {
            Ok(message) => message,
            Err(e) => {
                if let Some(callback) = callback {
                    effects.logins.push((callback, Err(e.into())));
                }
                return;
            }
        };

        if !core.write(message.to_frame()) {
            // Session went away between the state check and the write; the
            // next open sends it.
            core.queue.replace_login(PendingLogin::new(params, callback));
            return;
        }

        tracing::info!("sent authentication request");
        core.auth_in_flight = true;
        core.in_flight_callback = callback;
        core.last_params = Some(params);
        if core.state == ConnectionState::AwaitingAuthentication {
            self.transition(core, ConnectionState::Authenticating);
        }
    }

    fn on_open(&self, epoch: u64, writer: mpsc::UnboundedSender<String>) {
        let mut effects = Effects::default();
        {
            let mut core = lock(&self.core);
            if !core.is_current(epoch) {
                return;
            }
            if let Some(session) = core.session.as_mut() {
                session.writer = Some(writer);
            }
            core.reconnect_attempts = 0;
            self.shared.set_attempt(0);
            tracing::info!("connected to {}", core.url);
            self.transition(&mut core, ConnectionState::AwaitingAuthentication);

            if let Some(login) = core.queue.take_login() {
                self.send_login(&mut core, &mut effects, login.params, login.callback);
            } else if let Some(params) = core.last_params.clone() {
                // Reconnected: repeat the last credentials, keeping the
                // callback of an attempt that was cut off.
                let callback = core.in_flight_callback.take();
                self.send_login(&mut core, &mut effects, params, callback);
            }
        }
        self.run(effects);
    }

    fn on_frame(self: &Arc<Self>, epoch: u64, frame: &str) {
        for parsed in Message::parse_all(frame) {
            match parsed {
                Ok(message) => self.on_message(epoch, message),
                Err(e) => {
                    if !self.is_current(epoch) {
                        return;
                    }
                    self.errors.report_background(
                        Topic::Error,
                        Event::MessageParseError,
                        format!("{}: {}", e, printable(frame)),
                    );
                }
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        lock(&self.core).is_current(epoch)
    }

    fn on_message(self: &Arc<Self>, epoch: u64, message: Message) {
        tracing::debug!("received {}", message);
        match message.topic {
            Topic::Connection => self.on_connection_message(epoch, message),
            Topic::Auth => self.on_auth_message(epoch, message),
            Topic::Error => {
                if !self.is_current(epoch) {
                    return;
                }
                let event = Event::from_wire(message.data(0).unwrap_or_default());
                let text = message.data(1).unwrap_or_default().to_string();
                self.errors.report_background(Topic::Error, event, text);
            }
            topic => {
                if !self.is_current(epoch) {
                    return;
                }
                let handler = self
                    .handlers
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&topic)
                    .cloned();
                match handler {
                    Some(handler) => {
                        isolate("message handler", || handler.handle(message));
                    }
                    None => self.errors.report_background(
                        topic,
                        Event::UnsolicitedMessage,
                        message.to_string(),
                    ),
                }
            }
        }
    }

    fn on_connection_message(self: &Arc<Self>, epoch: u64, message: Message) {
        let mut rejected = false;
        {
            let mut core = lock(&self.core);
            if !core.is_current(epoch) {
                return;
            }
            match message.action {
                Action::Challenge => {
                    let url = core.url.clone();
                    core.write(Message::challenge_response(&url).to_frame());
                }
                Action::Ping => {
                    core.write(Message::pong().to_frame());
                }
                Action::Redirect => match message.data(0) {
                    Some(url) => {
                        tracing::info!("redirected to {}", url);
                        core.url = url.to_string();
                        core.auth_in_flight = false;
                        self.start_session(
                            &mut core,
                            Duration::ZERO,
                            ConnectionState::Reconnecting,
                        );
                    }
                    None => tracing::warn!("redirect without url ignored"),
                },
                Action::Rejection => {
                    tracing::warn!("connection challenge rejected by server");
                    rejected = true;
                }
                _ => tracing::debug!("ignoring {}", message),
            }
        }
        self.deliver_transitions();

        if rejected {
            Connection {
                inner: Arc::clone(self),
            }
            .close();
        }
    }

    fn on_auth_message(&self, epoch: u64, message: Message) {
        let mut effects = Effects::default();
        {
            let mut core = lock(&self.core);
            if !core.is_current(epoch) {
                return;
            }
            match message.action {
                Action::Ack => self.on_auth_accepted(&mut core, &mut effects, &message),
                Action::Error => self.on_auth_rejected(&mut core, &mut effects, &message),
                _ => tracing::debug!("ignoring {}", message),
            }
        }
        self.run(effects);
    }

    fn on_auth_accepted(&self, core: &mut Core, effects: &mut Effects, message: &Message) {
        core.auth_in_flight = false;
        core.failed_logins = 0;
        let callback = core.in_flight_callback.take();
        let data = message.data(0).and_then(|raw| match convert_typed(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("ignoring undecodable login data: {}", e);
                None
            }
        });

        tracing::info!("authenticated");
        self.transition(core, ConnectionState::Open);

        let writer = core.session.as_ref().and_then(|s| s.writer.clone());
        let flushed = core.queue.drain(|frame| {
            if let Some(writer) = &writer {
                // The session only drops its receiver when it ends, and a new
                // session re-authenticates before anything is sent.
                let _ = writer.send(frame);
            }
        });
        if flushed > 0 {
            tracing::debug!("flushed {} queued frames", flushed);
        }

        if let Some(login) = core.queue.take_login() {
            self.send_login(core, effects, login.params, login.callback);
        }
        if let Some(callback) = callback {
            effects.logins.push((callback, Ok(data)));
        }
    }

    fn on_auth_rejected(&self, core: &mut Core, effects: &mut Effects, message: &Message) {
        let event = Event::from_wire(message.data(0).unwrap_or_default());
        let text = decode_text(message.data(1));
        core.auth_in_flight = false;
        core.failed_logins += 1;
        let callback = core.in_flight_callback.take();

        let max = self.config.max_login_attempts;
        let exhausted =
            event == Event::TooManyAuthAttempts || (max > 0 && core.failed_logins >= max);

        let (report_event, err) = if exhausted {
            tracing::warn!(
                "login rejected ({}), giving up after {} attempts",
                event,
                core.failed_logins
            );
            core.login_exhausted = true;
            if let Some(pending) = core.queue.take_login() {
                if let Some(cb) = pending.callback {
                    effects
                        .logins
                        .push((cb, Err(ClientError::AuthenticationExhausted)));
                }
            }
            self.terminate(core, ConnectionState::Error);
            (Event::TooManyAuthAttempts, ClientError::AuthenticationExhausted)
        } else {
            tracing::info!("login rejected ({}): {}", event, text);
            if core.state == ConnectionState::Authenticating {
                self.transition(core, ConnectionState::AwaitingAuthentication);
            }
            if let Some(login) = core.queue.take_login() {
                self.send_login(core, effects, login.params, login.callback);
            }
            (
                event.clone(),
                ClientError::AuthenticationRejected {
                    event,
                    message: text.clone(),
                },
            )
        };

        match callback {
            Some(callback) => effects.logins.push((callback, Err(err))),
            None => effects.reports.push((Topic::Auth, report_event, text)),
        }
    }

    fn on_close(self: &Arc<Self>, epoch: u64, reason: String) {
        let mut effects = Effects::default();
        {
            let mut core = lock(&self.core);
            if !core.is_current(epoch) {
                return;
            }
            core.session = None;
            if core.explicitly_closed || core.state == ConnectionState::Error {
                return;
            }

            if core.reconnect_attempts < self.config.max_reconnect_attempts {
                core.reconnect_attempts += 1;
                self.shared.set_attempt(core.reconnect_attempts);
                let delay = self.config.reconnect_delay(core.reconnect_attempts);
                tracing::warn!(
                    "connection lost ({}), reconnecting in {:?} (attempt {}/{})",
                    reason,
                    delay,
                    core.reconnect_attempts,
                    self.config.max_reconnect_attempts
                );
                core.auth_in_flight = false;
                self.start_session(&mut core, delay, ConnectionState::Reconnecting);
            } else {
                tracing::warn!("connection lost ({}), not reconnecting", reason);
                self.terminate(&mut core, ConnectionState::Error);
                effects.reports.push((
                    Topic::Connection,
                    Event::ConnectionError,
                    format!(
                        "max reconnection attempts ({}) reached: {}",
                        self.config.max_reconnect_attempts, reason
                    ),
                ));
            }
        }
        self.run(effects);
    }

    /// Executes collected side effects outside the lock, after delivering
    /// the transitions that produced them.
    fn run(&self, effects: Effects) {
        self.deliver_transitions();
        for (callback, result) in effects.logins {
            isolate("login callback", || callback(result));
        }
        for (topic, event, message) in effects.reports {
            self.errors.report_background(topic, event, message);
        }
    }

    /// Delivers queued transitions to listeners, unless another caller is
    /// already doing so. That caller picks up everything queued meanwhile.
    fn deliver_transitions(&self) {
        {
            let mut queue = lock(&self.notifications);
            if queue.draining {
                return;
            }
            queue.draining = true;
        }
        loop {
            let next = {
                let mut queue = lock(&self.notifications);
                match queue.pending.pop_front() {
                    Some(state) => state,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            self.listeners.notify(next);
        }
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = core.session.take() {
            session.cancel.cancel();
        }
    }
}

/// Decodes a typed text part, falling back to the raw text.
fn decode_text(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    match convert_typed(raw) {
        Ok(Value::String(text)) => text,
        Ok(Value::Null) => String::new(),
        Ok(other) => other.to_string(),
        Err(_) => raw.to_string(),
    }
}

enum Step {
    Cancelled,
    Outbound(Option<String>),
    Inbound(super::transport::TransportResult<Option<String>>),
}

/// One connection attempt: open the transport, then pump frames both ways
/// until cancelled or the transport ends.
async fn run_session(
    inner: Weak<ConnectionInner>,
    factory: TransportFactory,
    url: String,
    epoch: u64,
    cancel: CancellationToken,
    delay: Duration,
) {
    if !delay.is_zero() {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let mut transport = factory();
    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        result = transport.open(&url) => result,
    };
    if let Err(e) = opened {
        if let Some(inner) = inner.upgrade() {
            inner.on_close(epoch, e.to_string());
        }
        return;
    }

    let (writer, mut outbound) = mpsc::unbounded_channel();
    match inner.upgrade() {
        Some(inner) => inner.on_open(epoch, writer),
        None => {
            let _ = transport.close().await;
            return;
        }
    }

    let reason = loop {
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            frame = outbound.recv() => Step::Outbound(frame),
            inbound = transport.recv() => Step::Inbound(inbound),
        };

        match step {
            Step::Cancelled | Step::Outbound(None) => break None,
            Step::Outbound(Some(frame)) => {
                if !transport.is_open() {
                    break Some("transport closed".to_string());
                }
                if let Err(e) = transport.send(frame).await {
                    break Some(e.to_string());
                }
            }
            Step::Inbound(Ok(Some(frame))) => match inner.upgrade() {
                Some(inner) => inner.on_frame(epoch, &frame),
                None => break None,
            },
            Step::Inbound(Ok(None)) => break Some("closed by server".to_string()),
            Step::Inbound(Err(e)) => break Some(e.to_string()),
        }
    };

    if let Err(e) = transport.close().await {
        tracing::debug!("transport close failed: {}", e);
    }
    if let Some(reason) = reason {
        if let Some(inner) = inner.upgrade() {
            inner.on_close(epoch, reason);
        }
    }
}
