// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use super::*;
use crate::connection::SharedConnectionState;
use dw_core::ConnectionState;
use std::sync::atomic::AtomicUsize;

type Seen = Arc<Mutex<Vec<(Topic, Event, String)>>>;

struct Fixture {
    registry: TimeoutRegistry,
    shared: Arc<SharedConnectionState>,
    seen: Seen,
}

fn fixture() -> Fixture {
    let shared = Arc::new(SharedConnectionState::new());
    shared.set(ConnectionState::Open);
    let errors = Arc::new(ErrorPolicy::new(Arc::clone(&shared)));
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    errors.set_handler(Arc::new(move |topic: Topic, event: &Event, message: &str| {
        sink.lock()
            .unwrap()
            .push((topic, event.clone(), message.to_string()));
    }));
    let registry = TimeoutRegistry::new(
        errors,
        Handle::current(),
        Duration::from_millis(1000),
        Duration::from_millis(5000),
    );
    Fixture {
        registry,
        shared,
        seen,
    }
}

fn counter() -> (Arc<AtomicUsize>, impl FnOnce(ClientError) + Send + 'static) {
    let fired = Arc::new(AtomicUsize::new(0));
    let handle = Arc::clone(&fired);
    (fired, move |_err: ClientError| {
        handle.fetch_add(1, Ordering::SeqCst);
    })
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn fires_once_after_deadline() {
    let f = fixture();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    f.registry
        .register(
            Topic::Event,
            "news|1",
            TimeoutKind::Ack,
            Duration::from_millis(100),
            move |err| sink.lock().unwrap().push(err.to_string()),
        )
        .unwrap();

    advance(99).await;
    assert!(fired.lock().unwrap().is_empty());
    assert_eq!(f.registry.len(), 1);

    advance(2).await;
    assert_eq!(fired.lock().unwrap().len(), 1);
    assert!(fired.lock().unwrap()[0].contains("news|1"));
    assert!(f.registry.is_empty());

    let seen = f.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Topic::Event);
    assert_eq!(seen[0].1, Event::AckTimeout);
    assert!(seen[0].2.contains("news|1"));
}

#[tokio::test(start_paused = true)]
async fn response_kind_reports_response_timeout() {
    let f = fixture();
    let (fired, on_timeout) = counter();
    f.registry
        .register(
            Topic::Rpc,
            "add|1",
            TimeoutKind::Response,
            Duration::from_millis(10),
            on_timeout,
        )
        .unwrap();

    advance(20).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(f.seen.lock().unwrap()[0].1, Event::ResponseTimeout);
}

#[tokio::test(start_paused = true)]
async fn clear_before_expiry_wins() {
    let f = fixture();
    let (fired, on_timeout) = counter();
    f.registry
        .register(
            Topic::Event,
            "news|1",
            TimeoutKind::Ack,
            Duration::from_millis(100),
            on_timeout,
        )
        .unwrap();

    assert!(f.registry.clear(Topic::Event, "news|1"));
    advance(200).await;

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(f.seen.lock().unwrap().is_empty());
    assert!(!f.registry.clear(Topic::Event, "news|1"));
}

#[tokio::test(start_paused = true)]
async fn clear_after_expiry_is_noop() {
    let f = fixture();
    let (fired, on_timeout) = counter();
    f.registry
        .register(
            Topic::Event,
            "news|1",
            TimeoutKind::Ack,
            Duration::from_millis(10),
            on_timeout,
        )
        .unwrap();

    advance(20).await;
    assert!(!f.registry.clear(Topic::Event, "news|1"));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_key_is_rejected_while_outstanding() {
    let f = fixture();
    f.registry
        .register_default(Topic::Record, "doc|1", TimeoutKind::Ack, |_| {})
        .unwrap();

    let err = f
        .registry
        .register_default(Topic::Record, "doc|1", TimeoutKind::Ack, |_| {})
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::DuplicateRequest { topic: Topic::Record, ref token } if token == "doc|1"
    ));

    // Same token on another topic, or waiting for something else, is a
    // different key.
    f.registry
        .register_default(Topic::Event, "doc|1", TimeoutKind::Ack, |_| {})
        .unwrap();
    f.registry
        .register_default(Topic::Record, "doc|1", TimeoutKind::Response, |_| {})
        .unwrap();

    assert!(f.registry.clear(Topic::Record, "doc|1"));
    f.registry
        .register_default(Topic::Record, "doc|1", TimeoutKind::Ack, |_| {})
        .unwrap();
    assert_eq!(f.registry.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn register_default_uses_configured_durations() {
    let f = fixture();
    let start = Instant::now();
    f.registry
        .register_default(Topic::Event, "a|1", TimeoutKind::Ack, |_| {})
        .unwrap();
    f.registry
        .register_default(Topic::Rpc, "b|1", TimeoutKind::Response, |_| {})
        .unwrap();

    assert_eq!(
        f.registry.deadline(Topic::Event, TimeoutKind::Ack, "a|1").unwrap() - start,
        Duration::from_millis(1000)
    );
    assert_eq!(
        f.registry.deadline(Topic::Rpc, TimeoutKind::Response, "b|1").unwrap() - start,
        Duration::from_millis(5000)
    );
    assert!(f
        .registry
        .deadline(Topic::Rpc, TimeoutKind::Ack, "b|1")
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn stale_timer_does_not_fire_reregistered_key() {
    let f = fixture();
    let (first, on_first) = counter();
    let (second, on_second) = counter();

    f.registry
        .register(
            Topic::Event,
            "news|1",
            TimeoutKind::Ack,
            Duration::from_millis(100),
            on_first,
        )
        .unwrap();
    assert!(f.registry.clear(Topic::Event, "news|1"));
    f.registry
        .register(
            Topic::Event,
            "news|1",
            TimeoutKind::Ack,
            Duration::from_millis(300),
            on_second,
        )
        .unwrap();

    advance(150).await;
    assert_eq!(second.load(Ordering::SeqCst), 0);

    advance(200).await;
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_all_drops_entries_without_callbacks() {
    let f = fixture();
    let (fired, _) = counter();
    for name in ["a", "b", "c"] {
        let fired = Arc::clone(&fired);
        f.registry
            .register(
                Topic::Event,
                correlation_token(name, "1"),
                TimeoutKind::Ack,
                Duration::from_millis(50),
                move |_| {
                    fired.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
    }

    assert_eq!(f.registry.cancel_all(), 3);
    advance(100).await;

    assert!(f.registry.is_empty());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(f.seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timeout_while_awaiting_authentication_reports_not_authenticated() {
    let f = fixture();
    f.shared.set(ConnectionState::AwaitingAuthentication);
    f.registry
        .register(
            Topic::Event,
            "news|1",
            TimeoutKind::Ack,
            Duration::from_millis(10),
            |_| {},
        )
        .unwrap();

    advance(20).await;
    let seen = f.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, Event::NotAuthenticated);
}

#[tokio::test(start_paused = true)]
async fn panicking_timeout_callback_still_escalates() {
    let f = fixture();
    f.registry
        .register(
            Topic::Event,
            "news|1",
            TimeoutKind::Ack,
            Duration::from_millis(10),
            |_| panic!("callback failure"),
        )
        .unwrap();
    let (fired, on_timeout) = counter();
    f.registry
        .register(
            Topic::Event,
            "news|2",
            TimeoutKind::Ack,
            Duration::from_millis(20),
            on_timeout,
        )
        .unwrap();

    advance(30).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(f.seen.lock().unwrap().len(), 2);
    assert!(f.registry.is_empty());
}

fn parts(data: &[&str]) -> Vec<String> {
    data.iter().map(|part| part.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn clear_message_correlates_acks() {
    let f = fixture();
    let token = correlation_token("news", "7");
    assert_eq!(token, "news|7");
    f.registry
        .register_default(Topic::Event, token, TimeoutKind::Ack, |_| {})
        .unwrap();

    let ack = Message::new(Topic::Event, Action::Ack, parts(&["S", "news", "7"]));
    assert!(f.registry.clear_message(&ack));
    assert!(!f.registry.clear_message(&ack));
}

#[tokio::test(start_paused = true)]
async fn clear_message_correlates_replies_of_any_action() {
    let f = fixture();
    f.registry
        .register_default(Topic::Rpc, correlation_token("add", "3"), TimeoutKind::Response, |_| {})
        .unwrap();
    f.registry
        .register_default(Topic::Record, correlation_token("doc", "4"), TimeoutKind::Ack, |_| {})
        .unwrap();

    let response = Message::new(Topic::Rpc, Action::Response, parts(&["add", "3", "N3"]));
    let read = Message::new(Topic::Record, Action::Read, parts(&["doc", "4", "{}"]));
    assert!(f.registry.clear_message(&response));
    assert!(f.registry.clear_message(&read));
    assert!(f.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn ack_leaves_the_response_wait_outstanding() {
    let f = fixture();
    let token = correlation_token("add", "5");
    f.registry
        .register_default(Topic::Rpc, token.clone(), TimeoutKind::Ack, |_| {})
        .unwrap();
    f.registry
        .register_default(Topic::Rpc, token.clone(), TimeoutKind::Response, |_| {})
        .unwrap();

    let ack = Message::new(Topic::Rpc, Action::Ack, parts(&["REQ", "add", "5"]));
    assert!(f.registry.clear_message(&ack));
    assert!(f.registry.deadline(Topic::Rpc, TimeoutKind::Ack, &token).is_none());
    assert!(f
        .registry
        .deadline(Topic::Rpc, TimeoutKind::Response, &token)
        .is_some());

    let response = Message::new(Topic::Rpc, Action::Response, parts(&["add", "5", "N3"]));
    assert!(f.registry.clear_message(&response));
    assert!(f.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn clear_message_ignores_uncorrelated_messages() {
    let f = fixture();
    f.registry
        .register_default(Topic::Event, correlation_token("news", "1"), TimeoutKind::Ack, |_| {})
        .unwrap();

    let bare = Message::new(Topic::Event, Action::Ack, Vec::new());
    let without_id = Message::new(Topic::Event, Action::Ack, parts(&["S", "news"]));
    let other_request = Message::new(Topic::Event, Action::Ack, parts(&["S", "news", "2"]));
    let other_topic = Message::new(Topic::Record, Action::Ack, parts(&["S", "news", "1"]));
    for message in [bare, without_id, other_request, other_topic] {
        assert!(!f.registry.clear_message(&message), "{}", message);
    }
    assert_eq!(f.registry.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clear_and_expiry_never_both_take_effect() {
    let f = fixture();

    for round in 0..200 {
        let token = format!("race|{}", round);
        let (fired, on_timeout) = counter();
        f.registry
            .register(
                Topic::Event,
                token.clone(),
                TimeoutKind::Ack,
                Duration::from_millis(1),
                on_timeout,
            )
            .unwrap();

        tokio::time::sleep(Duration::from_micros(900 + (round % 5) * 50)).await;
        let cleared = f.registry.clear(Topic::Event, &token);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let fired = fired.load(Ordering::SeqCst);
        assert_eq!(fired + usize::from(cleared), 1, "round {}", round);
    }
    assert!(f.registry.is_empty());
}
