// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    exhausted = { ClientError::AuthenticationExhausted, "too many login attempts" },
    closed = { ClientError::IsClosed, "closed" },
    no_runtime = { ClientError::NoRuntime, "tokio runtime" },
    failure = { ClientError::ConnectionFailure("refused".into()), "refused" },
)]
fn error_display_contains(err: ClientError, expected: &str) {
    assert!(err.to_string().contains(expected));
}

#[test]
fn rejection_display_names_the_reason() {
    let err = ClientError::AuthenticationRejected {
        event: Event::InvalidAuthData,
        message: "bad password".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("INVALID_AUTH_DATA"));
    assert!(msg.contains("bad password"));
}

#[test]
fn unhandled_display_carries_the_triple() {
    let err = ClientError::Unhandled {
        topic: Topic::Event,
        event: Event::AckTimeout,
        message: "no ack for news|1".into(),
    };
    assert_eq!(err.to_string(), "E ACK_TIMEOUT: no ack for news|1");
}

#[test]
fn duplicate_request_names_key() {
    let err = ClientError::DuplicateRequest {
        topic: Topic::Rpc,
        token: "add|1".into(),
    };
    assert!(err.to_string().contains("P 'add|1'"));
}

#[test]
fn error_from_protocol() {
    let err: ClientError = dw_core::Error::EmptyFrame.into();
    assert!(matches!(err, ClientError::Protocol(_)));
}
