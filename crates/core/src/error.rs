// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for frame parsing.

use thiserror::Error;

/// All possible errors raised while decoding protocol frames.
#[derive(Debug, Error)]
pub enum Error {
    #[error("empty frame")]
    EmptyFrame,

    #[error("unknown topic: '{0}'")]
    UnknownTopic(String),

    #[error("unknown action: '{0}'")]
    UnknownAction(String),

    #[error("message has no action: '{0}'")]
    MissingAction(String),

    #[error("invalid typed data: '{0}'\n  hint: typed data starts with one of S, O, N, T, F, L, U")]
    InvalidTypedData(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for dw-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
