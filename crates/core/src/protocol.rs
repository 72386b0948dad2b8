// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Text frame envelope shared by every sub-protocol.
//!
//! A frame holds one or more messages. Each message is a list of parts:
//! - part 0: the [`Topic`]
//! - part 1: the [`Action`]
//! - parts 2..: opaque data owned by the sub-protocol
//!
//! Parts are joined with ASCII 31 and every message is terminated with
//! ASCII 30.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, Result};

/// Terminates a message inside a frame.
pub const MESSAGE_SEPARATOR: char = '\u{1e}';

/// Separates the parts of a single message.
pub const PART_SEPARATOR: char = '\u{1f}';

/// Sub-protocol a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    Connection,
    Auth,
    Error,
    Event,
    Record,
    Rpc,
    Private,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Connection => "C",
            Topic::Auth => "A",
            Topic::Error => "X",
            Topic::Event => "E",
            Topic::Record => "R",
            Topic::Rpc => "P",
            Topic::Private => "PRIVATE/",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "C" => Ok(Topic::Connection),
            "A" => Ok(Topic::Auth),
            "X" => Ok(Topic::Error),
            "E" => Ok(Topic::Event),
            "R" => Ok(Topic::Record),
            "P" => Ok(Topic::Rpc),
            "PRIVATE/" => Ok(Topic::Private),
            _ => Err(Error::UnknownTopic(s.to_string())),
        }
    }
}

/// What a message asks the receiver to do.
///
/// Connection and auth actions are interpreted by the client core; the rest
/// are carried through to the sub-protocol handler untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Ack,
    Read,
    Create,
    Update,
    Patch,
    Delete,
    Subscribe,
    Unsubscribe,
    Has,
    Snapshot,
    Invoke,
    SubscriptionForPatternFound,
    SubscriptionForPatternRemoved,
    SubscriptionHasProvider,
    Listen,
    Unlisten,
    ListenAccept,
    ListenReject,
    ProviderUpdate,
    Query,
    CreateOrRead,
    Event,
    Error,
    Request,
    Response,
    Rejection,
    Ping,
    Pong,
    Challenge,
    ChallengeResponse,
    Redirect,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Ack => "A",
            Action::Read => "R",
            Action::Create => "C",
            Action::Update => "U",
            Action::Patch => "P",
            Action::Delete => "D",
            Action::Subscribe => "S",
            Action::Unsubscribe => "US",
            Action::Has => "H",
            Action::Snapshot => "SN",
            Action::Invoke => "I",
            Action::SubscriptionForPatternFound => "SP",
            Action::SubscriptionForPatternRemoved => "SR",
            Action::SubscriptionHasProvider => "SH",
            Action::Listen => "L",
            Action::Unlisten => "UL",
            Action::ListenAccept => "LA",
            Action::ListenReject => "LR",
            Action::ProviderUpdate => "PU",
            Action::Query => "Q",
            Action::CreateOrRead => "CR",
            Action::Event => "EVT",
            Action::Error => "E",
            Action::Request => "REQ",
            Action::Response => "RES",
            Action::Rejection => "REJ",
            Action::Ping => "PI",
            Action::Pong => "PO",
            Action::Challenge => "CH",
            Action::ChallengeResponse => "CHR",
            Action::Redirect => "RED",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let action = match s {
            "A" => Action::Ack,
            "R" => Action::Read,
            "C" => Action::Create,
            "U" => Action::Update,
            "P" => Action::Patch,
            "D" => Action::Delete,
            "S" => Action::Subscribe,
            "US" => Action::Unsubscribe,
            "H" => Action::Has,
            "SN" => Action::Snapshot,
            "I" => Action::Invoke,
            "SP" => Action::SubscriptionForPatternFound,
            "SR" => Action::SubscriptionForPatternRemoved,
            "SH" => Action::SubscriptionHasProvider,
            "L" => Action::Listen,
            "UL" => Action::Unlisten,
            "LA" => Action::ListenAccept,
            "LR" => Action::ListenReject,
            "PU" => Action::ProviderUpdate,
            "Q" => Action::Query,
            "CR" => Action::CreateOrRead,
            "EVT" => Action::Event,
            "E" => Action::Error,
            "REQ" => Action::Request,
            "RES" => Action::Response,
            "REJ" => Action::Rejection,
            "PI" => Action::Ping,
            "PO" => Action::Pong,
            "CH" => Action::Challenge,
            "CHR" => Action::ChallengeResponse,
            "RED" => Action::Redirect,
            _ => return Err(Error::UnknownAction(s.to_string())),
        };
        Ok(action)
    }
}

/// A single decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: Topic,
    pub action: Action,
    pub data: Vec<String>,
}

impl Message {
    /// Creates a message from its parts.
    pub fn new(topic: Topic, action: Action, data: Vec<String>) -> Self {
        Message {
            topic,
            action,
            data,
        }
    }

    /// Creates an auth request carrying the serialized auth parameters.
    pub fn auth_request(params: &Value) -> Result<Self> {
        let json = serde_json::to_string(params)?;
        Ok(Message::new(Topic::Auth, Action::Request, vec![json]))
    }

    /// Creates the answer to a connection challenge.
    pub fn challenge_response(url: &str) -> Self {
        Message::new(
            Topic::Connection,
            Action::ChallengeResponse,
            vec![url.to_string()],
        )
    }

    /// Creates a keepalive answer.
    pub fn pong() -> Self {
        Message::new(Topic::Connection, Action::Pong, Vec::new())
    }

    /// Returns data part `index`, if present.
    pub fn data(&self, index: usize) -> Option<&str> {
        self.data.get(index).map(String::as_str)
    }

    /// Encodes the message as a terminated frame segment.
    pub fn to_frame(&self) -> String {
        let mut out = String::with_capacity(16);
        out.push_str(self.topic.as_str());
        out.push(PART_SEPARATOR);
        out.push_str(self.action.as_str());
        for part in &self.data {
            out.push(PART_SEPARATOR);
            out.push_str(part);
        }
        out.push(MESSAGE_SEPARATOR);
        out
    }

    /// Decodes a single message (without its terminator).
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim_end_matches(MESSAGE_SEPARATOR);
        if raw.is_empty() {
            return Err(Error::EmptyFrame);
        }

        let mut parts = raw.split(PART_SEPARATOR);
        let topic: Topic = parts.next().unwrap_or_default().parse()?;
        let action: Action = parts
            .next()
            .ok_or_else(|| Error::MissingAction(printable(raw)))?
            .parse()?;
        let data = parts.map(str::to_string).collect();

        Ok(Message::new(topic, action, data))
    }

    /// Decodes every message contained in a transport frame.
    ///
    /// Each segment is decoded independently so one bad message does not
    /// hide the others.
    pub fn parse_all(frame: &str) -> Vec<Result<Self>> {
        frame
            .split(MESSAGE_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .map(Message::parse)
            .collect()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&printable(&self.to_frame()))
    }
}

/// Renders separators visibly for logs and error messages.
pub fn printable(frame: &str) -> String {
    frame
        .trim_end_matches(MESSAGE_SEPARATOR)
        .replace(PART_SEPARATOR, "|")
        .replace(MESSAGE_SEPARATOR, "+")
}

/// Decodes a typed payload. `U` (undefined) and `L` (null) both become
/// [`Value::Null`].
pub fn convert_typed(raw: &str) -> Result<Value> {
    let Some(prefix) = raw.chars().next() else {
        return Err(Error::InvalidTypedData(String::new()));
    };
    let rest = &raw[prefix.len_utf8()..];

    match prefix {
        'S' => Ok(Value::String(rest.to_string())),
        'O' => Ok(serde_json::from_str(rest)?),
        'N' => {
            let number: serde_json::Number = rest
                .parse()
                .map_err(|_| Error::InvalidTypedData(raw.to_string()))?;
            Ok(Value::Number(number))
        }
        'T' => Ok(Value::Bool(true)),
        'F' => Ok(Value::Bool(false)),
        'L' | 'U' => Ok(Value::Null),
        _ => Err(Error::InvalidTypedData(raw.to_string())),
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
