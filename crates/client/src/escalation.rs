// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error escalation policy.
//!
//! Every error or diagnostic raised anywhere in the client is reported here
//! as a `(topic, event, message)` triple. The policy then decides:
//!
//! 1. timeouts observed while the connection awaits authentication are
//!    rewritten once into a `NOT_AUTHENTICATED` diagnostic
//! 2. if a runtime error handler is registered, it receives the triple and
//!    its decision is final
//! 3. otherwise the condition becomes a terminating failure: returned to the
//!    caller, or, for background conditions, logged and handed to the fatal
//!    hook which moves the connection to `ERROR`

use std::sync::{Arc, PoisonError, RwLock};

use dw_core::{ConnectionState, Event, Topic};

use crate::connection::SharedConnectionState;
use crate::error::{ClientError, ClientResult};
use crate::isolate;

/// Diagnostic substituted for timeouts seen before `login()` completed.
pub const NOT_AUTHENTICATED_MESSAGE: &str =
    "Your message timed out because you're not authenticated. Have you called login()?";

/// Receives every escalated condition once registered on a client.
pub trait RuntimeErrorHandler: Send + Sync {
    fn on_exception(&self, topic: Topic, event: &Event, message: &str);
}

impl<F> RuntimeErrorHandler for F
where
    F: Fn(Topic, &Event, &str) + Send + Sync,
{
    fn on_exception(&self, topic: Topic, event: &Event, message: &str) {
        self(topic, event, message)
    }
}

type FatalHook = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// The single funnel for client errors.
pub struct ErrorPolicy {
    state: Arc<SharedConnectionState>,
    handler: RwLock<Option<Arc<dyn RuntimeErrorHandler>>>,
    fatal: RwLock<Option<FatalHook>>,
}

impl ErrorPolicy {
    pub fn new(state: Arc<SharedConnectionState>) -> Self {
        ErrorPolicy {
            state,
            handler: RwLock::new(None),
            fatal: RwLock::new(None),
        }
    }

    /// Registers the runtime error handler, replacing any previous one.
    pub fn set_handler(&self, handler: Arc<dyn RuntimeErrorHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Removes the runtime error handler.
    pub fn clear_handler(&self) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_handler(&self) -> bool {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn set_fatal_hook(&self, hook: FatalHook) {
        *self.fatal.write().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    /// Escalates a condition on behalf of a caller.
    ///
    /// Returns `Err(ClientError::Unhandled)` when no handler is registered.
    pub fn report(&self, topic: Topic, event: Event, message: impl Into<String>) -> ClientResult<()> {
        self.escalate(topic, event, message.into(), false)
    }

    /// Escalates a condition that has no caller to return to.
    pub fn report_background(&self, topic: Topic, event: Event, message: impl Into<String>) {
        if let Err(err) = self.report(topic, event, message) {
            tracing::error!("unhandled client error: {}", err);
            let hook = self
                .fatal
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(hook) = hook {
                hook(&err);
            }
        }
    }

    fn escalate(&self, topic: Topic, event: Event, message: String, rewritten: bool) -> ClientResult<()> {
        if !rewritten
            && event.is_timeout()
            && self.state.get() == ConnectionState::AwaitingAuthentication
        {
            tracing::debug!("{} {} while awaiting authentication: {}", topic, event, message);
            return self.escalate(
                Topic::Error,
                Event::NotAuthenticated,
                NOT_AUTHENTICATED_MESSAGE.to_string(),
                true,
            );
        }

        // Clone out of the lock so a handler may replace itself.
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match handler {
            Some(handler) => {
                // A panicking handler still counts as having taken the error.
                isolate("runtime error handler", || {
                    handler.on_exception(topic, &event, &message)
                });
                Ok(())
            }
            None => Err(ClientError::Unhandled {
                topic,
                event,
                message,
            }),
        }
    }
}

#[cfg(test)]
#[path = "escalation_tests.rs"]
mod tests;
