//! Completion correlation
//!
//! Every request (and every notify that wants its completion) parks its
//! callback here under a fresh [`Token`] before the native call is made. The
//! native layer echoes the token back with the completion; [`CorrelationTable::take`]
//! removes the entry, so a callback can fire at most once and its reference is
//! released as soon as it has run.
//!
//! Entries still pending when the table is cleared (client teardown) are
//! dropped without firing.

use pomelo_native::{Completion, ResultCode, Timeout, Token};
use std::collections::HashMap;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Request,
    Notify,
}

/// What the caller sent, reconstructed for the completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub route: String,
    pub message: String,
    pub timeout: Timeout,
}

impl RequestDescriptor {
    pub fn new(route: impl Into<String>, message: impl Into<String>, timeout: Timeout) -> Self {
        Self {
            route: route.into(),
            message: message.into(),
            timeout,
        }
    }
}

#[derive(Debug)]
pub struct PendingCall<C> {
    pub kind: CallKind,
    pub descriptor: RequestDescriptor,
    pub callback: C,
}

/// A completion matched to the call it belongs to.
#[derive(Debug)]
pub struct Resolution<C> {
    pub call: PendingCall<C>,
    /// Short reason, `None` on success
    pub error: Option<&'static str>,
    /// Only requests carry a response
    pub response: Option<String>,
}

/// Short reason for a completion code; `None` means success.
pub fn error_reason(code: ResultCode) -> Option<&'static str> {
    (!code.is_ok()).then(|| code.reason())
}

#[derive(Debug)]
pub struct CorrelationTable<C> {
    next: u64,
    pending: HashMap<Token, PendingCall<C>>,
}

impl<C> Default for CorrelationTable<C> {
    fn default() -> Self {
        Self {
            next: 1,
            pending: HashMap::new(),
        }
    }
}

impl<C> CorrelationTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `callback` and return the token to hand to the native layer.
    pub fn register(&mut self, kind: CallKind, descriptor: RequestDescriptor, callback: C) -> Token {
        let token = Token(self.next);
        self.next += 1;
        trace!(%token, route = %descriptor.route, ?kind, "registered completion callback");
        self.pending.insert(
            token,
            PendingCall {
                kind,
                descriptor,
                callback,
            },
        );
        token
    }

    /// Remove the entry for `token`, if still pending.
    pub fn take(&mut self, token: Token) -> Option<PendingCall<C>> {
        self.pending.remove(&token)
    }

    /// Match a native completion to its pending call.
    ///
    /// Completions for unknown tokens (never registered, already fired, or
    /// dropped on teardown) are reported and ignored.
    pub fn resolve(&mut self, completion: Completion) -> Option<Resolution<C>> {
        let Some(call) = self.take(completion.token) else {
            warn!(
                token = %completion.token,
                code = %completion.code,
                "completion for unknown or already completed operation"
            );
            return None;
        };

        let response = match call.kind {
            CallKind::Request => completion.response,
            CallKind::Notify => None,
        };
        Some(Resolution {
            error: error_reason(completion.code),
            call,
            response,
        })
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending call without firing it; returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn echo() -> RequestDescriptor {
        RequestDescriptor::new("echo", "hello", Timeout::secs(1000))
    }

    #[test]
    fn tokens_are_unique() {
        let mut table = CorrelationTable::new();
        let a = table.register(CallKind::Request, echo(), "a");
        let b = table.register(CallKind::Request, echo(), "b");
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn resolve_fires_once() {
        let mut table = CorrelationTable::new();
        let token = table.register(CallKind::Request, echo(), "cb");

        let completion = Completion::new(token, ResultCode::Ok, Some("world".into()));
        let resolution = table.resolve(completion.clone()).unwrap();
        assert_eq!(resolution.call.callback, "cb");
        assert_eq!(resolution.error, None);
        assert_eq!(resolution.response.as_deref(), Some("world"));
        assert!(table.is_empty());

        assert!(table.resolve(completion).is_none());
    }

    #[test]
    fn error_codes_become_short_reasons() {
        let mut table = CorrelationTable::new();
        let token = table.register(CallKind::Request, echo(), ());

        let resolution = table
            .resolve(Completion::new(token, ResultCode::NotFound, None))
            .unwrap();
        assert_eq!(resolution.error, Some("NOT_FOUND"));
        assert_eq!(resolution.call.descriptor.route, "echo");
        assert_eq!(resolution.call.descriptor.message, "hello");
    }

    #[test]
    fn notify_resolution_has_no_response() {
        let mut table = CorrelationTable::new();
        let token = table.register(CallKind::Notify, echo(), ());
        let resolution = table
            .resolve(Completion::new(token, ResultCode::Ok, Some("ignored".into())))
            .unwrap();
        assert_eq!(resolution.response, None);
    }

    #[test]
    #[traced_test]
    fn unknown_token_is_reported() {
        let mut table: CorrelationTable<()> = CorrelationTable::new();
        assert!(table
            .resolve(Completion::new(Token(77), ResultCode::Ok, None))
            .is_none());
        assert!(logs_contain("unknown or already completed"));
    }

    #[test]
    fn clear_drops_pending_without_firing() {
        let mut table = CorrelationTable::new();
        let token = table.register(CallKind::Request, echo(), ());
        table.register(CallKind::Notify, echo(), ());
        assert_eq!(table.clear(), 2);
        assert!(table.take(token).is_none());
    }
}
