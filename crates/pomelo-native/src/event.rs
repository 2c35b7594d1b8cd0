//! Events and completions handed over by a native poll step

use crate::codes::ResultCode;
use std::fmt;

/// Timeout value the native layer uses for "no timeout".
pub const WITHOUT_TIMEOUT: i64 = -1;

/// Opaque correlation id attached to an in-flight request or notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-operation timeout, in seconds. `None` waits forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Timeout(pub Option<u32>);

impl Timeout {
    pub const NONE: Timeout = Timeout(None);

    pub fn secs(secs: u32) -> Self {
        Self(Some(secs))
    }

    /// Script values below zero mean "without timeout".
    pub fn from_script(value: i64) -> Self {
        if value < 0 {
            Self::NONE
        } else {
            Self(Some(u32::try_from(value).unwrap_or(u32::MAX)))
        }
    }

    /// Value reported back to scripts; [`WITHOUT_TIMEOUT`] when unset.
    pub fn as_script(self) -> i64 {
        self.0.map(i64::from).unwrap_or(WITHOUT_TIMEOUT)
    }
}

/// Event kinds raised by the native client.
///
/// The reason-carrying variants hold a short description supplied by the
/// native layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    Push { route: String, payload: String },
    Connected,
    ConnectError(String),
    ConnectFailed(String),
    Disconnect,
    KickedByServer,
    UnexpectedDisconnect(String),
    ProtoError(String),
    /// Event kinds this bridge does not route.
    Other(i32),
}

/// Completion of a request or notify that asked for one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub token: Token,
    pub code: ResultCode,
    pub response: Option<String>,
}

impl Completion {
    pub fn new(token: Token, code: ResultCode, response: Option<String>) -> Self {
        Self {
            token,
            code,
            response,
        }
    }
}

/// One item produced by a native poll step, in native delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Event(NativeEvent),
    Completion(Completion),
}

impl From<NativeEvent> for Delivery {
    fn from(event: NativeEvent) -> Self {
        Delivery::Event(event)
    }
}

impl From<Completion> for Delivery {
    fn from(completion: Completion) -> Self {
        Delivery::Completion(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_script_timeout_means_none() {
        assert_eq!(Timeout::from_script(-1), Timeout::NONE);
        assert_eq!(Timeout::from_script(-30), Timeout::NONE);
        assert_eq!(Timeout::NONE.as_script(), WITHOUT_TIMEOUT);
    }

    #[test]
    fn script_timeout_round_trips() {
        assert_eq!(Timeout::from_script(1000), Timeout::secs(1000));
        assert_eq!(Timeout::secs(0).as_script(), 0);
    }
}
