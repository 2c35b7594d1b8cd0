//! Event dispatch
//!
//! Native events are resolved to a logical event name plus an optional
//! argument, then fanned out to the listeners registered under that name:
//!
//! | native event                                   | name          | arg     |
//! |------------------------------------------------|---------------|---------|
//! | push                                           | push route    | payload |
//! | connected                                      | `connected`   | -       |
//! | disconnect                                     | `disconnect`  | -       |
//! | kicked by server                               | `kicked`      | -       |
//! | connect error/failed, unexpected disconnect, protocol error | `error` | reason |
//!
//! Listeners run against a snapshot taken before the first one is invoked, so
//! listeners added or removed during a pass only affect later passes. A
//! failing listener is reported and the pass moves on.

use crate::listeners::{ListenerRegistry, Matcher};
use pomelo_native::NativeEvent;
use std::cell::RefCell;
use std::fmt;
use tracing::{error, trace};

pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_KICKED: &str = "kicked";
pub const EVENT_ERROR: &str = "error";

/// A native event resolved to its logical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved<'a> {
    pub name: &'a str,
    pub arg: Option<&'a str>,
}

/// Logical name and argument for `event`; `None` for kinds nobody listens to.
pub fn resolve(event: &NativeEvent) -> Option<Resolved<'_>> {
    let (name, arg) = match event {
        NativeEvent::Push { route, payload } => (route.as_str(), Some(payload.as_str())),
        NativeEvent::Connected => (EVENT_CONNECTED, None),
        NativeEvent::Disconnect => (EVENT_DISCONNECT, None),
        NativeEvent::KickedByServer => (EVENT_KICKED, None),
        NativeEvent::ConnectError(reason)
        | NativeEvent::ConnectFailed(reason)
        | NativeEvent::UnexpectedDisconnect(reason)
        | NativeEvent::ProtoError(reason) => (EVENT_ERROR, Some(reason.as_str())),
        NativeEvent::Other(_) => return None,
    };
    Some(Resolved { name, arg })
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

/// Deliver `event` to the listeners currently registered for it.
///
/// `invoke` runs a single listener. No borrow of `registry` is held while it
/// runs, so listeners may register or remove listeners. Once-entries are
/// removed right after their own invocation, whether or not it failed.
pub fn dispatch<C, E, F>(
    registry: &RefCell<ListenerRegistry<C>>,
    event: &NativeEvent,
    mut invoke: F,
) -> DispatchReport
where
    C: Clone + PartialEq,
    E: fmt::Display,
    F: FnMut(&C, Option<&str>) -> Result<(), E>,
{
    let mut report = DispatchReport::default();

    let Some(Resolved { name, arg }) = resolve(event) else {
        trace!(?event, "ignoring native event");
        return report;
    };

    let snapshot = registry.borrow().snapshot(name);
    let Some(snapshot) = snapshot else {
        return report;
    };

    for entry in &snapshot {
        report.invoked += 1;
        if let Err(err) = invoke(entry.callback(), arg) {
            report.failed += 1;
            error!(event = name, "listener failed: {err}");
        }
        if let Some(id) = entry.once_id() {
            registry.borrow_mut().off(name, &Matcher::Once(id));
        }
    }

    report
}
