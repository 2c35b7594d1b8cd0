//! Per-client listener registry
//!
//! Maps an event name to the ordered list of listeners registered for it.
//! Duplicates are allowed and insertion order is the invocation order.
//!
//! A listener is either a plain callback or a once-entry wrapping one. Once
//! entries carry an [`OnceId`] so they can be removed by identity, and they
//! also match a plain matcher equal to the callback they wrap:
//!
//! | entry \ matcher     | `Callback(m)` | `Once(j)`  |
//! |---------------------|---------------|------------|
//! | `Plain(c)`          | `c == m`      | never      |
//! | `Once { c, id }`    | `c == m`      | `id == j`  |

use std::collections::HashMap;
use std::fmt;

/// Identity of a once-entry, unique within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OnceId(u64);

impl fmt::Display for OnceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "once#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEntry<C> {
    Plain(C),
    Once { callback: C, id: OnceId },
}

impl<C> ListenerEntry<C> {
    /// The callback invoked for this entry.
    pub fn callback(&self) -> &C {
        match self {
            ListenerEntry::Plain(callback) => callback,
            ListenerEntry::Once { callback, .. } => callback,
        }
    }

    pub fn once_id(&self) -> Option<OnceId> {
        match self {
            ListenerEntry::Plain(_) => None,
            ListenerEntry::Once { id, .. } => Some(*id),
        }
    }
}

/// What `off` looks for.
#[derive(Debug, Clone, Copy)]
pub enum Matcher<'a, C> {
    Callback(&'a C),
    Once(OnceId),
}

impl<C: PartialEq> ListenerEntry<C> {
    pub fn matches(&self, matcher: &Matcher<'_, C>) -> bool {
        match (self, matcher) {
            (ListenerEntry::Plain(callback), Matcher::Callback(m)) => callback == *m,
            (ListenerEntry::Plain(_), Matcher::Once(_)) => false,
            (ListenerEntry::Once { callback, .. }, Matcher::Callback(m)) => callback == *m,
            (ListenerEntry::Once { id, .. }, Matcher::Once(j)) => id == j,
        }
    }
}

#[derive(Debug)]
pub struct ListenerRegistry<C> {
    events: HashMap<String, Vec<ListenerEntry<C>>>,
    next_once: u64,
}

impl<C> Default for ListenerRegistry<C> {
    fn default() -> Self {
        Self {
            events: HashMap::new(),
            next_once: 1,
        }
    }
}

impl<C: Clone + PartialEq> ListenerRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to `event`'s listeners.
    pub fn on(&mut self, event: &str, callback: C) {
        self.push(event, ListenerEntry::Plain(callback));
    }

    /// Append a once-entry wrapping `callback`; returns its identity.
    pub fn once(&mut self, event: &str, callback: C) -> OnceId {
        let id = OnceId(self.next_once);
        self.next_once += 1;
        self.push(event, ListenerEntry::Once { callback, id });
        id
    }

    fn push(&mut self, event: &str, entry: ListenerEntry<C>) {
        self.events.entry(event.to_string()).or_default().push(entry);
    }

    /// Remove the most recently added listener matching `matcher`.
    ///
    /// At most one entry is removed; later entries shift down and keep their
    /// relative order. Returns whether anything was removed.
    pub fn off(&mut self, event: &str, matcher: &Matcher<'_, C>) -> bool {
        let Some(entries) = self.events.get_mut(event) else {
            return false;
        };
        match entries.iter().rposition(|entry| entry.matches(matcher)) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Independent copy of `event`'s listeners.
    pub fn listeners(&self, event: &str) -> Vec<ListenerEntry<C>> {
        self.events.get(event).cloned().unwrap_or_default()
    }

    /// Snapshot for one dispatch pass; `None` when nothing is registered, so
    /// an unobserved event costs no allocation.
    pub fn snapshot(&self, event: &str) -> Option<Vec<ListenerEntry<C>>> {
        self.events
            .get(event)
            .filter(|entries| !entries.is_empty())
            .cloned()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.events.values().all(Vec::is_empty)
    }

    /// Drop every listener.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
