//! Poll registry
//!
//! The set of live clients one `pomelo.poll()` call drives. It holds weak
//! references only: clients are owned by their script handles, and the
//! lifecycle code adds and removes them. Iteration works on a snapshot so a
//! client closed by another client's poll step cannot disturb the walk.
//!
//! Everything here runs on the single thread that owns the Lua state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Identity of a client within a poll registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct PollRegistry<T> {
    next_id: Cell<u64>,
    clients: RefCell<Vec<(ClientId, Weak<T>)>>,
}

impl<T> Default for PollRegistry<T> {
    fn default() -> Self {
        Self {
            next_id: Cell::new(1),
            clients: RefCell::new(Vec::new()),
        }
    }
}

impl<T> fmt::Debug for PollRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollRegistry")
            .field("clients", &self.len())
            .finish()
    }
}

impl<T> PollRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out an id for a client about to be added.
    pub fn allocate_id(&self) -> ClientId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        ClientId(id)
    }

    pub fn add(&self, id: ClientId, client: &Rc<T>) {
        self.clients.borrow_mut().push((id, Rc::downgrade(client)));
    }

    /// Returns whether `id` was registered.
    pub fn remove(&self, id: ClientId) -> bool {
        let mut clients = self.clients.borrow_mut();
        let before = clients.len();
        clients.retain(|(client_id, _)| *client_id != id);
        clients.len() != before
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.borrow().iter().any(|(client_id, _)| *client_id == id)
    }

    pub fn len(&self) -> usize {
        self.clients.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.borrow().is_empty()
    }

    /// Strong references to every live client, in registration order.
    pub fn snapshot(&self) -> Vec<Rc<T>> {
        self.clients
            .borrow()
            .iter()
            .filter_map(|(_, client)| client.upgrade())
            .collect()
    }

    /// Run `step` for each client in a snapshot taken up front.
    ///
    /// No borrow of the registry is held while `step` runs, so it may add or
    /// remove clients.
    pub fn for_each(&self, mut step: impl FnMut(&Rc<T>)) -> usize {
        let clients = self.snapshot();
        for client in &clients {
            step(client);
        }
        clients.len()
    }
}
