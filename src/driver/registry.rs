use std::{
    fmt,
    rc::{Rc, Weak},
};

////////////////////////////////////////////////////////////////////////////////

/// Stable identity of a socket registered with a driver.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SocketId(pub(crate) u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Non-owning list of the live sockets of one kind, in registration order.
pub(crate) struct SocketRegistry<S> {
    entries: Vec<(SocketId, Weak<S>)>,
}

impl<S> SocketRegistry<S> {
    pub fn insert(&mut self, id: SocketId, socket: &Rc<S>) {
        self.entries.push((id, Rc::downgrade(socket)));
    }

    /// Removes the first entry with `id`, keeping the order of the rest.
    pub fn remove(&mut self, id: SocketId) -> bool {
        if let Some(pos) = self.entries.iter().position(|(other, _)| *other == id) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Strong references to every live entry, in registration order.
    pub fn snapshot(&self) -> Vec<Rc<S>> {
        self.entries
            .iter()
            .filter_map(|(_, socket)| socket.upgrade())
            .collect()
    }
}

impl<S> Default for SocketRegistry<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
