//! Registry of live sockets and the poll entry points driving them.
//!
//! The application owns one [`Driver`] and calls [`Driver::poll_tcp`] and
//! [`Driver::poll_udp`] (or [`Driver::poll`]) once per tick. Each pass works
//! on the sockets registered when it started: sockets created by a callback
//! are serviced from the next pass on, sockets dropped by a callback are
//! skipped for the rest of the pass.
//!
//! A callback may poll the other socket kinds. Polling the kind whose pass is
//! running is not supported and is ignored.

mod builder;
mod registry;

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use log::{debug, trace, warn};

use crate::{listener::ListenerShared, socket::Backend, tcp::TcpShared, udp::UdpShared};

pub use builder::{DriverBuilder, DriverConfig};
pub use registry::SocketId;

pub(crate) use registry::SocketRegistry;

////////////////////////////////////////////////////////////////////////////////

struct DriverState {
    config: DriverConfig,
    backend: Box<dyn Backend>,
    next_id: Cell<u64>,
    tcp_polling: Cell<bool>,
    udp_polling: Cell<bool>,
    listener_polling: Cell<bool>,
    tcp_scratch: RefCell<Vec<u8>>,
    udp_scratch: RefCell<Vec<u8>>,
    tcp: RefCell<SocketRegistry<TcpShared>>,
    udp: RefCell<SocketRegistry<UdpShared>>,
    listeners: RefCell<SocketRegistry<ListenerShared>>,
}

////////////////////////////////////////////////////////////////////////////////

pub struct Driver(Rc<DriverState>);

impl Driver {
    pub fn new() -> Self {
        DriverBuilder::new().build()
    }

    pub fn builder() -> DriverBuilder {
        DriverBuilder::new()
    }

    pub(crate) fn from_parts(config: DriverConfig, backend: Box<dyn Backend>) -> Self {
        let tcp_scratch = vec![0u8; config.tcp_recv_buffer_size.max(1)];
        let udp_scratch = vec![0u8; config.udp_recv_buffer_size.max(1)];
        Self(Rc::new(DriverState {
            config,
            backend,
            next_id: Cell::new(1),
            tcp_polling: Cell::new(false),
            udp_polling: Cell::new(false),
            listener_polling: Cell::new(false),
            tcp_scratch: RefCell::new(tcp_scratch),
            udp_scratch: RefCell::new(udp_scratch),
            tcp: Default::default(),
            udp: Default::default(),
            listeners: Default::default(),
        }))
    }

    pub fn config(&self) -> &DriverConfig {
        &self.0.config
    }

    ////////////////////////////////////////////////////////////////////////////////

    /// Polls listeners, then TCP sockets, then UDP sockets.
    pub fn poll(&self) {
        self.poll_listeners();
        self.poll_tcp();
        self.poll_udp();
    }

    pub fn poll_tcp(&self) {
        let Some(_guard) = Self::enter("tcp", &self.0.tcp_polling) else {
            return;
        };
        let sockets = self.0.tcp.borrow().snapshot();
        trace!("tcp poll pass over {} sockets", sockets.len());
        let mut scratch = self.0.tcp_scratch.borrow_mut();
        for socket in sockets {
            socket.poll(&mut scratch);
        }
    }

    pub fn poll_udp(&self) {
        let Some(_guard) = Self::enter("udp", &self.0.udp_polling) else {
            return;
        };
        let sockets = self.0.udp.borrow().snapshot();
        trace!("udp poll pass over {} sockets", sockets.len());
        let mut scratch = self.0.udp_scratch.borrow_mut();
        for socket in sockets {
            socket.poll(&mut scratch);
        }
    }

    pub fn poll_listeners(&self) {
        let Some(_guard) = Self::enter("listener", &self.0.listener_polling) else {
            return;
        };
        let listeners = self.0.listeners.borrow().snapshot();
        trace!("listener poll pass over {} listeners", listeners.len());
        for listener in listeners {
            listener.poll(self);
        }
    }

    ////////////////////////////////////////////////////////////////////////////////

    pub fn tcp_count(&self) -> usize {
        self.0.tcp.borrow().len()
    }

    pub fn udp_count(&self) -> usize {
        self.0.udp.borrow().len()
    }

    pub fn listener_count(&self) -> usize {
        self.0.listeners.borrow().len()
    }

    ////////////////////////////////////////////////////////////////////////////////

    pub(crate) fn handle(&self) -> DriverHandle {
        DriverHandle(Rc::downgrade(&self.0))
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.0.backend.as_ref()
    }

    pub(crate) fn next_id(&self) -> SocketId {
        let id = self.0.next_id.get();
        self.0.next_id.set(id + 1);
        SocketId(id)
    }

    pub(crate) fn register_tcp(&self, id: SocketId, socket: &Rc<TcpShared>) {
        debug!("registered tcp socket {id}");
        self.0.tcp.borrow_mut().insert(id, socket);
    }

    pub(crate) fn register_udp(&self, id: SocketId, socket: &Rc<UdpShared>) {
        debug!("registered udp socket {id}");
        self.0.udp.borrow_mut().insert(id, socket);
    }

    pub(crate) fn register_listener(&self, id: SocketId, listener: &Rc<ListenerShared>) {
        debug!("registered tcp listener {id}");
        self.0.listeners.borrow_mut().insert(id, listener);
    }

    /// Marks a pass of one kind as running. Kinds are guarded separately, so a
    /// callback may poll the other kinds.
    fn enter<'a>(kind: &str, polling: &'a Cell<bool>) -> Option<PollGuard<'a>> {
        if polling.replace(true) {
            warn!("{kind} poll requested during a {kind} pass, ignored");
            None
        } else {
            Some(PollGuard(polling))
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////////////

struct PollGuard<'a>(&'a Cell<bool>);

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Weak reference sockets keep to deregister themselves.
#[derive(Clone)]
pub(crate) struct DriverHandle(Weak<DriverState>);

impl DriverHandle {
    pub fn deregister_tcp(&self, id: SocketId) {
        // sockets may outlive their driver
        if let Some(state) = self.0.upgrade() {
            state.tcp.borrow_mut().remove(id);
            debug!("deregistered tcp socket {id}");
        }
    }

    pub fn deregister_udp(&self, id: SocketId) {
        if let Some(state) = self.0.upgrade() {
            state.udp.borrow_mut().remove(id);
            debug!("deregistered udp socket {id}");
        }
    }

    pub fn deregister_listener(&self, id: SocketId) {
        if let Some(state) = self.0.upgrade() {
            state.listeners.borrow_mut().remove(id);
            debug!("deregistered tcp listener {id}");
        }
    }
}
