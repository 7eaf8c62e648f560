//! Deterministic in-memory network for a single simulated host.
//!
//! Implements every socket primitive so drivers can be exercised without
//! touching the operating system. Unspecified and loopback addresses resolve
//! to [`SimNetwork::HOST`]; nothing else is reachable.
//!
//! ```
//! use pollnet::{sim::SimNetwork, Driver, UdpSocket};
//!
//! let net = SimNetwork::new(123);
//! let driver = Driver::builder().backend(net.handle()).build();
//! let socket = UdpSocket::new(&driver);
//! assert!(socket.bind(9001).is_done());
//! ```

mod registry;
mod tcp;
mod udp;


use std::{
    cell::RefCell,
    collections::BTreeSet,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    rc::{Rc, Weak},
};

use log::trace;
use rand::{rngs::StdRng, Rng, SeedableRng};

use registry::SimRegistry;
use tcp::{Connection, ListenerEndpoint};
use udp::{Datagram, UdpEndpoint};

use crate::{
    socket::{Backend, DatagramSocket, ListenerSocket, StreamSocket},
    Status,
};

pub use tcp::{SimListener, SimStream};
pub use udp::SimDatagram;

////////////////////////////////////////////////////////////////////////////////

struct NetworkState {
    registry: SimRegistry,
    rng: StdRng,
    drop_rate: f64,
    udp_recv_buffer_size: usize,
    tcp_pipe_capacity: usize,
    udp_ports: BTreeSet<u16>,
    tcp_ports: BTreeSet<u16>,
}

impl NetworkState {
    fn new(seed: u64) -> Self {
        Self {
            registry: Default::default(),
            rng: StdRng::seed_from_u64(seed),
            drop_rate: 0.0,
            udp_recv_buffer_size: SimNetwork::DEFAULT_UDP_RECV_BUFFER_SIZE,
            tcp_pipe_capacity: SimNetwork::DEFAULT_TCP_PIPE_CAPACITY,
            udp_ports: BTreeSet::from_iter(1..=u16::MAX),
            tcp_ports: BTreeSet::from_iter(1..=u16::MAX),
        }
    }
}

fn take_port(ports: &mut BTreeSet<u16>, port: u16) -> Option<u16> {
    if port == 0 {
        ports.pop_first()
    } else {
        ports.take(&port)
    }
}

////////////////////////////////////////////////////////////////////////////////

pub struct SimNetwork(Rc<RefCell<NetworkState>>);

impl SimNetwork {
    pub const HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    pub const DEFAULT_UDP_RECV_BUFFER_SIZE: usize = 4096;
    pub const DEFAULT_TCP_PIPE_CAPACITY: usize = 65536;

    pub fn new(seed: u64) -> Self {
        Self(Rc::new(RefCell::new(NetworkState::new(seed))))
    }

    pub fn handle(&self) -> SimNetworkHandle {
        SimNetworkHandle(Rc::downgrade(&self.0))
    }

    /// Probability in `0.0..=1.0` that a datagram between two different
    /// sockets is lost.
    pub fn set_drop_rate(&self, drop_rate: f64) {
        self.0.borrow_mut().drop_rate = drop_rate.clamp(0.0, 1.0);
    }

    /// Bytes a socket may hold unread; datagrams that do not fit are lost.
    /// Applies to sockets bound afterwards.
    pub fn set_udp_recv_buffer_size(&self, size: usize) {
        self.0.borrow_mut().udp_recv_buffer_size = size;
    }

    /// Bytes in flight per connection direction before sends turn partial.
    /// Applies to connections made afterwards.
    pub fn set_tcp_pipe_capacity(&self, capacity: usize) {
        self.0.borrow_mut().tcp_pipe_capacity = capacity.max(1);
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone)]
pub struct SimNetworkHandle(Weak<RefCell<NetworkState>>);

impl SimNetworkHandle {
    pub fn alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    fn resolve(addr: SocketAddr) -> SocketAddr {
        if addr.ip().is_unspecified() || addr.ip().is_loopback() {
            SocketAddr::new(SimNetwork::HOST, addr.port())
        } else {
            addr
        }
    }

    ////////////////////////////////////////////////////////////////////////////////

    fn bind_udp(&self, addr: SocketAddr) -> Result<Rc<RefCell<UdpEndpoint>>, Status> {
        let state = self.0.upgrade().ok_or(Status::Error)?;
        let mut state = state.borrow_mut();
        let addr = Self::resolve(addr);
        if addr.ip() != SimNetwork::HOST {
            return Err(Status::Error);
        }
        let port = take_port(&mut state.udp_ports, addr.port()).ok_or(Status::Error)?;
        let addr = SocketAddr::new(addr.ip(), port);
        let endpoint = Rc::new(RefCell::new(UdpEndpoint::new(
            addr,
            state.udp_recv_buffer_size,
        )));
        state.registry.udp.insert(addr, Rc::downgrade(&endpoint));
        Ok(endpoint)
    }

    fn unbind_udp(&self, addr: SocketAddr) {
        // sockets may outlive the network
        if let Some(state) = self.0.upgrade() {
            let mut state = state.borrow_mut();
            if state.registry.udp.remove(&addr).is_some() {
                state.udp_ports.insert(addr.port());
            }
        }
    }

    fn send_datagram(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) -> Status {
        let Some(state) = self.0.upgrade() else {
            return Status::Error;
        };
        let mut state = state.borrow_mut();
        let to = Self::resolve(to);
        // lost
        if from != to && state.rng.gen_range(0.0..1.0) < state.drop_rate {
            trace!("datagram {from} -> {to} dropped");
            return Status::Done;
        }
        let Some(receiver) = state.registry.udp.get(&to).and_then(Weak::upgrade) else {
            trace!("datagram {from} -> {to} has no receiver");
            return Status::Done;
        };
        let delivered = receiver.borrow_mut().deliver(Datagram {
            from,
            data: data.to_vec(),
        });
        if let Err(lost) = delivered {
            trace!(
                "datagram {from} -> {to} of {} bytes overflowed receive buffer",
                lost.data.len()
            );
        }
        Status::Done
    }

    ////////////////////////////////////////////////////////////////////////////////

    fn listen(&self, addr: SocketAddr) -> Result<Rc<RefCell<ListenerEndpoint>>, Status> {
        let state = self.0.upgrade().ok_or(Status::Error)?;
        let mut state = state.borrow_mut();
        let addr = Self::resolve(addr);
        if addr.ip() != SimNetwork::HOST {
            return Err(Status::Error);
        }
        let port = take_port(&mut state.tcp_ports, addr.port()).ok_or(Status::Error)?;
        let addr = SocketAddr::new(addr.ip(), port);
        let endpoint = Rc::new(RefCell::new(ListenerEndpoint::new(addr)));
        state.registry.listeners.insert(addr, Rc::downgrade(&endpoint));
        Ok(endpoint)
    }

    fn close_listener(&self, addr: SocketAddr) {
        if let Some(state) = self.0.upgrade() {
            let mut state = state.borrow_mut();
            if state.registry.listeners.remove(&addr).is_some() {
                state.tcp_ports.insert(addr.port());
            }
        }
    }

    /// Queues a connection on the listener at `to`; `None` means refused.
    fn connect(&self, to: SocketAddr) -> Option<Connection> {
        let state = self.0.upgrade()?;
        let mut state = state.borrow_mut();
        let to = Self::resolve(to);
        let listener = state.registry.listeners.get(&to).and_then(Weak::upgrade)?;
        let port = take_port(&mut state.tcp_ports, 0)?;
        let local = SocketAddr::new(SimNetwork::HOST, port);

        let capacity = state.tcp_pipe_capacity;
        let (client, server) = Connection::pair(local, to, capacity);
        listener
            .borrow_mut()
            .backlog
            .push_back(SimStream::open(self.clone(), server));
        trace!("connection {local} -> {to} queued");
        Some(client)
    }

    fn release_tcp_port(&self, port: u16) {
        if let Some(state) = self.0.upgrade() {
            state.borrow_mut().tcp_ports.insert(port);
        }
    }
}

impl Backend for SimNetworkHandle {
    fn stream(&self) -> Box<dyn StreamSocket> {
        Box::new(SimStream::new(self.clone()))
    }

    fn datagram(&self) -> Box<dyn DatagramSocket> {
        Box::new(SimDatagram::new(self.clone()))
    }

    fn listener(&self) -> Box<dyn ListenerSocket> {
        Box::new(SimListener::new(self.clone()))
    }
}
