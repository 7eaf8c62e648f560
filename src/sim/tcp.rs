use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    net::{IpAddr, SocketAddr},
    rc::Rc,
    time::Duration,
};

use log::trace;

use crate::{
    socket::{ListenerSocket, StreamSocket},
    Status,
};

use super::SimNetworkHandle;

////////////////////////////////////////////////////////////////////////////////

/// One direction of a connection.
pub struct Pipe {
    data: VecDeque<u8>,
    capacity: usize,
    closed: bool,
}

impl Pipe {
    fn new(capacity: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            data: VecDeque::new(),
            capacity,
            closed: false,
        }))
    }

    fn write(&mut self, buf: &[u8]) -> (Status, usize) {
        if self.closed {
            return (Status::Disconnected, 0);
        }
        if buf.is_empty() {
            return (Status::Done, 0);
        }
        let n = buf.len().min(self.capacity - self.data.len());
        self.data.extend(&buf[..n]);
        let status = if n == buf.len() {
            Status::Done
        } else if n == 0 {
            Status::NotReady
        } else {
            Status::Partial
        };
        (status, n)
    }

    fn read(&mut self, buf: &mut [u8]) -> (Status, usize) {
        if self.data.is_empty() {
            let status = if self.closed {
                Status::Disconnected
            } else {
                Status::NotReady
            };
            return (status, 0);
        }
        let n = buf.len().min(self.data.len());
        for (dst, src) in buf.iter_mut().zip(self.data.drain(..n)) {
            *dst = src;
        }
        let status = if self.data.is_empty() {
            Status::Done
        } else {
            Status::Partial
        };
        (status, n)
    }
}

////////////////////////////////////////////////////////////////////////////////

pub struct Connection {
    local: SocketAddr,
    remote: SocketAddr,
    inbound: Rc<RefCell<Pipe>>,
    outbound: Rc<RefCell<Pipe>>,
    accepted: Rc<Cell<bool>>,
    owns_port: bool,
}

impl Connection {
    /// Both ends of a connection from `client` to the listener at `server`.
    pub fn pair(client: SocketAddr, server: SocketAddr, capacity: usize) -> (Self, Self) {
        let to_server = Pipe::new(capacity);
        let to_client = Pipe::new(capacity);
        let accepted = Rc::new(Cell::new(false));
        let client_end = Connection {
            local: client,
            remote: server,
            inbound: to_client.clone(),
            outbound: to_server.clone(),
            accepted: accepted.clone(),
            owns_port: true,
        };
        let server_end = Connection {
            local: server,
            remote: client,
            inbound: to_server,
            outbound: to_client,
            accepted,
            owns_port: false,
        };
        (client_end, server_end)
    }

    fn established(&self) -> bool {
        self.accepted.get()
    }

    fn close(&self) {
        self.inbound.borrow_mut().closed = true;
        self.outbound.borrow_mut().closed = true;
    }

    fn peer_gone(&self) -> bool {
        self.inbound.borrow().closed
    }
}

////////////////////////////////////////////////////////////////////////////////

enum State {
    Idle,
    Refused,
    Open(Connection),
}

/// Stream socket of a [`super::SimNetwork`].
///
/// Connecting never blocks, whatever the timeout. The connection stays
/// pending until the listener side accepts it.
pub struct SimStream {
    net: SimNetworkHandle,
    state: State,
}

impl SimStream {
    pub fn new(net: SimNetworkHandle) -> Self {
        Self {
            net,
            state: State::Idle,
        }
    }

    pub(super) fn open(net: SimNetworkHandle, conn: Connection) -> Self {
        Self {
            net,
            state: State::Open(conn),
        }
    }

    fn established(&self) -> Option<&Connection> {
        match &self.state {
            State::Open(conn) if conn.established() => Some(conn),
            _ => None,
        }
    }
}

impl StreamSocket for SimStream {
    fn connect(&mut self, addr: SocketAddr, _timeout: Duration) -> Status {
        self.disconnect();
        self.state = match self.net.connect(addr) {
            Some(conn) => State::Open(conn),
            None => {
                trace!("connection to {addr} refused");
                State::Refused
            }
        };
        Status::NotReady
    }

    fn disconnect(&mut self) {
        if let State::Open(conn) = std::mem::replace(&mut self.state, State::Idle) {
            conn.close();
            if conn.owns_port {
                self.net.release_tcp_port(conn.local.port());
            }
        }
    }

    fn send(&mut self, buf: &[u8]) -> (Status, usize) {
        match &self.state {
            State::Open(conn) if conn.established() => conn.outbound.borrow_mut().write(buf),
            State::Open(_) => (Status::NotReady, 0),
            State::Idle | State::Refused => (Status::Error, 0),
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> (Status, usize) {
        let result = match &self.state {
            State::Idle => return (Status::NotReady, 0),
            State::Refused => (Status::Error, 0),
            // listener went away before accepting
            State::Open(conn) if !conn.established() && conn.peer_gone() => (Status::Error, 0),
            State::Open(conn) if !conn.established() => return (Status::NotReady, 0),
            State::Open(conn) => conn.inbound.borrow_mut().read(buf),
        };
        // terminal statuses are reported once
        if matches!(result.0, Status::Error | Status::Disconnected) {
            self.disconnect();
        }
        result
    }

    fn remote_addr(&self) -> Option<IpAddr> {
        self.established().map(|conn| conn.remote.ip())
    }

    fn remote_port(&self) -> u16 {
        self.established().map_or(0, |conn| conn.remote.port())
    }

    fn local_port(&self) -> u16 {
        match &self.state {
            State::Open(conn) => conn.local.port(),
            State::Idle | State::Refused => 0,
        }
    }
}

impl Drop for SimStream {
    fn drop(&mut self) {
        self.disconnect();
    }
}

////////////////////////////////////////////////////////////////////////////////

pub struct ListenerEndpoint {
    pub local_addr: SocketAddr,
    pub backlog: VecDeque<SimStream>,
}

impl ListenerEndpoint {
    pub fn new(local_addr: SocketAddr) -> Self {
        Self {
            local_addr,
            backlog: VecDeque::new(),
        }
    }
}

/// Listening socket of a [`super::SimNetwork`].
pub struct SimListener {
    net: SimNetworkHandle,
    endpoint: Option<Rc<RefCell<ListenerEndpoint>>>,
}

impl SimListener {
    pub fn new(net: SimNetworkHandle) -> Self {
        Self {
            net,
            endpoint: None,
        }
    }
}

impl ListenerSocket for SimListener {
    fn listen(&mut self, addr: SocketAddr) -> Status {
        self.close();
        match self.net.listen(addr) {
            Ok(endpoint) => {
                self.endpoint = Some(endpoint);
                Status::Done
            }
            Err(status) => status,
        }
    }

    fn close(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            let addr = endpoint.borrow().local_addr;
            self.net.close_listener(addr);
            // pending connections are refused when the backlog drops
        }
    }

    fn accept(&mut self) -> Result<Box<dyn StreamSocket>, Status> {
        let Some(endpoint) = self.endpoint.as_ref() else {
            return Err(Status::NotReady);
        };
        let stream = endpoint
            .borrow_mut()
            .backlog
            .pop_front()
            .ok_or(Status::NotReady)?;
        if let State::Open(conn) = &stream.state {
            conn.accepted.set(true);
        }
        Ok(Box::new(stream))
    }

    fn local_port(&self) -> u16 {
        self.endpoint
            .as_ref()
            .map_or(0, |e| e.borrow().local_addr.port())
    }
}

impl Drop for SimListener {
    fn drop(&mut self) {
        self.close();
    }
}
