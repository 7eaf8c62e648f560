//! Callback-driven, connection-oriented socket.


use std::{
    cell::{Cell, RefCell},
    net::{IpAddr, SocketAddr},
    ops::Deref,
    rc::Rc,
    time::Duration,
};

use log::{debug, trace, warn};

use crate::{
    addr::ToIpAddr,
    callback::Callback,
    driver::{Driver, DriverHandle, SocketId},
    socket::StreamSocket,
    Status,
};

////////////////////////////////////////////////////////////////////////////////

pub(crate) struct TcpShared {
    id: SocketId,
    stream: RefCell<Box<dyn StreamSocket>>,
    connecting: Cell<bool>,
    detached: Cell<bool>,
    on_data_received: Callback<[u8]>,
    on_error: Callback<Status>,
    on_connected: Callback<TcpHandle>,
}

impl TcpShared {
    /// One poll step: drain everything readable, dispatch it, then check
    /// whether a pending connect has completed.
    pub(crate) fn poll(self: &Rc<Self>, scratch: &mut [u8]) {
        if self.detached.get() {
            return;
        }

        let mut data = Vec::new();
        let status = {
            let mut stream = self.stream.borrow_mut();
            loop {
                let (status, received) = stream.receive(scratch);
                data.extend_from_slice(&scratch[..received.min(scratch.len())]);
                if status != Status::Partial {
                    break status;
                }
            }
        };

        match status {
            Status::Done => {
                trace!("tcp socket {} received {} bytes", self.id, data.len());
                self.on_data_received.invoke(&data);
            }
            Status::NotReady => {}
            status => {
                warn!("tcp socket {} receive failed: {status}", self.id);
                self.on_error.invoke(&status);
            }
        }

        // a callback may have dropped the socket
        if self.detached.get() || !self.connecting.get() {
            return;
        }
        if self.stream.borrow().remote_port() != 0 {
            self.connecting.set(false);
            debug!("tcp socket {} connected", self.id);
            self.on_connected.invoke(&TcpHandle {
                shared: self.clone(),
            });
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Operations of a TCP socket.
///
/// Borrowed from a [`TcpSocket`] or handed to the connected callback. The
/// handle keeps the socket state alive but not its registration: once the
/// owning [`TcpSocket`] is dropped the driver no longer polls it. Storing a
/// handle inside one of its own callbacks leaks the socket.
pub struct TcpHandle {
    shared: Rc<TcpShared>,
}

impl TcpHandle {
    pub fn id(&self) -> SocketId {
        self.shared.id
    }

    /// Starts a non-blocking connect, completion is reported by a later poll.
    pub fn connect(&self, address: impl ToIpAddr, port: u16) {
        self.connect_timeout(address, port, Duration::ZERO)
    }

    /// Connects, blocking for at most `timeout`; a zero timeout never blocks.
    pub fn connect_timeout(&self, address: impl ToIpAddr, port: u16, timeout: Duration) {
        let id = self.shared.id;
        let status = match address.to_ip_addr() {
            Ok(ip) => {
                let addr = SocketAddr::new(ip, port);
                debug!("tcp socket {id} connecting to {addr}");
                self.shared.stream.borrow_mut().connect(addr, timeout)
            }
            Err(err) => {
                warn!("tcp socket {id} cannot connect: {err}");
                Status::Error
            }
        };

        // set even when the attempt has already failed
        self.shared.connecting.set(true);

        if !matches!(status, Status::Done | Status::NotReady) {
            warn!("tcp socket {id} connect failed: {status}");
            self.shared.on_error.invoke(&status);
        }
    }

    pub fn disconnect(&self) {
        debug!("tcp socket {} disconnecting", self.shared.id);
        self.shared.stream.borrow_mut().disconnect();
    }

    /// Sends as much of `buf` as possible without blocking and returns the
    /// number of bytes sent. Anything short of `Done` goes to the error
    /// callback.
    pub fn send(&self, buf: &[u8]) -> usize {
        let (status, sent) = self.shared.stream.borrow_mut().send(buf);
        if status != Status::Done {
            warn!(
                "tcp socket {} sent {sent} of {} bytes: {status}",
                self.shared.id,
                buf.len()
            );
            self.shared.on_error.invoke(&status);
        }
        sent
    }

    pub fn remote_address(&self) -> Option<IpAddr> {
        self.shared.stream.borrow().remote_addr()
    }

    pub fn remote_port(&self) -> u16 {
        self.shared.stream.borrow().remote_port()
    }

    pub fn local_port(&self) -> u16 {
        self.shared.stream.borrow().local_port()
    }

    pub fn is_connecting(&self) -> bool {
        self.shared.connecting.get()
    }

    ////////////////////////////////////////////////////////////////////////////////

    pub fn on_data_received<F>(&self, handler: F)
    where
        F: Fn(&[u8]) + 'static,
    {
        self.shared.on_data_received.set(handler);
    }

    pub fn on_data_received_with<C, F>(&self, ctx: C, handler: F)
    where
        C: 'static,
        F: Fn(&C, &[u8]) + 'static,
    {
        self.shared.on_data_received.bind(ctx, handler);
    }

    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(Status) + 'static,
    {
        self.shared.on_error.set(move |status: &Status| handler(*status));
    }

    pub fn on_error_with<C, F>(&self, ctx: C, handler: F)
    where
        C: 'static,
        F: Fn(&C, Status) + 'static,
    {
        self.shared
            .on_error
            .bind(ctx, move |ctx: &C, status: &Status| handler(ctx, *status));
    }

    pub fn on_connected<F>(&self, handler: F)
    where
        F: Fn(&TcpHandle) + 'static,
    {
        self.shared.on_connected.set(handler);
    }

    pub fn on_connected_with<C, F>(&self, ctx: C, handler: F)
    where
        C: 'static,
        F: Fn(&C, &TcpHandle) + 'static,
    {
        self.shared.on_connected.bind(ctx, handler);
    }
}

////////////////////////////////////////////////////////////////////////////////

/// TCP socket registered with a [`Driver`] for its whole lifetime.
pub struct TcpSocket {
    handle: TcpHandle,
    driver: DriverHandle,
}

impl TcpSocket {
    pub fn new(driver: &Driver) -> Self {
        Self::from_boxed(driver, driver.backend().stream())
    }

    pub fn with_stream(driver: &Driver, stream: impl StreamSocket + 'static) -> Self {
        Self::from_boxed(driver, Box::new(stream))
    }

    pub(crate) fn from_boxed(driver: &Driver, stream: Box<dyn StreamSocket>) -> Self {
        let id = driver.next_id();
        let shared = Rc::new(TcpShared {
            id,
            stream: RefCell::new(stream),
            connecting: Cell::new(false),
            detached: Cell::new(false),
            on_data_received: Callback::new(),
            on_error: Callback::new(),
            on_connected: Callback::new(),
        });
        driver.register_tcp(id, &shared);
        Self {
            handle: TcpHandle { shared },
            driver: driver.handle(),
        }
    }

    pub fn handle(&self) -> &TcpHandle {
        &self.handle
    }
}

impl Deref for TcpSocket {
    type Target = TcpHandle;

    fn deref(&self) -> &TcpHandle {
        &self.handle
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        self.handle.shared.detached.set(true);
        self.driver.deregister_tcp(self.handle.shared.id);
    }
}
