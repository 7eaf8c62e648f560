//! Callback-driven datagram socket.
//!
//! Every datagram readable during one poll pass is appended to a single
//! buffer and delivered by one data callback. Datagram boundaries and sender
//! addresses are not kept; applications needing them must frame their
//! payloads themselves.


use std::{
    cell::{Cell, RefCell},
    net::{Ipv4Addr, SocketAddr},
    ops::Deref,
    rc::Rc,
};

use log::{debug, trace, warn};

use crate::{
    addr::ToIpAddr,
    callback::Callback,
    driver::{Driver, DriverHandle, SocketId},
    socket::DatagramSocket,
    Status,
};

////////////////////////////////////////////////////////////////////////////////

pub(crate) struct UdpShared {
    id: SocketId,
    socket: RefCell<Box<dyn DatagramSocket>>,
    detached: Cell<bool>,
    on_data_received: Callback<[u8]>,
    on_error: Callback<Status>,
}

impl UdpShared {
    pub(crate) fn poll(&self, scratch: &mut [u8]) {
        if self.detached.get() {
            return;
        }

        let mut data = Vec::new();
        let mut datagrams = 0usize;
        let status = {
            let mut socket = self.socket.borrow_mut();
            loop {
                let (status, received, _sender) = socket.receive_from(scratch);
                data.extend_from_slice(&scratch[..received.min(scratch.len())]);
                datagrams += 1;
                if status != Status::Partial {
                    break status;
                }
            }
        };

        match status {
            Status::Done => {
                trace!(
                    "udp socket {} drained {datagrams} datagrams, {} bytes",
                    self.id,
                    data.len()
                );
                self.on_data_received.invoke(&data);
            }
            Status::NotReady => {}
            status => {
                warn!("udp socket {} receive failed: {status}", self.id);
                self.on_error.invoke(&status);
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Operations of a UDP socket, borrowed from a [`UdpSocket`].
pub struct UdpHandle {
    shared: Rc<UdpShared>,
}

impl UdpHandle {
    pub fn id(&self) -> SocketId {
        self.shared.id
    }

    /// Binds to `port` on every local address.
    pub fn bind(&self, port: u16) -> Status {
        self.bind_to(port, Ipv4Addr::UNSPECIFIED)
    }

    pub fn bind_to(&self, port: u16, address: impl ToIpAddr) -> Status {
        let id = self.shared.id;
        let ip = match address.to_ip_addr() {
            Ok(ip) => ip,
            Err(err) => {
                warn!("udp socket {id} cannot bind: {err}");
                return Status::Error;
            }
        };
        let addr = SocketAddr::new(ip, port);
        let status = self.shared.socket.borrow_mut().bind(addr);
        debug!("udp socket {id} bind to {addr}: {status}");
        status
    }

    pub fn unbind(&self) {
        debug!("udp socket {} unbinding", self.shared.id);
        self.shared.socket.borrow_mut().unbind();
    }

    /// Sends one datagram. Anything short of `Done` goes to the error
    /// callback.
    pub fn send(&self, buf: &[u8], address: impl ToIpAddr, port: u16) {
        let id = self.shared.id;
        let status = match address.to_ip_addr() {
            Ok(ip) => self
                .shared
                .socket
                .borrow_mut()
                .send_to(buf, SocketAddr::new(ip, port)),
            Err(err) => {
                warn!("udp socket {id} cannot send: {err}");
                Status::Error
            }
        };
        if status != Status::Done {
            warn!("udp socket {id} send of {} bytes: {status}", buf.len());
            self.shared.on_error.invoke(&status);
        }
    }

    pub fn local_port(&self) -> u16 {
        self.shared.socket.borrow().local_port()
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
}

////////////////////////////////////////////////////////////////////////////////

/// UDP socket registered with a [`Driver`] for its whole lifetime.
pub struct UdpSocket {
    handle: UdpHandle,
    driver: DriverHandle,
}

impl UdpSocket {
    pub fn new(driver: &Driver) -> Self {
        Self::from_boxed(driver, driver.backend().datagram())
    }

    pub fn with_datagram(driver: &Driver, socket: impl DatagramSocket + 'static) -> Self {
        Self::from_boxed(driver, Box::new(socket))
    }

    fn from_boxed(driver: &Driver, socket: Box<dyn DatagramSocket>) -> Self {
        let id = driver.next_id();
        let shared = Rc::new(UdpShared {
            id,
            socket: RefCell::new(socket),
            detached: Cell::new(false),
            on_data_received: Callback::new(),
            on_error: Callback::new(),
        });
        driver.register_udp(id, &shared);
        Self {
            handle: UdpHandle { shared },
            driver: driver.handle(),
        }
    }

    pub fn handle(&self) -> &UdpHandle {
        &self.handle
    }
}

impl Deref for UdpSocket {
    type Target = UdpHandle;

    fn deref(&self) -> &UdpHandle {
        &self.handle
    }
}

impl Drop for UdpSocket {
    fn drop(&mut self) {
        self.handle.shared.detached.set(true);
        self.driver.deregister_udp(self.handle.shared.id);
    }
}
