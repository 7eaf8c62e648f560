//! Callback-driven TCP listener.


use std::{
    cell::{Cell, RefCell},
    net::{Ipv4Addr, SocketAddr},
    rc::Rc,
};

use log::{debug, warn};

use crate::{
    addr::ToIpAddr,
    callback::{Callback, Handoff},
    driver::{Driver, DriverHandle, SocketId},
    socket::ListenerSocket,
    tcp::TcpSocket,
    Status,
};

////////////////////////////////////////////////////////////////////////////////

pub(crate) struct ListenerShared {
    id: SocketId,
    listener: RefCell<Box<dyn ListenerSocket>>,
    detached: Cell<bool>,
    on_connection: Handoff<TcpSocket>,
    on_error: Callback<Status>,
}

impl ListenerShared {
    /// Accepts every pending connection and hands each one over.
    pub(crate) fn poll(&self, driver: &Driver) {
        loop {
            if self.detached.get() {
                return;
            }
            let accepted = self.listener.borrow_mut().accept();
            match accepted {
                Ok(stream) => {
                    let socket = TcpSocket::from_boxed(driver, stream);
                    debug!(
                        "listener {} accepted tcp socket {}",
                        self.id,
                        socket.id()
                    );
                    self.on_connection.invoke(socket);
                }
                Err(Status::NotReady) => return,
                Err(status) => {
                    warn!("listener {} accept failed: {status}", self.id);
                    self.on_error.invoke(&status);
                    return;
                }
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// TCP listener handing accepted connections to a callback.
///
/// Accepted sockets are registered with the same driver before the callback
/// runs. A socket the callback does not keep is closed right away.
pub struct TcpListener {
    shared: Rc<ListenerShared>,
    driver: DriverHandle,
}

impl TcpListener {
    pub fn new(driver: &Driver) -> Self {
        Self::from_boxed(driver, driver.backend().listener())
    }

    pub fn with_listener(driver: &Driver, listener: impl ListenerSocket + 'static) -> Self {
        Self::from_boxed(driver, Box::new(listener))
    }

    fn from_boxed(driver: &Driver, listener: Box<dyn ListenerSocket>) -> Self {
        let id = driver.next_id();
        let shared = Rc::new(ListenerShared {
            id,
            listener: RefCell::new(listener),
            detached: Cell::new(false),
            on_connection: Handoff::new(),
            on_error: Callback::new(),
        });
        driver.register_listener(id, &shared);
        Self {
            shared,
            driver: driver.handle(),
        }
    }

    pub fn id(&self) -> SocketId {
        self.shared.id
    }

    /// Listens on `port` on every local address.
    pub fn listen(&self, port: u16) -> Status {
        self.listen_on(port, Ipv4Addr::UNSPECIFIED)
    }

    pub fn listen_on(&self, port: u16, address: impl ToIpAddr) -> Status {
        let id = self.shared.id;
        let ip = match address.to_ip_addr() {
            Ok(ip) => ip,
            Err(err) => {
                warn!("listener {id} cannot listen: {err}");
                return Status::Error;
            }
        };
        let addr = SocketAddr::new(ip, port);
        let status = self.shared.listener.borrow_mut().listen(addr);
        debug!("listener {id} listen on {addr}: {status}");
        status
    }

    pub fn close(&self) {
        debug!("listener {} closing", self.shared.id);
        self.shared.listener.borrow_mut().close();
    }

    pub fn local_port(&self) -> u16 {
        self.shared.listener.borrow().local_port()
    }

    pub fn on_connection<F>(&self, handler: F)
    where
        F: Fn(TcpSocket) + 'static,
    {
        self.shared.on_connection.set(handler);
    }

    pub fn on_connection_with<C, F>(&self, ctx: C, handler: F)
    where
        C: 'static,
        F: Fn(&C, TcpSocket) + 'static,
    {
        self.shared.on_connection.bind(ctx, handler);
    }

    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(Status) + 'static,
    {
        self.shared.on_error.set(move |status: &Status| handler(*status));
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        self.shared.detached.set(true);
        self.driver.deregister_listener(self.shared.id);
    }
}
