//! Contract of the non-blocking socket primitives the wrappers drive.
//!
//! Every call returns immediately with a [`Status`]. Implementations decide
//! how the status set maps onto their transport; the wrappers only rely on
//! the following:
//!
//! * `receive` returns `Partial` while more data is waiting after the bytes
//!   it just copied, `Done` when it copied the last available bytes and
//!   `NotReady` when nothing was available.
//! * `remote_port` is zero until a connection is established.

pub mod os;

use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use crate::Status;

pub use os::OsBackend;

////////////////////////////////////////////////////////////////////////////////

pub trait StreamSocket {
    /// Starts connecting to `addr`. A zero `timeout` never blocks.
    fn connect(&mut self, addr: SocketAddr, timeout: Duration) -> Status;

    fn disconnect(&mut self);

    /// Returns the status and the number of bytes actually sent.
    fn send(&mut self, buf: &[u8]) -> (Status, usize);

    /// Returns the status and the number of bytes copied into `buf`.
    fn receive(&mut self, buf: &mut [u8]) -> (Status, usize);

    fn remote_addr(&self) -> Option<IpAddr>;

    fn remote_port(&self) -> u16;

    fn local_port(&self) -> u16;
}

pub trait DatagramSocket {
    fn bind(&mut self, addr: SocketAddr) -> Status;

    fn unbind(&mut self);

    fn send_to(&mut self, buf: &[u8], target: SocketAddr) -> Status;

    /// Returns the status, the number of bytes copied and the sender.
    fn receive_from(&mut self, buf: &mut [u8]) -> (Status, usize, Option<SocketAddr>);

    fn local_port(&self) -> u16;
}

pub trait ListenerSocket {
    fn listen(&mut self, addr: SocketAddr) -> Status;

    fn close(&mut self);

    /// Takes the next pending connection, or the status explaining why none
    /// was taken.
    fn accept(&mut self) -> Result<Box<dyn StreamSocket>, Status>;

    fn local_port(&self) -> u16;
}

////////////////////////////////////////////////////////////////////////////////

/// Creates the primitives behind the sockets of a driver.
pub trait Backend {
    fn stream(&self) -> Box<dyn StreamSocket>;

    fn datagram(&self) -> Box<dyn DatagramSocket>;

    fn listener(&self) -> Box<dyn ListenerSocket>;
}
