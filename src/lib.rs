//! Callback-driven non-blocking sockets serviced by a per-tick poll.
//!
//! ```no_run
//! use pollnet::{Driver, TcpSocket};
//!
//! let driver = Driver::new();
//! let socket = TcpSocket::new(&driver);
//! socket.on_connected(|socket| {
//!     socket.send(b"hello");
//! });
//! socket.on_data_received(|data| println!("got {} bytes", data.len()));
//! socket.on_error(|status| eprintln!("socket error: {status}"));
//! socket.connect("127.0.0.1", 9000);
//!
//! loop {
//!     driver.poll();
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! ```

pub mod addr;
pub mod callback;
pub mod driver;
pub mod listener;
pub mod sim;
pub mod socket;
pub mod tcp;
pub mod udp;

mod status;

#[cfg(test)]
mod testing;

pub use addr::ToIpAddr;
pub use driver::{Driver, DriverBuilder, DriverConfig, SocketId};
pub use listener::TcpListener;
pub use status::{Error, Result, Status};
pub use tcp::{TcpHandle, TcpSocket};
pub use udp::{UdpHandle, UdpSocket};
