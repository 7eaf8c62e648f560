#[cfg(test)]
mod tests;

use std::{
    io::{self, Read, Write},
    net::{self, IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr},
    time::Duration,
};

use log::debug;
use mio::net::{TcpListener, TcpStream, UdpSocket};

use crate::Status;

use super::{Backend, DatagramSocket, ListenerSocket, StreamSocket};

////////////////////////////////////////////////////////////////////////////////

/// Largest payload of a single IPv4 UDP datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65507;

////////////////////////////////////////////////////////////////////////////////

/// Real non-blocking sockets of the operating system.
#[derive(Clone, Copy, Default, Debug)]
pub struct OsBackend;

impl Backend for OsBackend {
    fn stream(&self) -> Box<dyn StreamSocket> {
        Box::new(OsStream::default())
    }

    fn datagram(&self) -> Box<dyn DatagramSocket> {
        Box::new(OsDatagram::default())
    }

    fn listener(&self) -> Box<dyn ListenerSocket> {
        Box::new(OsListener::default())
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
pub struct OsStream {
    stream: Option<TcpStream>,
}

impl OsStream {
    fn connect_blocking(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
        let stream = net::TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nonblocking(true)?;
        Ok(TcpStream::from_std(stream))
    }

    fn more_pending(stream: &TcpStream) -> bool {
        let mut probe = [0u8; 1];
        matches!(stream.peek(&mut probe), Ok(n) if n > 0)
    }
}

impl StreamSocket for OsStream {
    fn connect(&mut self, addr: SocketAddr, timeout: Duration) -> Status {
        self.disconnect();
        if timeout.is_zero() {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    self.stream = Some(stream);
                    Status::NotReady
                }
                Err(err) => {
                    debug!("connect to {addr} failed: {err}");
                    Status::from(&err)
                }
            }
        } else {
            match Self::connect_blocking(addr, timeout) {
                Ok(stream) => {
                    self.stream = Some(stream);
                    Status::Done
                }
                Err(err) => {
                    debug!("connect to {addr} failed: {err}");
                    Status::from(&err)
                }
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn send(&mut self, buf: &[u8]) -> (Status, usize) {
        let Some(stream) = self.stream.as_mut() else {
            return (Status::Error, 0);
        };
        let mut sent = 0;
        while sent < buf.len() {
            match stream.write(&buf[sent..]) {
                Ok(0) => return (Status::Disconnected, sent),
                Ok(n) => sent += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    let status = if sent == 0 {
                        Status::NotReady
                    } else {
                        Status::Partial
                    };
                    return (status, sent);
                }
                Err(err) => return (Status::from(&err), sent),
            }
        }
        (Status::Done, sent)
    }

    fn receive(&mut self, buf: &mut [u8]) -> (Status, usize) {
        let Some(stream) = self.stream.as_mut() else {
            return (Status::NotReady, 0);
        };
        if buf.is_empty() {
            return (Status::NotReady, 0);
        }
        loop {
            return match stream.read(buf) {
                Ok(0) => {
                    // peer closed, report it once
                    self.stream = None;
                    (Status::Disconnected, 0)
                }
                Ok(n) if n == buf.len() && Self::more_pending(stream) => (Status::Partial, n),
                Ok(n) => (Status::Done, n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                // still connecting on some platforms
                Err(err) if err.kind() == io::ErrorKind::NotConnected => (Status::NotReady, 0),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => (Status::NotReady, 0),
                Err(err) => {
                    debug!("receive failed: {err}");
                    self.stream = None;
                    (Status::from(&err), 0)
                }
            };
        }
    }

    fn remote_addr(&self) -> Option<IpAddr> {
        self.stream
            .as_ref()
            .and_then(|s| s.peer_addr().ok())
            .map(|addr| addr.ip())
    }

    fn remote_port(&self) -> u16 {
        self.stream
            .as_ref()
            .and_then(|s| s.peer_addr().ok())
            .map_or(0, |addr| addr.port())
    }

    fn local_port(&self) -> u16 {
        self.stream
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map_or(0, |addr| addr.port())
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
pub struct OsDatagram {
    socket: Option<UdpSocket>,
}

impl OsDatagram {
    fn ensure_bound(&mut self, target: SocketAddr) -> io::Result<&UdpSocket> {
        if self.socket.is_none() {
            let any: IpAddr = match target {
                SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
                SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
            };
            let socket = UdpSocket::bind(SocketAddr::new(any, 0))?;
            debug!("implicitly bound udp socket to {:?}", socket.local_addr());
            self.socket = Some(socket);
        }
        match self.socket.as_ref() {
            Some(socket) => Ok(socket),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    fn more_pending(socket: &UdpSocket) -> bool {
        let mut probe = [0u8; 1];
        match socket.peek_from(&mut probe) {
            Ok(_) => true,
            Err(err) => err.kind() != io::ErrorKind::WouldBlock,
        }
    }
}

impl DatagramSocket for OsDatagram {
    fn bind(&mut self, addr: SocketAddr) -> Status {
        self.unbind();
        match UdpSocket::bind(addr) {
            Ok(socket) => {
                self.socket = Some(socket);
                Status::Done
            }
            Err(err) => {
                debug!("bind to {addr} failed: {err}");
                Status::Error
            }
        }
    }

    fn unbind(&mut self) {
        self.socket = None;
    }

    fn send_to(&mut self, buf: &[u8], target: SocketAddr) -> Status {
        if buf.len() > MAX_DATAGRAM_SIZE {
            return Status::Error;
        }
        let socket = match self.ensure_bound(target) {
            Ok(socket) => socket,
            Err(err) => return Status::from(&err),
        };
        loop {
            return match socket.send_to(buf, target) {
                Ok(n) if n == buf.len() => Status::Done,
                Ok(_) => Status::Partial,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => Status::from(&err),
            };
        }
    }

    fn receive_from(&mut self, buf: &mut [u8]) -> (Status, usize, Option<SocketAddr>) {
        let Some(socket) = self.socket.as_ref() else {
            return (Status::NotReady, 0, None);
        };
        loop {
            return match socket.recv_from(buf) {
                Ok((n, from)) if Self::more_pending(socket) => (Status::Partial, n, Some(from)),
                Ok((n, from)) => (Status::Done, n, Some(from)),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => (Status::from(&err), 0, None),
            };
        }
    }

    fn local_port(&self) -> u16 {
        self.socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map_or(0, |addr| addr.port())
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
pub struct OsListener {
    listener: Option<TcpListener>,
}

impl ListenerSocket for OsListener {
    fn listen(&mut self, addr: SocketAddr) -> Status {
        self.close();
        match TcpListener::bind(addr) {
            Ok(listener) => {
                self.listener = Some(listener);
                Status::Done
            }
            Err(err) => {
                debug!("listen on {addr} failed: {err}");
                Status::Error
            }
        }
    }

    fn close(&mut self) {
        self.listener = None;
    }

    fn accept(&mut self) -> Result<Box<dyn StreamSocket>, Status> {
        let Some(listener) = self.listener.as_ref() else {
            return Err(Status::NotReady);
        };
        loop {
            return match listener.accept() {
                Ok((stream, peer)) => {
                    debug!("accepted connection from {peer}");
                    Ok(Box::new(OsStream {
                        stream: Some(stream),
                    }))
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => Err(Status::from(&err)),
            };
        }
    }

    fn local_port(&self) -> u16 {
        self.listener
            .as_ref()
            .and_then(|l| l.local_addr().ok())
            .map_or(0, |addr| addr.port())
    }
}
