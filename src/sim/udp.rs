use std::{
    cell::RefCell,
    collections::VecDeque,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    rc::Rc,
};

use crate::{
    socket::{os::MAX_DATAGRAM_SIZE, DatagramSocket},
    Status,
};

use super::SimNetworkHandle;

////////////////////////////////////////////////////////////////////////////////

#[derive(PartialEq, Eq, Debug)]
pub struct Datagram {
    pub from: SocketAddr,
    pub data: Vec<u8>,
}

/// Bound address of a simulated datagram socket and its receive queue.
///
/// The queue is bounded by the payload bytes it holds, not by the number of
/// datagrams.
pub struct UdpEndpoint {
    pub local_addr: SocketAddr,
    queue: VecDeque<Datagram>,
    queued_bytes: usize,
    limit: usize,
}

impl UdpEndpoint {
    pub fn new(local_addr: SocketAddr, limit: usize) -> Self {
        Self {
            local_addr,
            queue: VecDeque::new(),
            queued_bytes: 0,
            limit,
        }
    }

    /// Queues `datagram`, handing it back when the queue has no room left.
    pub fn deliver(&mut self, datagram: Datagram) -> Result<(), Datagram> {
        let queued_bytes = self.queued_bytes + datagram.data.len();
        if queued_bytes > self.limit {
            return Err(datagram);
        }
        self.queued_bytes = queued_bytes;
        self.queue.push_back(datagram);
        Ok(())
    }

    fn pop(&mut self) -> Option<Datagram> {
        let datagram = self.queue.pop_front()?;
        self.queued_bytes -= datagram.data.len();
        Some(datagram)
    }

    fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Datagram socket of a [`super::SimNetwork`].
pub struct SimDatagram {
    net: SimNetworkHandle,
    endpoint: Option<Rc<RefCell<UdpEndpoint>>>,
}

impl SimDatagram {
    pub fn new(net: SimNetworkHandle) -> Self {
        Self {
            net,
            endpoint: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().map(|e| e.borrow().local_addr)
    }
}

impl DatagramSocket for SimDatagram {
    fn bind(&mut self, addr: SocketAddr) -> Status {
        self.unbind();
        match self.net.bind_udp(addr) {
            Ok(endpoint) => {
                self.endpoint = Some(endpoint);
                Status::Done
            }
            Err(status) => status,
        }
    }

    fn unbind(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            self.net.unbind_udp(endpoint.borrow().local_addr);
        }
    }

    fn send_to(&mut self, buf: &[u8], target: SocketAddr) -> Status {
        if buf.len() > MAX_DATAGRAM_SIZE {
            return Status::Error;
        }
        if self.endpoint.is_none() {
            let any = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
            let status = self.bind(any);
            if status != Status::Done {
                return status;
            }
        }
        match self.local_addr() {
            Some(from) => self.net.send_datagram(from, target, buf),
            None => Status::Error,
        }
    }

    fn receive_from(&mut self, buf: &mut [u8]) -> (Status, usize, Option<SocketAddr>) {
        let Some(endpoint) = self.endpoint.as_ref() else {
            return (Status::NotReady, 0, None);
        };
        let mut endpoint = endpoint.borrow_mut();
        let Some(datagram) = endpoint.pop() else {
            return (Status::NotReady, 0, None);
        };
        // the tail of a datagram longer than `buf` is lost
        let len = datagram.data.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram.data[..len]);
        let status = if endpoint.has_pending() {
            Status::Partial
        } else {
            Status::Done
        };
        (status, len, Some(datagram.from))
    }

    fn local_port(&self) -> u16 {
        self.local_addr().map_or(0, |addr| addr.port())
    }
}

impl Drop for SimDatagram {
    fn drop(&mut self) {
        self.unbind();
    }
}

////////////////////////////////////////////////////////////////////////////////
