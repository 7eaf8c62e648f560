//! Primitives replaying scripted statuses, for exact control in tests.

use std::{
    cell::RefCell,
    collections::VecDeque,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    rc::Rc,
    time::Duration,
};

use crate::{
    socket::{DatagramSocket, ListenerSocket, StreamSocket},
    Status,
};

////////////////////////////////////////////////////////////////////////////////

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
pub struct StreamScript {
    pub connects: VecDeque<Status>,
    pub receives: VecDeque<(Status, Vec<u8>)>,
    pub sends: VecDeque<(Status, usize)>,
    pub remote_port: u16,
    pub receive_calls: usize,
    pub connected_to: Vec<SocketAddr>,
    pub sent: Vec<u8>,
    pub disconnects: usize,
}

/// Stream whose script stays reachable from the test after the socket takes
/// ownership of a clone.
#[derive(Clone, Default)]
pub struct ScriptedStream(Rc<RefCell<StreamScript>>);

impl ScriptedStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_connect(&self, status: Status) {
        self.0.borrow_mut().connects.push_back(status);
    }

    pub fn push_receive(&self, status: Status, data: &[u8]) {
        self.0
            .borrow_mut()
            .receives
            .push_back((status, data.to_vec()));
    }

    pub fn push_send(&self, status: Status, sent: usize) {
        self.0.borrow_mut().sends.push_back((status, sent));
    }

    pub fn set_remote_port(&self, port: u16) {
        self.0.borrow_mut().remote_port = port;
    }

    pub fn script(&self) -> std::cell::Ref<'_, StreamScript> {
        self.0.borrow()
    }
}

impl StreamSocket for ScriptedStream {
    fn connect(&mut self, addr: SocketAddr, _timeout: Duration) -> Status {
        let mut script = self.0.borrow_mut();
        script.connected_to.push(addr);
        script.connects.pop_front().unwrap_or(Status::NotReady)
    }

    fn disconnect(&mut self) {
        self.0.borrow_mut().disconnects += 1;
    }

    fn send(&mut self, buf: &[u8]) -> (Status, usize) {
        let mut script = self.0.borrow_mut();
        let (status, sent) = script
            .sends
            .pop_front()
            .unwrap_or((Status::Done, buf.len()));
        let sent = sent.min(buf.len());
        script.sent.extend_from_slice(&buf[..sent]);
        (status, sent)
    }

    fn receive(&mut self, buf: &mut [u8]) -> (Status, usize) {
        let mut script = self.0.borrow_mut();
        script.receive_calls += 1;
        let Some((status, data)) = script.receives.pop_front() else {
            return (Status::NotReady, 0);
        };
        assert!(data.len() <= buf.len(), "scripted chunk exceeds scratch");
        buf[..data.len()].copy_from_slice(&data);
        (status, data.len())
    }

    fn remote_addr(&self) -> Option<IpAddr> {
        (self.0.borrow().remote_port != 0).then_some(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn remote_port(&self) -> u16 {
        self.0.borrow().remote_port
    }

    fn local_port(&self) -> u16 {
        40000
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
pub struct DatagramScript {
    pub receives: VecDeque<(Status, Vec<u8>)>,
    pub sends: VecDeque<Status>,
    pub bound: Option<SocketAddr>,
    pub receive_calls: usize,
    pub sent_to: Vec<(Vec<u8>, SocketAddr)>,
}

#[derive(Clone, Default)]
pub struct ScriptedDatagram(Rc<RefCell<DatagramScript>>);

impl ScriptedDatagram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_receive(&self, status: Status, data: &[u8]) {
        self.0
            .borrow_mut()
            .receives
            .push_back((status, data.to_vec()));
    }

    pub fn push_send(&self, status: Status) {
        self.0.borrow_mut().sends.push_back(status);
    }

    pub fn script(&self) -> std::cell::Ref<'_, DatagramScript> {
        self.0.borrow()
    }
}

impl DatagramSocket for ScriptedDatagram {
    fn bind(&mut self, addr: SocketAddr) -> Status {
        self.0.borrow_mut().bound = Some(addr);
        Status::Done
    }

    fn unbind(&mut self) {
        self.0.borrow_mut().bound = None;
    }

    fn send_to(&mut self, buf: &[u8], target: SocketAddr) -> Status {
        let mut script = self.0.borrow_mut();
        script.sent_to.push((buf.to_vec(), target));
        script.sends.pop_front().unwrap_or(Status::Done)
    }

    fn receive_from(&mut self, buf: &mut [u8]) -> (Status, usize, Option<SocketAddr>) {
        let mut script = self.0.borrow_mut();
        script.receive_calls += 1;
        let Some((status, data)) = script.receives.pop_front() else {
            return (Status::NotReady, 0, None);
        };
        assert!(data.len() <= buf.len(), "scripted datagram exceeds scratch");
        buf[..data.len()].copy_from_slice(&data);
        let sender = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5555);
        (status, data.len(), Some(sender))
    }

    fn local_port(&self) -> u16 {
        self.0.borrow().bound.map_or(0, |addr| addr.port())
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
pub struct ListenerScript {
    pub accepts: VecDeque<Result<ScriptedStream, Status>>,
    pub accept_calls: usize,
    pub listening_on: Option<SocketAddr>,
    pub closes: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedListener(Rc<RefCell<ListenerScript>>);

impl ScriptedListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a connection and returns its stream for inspection.
    pub fn push_connection(&self) -> ScriptedStream {
        let stream = ScriptedStream::new();
        self.0.borrow_mut().accepts.push_back(Ok(stream.clone()));
        stream
    }

    pub fn push_failure(&self, status: Status) {
        self.0.borrow_mut().accepts.push_back(Err(status));
    }

    pub fn script(&self) -> std::cell::Ref<'_, ListenerScript> {
        self.0.borrow()
    }
}

impl ListenerSocket for ScriptedListener {
    fn listen(&mut self, addr: SocketAddr) -> Status {
        self.0.borrow_mut().listening_on = Some(addr);
        Status::Done
    }

    fn close(&mut self) {
        let mut script = self.0.borrow_mut();
        script.listening_on = None;
        script.closes += 1;
    }

    fn accept(&mut self) -> Result<Box<dyn StreamSocket>, Status> {
        let mut script = self.0.borrow_mut();
        script.accept_calls += 1;
        match script.accepts.pop_front() {
            Some(Ok(stream)) => Ok(Box::new(stream)),
            Some(Err(status)) => Err(status),
            None => Err(Status::NotReady),
        }
    }

    fn local_port(&self) -> u16 {
        self.0.borrow().listening_on.map_or(0, |addr| addr.port())
    }
}
