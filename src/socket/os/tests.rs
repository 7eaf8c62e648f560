use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use crate::{testing::init_logging, Driver, Status, TcpListener, TcpSocket, UdpSocket};

////////////////////////////////////////////////////////////////////////////////

type Log<T> = Rc<RefCell<Vec<T>>>;

/// Polls until `done` holds or two seconds pass.
fn poll_until(driver: &Driver, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        driver.poll();
        if done() {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn collect_errors(socket: &TcpSocket) -> Log<Status> {
    let errors = Log::default();
    socket.on_error({
        let errors = errors.clone();
        move |status| errors.borrow_mut().push(status)
    });
    errors
}

////////////////////////////////////////////////////////////////////////////////

#[test]
fn refused_connect_reports_error_and_never_connects() {
    init_logging();
    let driver = Driver::new();
    let socket = TcpSocket::new(&driver);
    let errors = collect_errors(&socket);
    let connected = Rc::new(Cell::new(false));
    socket.on_connected({
        let connected = connected.clone();
        move |_| connected.set(true)
    });

    socket.connect("127.0.0.1", unused_port());

    assert!(poll_until(&driver, || !errors.borrow().is_empty()));
    for _ in 0..5 {
        driver.poll();
    }
    assert_eq!(*errors.borrow(), vec![Status::Error]);
    assert!(!connected.get());
    assert_eq!(socket.remote_port(), 0);
}

#[test]
fn loopback_exchange() {
    init_logging();
    let driver = Driver::new();

    let listener = TcpListener::new(&driver);
    assert!(listener.listen_on(0, "127.0.0.1").is_done());
    let port = listener.local_port();
    assert_ne!(port, 0);
    let accepted = Rc::new(RefCell::new(Vec::new()));
    let received = Rc::new(RefCell::new(Vec::new()));
    listener.on_connection({
        let accepted = accepted.clone();
        let received = received.clone();
        move |socket: TcpSocket| {
            socket.on_data_received({
                let received = received.clone();
                move |bytes: &[u8]| received.borrow_mut().extend_from_slice(bytes)
            });
            accepted.borrow_mut().push(socket);
        }
    });

    let client = TcpSocket::new(&driver);
    let errors = collect_errors(&client);
    let connected = Rc::new(Cell::new(0));
    client.on_connected({
        let connected = connected.clone();
        move |socket| {
            connected.set(connected.get() + 1);
            socket.send(b"ping");
        }
    });
    client.connect("127.0.0.1", port);

    assert!(poll_until(&driver, || connected.get() == 1
        && received.borrow().as_slice() == b"ping"));
    assert_eq!(accepted.borrow().len(), 1);
    assert_eq!(client.remote_port(), port);
    assert_eq!(accepted.borrow()[0].remote_port(), client.local_port());

    let reply = Rc::new(RefCell::new(Vec::new()));
    client.on_data_received({
        let reply = reply.clone();
        move |bytes| reply.borrow_mut().extend_from_slice(bytes)
    });
    let message = vec![7u8; 10_000];
    assert_eq!(accepted.borrow()[0].send(&message), message.len());
    assert!(poll_until(&driver, || reply.borrow().len() == message.len()));

    accepted.borrow_mut().clear();
    assert!(poll_until(&driver, || !errors.borrow().is_empty()));
    assert_eq!(*errors.borrow(), vec![Status::Disconnected]);
    assert_eq!(connected.get(), 1);
}

#[test]
fn blocking_connect_completes_on_first_poll() {
    let driver = Driver::new();
    let listener = TcpListener::new(&driver);
    assert!(listener.listen_on(0, "127.0.0.1").is_done());

    let client = TcpSocket::new(&driver);
    let errors = collect_errors(&client);
    let connected = Rc::new(Cell::new(0));
    client.on_connected({
        let connected = connected.clone();
        move |_| connected.set(connected.get() + 1)
    });
    client.connect_timeout("127.0.0.1", listener.local_port(), Duration::from_secs(1));
    assert!(client.is_connecting());

    driver.poll_tcp();

    assert_eq!(connected.get(), 1);
    assert!(errors.borrow().is_empty());
}

#[test]
fn send_without_connection_fails() {
    let driver = Driver::new();
    let socket = TcpSocket::new(&driver);
    let errors = collect_errors(&socket);

    assert_eq!(socket.send(b"nobody"), 0);

    assert_eq!(*errors.borrow(), vec![Status::Error]);
}

////////////////////////////////////////////////////////////////////////////////

// Arrival on a real socket may straddle polls, so only the combined bytes are
// checked here.
#[test]
fn datagram_bytes_arrive_in_order() {
    init_logging();
    let driver = Driver::new();
    let receiver = UdpSocket::new(&driver);
    assert!(receiver.bind_to(0, "127.0.0.1").is_done());
    let port = receiver.local_port();
    let received = Rc::new(RefCell::new(Vec::new()));
    receiver.on_data_received({
        let received = received.clone();
        move |bytes: &[u8]| received.borrow_mut().extend_from_slice(bytes)
    });

    let sender = UdpSocket::new(&driver);
    sender.send(b"hello", "127.0.0.1", port);
    sender.send(b"hello", "127.0.0.1", port);
    assert_ne!(sender.local_port(), 0);

    assert!(poll_until(&driver, || received.borrow().len() >= 10));
    assert_eq!(received.borrow().as_slice(), b"hellohello");
}

#[test]
fn udp_port_in_use() {
    let driver = Driver::new();
    let first = UdpSocket::new(&driver);
    assert!(first.bind_to(0, "127.0.0.1").is_done());
    let second = UdpSocket::new(&driver);

    assert_eq!(second.bind_to(first.local_port(), "127.0.0.1"), Status::Error);

    first.unbind();
    assert_eq!(first.local_port(), 0);
}

#[test]
fn oversized_datagram_fails() {
    let driver = Driver::new();
    let sender = UdpSocket::new(&driver);
    let errors = Log::default();
    sender.on_error({
        let errors = errors.clone();
        move |status| errors.borrow_mut().push(status)
    });

    sender.send(&[0u8; super::MAX_DATAGRAM_SIZE + 1], "127.0.0.1", 9);

    assert_eq!(*errors.borrow(), vec![Status::Error]);
}
