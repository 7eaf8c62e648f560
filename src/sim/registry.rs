use std::{cell::RefCell, collections::HashMap, net::SocketAddr, rc::Weak};

use super::{tcp::ListenerEndpoint, udp::UdpEndpoint};

////////////////////////////////////////////////////////////////////////////////

/// Bound addresses of the simulated host, one namespace per protocol.
#[derive(Default)]
pub struct SimRegistry {
    pub udp: HashMap<SocketAddr, Weak<RefCell<UdpEndpoint>>>,
    pub listeners: HashMap<SocketAddr, Weak<RefCell<ListenerEndpoint>>>,
}
