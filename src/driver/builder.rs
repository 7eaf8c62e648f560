use crate::socket::{Backend, OsBackend};

use super::Driver;

////////////////////////////////////////////////////////////////////////////////

/// Tunables of a [`Driver`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// Scratch size of one TCP receive call.
    pub tcp_recv_buffer_size: usize,
    /// Scratch size of one UDP receive call; longer datagrams are truncated.
    pub udp_recv_buffer_size: usize,
}

impl DriverConfig {
    pub const DEFAULT_TCP_RECV_BUFFER_SIZE: usize = 1024;
    pub const DEFAULT_UDP_RECV_BUFFER_SIZE: usize = 65536;
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tcp_recv_buffer_size: Self::DEFAULT_TCP_RECV_BUFFER_SIZE,
            udp_recv_buffer_size: Self::DEFAULT_UDP_RECV_BUFFER_SIZE,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

pub struct DriverBuilder {
    config: DriverConfig,
    backend: Option<Box<dyn Backend>>,
}

impl DriverBuilder {
    pub fn new() -> Self {
        Self {
            config: DriverConfig::default(),
            backend: None,
        }
    }

    pub fn tcp_recv_buffer_size(mut self, size: usize) -> Self {
        self.config.tcp_recv_buffer_size = size.max(1);
        self
    }

    pub fn udp_recv_buffer_size(mut self, size: usize) -> Self {
        self.config.udp_recv_buffer_size = size.max(1);
        self
    }

    /// Sockets created through the driver get their primitives from `backend`.
    pub fn backend(mut self, backend: impl Backend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    pub fn build(self) -> Driver {
        let backend = self.backend.unwrap_or_else(|| Box::new(OsBackend));
        Driver::from_parts(self.config, backend)
    }
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
