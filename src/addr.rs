////////////////////////////////////////////////////////////////////////////////

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::{Error, Result};

////////////////////////////////////////////////////////////////////////////////

/// Anything a socket operation accepts as a remote or local IP address.
///
/// Host names are not resolved, only IP literals are accepted.
pub trait ToIpAddr {
    fn to_ip_addr(&self) -> Result<IpAddr>;
}

////////////////////////////////////////////////////////////////////////////////

impl ToIpAddr for IpAddr {
    fn to_ip_addr(&self) -> Result<IpAddr> {
        Ok(*self)
    }
}

impl ToIpAddr for Ipv4Addr {
    fn to_ip_addr(&self) -> Result<IpAddr> {
        Ok(IpAddr::V4(*self))
    }
}

impl ToIpAddr for Ipv6Addr {
    fn to_ip_addr(&self) -> Result<IpAddr> {
        Ok(IpAddr::V6(*self))
    }
}

impl ToIpAddr for str {
    fn to_ip_addr(&self) -> Result<IpAddr> {
        self.parse::<IpAddr>()
            .map_err(|_| Error::InvalidAddress(self.to_owned()))
    }
}

impl ToIpAddr for String {
    fn to_ip_addr(&self) -> Result<IpAddr> {
        self.as_str().to_ip_addr()
    }
}

impl<T: ToIpAddr + ?Sized> ToIpAddr for &T {
    fn to_ip_addr(&self) -> Result<IpAddr> {
        (**self).to_ip_addr()
    }
}

////////////////////////////////////////////////////////////////////////////////
