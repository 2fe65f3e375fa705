use core::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Addresses and ports of one EtherNet/IP adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnipEndpoint {
    pub ip: Ipv4Addr,
    pub multicast_group: Ipv4Addr,
    pub explicit_port: u16,
    pub io_port: u16,
    pub connect_timeout: Duration,
}

impl EnipEndpoint {
    pub const EXPLICIT_DEFAULT_PORT: u16 = 44818;
    pub const IO_DEFAULT_PORT: u16 = 2222;
    pub const DEFAULT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 1);
    pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 192, 1, 3);

    pub fn new(ip: Ipv4Addr, multicast_group: Ipv4Addr) -> Self {
        Self {
            ip,
            multicast_group,
            explicit_port: Self::EXPLICIT_DEFAULT_PORT,
            io_port: Self::IO_DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_explicit_port(mut self, port: u16) -> Self {
        self.explicit_port = port;
        self
    }

    pub fn with_io_port(mut self, port: u16) -> Self {
        self.io_port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn explicit_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.explicit_port))
    }

    pub fn io_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.io_port))
    }

    /// Wildcard address the multicast receive socket binds to.
    pub fn io_bind_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.io_port))
    }
}

impl Default for EnipEndpoint {
    fn default() -> Self {
        Self::new(Self::DEFAULT_IP, Self::DEFAULT_MULTICAST_GROUP)
    }
}

impl fmt::Display for EnipEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} (io {} via {})",
            self.ip, self.explicit_port, self.io_port, self.multicast_group
        )
    }
}
