//! Configuration methods for the resolution service.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use super::types::{ServiceConfig, ServiceConfigBuilder};

impl ServiceConfig {
    /// Source address to bind when talking to `nameserver`, if one is configured
    pub fn outgoing_for(&self, nameserver: &IpAddr) -> Option<SocketAddr> {
        match nameserver {
            IpAddr::V4(_) => self.outgoing_v4.map(|addr| SocketAddr::new(IpAddr::V4(addr), 0)),
            IpAddr::V6(_) => self.outgoing_v6.map(|addr| SocketAddr::new(IpAddr::V6(addr), 0)),
        }
    }

    /// Whether any outgoing source address is pinned
    pub fn has_outgoing(&self) -> bool {
        self.outgoing_v4.is_some() || self.outgoing_v6.is_some()
    }
}

impl ServiceConfigBuilder {
    /// Build the configuration
    pub fn build(self) -> ServiceConfig {
        self.config
    }

    /// Set socket path
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.socket_path = path.into();
        self
    }

    /// Add a forwarding nameserver
    pub fn nameserver(mut self, addr: IpAddr) -> Self {
        self.config.nameservers.push(addr);
        self
    }

    /// Pin the IPv4 source address
    pub fn outgoing_v4(mut self, addr: Ipv4Addr) -> Self {
        self.config.outgoing_v4 = Some(addr);
        self
    }

    /// Pin the IPv6 source address
    pub fn outgoing_v6(mut self, addr: Ipv6Addr) -> Self {
        self.config.outgoing_v6 = Some(addr);
        self
    }

    /// Set cache size
    pub fn cache_size(mut self, size: usize) -> Self {
        self.config.cache_size = size;
        self
    }
}
