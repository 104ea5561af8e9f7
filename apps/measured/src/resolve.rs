//! Run-time resolution of pending destinations.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::schedule::{Destination, PendingResolution};

#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Addresses for `name` in resolver order
    async fn resolve(&self, name: &str) -> io::Result<Vec<IpAddr>>;
}

/// Address families this host can reach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFamilies {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl Default for HostFamilies {
    fn default() -> Self {
        Self { ipv4: true, ipv6: true }
    }
}

impl HostFamilies {
    /// Probe for a route in each family. A connected UDP socket sends no
    /// packets, it only asks the kernel for a route.
    pub fn detect() -> Self {
        let probe = |bind: IpAddr, target: IpAddr| {
            UdpSocket::bind(SocketAddr::new(bind, 0))
                .and_then(|socket| socket.connect(SocketAddr::new(target, 53)))
                .is_ok()
        };

        let families = Self {
            ipv4: probe(Ipv4Addr::UNSPECIFIED.into(), Ipv4Addr::new(192, 0, 2, 1).into()),
            ipv6: probe(Ipv6Addr::UNSPECIFIED.into(), Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1).into()),
        };

        if !families.ipv4 && !families.ipv6 {
            warn!("No route in either address family, allowing both");
            return Self::default();
        }

        debug!(ipv4 = families.ipv4, ipv6 = families.ipv6, "Usable address families");
        families
    }

    pub fn allows(&self, addr: &IpAddr) -> bool {
        match addr {
            IpAddr::V4(_) => self.ipv4,
            IpAddr::V6(_) => self.ipv6,
        }
    }
}

/// Resolves through the operating system resolver
#[derive(Debug, Clone, Default)]
pub struct SystemResolver {
    families: HostFamilies,
}

impl SystemResolver {
    pub fn new(families: HostFamilies) -> Self {
        Self { families }
    }
}

#[async_trait]
impl NameResolver for SystemResolver {
    async fn resolve(&self, name: &str) -> io::Result<Vec<IpAddr>> {
        let mut addresses: Vec<IpAddr> = Vec::new();

        for socket_addr in tokio::net::lookup_host((name, 0)).await? {
            let addr = socket_addr.ip();
            if self.families.allows(&addr) && !addresses.contains(&addr) {
                addresses.push(addr);
            }
        }

        Ok(addresses)
    }
}

/// Resolve every pending name, applying its cap. Names that fail contribute
/// nothing and do not affect the others.
pub async fn resolve_pending(resolver: &dyn NameResolver, pending: &[PendingResolution]) -> Vec<Destination> {
    let mut destinations = Vec::new();

    for resolution in pending {
        match resolver.resolve(&resolution.name).await {
            Ok(addresses) => {
                let selected = resolution.cap(addresses);
                if selected.is_empty() {
                    warn!(name = %resolution.name, "Name resolved to no usable addresses");
                }
                destinations.extend(selected.into_iter().map(|addr| Destination::new(addr, &resolution.name)));
            }
            Err(e) => {
                warn!(name = %resolution.name, error = %e, "Failed to resolve destination, skipping");
            }
        }
    }

    destinations
}
