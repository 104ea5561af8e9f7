//! Configuration data structures for the resolution service.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Number of records kept by the shared resolver cache
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Configuration options for the resolution service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Filesystem path of the listening unix socket
    pub socket_path: PathBuf,

    /// Nameservers to forward queries to, empty means the system configuration
    pub nameservers: Vec<IpAddr>,

    /// Source address for queries sent over IPv4
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outgoing_v4: Option<Ipv4Addr>,

    /// Source address for queries sent over IPv6
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outgoing_v6: Option<Ipv6Addr>,

    /// Records held in the resolver cache
    pub cache_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: std::env::temp_dir().join("measured").join("resolver.sock"),
            nameservers: Vec::new(),
            outgoing_v4: None,
            outgoing_v6: None,
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl ServiceConfig {
    /// Create a new configuration builder
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }
}

/// Builder for ServiceConfig
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    pub(crate) config: ServiceConfig,
}
