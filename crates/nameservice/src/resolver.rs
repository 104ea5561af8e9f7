//! Shared caching resolver used by the service.

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use hickory_resolver::config::{
    LookupIpStrategy, NameServerConfig, Protocol, ResolverConfig, ResolverOpts,
};
use hickory_resolver::{system_conf, TokioAsyncResolver};
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;

const DNS_PORT: u16 = 53;

/// Asynchronous name lookup backend
#[async_trait]
pub trait Lookup: Send + Sync {
    /// Resolve `name` to addresses in resolver order. Failures yield an empty list.
    async fn lookup(&self, name: &str) -> Vec<IpAddr>;
}

/// Caching resolver shared by every connection
///
/// Even with no forwarders configured it still caches, so a batch of test
/// processes starting together only pays the lookup latency once.
#[derive(Clone)]
pub struct CachingResolver {
    inner: TokioAsyncResolver,
}

impl CachingResolver {
    /// Build the resolver from service configuration
    pub fn new(config: &ServiceConfig) -> crate::Result<Self> {
        let (resolver_config, mut opts) = resolver_parts(config);

        opts.cache_size = config.cache_size;
        opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;

        info!(
            nameservers = resolver_config.name_servers().len(),
            cache_size = config.cache_size,
            "Initialising caching resolver"
        );

        Ok(Self { inner: TokioAsyncResolver::tokio(resolver_config, opts) })
    }
}

#[async_trait]
impl Lookup for CachingResolver {
    async fn lookup(&self, name: &str) -> Vec<IpAddr> {
        match self.inner.lookup_ip(name).await {
            Ok(response) => {
                let addresses: Vec<IpAddr> = response.iter().collect();
                debug!(name, count = addresses.len(), "Resolved name");
                addresses
            }
            Err(e) => {
                warn!(name, "Failed to resolve name: {}", e);
                Vec::new()
            }
        }
    }
}

/// Pick nameservers: configured forwarders if any, otherwise the system ones.
/// Outgoing source addresses are applied to whichever set is used.
fn resolver_parts(config: &ServiceConfig) -> (ResolverConfig, ResolverOpts) {
    if !config.nameservers.is_empty() {
        let mut resolver_config = ResolverConfig::new();
        for nameserver in &config.nameservers {
            debug!(%nameserver, "Adding nameserver");
            for protocol in [Protocol::Udp, Protocol::Tcp] {
                let mut server = NameServerConfig::new(SocketAddr::new(*nameserver, DNS_PORT), protocol);
                server.bind_addr = config.outgoing_for(nameserver);
                resolver_config.add_name_server(server);
            }
        }
        return (resolver_config, ResolverOpts::default());
    }

    let (system_config, opts) = match system_conf::read_system_conf() {
        Ok(parts) => parts,
        Err(e) => {
            warn!("Could not read system resolver configuration, using defaults: {}", e);
            (ResolverConfig::default(), ResolverOpts::default())
        }
    };

    if !config.has_outgoing() {
        return (system_config, opts);
    }

    let servers: Vec<NameServerConfig> = system_config
        .name_servers()
        .iter()
        .cloned()
        .map(|mut server| {
            server.bind_addr = config.outgoing_for(&server.socket_addr.ip());
            server
        })
        .collect();

    let resolver_config = ResolverConfig::from_parts(
        system_config.domain().cloned(),
        system_config.search().to_vec(),
        servers,
    );
    (resolver_config, opts)
}
