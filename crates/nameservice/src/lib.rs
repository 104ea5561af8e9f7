//! Nameservice - local name resolution for measurement test processes
//!
//! Test processes are short-lived and cannot share the daemon's resolver
//! cache directly. This library provides a small binary protocol over a unix
//! stream socket: a client submits a batch of names, the service resolves
//! them concurrently through one shared caching resolver and streams the
//! addresses back.

pub mod client;
pub mod config;
pub mod protocol;
pub mod resolver;
pub mod server;

// Re-export main types
pub use client::ResolverClient;
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use protocol::{AddressFamily, NameQuery, QueryFrame, ResolvedAddress, ResolverCodec};
pub use resolver::{CachingResolver, Lookup};
pub use server::ResolverService;

/// Re-export common error types
pub use anyhow;

/// Nameservice result type using anyhow for error handling
pub type Result<T> = anyhow::Result<T>;

/// Longest name that fits in a single request header.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Environment variable through which test processes learn the socket path.
pub const SOCKET_ENV: &str = "MEASURED_RESOLVER_SOCKET";
