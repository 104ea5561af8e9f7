//! Protocol message types for the resolver socket.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Address family requested by a client or carried by a response record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// Either family, whatever the resolver returns
    #[default]
    Unspec,
    Inet,
    Inet6,
}

impl AddressFamily {
    /// Family byte used on the wire
    pub const fn to_wire(self) -> u8 {
        match self {
            AddressFamily::Unspec => 0,
            AddressFamily::Inet => 4,
            AddressFamily::Inet6 => 6,
        }
    }

    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(AddressFamily::Unspec),
            4 => Some(AddressFamily::Inet),
            6 => Some(AddressFamily::Inet6),
            _ => None,
        }
    }

    /// Family of a concrete address
    pub const fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Inet,
            IpAddr::V6(_) => AddressFamily::Inet6,
        }
    }

    /// Whether `addr` satisfies a request for this family
    pub fn accepts(self, addr: &IpAddr) -> bool {
        self == AddressFamily::Unspec || self == AddressFamily::of(addr)
    }

    /// Number of address octets for a concrete family
    pub const fn address_len(self) -> Option<usize> {
        match self {
            AddressFamily::Unspec => None,
            AddressFamily::Inet => Some(4),
            AddressFamily::Inet6 => Some(16),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Unspec => write!(f, "unspec"),
            AddressFamily::Inet => write!(f, "inet"),
            AddressFamily::Inet6 => write!(f, "inet6"),
        }
    }
}

/// A single name a client wants resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameQuery {
    /// Name exactly as the schedule configured it
    pub name: String,

    /// Restrict results to this family
    pub family: AddressFamily,

    /// Upper bound on addresses returned for this name, 0 means no bound
    pub max_count: u8,
}

impl NameQuery {
    /// Query for any family with no cap
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), family: AddressFamily::Unspec, max_count: 0 }
    }

    /// Set the address cap
    pub fn with_max_count(mut self, max_count: u8) -> Self {
        self.max_count = max_count;
        self
    }

    /// Restrict to a family
    pub fn with_family(mut self, family: AddressFamily) -> Self {
        self.family = family;
        self
    }

    /// Apply family filter and cap to raw resolver output, keeping resolver order
    pub fn select(&self, addresses: impl IntoIterator<Item = IpAddr>) -> Vec<IpAddr> {
        let limit = match self.max_count {
            0 => usize::MAX,
            n => usize::from(n),
        };

        addresses
            .into_iter()
            .filter(|addr| self.family.accepts(addr))
            .take(limit)
            .collect()
    }
}

/// One decoded request header plus its name, if the header carried one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFrame {
    pub query: Option<NameQuery>,

    /// Another request follows this one
    pub more: bool,
}

/// A resolved address as sent back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub addr: IpAddr,

    /// The query name, not the resolver's canonical name
    pub name: String,

    /// Reserved, always zero
    pub flags: u8,
}

impl ResolvedAddress {
    pub fn new(addr: IpAddr, name: impl Into<String>) -> Self {
        Self { addr, name: name.into(), flags: 0 }
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.addr)
    }
}
