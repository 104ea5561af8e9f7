//! Statically configured names, resolved when the schedule is loaded.

use std::collections::HashMap;
use std::net::IpAddr;

use super::types::{Destination, PendingResolution};

#[derive(Debug, Default, Clone)]
pub struct NameTable {
    names: HashMap<String, Vec<IpAddr>>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address for `name`, keeping any it already has
    pub fn insert(&mut self, name: impl Into<String>, addr: IpAddr) {
        let addresses = self.names.entry(name.into()).or_default();
        if !addresses.contains(&addr) {
            addresses.push(addr);
        }
    }

    /// Every address configured for `name`, in the order they were added
    pub fn lookup(&self, name: &str) -> Option<&[IpAddr]> {
        self.names.get(name).map(Vec::as_slice)
    }

    /// Fixed destinations for a target naming a table entry
    pub fn destinations(&self, target: &PendingResolution) -> Option<Vec<Destination>> {
        let addresses = self.lookup(&target.name)?;
        Some(target.cap(addresses.iter().map(|addr| Destination::new(*addr, &target.name))))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_table_has_no_names() {
        let table = NameTable::new();
        assert_eq!(table.len(), 0);
        assert_eq!(table.lookup("test.target.name1"), None);
    }

    #[test]
    fn test_same_name_accumulates_addresses() {
        let mut table = NameTable::new();
        table.insert("test.target.name1", addr("130.217.250.13"));
        assert_eq!(table.lookup("test.target.name1"), Some(&[addr("130.217.250.13")][..]));

        table.insert("test.target.name1", addr("2001:df0:4:4000:230:48ff:fe7f:5544"));
        assert_eq!(
            table.lookup("test.target.name1"),
            Some(&[addr("130.217.250.13"), addr("2001:df0:4:4000:230:48ff:fe7f:5544")][..])
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_earlier_names_survive_new_inserts() {
        let mut table = NameTable::new();
        table.insert("test.target.name1", addr("130.217.250.13"));
        table.insert("test.target.name1", addr("2001:df0:4:4000:230:48ff:fe7f:5544"));
        table.insert("test.target.name2", addr("8.8.8.8"));

        assert_eq!(table.lookup("test.target.name2"), Some(&[addr("8.8.8.8")][..]));
        assert_eq!(table.lookup("test.target.name1").map(<[IpAddr]>::len), Some(2));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_duplicate_address_is_stored_once() {
        let mut table = NameTable::new();
        table.insert("a", addr("192.0.2.1"));
        table.insert("a", addr("192.0.2.1"));
        assert_eq!(table.lookup("a").map(<[IpAddr]>::len), Some(1));
    }

    #[test]
    fn test_destinations_carry_configured_name_and_cap() {
        let mut table = NameTable::new();
        table.insert("mirror", addr("192.0.2.1"));
        table.insert("mirror", addr("192.0.2.2"));
        table.insert("mirror", addr("2001:db8::3"));

        let capped = table.destinations(&PendingResolution { name: "mirror".into(), max_count: 2 }).unwrap();
        assert_eq!(
            capped,
            vec![Destination::new(addr("192.0.2.1"), "mirror"), Destination::new(addr("192.0.2.2"), "mirror")]
        );

        let all = table.destinations(&PendingResolution { name: "mirror".into(), max_count: 0 }).unwrap();
        assert_eq!(all.len(), 3);

        assert!(table.destinations(&PendingResolution { name: "other".into(), max_count: 0 }).is_none());
    }
}
