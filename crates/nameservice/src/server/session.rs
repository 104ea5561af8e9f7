//! Per-connection resolver session.
//!
//! Every submitted name becomes a task on the runtime. When its lookup
//! completes it pushes a [`Completion`] into the session's queue; the
//! connection worker drains that queue until the outstanding count is zero.
//! The worker is the only owner of the result list, so no lock is needed.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::{NameQuery, ResolvedAddress};
use crate::resolver::Lookup;

/// Lookup result pushed by a finished lookup task
#[derive(Debug)]
pub(crate) struct Completion {
    query: NameQuery,
    addresses: Vec<IpAddr>,
}

pub(crate) struct ResolverSession {
    resolver: Arc<dyn Lookup>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    outstanding: usize,
    results: Vec<ResolvedAddress>,
}

impl ResolverSession {
    pub(crate) fn new(resolver: Arc<dyn Lookup>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self { resolver, completions_tx, completions_rx, outstanding: 0, results: Vec::new() }
    }

    /// Start resolving `query` in the background
    pub(crate) fn submit(&mut self, query: NameQuery) {
        self.outstanding += 1;

        let resolver = Arc::clone(&self.resolver);
        let tx = self.completions_tx.clone();

        tokio::spawn(async move {
            let addresses = resolver.lookup(&query.name).await;
            // The session may already be gone after an I/O error
            let _ = tx.send(Completion { query, addresses });
        });
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Wait for every submitted lookup, returning results in completion order
    pub(crate) async fn settle(&mut self) -> &[ResolvedAddress] {
        while self.outstanding > 0 {
            // The session holds a sender, so this only ends on completion
            let Some(completion) = self.completions_rx.recv().await else {
                break;
            };
            self.outstanding -= 1;
            self.record(completion);
        }

        &self.results
    }

    fn record(&mut self, completion: Completion) {
        let Completion { query, addresses } = completion;
        let selected = query.select(addresses);

        debug!(
            name = %query.name,
            count = selected.len(),
            remaining = self.outstanding,
            "Lookup completed"
        );

        self.results
            .extend(selected.into_iter().map(|addr| ResolvedAddress::new(addr, query.name.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    struct TableLookup {
        table: HashMap<&'static str, Vec<IpAddr>>,
        delays: HashMap<&'static str, Duration>,
    }

    #[async_trait]
    impl Lookup for TableLookup {
        async fn lookup(&self, name: &str) -> Vec<IpAddr> {
            if let Some(delay) = self.delays.get(name) {
                tokio::time::sleep(*delay).await;
            }
            self.table.get(name).cloned().unwrap_or_default()
        }
    }

    fn addrs(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_caps_apply_per_name() {
        let lookup = TableLookup {
            table: HashMap::from([
                ("three.example", addrs(&["192.0.2.1", "192.0.2.2", "192.0.2.3"])),
                ("one.example", addrs(&["198.51.100.1"])),
            ]),
            delays: HashMap::new(),
        };
        let mut session = ResolverSession::new(Arc::new(lookup));

        session.submit(NameQuery::new("three.example").with_max_count(1));
        session.submit(NameQuery::new("one.example").with_max_count(2));
        assert_eq!(session.outstanding(), 2);

        let results = session.settle().await.to_vec();
        assert_eq!(session.outstanding(), 0);
        assert_eq!(results.len(), 2);

        let three: Vec<_> = results.iter().filter(|r| r.name == "three.example").collect();
        let one: Vec<_> = results.iter().filter(|r| r.name == "one.example").collect();
        assert_eq!(three.len(), 1);
        assert_eq!(three[0].addr, "192.0.2.1".parse::<IpAddr>().unwrap());
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn test_results_follow_completion_order() {
        let lookup = TableLookup {
            table: HashMap::from([
                ("slow.example", addrs(&["192.0.2.1"])),
                ("fast.example", addrs(&["192.0.2.2"])),
            ]),
            delays: HashMap::from([("slow.example", Duration::from_millis(100))]),
        };
        let mut session = ResolverSession::new(Arc::new(lookup));

        session.submit(NameQuery::new("slow.example"));
        session.submit(NameQuery::new("fast.example"));

        let names: Vec<String> = session.settle().await.iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["fast.example".to_string(), "slow.example".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_name_contributes_nothing() {
        let lookup = TableLookup {
            table: HashMap::from([("ok.example", addrs(&["192.0.2.9"]))]),
            delays: HashMap::new(),
        };
        let mut session = ResolverSession::new(Arc::new(lookup));

        session.submit(NameQuery::new("missing.example"));
        session.submit(NameQuery::new("ok.example"));

        let results = session.settle().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "ok.example");
    }

    #[tokio::test]
    async fn test_settle_without_submissions_is_empty() {
        let lookup = TableLookup { table: HashMap::new(), delays: HashMap::new() };
        let mut session = ResolverSession::new(Arc::new(lookup));
        assert!(session.settle().await.is_empty());
    }
}
