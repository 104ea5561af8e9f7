//! Integration tests for the resolution service
//!
//! These run the real unix socket listener against a fixed lookup table.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nameservice::{Lookup, NameQuery, ResolvedAddress, ResolverClient, ResolverCodec, ResolverService};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

struct TableLookup {
    table: HashMap<String, Vec<IpAddr>>,
    calls: AtomicUsize,
}

impl TableLookup {
    fn new(entries: &[(&str, &[&str])]) -> Self {
        let table = entries
            .iter()
            .map(|(name, addrs)| {
                (name.to_string(), addrs.iter().map(|a| a.parse().unwrap()).collect())
            })
            .collect();
        Self { table, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Lookup for TableLookup {
    async fn lookup(&self, name: &str) -> Vec<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table.get(name).cloned().unwrap_or_default()
    }
}

/// Answers only after the client has had time to hang up
struct SlowLookup {
    inner: TableLookup,
    delay: Duration,
}

#[async_trait]
impl Lookup for SlowLookup {
    async fn lookup(&self, name: &str) -> Vec<IpAddr> {
        tokio::time::sleep(self.delay).await;
        self.inner.lookup(name).await
    }
}

fn socket_path(dir: &TempDir) -> PathBuf {
    dir.path().join("resolver.sock")
}

fn start(dir: &TempDir, lookup: Arc<dyn Lookup>) -> tokio::task::JoinHandle<()> {
    let _ = tracing_subscriber::fmt::try_init();
    ResolverService::bind(socket_path(dir), lookup).unwrap().spawn()
}

#[tokio::test]
async fn test_zero_names_returns_zero_entries() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = Arc::new(TableLookup::new(&[]));
    let _service = start(&dir, lookup.clone());

    let client = ResolverClient::connect(socket_path(&dir)).await.unwrap();
    let results = client.resolve(&[]).await.unwrap();

    assert!(results.is_empty());
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_caps_limit_each_name_independently() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = Arc::new(TableLookup::new(&[
        ("many.example", &["192.0.2.1", "192.0.2.2", "192.0.2.3"]),
        ("single.example", &["198.51.100.1"]),
    ]));
    let _service = start(&dir, lookup);

    let client = ResolverClient::connect(socket_path(&dir)).await.unwrap();
    let results = client
        .resolve(&[
            NameQuery::new("many.example").with_max_count(1),
            NameQuery::new("single.example").with_max_count(2),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.contains(&ResolvedAddress::new("192.0.2.1".parse().unwrap(), "many.example")));
    assert!(results.contains(&ResolvedAddress::new("198.51.100.1".parse().unwrap(), "single.example")));
}

#[tokio::test]
async fn test_unresolvable_name_does_not_affect_others() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = Arc::new(TableLookup::new(&[("good.example", &["2001:db8::1"])]));
    let _service = start(&dir, lookup);

    let client = ResolverClient::connect(socket_path(&dir)).await.unwrap();
    let results = client
        .resolve(&[NameQuery::new("bad.example"), NameQuery::new("good.example")])
        .await
        .unwrap();

    assert_eq!(results, vec![ResolvedAddress::new("2001:db8::1".parse().unwrap(), "good.example")]);
}

#[tokio::test]
async fn test_last_name_header_terminates_the_request_phase() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = Arc::new(TableLookup::new(&[("only.example", &["192.0.2.44"])]));
    let _service = start(&dir, lookup);

    let mut stream = UnixStream::connect(socket_path(&dir)).await.unwrap();
    let mut codec = ResolverCodec;
    codec.write_request(&mut stream, &NameQuery::new("only.example"), false).await.unwrap();

    let (entry, more) = codec.read_response(&mut stream).await.unwrap().unwrap();
    assert_eq!(entry.name, "only.example");
    assert!(!more);
    assert!(codec.read_response(&mut stream).await.unwrap().is_none());
}

#[tokio::test]
async fn test_broken_client_does_not_stop_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = Arc::new(TableLookup::new(&[("after.example", &["192.0.2.80"])]));
    let _service = start(&dir, lookup);

    // Half a header, then hang up
    let mut broken = UnixStream::connect(socket_path(&dir)).await.unwrap();
    broken.write_all(&[12, 0]).await.unwrap();
    drop(broken);

    let client = ResolverClient::connect(socket_path(&dir)).await.unwrap();
    let results = client.resolve(&[NameQuery::new("after.example")]).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_client_gone_before_responses_does_not_stop_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let many: Vec<String> = (1..=64).map(|i| format!("192.0.2.{i}")).collect();
    let many: Vec<&str> = many.iter().map(String::as_str).collect();
    let lookup = Arc::new(SlowLookup {
        inner: TableLookup::new(&[("many.example", &many), ("after.example", &["198.51.100.9"])]),
        delay: Duration::from_millis(200),
    });
    let _service = start(&dir, lookup);

    // Submit a complete request, then hang up before any response is written
    let mut gone = UnixStream::connect(socket_path(&dir)).await.unwrap();
    let mut codec = ResolverCodec;
    codec.write_request(&mut gone, &NameQuery::new("many.example"), true).await.unwrap();
    codec.write_request(&mut gone, &NameQuery::new("many.example").with_max_count(32), false).await.unwrap();
    drop(gone);

    tokio::time::sleep(Duration::from_millis(400)).await;

    let client = ResolverClient::connect(socket_path(&dir)).await.unwrap();
    let results = client.resolve(&[NameQuery::new("after.example")]).await.unwrap();
    assert_eq!(results, vec![ResolvedAddress::new("198.51.100.9".parse().unwrap(), "after.example")]);
}

#[tokio::test]
async fn test_stale_socket_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(socket_path(&dir), b"left over").unwrap();

    let lookup = Arc::new(TableLookup::new(&[]));
    let _service = start(&dir, lookup);

    let client = ResolverClient::connect(socket_path(&dir)).await.unwrap();
    assert!(client.resolve(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_socket_file_removed_when_service_stops() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = Arc::new(TableLookup::new(&[]));
    let service = start(&dir, lookup);
    assert!(socket_path(&dir).exists());

    service.abort();
    let _ = service.await;

    assert!(!socket_path(&dir).exists());
}
