use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use clap::Parser;
use nameservice::{NameQuery, ResolverClient};
use rand::seq::SliceRandom;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{TestContext, TestId, TestModule, TestResult};
use crate::schedule::{Destination, PendingResolution};

/// TCP connect latency probe
pub struct TcpPing;

#[derive(Debug, Parser)]
#[command(name = "tcpping")]
struct TcpPingArgs {
    /// Port to connect to
    #[arg(short, long, default_value_t = 80)]
    port: u16,

    /// Connect timeout in seconds
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    /// Extra destinations resolved through the resolution service, NAME[:COUNT]
    #[arg(long = "resolve")]
    resolve: Vec<String>,
}

#[async_trait]
impl TestModule for TcpPing {
    fn id(&self) -> TestId {
        TestId(1)
    }

    fn name(&self) -> &'static str {
        "tcpping"
    }

    fn max_duration(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn run(&self, mut ctx: TestContext) -> anyhow::Result<()> {
        let args = TcpPingArgs::try_parse_from(&ctx.args).context("Invalid tcpping arguments")?;
        let connect_timeout = Duration::from_secs(args.timeout.max(1));

        let mut destinations = std::mem::take(&mut ctx.destinations);
        if !args.resolve.is_empty() {
            destinations.extend(resolve_extra(&ctx, &args.resolve).await);
        }
        destinations.shuffle(&mut ctx.rng);

        let probes = destinations
            .iter()
            .map(|destination| probe(ctx.run_id, destination, args.port, connect_timeout));
        let results = futures::future::join_all(probes).await;

        for result in &results {
            println!("{}", serde_json::to_string(result)?);
        }

        let up = results.iter().filter(|r| r.latency_ms.is_some()).count();
        debug!(run_id = %ctx.run_id, up, total = results.len(), "tcpping finished");
        Ok(())
    }
}

async fn resolve_extra(ctx: &TestContext, names: &[String]) -> Vec<Destination> {
    let Some(socket) = &ctx.resolver_socket else {
        warn!("--resolve given but no resolution service is available");
        return Vec::new();
    };

    let mut queries = Vec::new();
    for name in names {
        match PendingResolution::parse(name) {
            Ok(pending) => queries.push(NameQuery::new(pending.name).with_max_count(pending.max_count)),
            Err(e) => warn!(error = %e, "Ignoring --resolve argument"),
        }
    }

    let resolved = match ResolverClient::connect(socket).await {
        Ok(client) => client.resolve(&queries).await,
        Err(e) => Err(e),
    };

    match resolved {
        Ok(addresses) => addresses.into_iter().map(Destination::from).collect(),
        Err(e) => {
            warn!(socket = %socket.display(), error = %e, "Resolution service request failed");
            Vec::new()
        }
    }
}

async fn probe(run_id: Uuid, destination: &Destination, port: u16, connect_timeout: Duration) -> TestResult {
    let result = TestResult::new(run_id, "tcpping", destination.name.clone(), destination.addr);
    let target = SocketAddr::new(destination.addr, port);
    let start = Instant::now();

    let connected = timeout(connect_timeout, tokio::net::TcpStream::connect(target))
        .await
        .map_err(|_| anyhow!("TCP connection timeout"))
        .and_then(|connect| connect.map_err(|e| anyhow!("TCP connection failed: {}", e)));

    match connected {
        Ok(_stream) => result.success(start.elapsed().as_millis() as u64),
        Err(e) => result.failure(e.to_string()),
    }
}
