use std::sync::Arc;

use anyhow::Context;
use nameservice::{CachingResolver, ResolverService};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::executor::{Orchestrator, TestLauncher};
use crate::modules::ModuleRegistry;
use crate::resolve::{HostFamilies, SystemResolver};
use crate::schedule::ScheduleWatcher;
use crate::scheduler::{Scheduler, SchedulerEvent};

/// Run the measurement daemon until SIGINT or SIGTERM
pub async fn run(config: Config) -> anyhow::Result<()> {
    let modules = Arc::new(ModuleRegistry::builtin());
    info!(count = modules.len(), "Test modules registered");

    let lookup = CachingResolver::new(&config.resolver).context("Failed to create caching resolver")?;
    let service = ResolverService::bind(&config.resolver.socket_path, Arc::new(lookup))?;
    let socket_path = service.path().to_path_buf();
    let service_task = service.spawn();
    info!(socket = %socket_path.display(), "Resolution service listening");

    let program = config.runner.program().context("Failed to locate the test runner")?;
    let launcher = TestLauncher::new(program).with_resolver_socket(&socket_path);
    let resolver = SystemResolver::new(HostFamilies::detect());
    let orchestrator = Orchestrator::new(modules.clone(), Arc::new(resolver), launcher);

    let (scheduler, handle) = Scheduler::new(orchestrator);
    let tally = tally_runs(handle.subscribe());
    let scheduler_task = scheduler.spawn();

    let watcher = ScheduleWatcher::new(
        &config.schedule.path,
        config.schedule.check_interval(),
        modules,
        handle.commands(),
    )
    .spawn();
    info!(schedule = %config.schedule.path.display(), "Watching schedule file");

    shutdown_signal().await?;
    info!("Shutdown signal received, stopping");

    watcher.abort();
    handle.shutdown().await;
    if let Err(e) = scheduler_task.await {
        warn!(error = %e, "Scheduler task ended abnormally");
    }
    drop(handle);

    // Dropping the service removes its socket file
    service_task.abort();
    let _ = service_task.await;

    let runs = tally.await.unwrap_or_default();
    info!(started = runs.started, skipped = runs.skipped, terminated = runs.terminated, "Stopped");
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RunTally {
    started: u64,
    skipped: u64,
    terminated: u64,
}

impl RunTally {
    fn record(&mut self, event: &SchedulerEvent) {
        match event {
            SchedulerEvent::RunStarted { .. } => self.started += 1,
            SchedulerEvent::RunSkipped { .. } => self.skipped += 1,
            SchedulerEvent::WatchdogExpired { .. } => self.terminated += 1,
            SchedulerEvent::ScheduleLoaded { .. } | SchedulerEvent::ProcessExited { .. } => {}
        }
    }
}

/// Count scheduler events until every sender is gone
fn tally_runs(mut events: broadcast::Receiver<SchedulerEvent>) -> JoinHandle<RunTally> {
    tokio::spawn(async move {
        let mut tally = RunTally::default();
        loop {
            match events.recv().await {
                Ok(event) => tally.record(&event),
                Err(RecvError::Lagged(missed)) => debug!(missed, "Run tally fell behind"),
                Err(RecvError::Closed) => return tally,
            }
        }
    })
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}
