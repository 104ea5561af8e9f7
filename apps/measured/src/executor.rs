//! Execution orchestrator: resolves destinations for a due entry and
//! launches its test in a child process.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::LaunchError;
use crate::modules::{ModuleRegistry, TestInvocation};
use crate::resolve::{NameResolver, resolve_pending};
use crate::schedule::{Destination, TestSchedule};

/// Starts test child processes
#[derive(Debug, Clone)]
pub struct TestLauncher {
    program: PathBuf,
    leading_args: Vec<String>,
    resolver_socket: Option<PathBuf>,
}

impl TestLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), leading_args: Vec::new(), resolver_socket: None }
    }

    /// Arguments placed before `run-test <module>`
    #[cfg(test)]
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resolver_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.resolver_socket = Some(path.into());
        self
    }

    /// Start `program [leading args] run-test <module>` and feed it the invocation
    pub fn launch(&self, module: &str, invocation: &TestInvocation) -> Result<Child, LaunchError> {
        let payload = serde_json::to_vec(invocation)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .arg("run-test")
            .arg(module)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(socket) = &self.resolver_socket {
            command.env(nameservice::SOCKET_ENV, socket);
        }

        let mut child = command.spawn().map_err(LaunchError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            let run_id = invocation.run_id;
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    warn!(%run_id, error = %e, "Failed to write invocation to test process");
                }
                // Dropping stdin closes the pipe
            });
        }

        Ok(child)
    }
}

/// Why a due run did not start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownModule,
    NoDestinations,
    LaunchFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownModule => write!(f, "unknown module"),
            SkipReason::NoDestinations => write!(f, "no destinations"),
            SkipReason::LaunchFailed => write!(f, "launch failed"),
        }
    }
}

#[derive(Debug)]
pub struct StartedRun {
    pub run_id: Uuid,
    pub pid: u32,
    pub child: Child,
    pub module: &'static str,
    pub max_duration: Duration,
}

#[derive(Debug)]
pub enum FireOutcome {
    Started(StartedRun),
    Skipped(SkipReason),
}

/// Turns a due schedule entry into a running test process
pub struct Orchestrator {
    modules: Arc<ModuleRegistry>,
    resolver: Arc<dyn NameResolver>,
    launcher: TestLauncher,
}

impl Orchestrator {
    pub fn new(modules: Arc<ModuleRegistry>, resolver: Arc<dyn NameResolver>, launcher: TestLauncher) -> Self {
        Self { modules, resolver, launcher }
    }

    /// Fixed destinations followed by freshly resolved pending ones
    pub async fn destinations_for(&self, schedule: &TestSchedule) -> Vec<Destination> {
        let mut destinations = schedule.destinations.clone();
        if !schedule.pending.is_empty() {
            destinations.extend(resolve_pending(self.resolver.as_ref(), &schedule.pending).await);
        }
        destinations
    }

    pub async fn fire(&self, schedule: &TestSchedule) -> FireOutcome {
        let Some(module) = self.modules.get(schedule.module) else {
            error!(schedule = %schedule.id, module = %schedule.module, "Test module is not registered");
            return FireOutcome::Skipped(SkipReason::UnknownModule);
        };

        let mut destinations = self.destinations_for(schedule).await;
        if destinations.is_empty() {
            warn!(schedule = %schedule.id, module = module.name(), "No destinations, skipping run");
            return FireOutcome::Skipped(SkipReason::NoDestinations);
        }

        let max = module.max_targets();
        if max > 0 && destinations.len() > max {
            warn!(
                schedule = %schedule.id,
                module = module.name(),
                count = destinations.len(),
                max,
                "Too many destinations, truncating"
            );
            destinations.truncate(max);
        }

        let invocation = TestInvocation::new(module.name(), &schedule.params, destinations);
        let run_id = invocation.run_id;

        let started = self.launcher.launch(module.name(), &invocation).and_then(|child| {
            let pid = child.id().ok_or(LaunchError::Vanished)?;
            Ok((child, pid))
        });

        match started {
            Ok((child, pid)) => {
                debug!(
                    schedule = %schedule.id,
                    module = module.name(),
                    %run_id,
                    pid,
                    destinations = invocation.destinations.len(),
                    "Test process started"
                );
                FireOutcome::Started(StartedRun {
                    run_id,
                    pid,
                    child,
                    module: module.name(),
                    max_duration: module.max_duration(),
                })
            }
            Err(e) => {
                error!(schedule = %schedule.id, module = module.name(), error = %e, "Failed to start test");
                FireOutcome::Skipped(SkipReason::LaunchFailed)
            }
        }
    }
}
