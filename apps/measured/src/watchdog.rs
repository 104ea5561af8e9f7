//! Deadline supervision for running test processes.
//!
//! Every launched child is owned by a reaper task that waits for it to exit.
//! The supervisor never signals a pid directly: when a deadline passes it asks
//! the reaper to terminate the child, and the reaper only does so while the
//! process has not been reaped, so a recycled pid is never hit. Watchdogs are
//! keyed by run id; the pid is only reported.

use std::collections::HashMap;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::schedule::{ScheduleEntry, WatchdogEntry};
use crate::timers::{TimerId, TimerQueue};

/// How long a terminated process may take to exit before it is reported
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// A test process that has been reaped
#[derive(Debug, Clone, Copy)]
pub struct ProcessExit {
    pub run_id: Uuid,
    pub pid: u32,

    /// `None` when waiting on the process failed
    pub status: Option<ExitStatus>,
}

impl ProcessExit {
    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|status| status.code())
    }

    pub fn signal(&self) -> Option<i32> {
        self.status.and_then(|status| status.signal())
    }
}

/// Hand `child` to a reaper task.
///
/// The exit is reported on `exits`. Sending on the returned channel asks the
/// reaper to terminate the process if it is still running.
pub fn supervise(
    mut child: Child,
    pid: u32,
    run_id: Uuid,
    exits: mpsc::UnboundedSender<ProcessExit>,
) -> oneshot::Sender<()> {
    let (terminate_tx, terminate_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            Ok(()) = terminate_rx => {
                if let Some(pid) = child.id() {
                    match send_terminate(pid) {
                        Ok(()) => debug!(pid, "Sent SIGTERM"),
                        Err(e) => warn!(pid, error = %e, "Failed to signal test process"),
                    }
                }

                match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                    Ok(status) => status,
                    Err(_) => {
                        warn!(pid, grace = ?TERMINATE_GRACE, "Test process still running after SIGTERM");
                        child.wait().await
                    }
                }
            }
        };

        let status = match status {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(pid, error = %e, "Failed to wait for test process");
                None
            }
        };

        // The scheduler may already have shut down
        let _ = exits.send(ProcessExit { run_id, pid, status });
    });

    terminate_tx
}

fn send_terminate(pid: u32) -> io::Result<()> {
    let pid = i32::try_from(pid).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: kill(2) has no memory-safety preconditions. The caller owns the
    // unreaped child, so the pid cannot have been reused.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Armed,
    /// Deadline passed and termination was requested
    Expired,
}

struct ArmedWatchdog {
    pid: u32,
    timer: TimerId,
    terminate: Option<oneshot::Sender<()>>,
    state: WatchdogState,
    module: &'static str,
}

/// Exactly one watchdog per live test run
#[derive(Default)]
pub struct WatchdogSupervisor {
    watchdogs: HashMap<Uuid, ArmedWatchdog>,
}

impl WatchdogSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the deadline for run `run_id`, running as `pid`
    pub fn arm(
        &mut self,
        timers: &mut TimerQueue<ScheduleEntry>,
        run_id: Uuid,
        pid: u32,
        deadline: Instant,
        terminate: oneshot::Sender<()>,
        module: &'static str,
    ) {
        let timer = timers.add(deadline, ScheduleEntry::Watchdog(WatchdogEntry { run_id, pid, deadline }));
        let armed = ArmedWatchdog { pid, timer, terminate: Some(terminate), state: WatchdogState::Armed, module };

        if let Some(previous) = self.watchdogs.insert(run_id, armed) {
            warn!(%run_id, pid = previous.pid, "Replaced watchdog for a reused run id");
            timers.cancel(previous.timer);
        }
    }

    /// Deadline for `run_id` reached. Requests termination once; returns the
    /// new state, or `None` if the process was already reaped.
    pub fn expire(&mut self, run_id: Uuid) -> Option<WatchdogState> {
        let watchdog = self.watchdogs.get_mut(&run_id)?;
        if watchdog.state != WatchdogState::Armed {
            return Some(watchdog.state);
        }

        warn!(
            pid = watchdog.pid,
            module = watchdog.module,
            %run_id,
            "Test exceeded its maximum duration, terminating"
        );
        watchdog.state = WatchdogState::Expired;
        if let Some(terminate) = watchdog.terminate.take() {
            let _ = terminate.send(());
        }
        Some(WatchdogState::Expired)
    }

    /// The process of `run_id` was reaped. Removes its watchdog and returns
    /// the state it was in: `Armed` for a normal exit, `Expired` after
    /// termination.
    pub fn disarm(&mut self, timers: &mut TimerQueue<ScheduleEntry>, run_id: Uuid) -> Option<WatchdogState> {
        let watchdog = self.watchdogs.remove(&run_id)?;
        if watchdog.state == WatchdogState::Armed {
            timers.cancel(watchdog.timer);
        }
        debug!(pid = watchdog.pid, module = watchdog.module, from = ?watchdog.state, "Watchdog disarmed");
        Some(watchdog.state)
    }

    pub fn len(&self) -> usize {
        self.watchdogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchdogs.is_empty()
    }

    /// Ask every running test to stop. Returns how many were asked.
    pub fn terminate_all(&mut self) -> usize {
        let mut count = 0;
        for watchdog in self.watchdogs.values_mut() {
            if let Some(terminate) = watchdog.terminate.take() {
                watchdog.state = WatchdogState::Expired;
                if terminate.send(()).is_ok() {
                    count += 1;
                }
            }
        }
        count
    }
}
