//! Scheduler - the single loop that owns every timer
//!
//! One task selects over the earliest timer deadline, child exit
//! notifications and loader commands, so no two of them are ever handled
//! at the same time. Test runs and watchdogs share one timer queue.


use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::executor::{FireOutcome, Orchestrator, SkipReason};
use crate::schedule::{
    ScheduleEntry, ScheduleId, ScheduleRegistry, TestSchedule, WatchdogEntry, first_run_time, next_run_time,
};
use crate::timers::TimerQueue;
use crate::watchdog::{ProcessExit, TERMINATE_GRACE, WatchdogState, WatchdogSupervisor, supervise};

const COMMAND_CAPACITY: usize = 16;
const EVENT_CAPACITY: usize = 64;

pub enum SchedulerCommand {
    /// Replace every scheduled test run
    Load(ScheduleRegistry),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    ScheduleLoaded { entries: usize },
    RunStarted { schedule: ScheduleId, run_id: Uuid, pid: u32 },
    RunSkipped { schedule: ScheduleId, reason: SkipReason },
    WatchdogExpired { run_id: Uuid, pid: u32 },
    ProcessExited { run_id: Uuid, pid: u32, code: Option<i32>, signal: Option<i32>, after_expiry: bool },
}

/// Sends commands to a running scheduler and subscribes to its events
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl SchedulerHandle {
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SchedulerCommand::Shutdown).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn commands(&self) -> mpsc::Sender<SchedulerCommand> {
        self.commands.clone()
    }
}

pub struct Scheduler {
    orchestrator: Orchestrator,
    timers: TimerQueue<ScheduleEntry>,
    watchdogs: WatchdogSupervisor,
    commands: mpsc::Receiver<SchedulerCommand>,
    exits_tx: mpsc::UnboundedSender<ProcessExit>,
    exits_rx: mpsc::UnboundedReceiver<ProcessExit>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl Scheduler {
    pub fn new(orchestrator: Orchestrator) -> (Self, SchedulerHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = SchedulerHandle { commands: commands_tx, events: events.clone() };
        let scheduler = Self {
            orchestrator,
            timers: TimerQueue::new(),
            watchdogs: WatchdogSupervisor::new(),
            commands,
            exits_tx,
            exits_rx,
            events,
        };
        (scheduler, handle)
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("Scheduler started");

        loop {
            let deadline = self.timers.next_deadline();

            tokio::select! {
                _ = sleep_until_deadline(deadline) => self.fire_due().await,
                Some(exit) = self.exits_rx.recv() => self.handle_exit(exit),
                command = self.commands.recv() => match command {
                    Some(SchedulerCommand::Load(registry)) => self.load(registry),
                    Some(SchedulerCommand::Shutdown) | None => break,
                },
            }
        }

        self.shutdown().await;
    }

    fn load(&mut self, registry: ScheduleRegistry) {
        // Running tests keep their watchdogs
        self.timers.retain(|entry| !entry.is_test_run());

        let now_ms = wall_clock_ms();
        for schedule in registry.entries() {
            let first = first_run_time(
                now_ms,
                schedule.repeat,
                schedule.window_start_ms,
                schedule.window_end_ms,
                schedule.interval_ms,
            );
            self.schedule_at(Arc::clone(schedule), first, now_ms);
        }

        if registry.is_empty() {
            info!("Schedule is empty, no tests will run");
        } else {
            info!(entries = registry.len(), timers = self.timers.len(), "Schedule applied");
        }
        self.publish(SchedulerEvent::ScheduleLoaded { entries: registry.len() });
    }

    async fn fire_due(&mut self) {
        let now = Instant::now();

        while let Some((_, entry)) = self.timers.pop_expired(now) {
            match entry {
                ScheduleEntry::TestRun(schedule) => self.run_test(schedule).await,
                ScheduleEntry::Watchdog(WatchdogEntry { run_id, pid, deadline }) => {
                    debug!(%run_id, pid, late = ?now.saturating_duration_since(deadline), "Watchdog deadline reached");
                    if self.watchdogs.expire(run_id) == Some(WatchdogState::Expired) {
                        self.publish(SchedulerEvent::WatchdogExpired { run_id, pid });
                    }
                }
            }
        }
    }

    async fn run_test(&mut self, schedule: Arc<TestSchedule>) {
        match self.orchestrator.fire(&schedule).await {
            FireOutcome::Started(run) => {
                let terminate = supervise(run.child, run.pid, run.run_id, self.exits_tx.clone());
                let deadline = Instant::now() + run.max_duration;
                self.watchdogs.arm(&mut self.timers, run.run_id, run.pid, deadline, terminate, run.module);

                self.publish(SchedulerEvent::RunStarted { schedule: schedule.id, run_id: run.run_id, pid: run.pid });
            }
            FireOutcome::Skipped(reason) => {
                self.publish(SchedulerEvent::RunSkipped { schedule: schedule.id, reason });
            }
        }

        // Rescheduled right away; a run that overruns may overlap the next
        let now_ms = wall_clock_ms();
        let next = next_run_time(
            now_ms,
            schedule.repeat,
            schedule.window_start_ms,
            schedule.window_end_ms,
            schedule.interval_ms,
        );
        self.schedule_at(schedule, next, now_ms);
    }

    fn schedule_at(&mut self, schedule: Arc<TestSchedule>, at_ms: Option<u64>, now_ms: u64) {
        let Some(at_ms) = at_ms else {
            info!(schedule = %schedule.id, module = %schedule.module, "Test will not run again");
            return;
        };

        let Some(deadline) = Instant::now().checked_add(Duration::from_millis(at_ms.saturating_sub(now_ms))) else {
            warn!(schedule = %schedule.id, at_ms, "Next run is too far in the future");
            return;
        };

        debug!(schedule = %schedule.id, in_ms = at_ms.saturating_sub(now_ms), "Next run scheduled");
        self.timers.add(deadline, ScheduleEntry::TestRun(schedule));
    }

    fn handle_exit(&mut self, exit: ProcessExit) {
        let after_expiry = self.watchdogs.disarm(&mut self.timers, exit.run_id) == Some(WatchdogState::Expired);

        match (exit.code(), exit.signal()) {
            (Some(0), _) => debug!(pid = exit.pid, "Test process finished"),
            (Some(code), _) => warn!(pid = exit.pid, code, "Test process failed"),
            (None, Some(signal)) if after_expiry => info!(pid = exit.pid, signal, "Overrunning test terminated"),
            (None, Some(signal)) => warn!(pid = exit.pid, signal, "Test process killed by signal"),
            (None, None) => warn!(pid = exit.pid, "Test process exit status unknown"),
        }

        self.publish(SchedulerEvent::ProcessExited {
            run_id: exit.run_id,
            pid: exit.pid,
            code: exit.code(),
            signal: exit.signal(),
            after_expiry,
        });
    }

    async fn shutdown(&mut self) {
        let signalled = self.watchdogs.terminate_all();
        info!(running = signalled, "Scheduler stopping");

        let deadline = Instant::now() + TERMINATE_GRACE;
        while !self.watchdogs.is_empty() {
            match tokio::time::timeout_at(deadline, self.exits_rx.recv()).await {
                Ok(Some(exit)) => self.handle_exit(exit),
                _ => {
                    warn!(remaining = self.watchdogs.len(), "Test processes still running at shutdown");
                    break;
                }
            }
        }
    }

    fn publish(&self, event: SchedulerEvent) {
        // Ignore errors if there are no receivers
        let _ = self.events.send(event);
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Milliseconds since the unix epoch
fn wall_clock_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
