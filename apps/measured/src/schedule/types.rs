use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use nameservice::ResolvedAddress;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use super::nametable::NameTable;
use crate::error::ScheduleError;
use crate::modules::TestId;

pub const HOUR_MS: u64 = 60 * 60 * 1000;
pub const DAY_MS: u64 = 24 * HOUR_MS;
pub const WEEK_MS: u64 = 7 * DAY_MS;

/// Repeat cycle of a scheduled test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    /// One unbounded cycle
    #[default]
    None,
    Hourly,
    Daily,
    Weekly,
}

impl Repeat {
    /// Cycle length in milliseconds, `None` for the unbounded cycle
    pub const fn cycle_ms(self) -> Option<u64> {
        match self {
            Repeat::None => None,
            Repeat::Hourly => Some(HOUR_MS),
            Repeat::Daily => Some(DAY_MS),
            Repeat::Weekly => Some(WEEK_MS),
        }
    }
}

impl fmt::Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repeat::None => write!(f, "none"),
            Repeat::Hourly => write!(f, "hourly"),
            Repeat::Daily => write!(f, "daily"),
            Repeat::Weekly => write!(f, "weekly"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ScheduleId(pub u64);

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A resolved endpoint handed to a test module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub addr: IpAddr,

    /// Name as configured in the schedule; results are reported under this
    /// name rather than whatever canonical name the resolver returned
    pub name: String,
}

impl Destination {
    pub fn new(addr: IpAddr, name: impl Into<String>) -> Self {
        Self { addr, name: name.into() }
    }
}

impl From<ResolvedAddress> for Destination {
    fn from(resolved: ResolvedAddress) -> Self {
        Self { addr: resolved.addr, name: resolved.name }
    }
}

/// A name resolved afresh each time the test runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResolution {
    pub name: String,

    /// Maximum addresses used for this name, 0 means all of them
    pub max_count: u8,
}

impl PendingResolution {
    /// Parse `name` or `name:count`
    pub fn parse(spec: &str) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidTarget(spec.to_string());

        let (name, max_count) = match spec.rsplit_once(':') {
            Some((name, count)) => (name, count.parse::<u8>().map_err(|_| invalid())?),
            None => (spec, 0),
        };

        if name.is_empty() || name.len() > nameservice::MAX_NAME_LEN {
            return Err(invalid());
        }

        Ok(Self { name: name.to_string(), max_count })
    }

    /// Keep at most `max_count` of `addresses`, in the order given
    pub fn cap<T>(&self, addresses: impl IntoIterator<Item = T>) -> Vec<T> {
        let limit = match self.max_count {
            0 => usize::MAX,
            n => usize::from(n),
        };
        addresses.into_iter().take(limit).collect()
    }
}

/// Where a configured target comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Fixed(Vec<Destination>),
    Pending(PendingResolution),
}

impl Target {
    /// An IP literal or a name in `names` is fixed, anything else is resolved
    /// at run time
    pub fn parse(spec: &str, names: &NameTable) -> Result<Self, ScheduleError> {
        let spec = spec.trim();
        if let Ok(addr) = spec.parse::<IpAddr>() {
            return Ok(Target::Fixed(vec![Destination::new(addr, spec)]));
        }

        let pending = PendingResolution::parse(spec)?;
        Ok(match names.destinations(&pending) {
            Some(destinations) => Target::Fixed(destinations),
            None => Target::Pending(pending),
        })
    }
}

/// A recurring test run as loaded from the schedule
#[derive(Debug, Clone)]
pub struct TestSchedule {
    pub id: ScheduleId,
    pub module: TestId,
    pub repeat: Repeat,

    /// Window offsets into the repeat cycle, end exclusive
    pub window_start_ms: u64,
    pub window_end_ms: u64,

    /// Minimum time between runs
    pub interval_ms: u64,

    pub destinations: Vec<Destination>,
    pub pending: Vec<PendingResolution>,

    /// Passed to the module after its name
    pub params: Vec<String>,
}

impl TestSchedule {
    pub fn has_targets(&self) -> bool {
        !self.destinations.is_empty() || !self.pending.is_empty()
    }
}

/// Deadline for one running test process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogEntry {
    pub run_id: Uuid,
    pub pid: u32,
    pub deadline: Instant,
}

/// Payload of every timer the scheduler arms
#[derive(Debug, Clone)]
pub enum ScheduleEntry {
    TestRun(Arc<TestSchedule>),
    Watchdog(WatchdogEntry),
}

impl ScheduleEntry {
    pub fn is_test_run(&self) -> bool {
        matches!(self, ScheduleEntry::TestRun(_))
    }
}
