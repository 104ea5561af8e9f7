pub mod loader;
pub mod nametable;
pub mod recurrence;
pub mod registry;
pub mod types;

pub use loader::ScheduleWatcher;
pub use recurrence::{first_run_time, next_run_time};
pub use registry::ScheduleRegistry;
pub use types::{Destination, PendingResolution, ScheduleEntry, ScheduleId, TestSchedule, WatchdogEntry};
