use std::sync::Arc;

use tracing::debug;

use super::types::{ScheduleId, TestSchedule};
use crate::error::ScheduleError;
use crate::modules::ModuleRegistry;

/// Validated test schedules
///
/// Only the loader mutates a registry; the scheduler receives it whole and
/// never modifies the entries it reads.
#[derive(Debug, Default, Clone)]
pub struct ScheduleRegistry {
    entries: Vec<Arc<TestSchedule>>,
    next_id: u64,
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a schedule, assigning it a fresh id
    pub fn insert(
        &mut self,
        mut schedule: TestSchedule,
        modules: &ModuleRegistry,
    ) -> Result<ScheduleId, ScheduleError> {
        validate(&schedule, modules)?;

        self.next_id += 1;
        schedule.id = ScheduleId(self.next_id);
        debug!(
            schedule = %schedule.id,
            module = %schedule.module,
            repeat = %schedule.repeat,
            "Schedule entry added"
        );

        let id = schedule.id;
        self.entries.push(Arc::new(schedule));
        Ok(id)
    }

    pub fn entries(&self) -> &[Arc<TestSchedule>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Checks a schedule must pass before it may be scheduled
pub fn validate(schedule: &TestSchedule, modules: &ModuleRegistry) -> Result<(), ScheduleError> {
    let module = modules
        .get(schedule.module)
        .ok_or_else(|| ScheduleError::UnknownModule(schedule.module.to_string()))?;

    if schedule.window_start_ms >= schedule.window_end_ms {
        return Err(ScheduleError::EmptyWindow {
            start: schedule.window_start_ms,
            end: schedule.window_end_ms,
        });
    }

    match schedule.repeat.cycle_ms() {
        Some(cycle) if schedule.window_end_ms > cycle => {
            return Err(ScheduleError::WindowBeyondCycle { end: schedule.window_end_ms, cycle });
        }
        None if schedule.window_start_ms > 0 => {
            return Err(ScheduleError::DelayedUnboundedWindow(schedule.window_start_ms));
        }
        _ => {}
    }

    if schedule.interval_ms == 0 {
        return Err(ScheduleError::ZeroInterval);
    }

    if !schedule.has_targets() {
        return Err(ScheduleError::NoTargets);
    }

    let max = module.max_targets();
    if max > 0 && schedule.destinations.len() > max {
        return Err(ScheduleError::TooManyTargets {
            module: module.name().to_string(),
            count: schedule.destinations.len(),
            max,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::TestId;
    use crate::schedule::types::{Destination, PendingResolution, Repeat, HOUR_MS};

    fn schedule() -> TestSchedule {
        TestSchedule {
            id: ScheduleId::default(),
            module: TestId(1),
            repeat: Repeat::Hourly,
            window_start_ms: 0,
            window_end_ms: HOUR_MS,
            interval_ms: 60_000,
            destinations: vec![Destination::new("192.0.2.1".parse().unwrap(), "192.0.2.1")],
            pending: Vec::new(),
            params: Vec::new(),
        }
    }

    #[test]
    fn test_insert_assigns_ids() {
        let modules = ModuleRegistry::builtin();
        let mut registry = ScheduleRegistry::new();

        let first = registry.insert(schedule(), &modules).unwrap();
        let second = registry.insert(schedule(), &modules).unwrap();

        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.entries()[1].id, second);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_rejects_malformed_entries() {
        let modules = ModuleRegistry::builtin();
        let mut registry = ScheduleRegistry::new();

        let mut zero_width = schedule();
        zero_width.window_start_ms = 5_000;
        zero_width.window_end_ms = 5_000;
        assert!(matches!(registry.insert(zero_width, &modules), Err(ScheduleError::EmptyWindow { .. })));

        let mut too_long = schedule();
        too_long.window_end_ms = HOUR_MS + 1;
        assert!(matches!(
            registry.insert(too_long, &modules),
            Err(ScheduleError::WindowBeyondCycle { .. })
        ));

        let mut no_interval = schedule();
        no_interval.interval_ms = 0;
        assert!(matches!(registry.insert(no_interval, &modules), Err(ScheduleError::ZeroInterval)));

        let mut no_targets = schedule();
        no_targets.destinations.clear();
        assert!(matches!(registry.insert(no_targets, &modules), Err(ScheduleError::NoTargets)));

        let mut unknown = schedule();
        unknown.module = TestId(999);
        assert!(matches!(registry.insert(unknown, &modules), Err(ScheduleError::UnknownModule(_))));

        assert!(registry.is_empty());
    }

    #[test]
    fn test_pending_only_is_a_destination_source() {
        let modules = ModuleRegistry::builtin();
        let mut entry = schedule();
        entry.destinations.clear();
        entry.pending.push(PendingResolution { name: "example.com".into(), max_count: 1 });

        assert!(validate(&entry, &modules).is_ok());
    }

    #[test]
    fn test_unbounded_repeat_accepts_any_window_end() {
        let modules = ModuleRegistry::builtin();
        let mut entry = schedule();
        entry.repeat = Repeat::None;
        entry.window_end_ms = u64::MAX;

        assert!(validate(&entry, &modules).is_ok());
    }

    #[test]
    fn test_unbounded_repeat_rejects_late_window_start() {
        let modules = ModuleRegistry::builtin();
        let mut entry = schedule();
        entry.repeat = Repeat::None;
        entry.window_start_ms = 1_000;
        entry.window_end_ms = u64::MAX;
        entry.interval_ms = HOUR_MS;

        assert!(matches!(validate(&entry, &modules), Err(ScheduleError::DelayedUnboundedWindow(1_000))));
    }
}
