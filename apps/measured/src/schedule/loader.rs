//! Schedule file parsing and change detection.
//!
//! ```toml
//! [[name]]
//! name = "mirror.example"
//! addresses = ["192.0.2.20", "2001:db8::20"]
//!
//! [[test]]
//! module = "tcpping"
//! repeat = "daily"
//! start_ms = 3600000
//! end_ms = 7200000
//! interval_ms = 600000
//! targets = ["192.0.2.10", "mirror.example", "example.com:2"]
//! args = ["--port", "443"]
//! ```

use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::nametable::NameTable;
use super::registry::ScheduleRegistry;
use super::types::{Repeat, ScheduleId, Target, TestSchedule};
use crate::error::ScheduleError;
use crate::modules::ModuleRegistry;
use crate::scheduler::SchedulerCommand;

#[derive(Debug, Deserialize)]
struct ScheduleFile {
    #[serde(default, rename = "name")]
    names: Vec<NameEntry>,
    #[serde(default, rename = "test")]
    tests: Vec<TestEntry>,
}

#[derive(Debug, Deserialize)]
struct NameEntry {
    name: String,
    addresses: Vec<IpAddr>,
}

#[derive(Debug, Deserialize)]
struct TestEntry {
    module: String,
    #[serde(default)]
    repeat: Repeat,
    #[serde(default)]
    start_ms: u64,
    end_ms: Option<u64>,
    interval_ms: u64,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    args: Vec<String>,
}

impl TestEntry {
    fn into_schedule(self, modules: &ModuleRegistry, names: &NameTable) -> Result<TestSchedule, ScheduleError> {
        let module = modules
            .by_name(&self.module)
            .ok_or_else(|| ScheduleError::UnknownModule(self.module.clone()))?;

        let mut destinations = Vec::new();
        let mut pending = Vec::new();
        for target in &self.targets {
            match Target::parse(target, names)? {
                Target::Fixed(fixed) => destinations.extend(fixed),
                Target::Pending(resolution) => pending.push(resolution),
            }
        }

        Ok(TestSchedule {
            id: ScheduleId::default(),
            module: module.id(),
            repeat: self.repeat,
            window_start_ms: self.start_ms,
            window_end_ms: self.end_ms.unwrap_or(self.repeat.cycle_ms().unwrap_or(u64::MAX)),
            interval_ms: self.interval_ms,
            destinations,
            pending,
            params: self.args,
        })
    }
}

/// Parse a schedule file, skipping tests that fail validation
pub fn parse_schedule(contents: &str, modules: &ModuleRegistry) -> Result<ScheduleRegistry, ScheduleError> {
    let file: ScheduleFile = toml::from_str(contents)?;

    let mut names = NameTable::new();
    for entry in file.names {
        for addr in entry.addresses {
            names.insert(entry.name.as_str(), addr);
        }
    }
    debug!(names = names.len(), "Name table built");

    let mut registry = ScheduleRegistry::new();
    for (index, entry) in file.tests.into_iter().enumerate() {
        let module = entry.module.clone();
        let result = entry
            .into_schedule(modules, &names)
            .and_then(|schedule| registry.insert(schedule, modules));

        if let Err(e) = result {
            warn!(index, module = %module, error = %e, "Skipping invalid test");
        }
    }

    Ok(registry)
}

pub async fn load_schedule(path: &Path, modules: &ModuleRegistry) -> Result<ScheduleRegistry, ScheduleError> {
    let contents = tokio::fs::read_to_string(path).await?;
    parse_schedule(&contents, modules)
}

/// Polls the schedule file and hands a fresh registry to the scheduler
/// whenever it changes
pub struct ScheduleWatcher {
    path: PathBuf,
    interval: Duration,
    modules: Arc<ModuleRegistry>,
    commands: mpsc::Sender<SchedulerCommand>,
    fingerprint: Option<(SystemTime, u64)>,
}

impl ScheduleWatcher {
    pub fn new(
        path: impl Into<PathBuf>,
        interval: Duration,
        modules: Arc<ModuleRegistry>,
        commands: mpsc::Sender<SchedulerCommand>,
    ) -> Self {
        Self { path: path.into(), interval, modules, commands, fingerprint: None }
    }

    /// Reload the schedule if the file changed since the last check.
    /// Returns true when a new registry was sent to the scheduler.
    pub async fn check(&mut self) -> bool {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.fingerprint.take().is_none() {
                    debug!(path = %self.path.display(), "No schedule file");
                    return false;
                }
                warn!(path = %self.path.display(), "Schedule file removed, clearing schedule");
                return self.send(ScheduleRegistry::new()).await;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to stat schedule file");
                return false;
            }
        };

        let fingerprint = (metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH), metadata.len());
        if self.fingerprint == Some(fingerprint) {
            return false;
        }
        self.fingerprint = Some(fingerprint);

        match load_schedule(&self.path, &self.modules).await {
            Ok(registry) => {
                info!(path = %self.path.display(), tests = registry.len(), "Schedule loaded");
                self.send(registry).await
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Keeping previous schedule");
                false
            }
        }
    }

    async fn send(&self, registry: ScheduleRegistry) -> bool {
        self.commands.send(SchedulerCommand::Load(registry)).await.is_ok()
    }

    /// Check immediately, then every `interval` until the scheduler goes away
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            loop {
                timer.tick().await;
                if self.commands.is_closed() {
                    debug!("Scheduler stopped, schedule watcher exiting");
                    break;
                }
                self.check().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::TestId;
    use crate::schedule::types::{DAY_MS, Destination, PendingResolution};

    const SCHEDULE: &str = r#"
[[test]]
module = "tcpping"
repeat = "daily"
start_ms = 3600000
end_ms = 7200000
interval_ms = 600000
targets = ["192.0.2.10", "example.com:2"]
args = ["--port", "443"]

[[test]]
module = "no-such-probe"
interval_ms = 1000
targets = ["192.0.2.11"]

[[test]]
module = "tcpping"
interval_ms = 1000
targets = []

[[test]]
module = "tcpping"
repeat = "daily"
interval_ms = 60000
targets = ["2001:db8::7"]
"#;

    #[test]
    fn test_invalid_tests_are_skipped() {
        let registry = parse_schedule(SCHEDULE, &ModuleRegistry::builtin()).unwrap();
        assert_eq!(registry.len(), 2);

        let first = &registry.entries()[0];
        assert_eq!(first.module, TestId(1));
        assert_eq!(first.repeat, Repeat::Daily);
        assert_eq!((first.window_start_ms, first.window_end_ms), (3_600_000, 7_200_000));
        assert_eq!(first.destinations.len(), 1);
        assert_eq!(first.pending.len(), 1);
        assert_eq!(first.pending[0].max_count, 2);
        assert_eq!(first.params, vec!["--port".to_string(), "443".to_string()]);
    }

    #[test]
    fn test_window_end_defaults_to_cycle() {
        let registry = parse_schedule(SCHEDULE, &ModuleRegistry::builtin()).unwrap();
        let last = &registry.entries()[1];
        assert_eq!((last.window_start_ms, last.window_end_ms), (0, DAY_MS));
    }

    #[test]
    fn test_unbounded_repeat_with_late_start_is_skipped() {
        let schedule = r#"
[[test]]
module = "tcpping"
repeat = "none"
start_ms = 1000
interval_ms = 3600000
targets = ["192.0.2.1"]
"#;
        let registry = parse_schedule(schedule, &ModuleRegistry::builtin()).unwrap();
        assert_eq!(registry.len(), 0);
    }

    const NAMED: &str = r#"
[[name]]
name = "mirror.example"
addresses = ["192.0.2.20", "2001:db8::20"]

[[name]]
name = "mirror.example"
addresses = ["192.0.2.21"]

[[test]]
module = "tcpping"
interval_ms = 1000
targets = ["mirror.example:2", "other.example"]
"#;

    #[test]
    fn test_named_targets_are_fixed_at_load() {
        let registry = parse_schedule(NAMED, &ModuleRegistry::builtin()).unwrap();
        let entry = &registry.entries()[0];

        assert_eq!(
            entry.destinations,
            vec![
                Destination::new("192.0.2.20".parse().unwrap(), "mirror.example"),
                Destination::new("2001:db8::20".parse().unwrap(), "mirror.example"),
            ]
        );
        assert_eq!(entry.pending, vec![PendingResolution { name: "other.example".into(), max_count: 0 }]);
    }

    #[test]
    fn test_reload_rebuilds_name_table() {
        let modules = ModuleRegistry::builtin();
        parse_schedule(NAMED, &modules).unwrap();

        let without_names = NAMED.split("[[test]]").nth(1).map(|rest| format!("[[test]]{rest}")).unwrap();
        let registry = parse_schedule(&without_names, &modules).unwrap();
        let entry = &registry.entries()[0];

        assert!(entry.destinations.is_empty());
        assert_eq!(entry.pending.len(), 2);
        assert_eq!(entry.pending[0], PendingResolution { name: "mirror.example".into(), max_count: 2 });
    }

    #[test]
    fn test_bad_name_address_is_a_parse_error() {
        let result = parse_schedule("[[name]]\nname = \"x\"\naddresses = [\"not-an-ip\"]\n", &ModuleRegistry::builtin());
        assert!(matches!(result, Err(ScheduleError::Parse(_))));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let result = parse_schedule("[[test]\nmodule = ", &ModuleRegistry::builtin());
        assert!(matches!(result, Err(ScheduleError::Parse(_))));
    }

    #[tokio::test]
    async fn test_watcher_reloads_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.toml");
        let (tx, mut rx) = mpsc::channel(4);
        let mut watcher =
            ScheduleWatcher::new(&path, Duration::from_secs(1), Arc::new(ModuleRegistry::builtin()), tx);

        assert!(!watcher.check().await);

        std::fs::write(&path, "[[test]]\nmodule = \"tcpping\"\ninterval_ms = 1000\ntargets = [\"192.0.2.1\"]\n")
            .unwrap();
        assert!(watcher.check().await);
        assert!(matches!(rx.recv().await, Some(SchedulerCommand::Load(r)) if r.len() == 1));

        assert!(!watcher.check().await);

        std::fs::write(&path, SCHEDULE).unwrap();
        assert!(watcher.check().await);
        assert!(matches!(rx.recv().await, Some(SchedulerCommand::Load(r)) if r.len() == 2));

        std::fs::remove_file(&path).unwrap();
        assert!(watcher.check().await);
        assert!(matches!(rx.recv().await, Some(SchedulerCommand::Load(r)) if r.is_empty()));
    }
}
