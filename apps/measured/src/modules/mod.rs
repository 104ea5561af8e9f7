//! Test modules - pluggable probes run inside child processes
//!
//! This module is responsible for:
//! - The contract every probe implements
//! - The registry mapping test ids to probes
//! - The child-side entry point that decodes an invocation and runs a probe

pub mod invocation;
pub mod runner;
pub mod tcpping;
pub mod types;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use uuid::Uuid;

use crate::schedule::Destination;

pub use invocation::TestInvocation;
pub use runner::run_test;
pub use types::{ProbeStatus, TestResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestId(pub u16);

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a module sees when it runs
pub struct TestContext {
    pub run_id: Uuid,

    /// Module name followed by the scheduled arguments
    pub args: Vec<String>,

    /// Never empty
    pub destinations: Vec<Destination>,

    /// Resolution service endpoint, when the daemon runs one
    pub resolver_socket: Option<PathBuf>,

    /// Seeded from OS entropy in the child
    pub rng: StdRng,
}

#[async_trait]
pub trait TestModule: Send + Sync {
    fn id(&self) -> TestId;

    fn name(&self) -> &'static str;

    /// Maximum destinations per run, 0 for no limit
    fn max_targets(&self) -> usize {
        0
    }

    /// Runs still alive after this long are terminated
    fn max_duration(&self) -> Duration;

    async fn run(&self, ctx: TestContext) -> anyhow::Result<()>;
}

/// Test modules by id, built once at startup
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<TestId, Arc<dyn TestModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every module shipped in this binary
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(tcpping::TcpPing));
        registry
    }

    /// Add a module, returning any module previously registered under its id
    pub fn register(&mut self, module: Arc<dyn TestModule>) -> Option<Arc<dyn TestModule>> {
        self.modules.insert(module.id(), module)
    }

    pub fn get(&self, id: TestId) -> Option<&Arc<dyn TestModule>> {
        self.modules.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<dyn TestModule>> {
        self.modules.values().find(|module| module.name() == name)
    }

    /// Modules ordered by id
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn TestModule>> {
        let mut modules: Vec<_> = self.modules.values().collect();
        modules.sort_by_key(|module| module.id());
        modules.into_iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(|module| module.name())).finish()
    }
}
