use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::Destination;

/// Payload written to a test child's stdin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInvocation {
    pub run_id: Uuid,

    /// Module name followed by the scheduled arguments
    pub args: Vec<String>,

    pub destinations: Vec<Destination>,
}

impl TestInvocation {
    pub fn new(module: &str, params: &[String], destinations: Vec<Destination>) -> Self {
        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(module.to_string());
        args.extend(params.iter().cloned());

        Self { run_id: Uuid::new_v4(), args, destinations }
    }

    pub fn module(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}
