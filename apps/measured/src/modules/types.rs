use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of probing one destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Down,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Up => write!(f, "up"),
            ProbeStatus::Down => write!(f, "down"),
        }
    }
}

/// Result record a test module writes to stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Run this result belongs to
    pub run_id: Uuid,

    pub module: String,

    /// Destination name as scheduled
    pub target: String,

    pub address: IpAddr,

    /// When the probe was made
    pub timestamp: DateTime<Utc>,

    pub status: ProbeStatus,

    /// Response time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,

    /// Error message (if the probe failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TestResult {
    pub fn new(run_id: Uuid, module: impl Into<String>, target: impl Into<String>, address: IpAddr) -> Self {
        Self {
            run_id,
            module: module.into(),
            target: target.into(),
            address,
            timestamp: Utc::now(),
            status: ProbeStatus::Down,
            latency_ms: None,
            error_message: None,
        }
    }

    /// Mark the probe as successful with latency
    pub fn success(mut self, latency_ms: u64) -> Self {
        self.status = ProbeStatus::Up;
        self.latency_ms = Some(latency_ms);
        self.error_message = None;
        self
    }

    /// Mark the probe as failed with error
    pub fn failure(mut self, error: String) -> Self {
        self.status = ProbeStatus::Down;
        self.latency_ms = None;
        self.error_message = Some(error);
        self
    }
}
