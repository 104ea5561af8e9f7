use std::io::Error as IoError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[source] IoError),
    #[error("Failed to write config file: {0}")]
    Write(#[source] IoError),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("No config directory available, set XDG_CONFIG_HOME or HOME")]
    PathUnavailable,
}

/// Reasons a schedule file or a single test entry is rejected at load time
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Unknown test module '{0}'")]
    UnknownModule(String),
    #[error("Window start {start}ms is not before window end {end}ms")]
    EmptyWindow { start: u64, end: u64 },
    #[error("Window end {end}ms lies beyond the {cycle}ms repeat cycle")]
    WindowBeyondCycle { end: u64, cycle: u64 },
    #[error("Window start {0}ms is never reached without a repeat cycle")]
    DelayedUnboundedWindow(u64),
    #[error("Interval must be greater than zero")]
    ZeroInterval,
    #[error("Test has no destinations")]
    NoTargets,
    #[error("{count} destinations exceeds the limit of {max} for {module}")]
    TooManyTargets { module: String, count: usize, max: usize },
    #[error("Invalid target '{0}'")]
    InvalidTarget(String),
    #[error("Failed to read schedule file: {0}")]
    Read(#[from] IoError),
    #[error("Failed to parse schedule file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to start test process: {0}")]
    Spawn(#[source] IoError),
    #[error("Failed to encode test invocation: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Test process exited before it could be supervised")]
    Vanished,
}
