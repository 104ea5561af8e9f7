//! Shared tracing setup for the measurement daemon and its test processes.

mod subscriber;

pub use subscriber::{init, init_with_level};
