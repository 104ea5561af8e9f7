use std::env::var;
use std::io::stderr;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init() {
    init_with_level(LevelFilter::INFO);
}

/// Install the global subscriber. `RUST_LOG` overrides `level`, and
/// `RUST_LOG_FORMAT=json` switches to one JSON object per line.
///
/// Everything is written to stderr: test processes own stdout for their
/// result records.
pub fn init_with_level(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(stderr)
            .with_filter(env_filter)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(stderr)
            .with_filter(env_filter)
            .boxed(),
    };

    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        warn!("Tracing subscriber already installed, keeping the existing one");
    }
}
