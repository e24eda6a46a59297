//! Tracing subscriber setup.

use tracing_subscriber::{
    EnvFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

pub const DEFAULT_LEVEL: &str = "warn";

/// Installs the global subscriber, writing to stderr. `RUST_LOG` wins over
/// `level`. Later calls are no-ops.
pub fn init_logging(level: Option<&str>) {
    let level = level
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(DEFAULT_LEVEL);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}
