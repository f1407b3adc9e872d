//! Tracing setup and the prelude imported by task modules.

use tracing_subscriber::EnvFilter;

/// Initialise the global subscriber from a `--log-level` style string.
///
/// Unknown levels fall back to `info`. `RUST_LOG` still wins when set, so
/// per-module filtering remains available in the field.
pub fn init(level: &str) {
    let level = match level {
        "debug" | "info" | "warn" | "error" | "trace" => level,
        _ => "info",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
}
