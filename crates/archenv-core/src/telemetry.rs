//! Tracing setup

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber filtered by `filter`
///
/// `RUST_LOG` takes precedence when set. Returns `false` if a global
/// subscriber was already installed, which makes repeated calls harmless.
pub fn init_tracing(filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
