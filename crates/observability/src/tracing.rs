//! Process-wide tracing setup.

use tracing_subscriber::{EnvFilter, fmt};

/// Install the JSON log subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Repeated calls are
/// harmless: only the first install wins.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .json()
        .flatten_event(true)
        .try_init();
}
