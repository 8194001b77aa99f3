//! Tracing setup shared by the workspace binaries.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "trade_import=info,cli=info,settings_loader=info";

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, or [`DEFAULT_FILTER`]
/// when unset. Calling it twice is harmless.
pub fn init() {
    init_with_default(DEFAULT_FILTER);
}

pub fn init_with_default(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
