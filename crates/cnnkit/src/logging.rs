//! Logging - Subscriber Setup for Binaries
//!
//! Library crates only emit `tracing` events. Binaries call [`init`] once to
//! print them.
//!
//! @version 0.1.0

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "cnnkit=info";

/// Installs a formatting subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_FILTER`]. Later calls are no-ops.
pub fn init() {
    init_with(DEFAULT_FILTER);
}

/// Like [`init`] with a caller-chosen fallback filter.
pub fn init_with(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // A subscriber installed earlier (e.g. by a test harness) wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init();
        init_with("cnnkit=debug");
        tracing::info!("logging initialised");
    }
}
