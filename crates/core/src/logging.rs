//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,lantern=debug,naga=warn";

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise lantern crates log at `debug`
/// and everything else at `info`. Calling this twice is harmless: the
/// second installation attempt is ignored.
///
/// # Example
/// ```
/// lantern_core::init_logging();
/// tracing::info!("renderer starting");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
