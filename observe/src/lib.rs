//! Tracing setup for binaries and tests that use Tendril.
//!
//! Filters come from `RUST_LOG` when set; otherwise [`DEFAULT_FILTER`] applies.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

pub const DEFAULT_FILTER: &str = "info,tendril_runtime=debug";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize a human-readable stdout subscriber for development.
pub fn init_stdout_tracing() -> Result<(), anyhow::Error> {
    Registry::default()
        .with(env_filter(DEFAULT_FILTER))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}

/// Initialize a JSON subscriber, one object per line, with span context.
pub fn init_json_tracing() -> Result<(), anyhow::Error> {
    Registry::default()
        .with(env_filter(DEFAULT_FILTER))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true),
        )
        .try_init()?;
    Ok(())
}

/// Test-friendly subscriber: output goes through the test harness capture,
/// and repeated calls across tests are harmless.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .try_init();
}
