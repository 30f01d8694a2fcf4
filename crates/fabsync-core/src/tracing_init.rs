//! Shared tracing/logging initialization.
//!
//! The daemon binary and the integration test harness use the same pattern
//! for setting up `tracing_subscriber` with an env-filter and optional JSON
//! output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the env-filter, preferring `RUST_LOG` over `default_filter`.
fn env_filter(default_filter: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    )
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"fabsync_daemon=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter(default_filter))
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter(default_filter))
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Install a test-writer subscriber, ignoring the error if one is already set.
///
/// Lets `cargo test -- --nocapture` show engine logs without every test
/// fighting over the global default.
pub fn try_init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("fabsync_daemon=debug,fabsync_core=debug"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
