///! Helpers to wrangle logging across stratus crates
///! NOTE: [initialize_tracing] should only ever be called in tests or binaries;
///! a library should only concern itself with instrumentation and logging.
use std::sync::Once;

static INITIALIZE_TRACING: Once = Once::new();

const DEFAULT_FILTER: &str = "stratus_core,stratus_app=info,tower_http=debug";

/// Install a global subscriber that honors `RUST_LOG`, falling back to
/// `default_filter` (or a stratus-scoped filter when `None`). Only the first
/// call has any effect.
pub fn initialize_tracing(default_filter: Option<&str>) {
    use tracing_subscriber::prelude::*;
    INITIALIZE_TRACING.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| default_filter.unwrap_or(DEFAULT_FILTER).into());

        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(filter))
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
