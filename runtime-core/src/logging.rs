//! Structured boot and request logging, shared by every binary and integration test in
//! the workspace.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `tracing` subscriber. Honors `RUST_LOG`/`LOG_LEVEL`, defaulting to
/// `info`, and emits JSON records so log aggregation doesn't need a custom parser.
///
/// Safe to call more than once per process (tests call it from multiple modules); later
/// calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into())))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
