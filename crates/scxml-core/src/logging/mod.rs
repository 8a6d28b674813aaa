//! Structured logging with `tracing`.
//!
//! Log output goes to stderr so it never interleaves with the status lines
//! commands print on stdout. `RUST_LOG` takes precedence over the configured
//! level.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at startup. Subsequent calls are no-ops.
///
/// # Arguments
///
/// * `level` - Minimum level or filter directive (e.g. `"warn"`,
///   `"scxml_client=debug"`).
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already set
    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("warn");
        init_subscriber("debug");
    }
}
