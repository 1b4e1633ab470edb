//! Tracing setup for tests.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber once per process.
///
/// Output goes through the test writer so it is captured per test, and the
/// filter honours `RUST_LOG` (default `info`).
pub fn init_test_logging() {
    static ONCE: Once = Once::new();

    ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::info!("logging initialised twice without panicking");
    }
}
