//! Log output for tests.

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber honouring `RUST_LOG`.
///
/// Defaults to `warn`. Safe to call from every test; only the first call
/// installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice() {
        init_test_logging();
        init_test_logging();
    }
}
