use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests.
///
/// Safe to call from every test; only the first call installs the subscriber.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
