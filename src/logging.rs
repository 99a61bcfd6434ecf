use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "kestrel=info";

/// Installs a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `kestrel=info`. Calling it again is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
