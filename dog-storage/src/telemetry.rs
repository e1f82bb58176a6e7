use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber; `RUST_LOG` overrides `default_filter`.
///
/// Returns false when a global subscriber was already set.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
