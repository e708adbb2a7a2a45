use tracing_subscriber::{fmt, EnvFilter};

/// Initialize `tracing` once. Respects `RUST_LOG`; falls back to `default_level`.
///
/// Output goes to stderr; stdout belongs to the rendered view.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
