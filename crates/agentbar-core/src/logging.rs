use std::sync::Once;

/// Install the global tracing subscriber. Safe to call more than once.
///
/// The filter comes from `RUST_LOG`, defaulting to debug output for this crate.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("agentbar_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .try_init();
    });
}
