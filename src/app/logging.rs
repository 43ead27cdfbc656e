use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber: env-filtered, plain text in
/// debug builds and JSON otherwise. Safe to call more than once; later
/// calls are no-ops so an embedding shell keeps its own subscriber.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    if cfg!(debug_assertions) {
        let _ = builder.try_init();
    } else {
        let _ = builder.json().try_init();
    }
}
