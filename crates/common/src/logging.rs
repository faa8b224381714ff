use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initializes the process-wide `tracing` subscriber. Called exactly once,
/// from the CLI binary's `main`.
///
/// `RUST_LOG` overrides `default_directive` when set; otherwise every span
/// and event at `default_directive` or above is emitted.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("tracing subscriber can only be installed once per process");
}
