//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing/telemetry. Embedders can install their own subscriber;
/// this helper installs a default env-based subscriber if none is set.
///
/// Per-cluster context is carried by the `autoscale_unit` span each
/// evaluation unit enters, so the fmt layer prints the cluster identity on
/// every event emitted while a unit runs.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
