//! Tracing initialization for the auto-iflow CLI.

use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the tracing subscriber.
///
/// Verbose mode enables debug-level output with targets; the default format
/// is compact and human-readable. `RUST_LOG` overrides both.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("auto_iflow=debug,info")
            } else {
                EnvFilter::try_new("auto_iflow=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_line_number(false)
                .with_file(false)
                .compact(),
        )
        .try_init()?;

    Ok(())
}

/// Log phase start with structured fields
pub fn log_phase_start(spec_id: &str, phase: &str) {
    tracing::info!(
        spec_id = %spec_id,
        phase = %phase,
        "Starting phase execution"
    );
}

/// Log phase completion with duration
pub fn log_phase_complete(spec_id: &str, phase: &str, duration_ms: u128) {
    tracing::info!(
        spec_id = %spec_id,
        phase = %phase,
        duration_ms = %duration_ms,
        "Phase execution completed"
    );
}

/// Log phase error with context
pub fn log_phase_error(spec_id: &str, phase: &str, error: &str, duration_ms: u128) {
    tracing::error!(
        spec_id = %spec_id,
        phase = %phase,
        duration_ms = %duration_ms,
        error = %error,
        "Phase execution failed"
    );
}
