//! Env-driven timeout parsing shared by the session runtime, post-session
//! processing, and the post-code test runner.
//!
//! Convention: a missing or unparseable value falls back to the default; a
//! zero or negative value means "no bound".

use std::time::Duration;

/// Resolve a timeout from an environment variable.
///
/// Returns `None` when the resolved value is `<= 0` (unbounded).
#[must_use]
pub fn timeout_from_env(env_key: &str, default_seconds: f64) -> Option<Duration> {
    let seconds = match std::env::var(env_key) {
        Ok(raw) => raw.trim().parse::<f64>().unwrap_or(default_seconds),
        Err(_) => default_seconds,
    };
    if seconds <= 0.0 {
        None
    } else {
        Some(Duration::from_secs_f64(seconds))
    }
}

/// Resolve a positive integer limit from an environment variable, falling
/// back to the default on absence or parse failure.
#[must_use]
pub fn limit_from_env(env_key: &str, default: usize) -> usize {
    match std::env::var(env_key) {
        Ok(raw) => raw.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}
