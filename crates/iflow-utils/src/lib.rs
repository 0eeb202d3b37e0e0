//! Shared utilities for the auto-iflow workspace.
//!
//! Leaf crate with no internal dependencies: atomic file writes, env-driven
//! timeout parsing, and tracing initialization.

pub mod atomic_write;
pub mod logging;
pub mod timeout;

pub use atomic_write::write_file_atomic;
pub use timeout::timeout_from_env;

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}
