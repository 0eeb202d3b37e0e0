//! Path resolution for the per-project data directory.

use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;
use std::path::Path;

/// Default data directory name inside a project.
pub const DEFAULT_DATA_DIR: &str = ".auto-iflow";

// Thread-local override used only in tests to avoid process-global env races.
thread_local! {
    static THREAD_DATA_DIR: RefCell<Option<Utf8PathBuf>> = const { RefCell::new(None) };
}

/// Resolve the data directory name:
/// 1) thread-local override (tests use this)
/// 2) env `AUTO_IFLOW_HOME` (opt-in for users/CI)
/// 3) default ".auto-iflow"
#[must_use]
pub fn data_dir_name() -> Utf8PathBuf {
    if let Some(tl) = THREAD_DATA_DIR.with(|tl| tl.borrow().clone()) {
        return tl;
    }
    if let Ok(p) = std::env::var("AUTO_IFLOW_HOME") {
        return Utf8PathBuf::from(p);
    }
    Utf8PathBuf::from(DEFAULT_DATA_DIR)
}

/// Returns `<project>/<data_dir>`
#[must_use]
pub fn data_dir(project_dir: &Utf8Path) -> Utf8PathBuf {
    project_dir.join(data_dir_name())
}

/// Returns `<project>/<data_dir>/specs`
#[must_use]
pub fn specs_dir(project_dir: &Utf8Path) -> Utf8PathBuf {
    data_dir(project_dir).join("specs")
}

/// Returns `<project>/<data_dir>/project_index.json`
#[must_use]
pub fn project_index_path(project_dir: &Utf8Path) -> Utf8PathBuf {
    data_dir(project_dir).join("project_index.json")
}

/// Returns `<project>/<data_dir>/project.env.json`
#[must_use]
pub fn project_env_path(project_dir: &Utf8Path) -> Utf8PathBuf {
    data_dir(project_dir).join("project.env.json")
}

/// Returns `<project>/<data_dir>/migration`
#[must_use]
pub fn migration_dir(project_dir: &Utf8Path) -> Utf8PathBuf {
    data_dir(project_dir).join("migration")
}

/// Convert a std path to a UTF-8 path, erroring on non-UTF-8 components.
pub fn to_utf8(path: &Path) -> crate::error::Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|p| crate::error::IflowError::SpecDir(format!("non-UTF-8 path: {}", p.display())))
}

/// Test helper: give this thread an isolated data directory name.
///
/// Hold the returned guard for the test's duration; the override is removed
/// when it drops.
#[cfg(any(test, feature = "test-utils"))]
pub fn with_thread_data_dir(name: &str) -> ThreadDataDirGuard {
    THREAD_DATA_DIR.with(|tl| *tl.borrow_mut() = Some(Utf8PathBuf::from(name)));
    ThreadDataDirGuard
}

#[cfg(any(test, feature = "test-utils"))]
pub struct ThreadDataDirGuard;

#[cfg(any(test, feature = "test-utils"))]
impl Drop for ThreadDataDirGuard {
    fn drop(&mut self) {
        THREAD_DATA_DIR.with(|tl| *tl.borrow_mut() = None);
    }
}
