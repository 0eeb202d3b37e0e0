//! Project index: a prebuilt static inventory of directories, languages,
//! and services, with a TTL'd in-process cache.

use camino::Utf8Path;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::paths;

/// Cache entries live this long before a reload.
const INDEX_CACHE_TTL: Duration = Duration::from_secs(300);

/// A directory that matters inside a service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeyDirectory {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

/// One service in the project inventory.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceInfo {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub key_directories: HashMap<String, KeyDirectory>,
}

/// The project index document (`project_index.json`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectIndex {
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub project_root: Option<String>,
    #[serde(default)]
    pub services: HashMap<String, ServiceInfo>,
    #[serde(default)]
    pub top_level_dirs: Vec<String>,
    #[serde(default)]
    pub external_integrations: Vec<String>,
}

impl ProjectIndex {
    /// Lowercased set of languages across all services.
    #[must_use]
    pub fn languages(&self) -> BTreeSet<String> {
        self.services
            .values()
            .map(|s| s.language.to_lowercase())
            .filter(|l| !l.is_empty())
            .collect()
    }

    #[must_use]
    pub fn has_js_services(&self) -> bool {
        let languages = self.languages();
        languages.contains("javascript") || languages.contains("typescript")
    }
}

struct CacheEntry {
    loaded_at: Instant,
    index: ProjectIndex,
}

// Global mutable cache keyed by absolute project path. Readers receive deep
// copies (clone-on-return) so callers can never mutate shared state.
static INDEX_CACHE: Lazy<Mutex<HashMap<String, CacheEntry>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Load the project index through the TTL cache.
///
/// Double-checked on miss: the lock is released while the file is read, then
/// re-taken to publish (last writer wins; both read the same file).
#[must_use]
pub fn load_project_index_cached(project_dir: &Utf8Path) -> ProjectIndex {
    let key = project_dir.as_str().to_string();

    {
        let cache = INDEX_CACHE.lock().expect("index cache poisoned");
        if let Some(entry) = cache.get(&key) {
            if entry.loaded_at.elapsed() < INDEX_CACHE_TTL {
                return entry.index.clone();
            }
        }
    }

    let index = load_project_index(project_dir);

    let mut cache = INDEX_CACHE.lock().expect("index cache poisoned");
    // Re-check: another thread may have refreshed while we read the file.
    if let Some(entry) = cache.get(&key) {
        if entry.loaded_at.elapsed() < INDEX_CACHE_TTL {
            return entry.index.clone();
        }
    }
    cache.insert(
        key,
        CacheEntry {
            loaded_at: Instant::now(),
            index: index.clone(),
        },
    );
    index
}

/// Load the project index directly from disk; empty when missing/corrupt.
#[must_use]
pub fn load_project_index(project_dir: &Utf8Path) -> ProjectIndex {
    crate::artifact::load_json(&paths::project_index_path(project_dir)).unwrap_or_default()
}

/// Drop a project's cache entry (used after regenerating the index).
pub fn invalidate_project_index(project_dir: &Utf8Path) {
    let mut cache = INDEX_CACHE.lock().expect("index cache poisoned");
    cache.remove(project_dir.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn write_index(project: &Utf8Path, json: &str) {
        let path = paths::project_index_path(project);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, json).unwrap();
    }

    #[test]
    fn test_missing_index_is_empty() {
        let dir = TempDir::new().unwrap();
        let index = load_project_index(&utf8_dir(&dir));
        assert!(index.services.is_empty());
    }

    #[test]
    fn test_languages_lowercased() {
        let dir = TempDir::new().unwrap();
        let project = utf8_dir(&dir);
        write_index(
            &project,
            r#"{"services": {"api": {"path": "apps/api", "language": "Python"},
                             "web": {"path": "apps/web", "language": "TypeScript"}}}"#,
        );

        let index = load_project_index(&project);
        let languages = index.languages();
        assert!(languages.contains("python"));
        assert!(languages.contains("typescript"));
        assert!(index.has_js_services());
    }

    #[test]
    fn test_cache_returns_deep_copy() {
        let dir = TempDir::new().unwrap();
        let project = utf8_dir(&dir);
        write_index(&project, r#"{"top_level_dirs": ["src"]}"#);

        let mut first = load_project_index_cached(&project);
        first.top_level_dirs.push("mutated".to_string());

        let second = load_project_index_cached(&project);
        assert_eq!(second.top_level_dirs, vec!["src".to_string()]);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let dir = TempDir::new().unwrap();
        let project = utf8_dir(&dir);
        write_index(&project, r#"{"top_level_dirs": ["src"]}"#);

        let _ = load_project_index_cached(&project);
        write_index(&project, r#"{"top_level_dirs": ["src", "docs"]}"#);

        // Cached copy is still the old one.
        assert_eq!(load_project_index_cached(&project).top_level_dirs.len(), 1);

        invalidate_project_index(&project);
        assert_eq!(load_project_index_cached(&project).top_level_dirs.len(), 2);
    }
}
