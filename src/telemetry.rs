//! Migration/rollout telemetry.
//!
//! Events append to a per-project `migration/metrics.jsonl` plus a global
//! mirror under the user's home data dir, and update an aggregate summary
//! used to decide when the legacy fallback can be turned off. Every write
//! path swallows IO errors; telemetry never fails the pipeline.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::paths;

/// Disable switch; telemetry is on unless explicitly set to "false".
pub const TELEMETRY_ENV_VAR: &str = "AUTO_IFLOW_MIGRATION_TELEMETRY";

const FALLBACK_THRESHOLD_ENV_VAR: &str = "AUTO_IFLOW_FALLBACK_DISABLE_THRESHOLD";
const FALLBACK_MIN_PROJECTS_ENV_VAR: &str = "AUTO_IFLOW_FALLBACK_DISABLE_MIN_PROJECTS";
const FORCE_LEGACY_ENV_VAR: &str = "AUTO_IFLOW_FORCE_LEGACY_FALLBACK";
const DISABLE_LEGACY_ENV_VAR: &str = "AUTO_IFLOW_DISABLE_LEGACY_FALLBACK";

/// Events mapping to a per-project migration status.
const EVENT_STATUS_MAP: &[(&str, &str)] = &[
    ("legacy_fallback_used", "legacy"),
    ("legacy_fallback_blocked", "legacy"),
    ("migration_started", "legacy"),
    ("migration_failed", "legacy"),
    ("migration_success", "auto_iflow"),
    ("auto_iflow_used", "auto_iflow"),
];

// Events deduped per (project, event) within the process.
static SEEN_EVENTS: Lazy<Mutex<HashSet<(Option<String>, String)>>> =
    Lazy::new(|| Mutex::new(HashSet::new()));

#[derive(Debug, Serialize)]
struct MetricsLine<'a> {
    timestamp: String,
    event: &'a str,
    project_path: Option<&'a str>,
    details: &'a serde_json::Value,
}

/// Per-project entry in the aggregate summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectEntry {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub last_event: String,
    #[serde(default)]
    pub last_seen: String,
}

/// Aggregate counts in the summary document.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SummaryCounts {
    #[serde(default)]
    pub auto_iflow: u32,
    #[serde(default)]
    pub legacy: u32,
    #[serde(default)]
    pub total: u32,
}

/// The rollout summary (`migration/summary.json` under the home data dir).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationSummary {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub projects: HashMap<String, ProjectEntry>,
    #[serde(default)]
    pub counts: SummaryCounts,
    #[serde(default)]
    pub events: HashMap<String, u32>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_version() -> u32 {
    1
}

fn telemetry_enabled() -> bool {
    std::env::var(TELEMETRY_ENV_VAR)
        .map(|v| !v.eq_ignore_ascii_case("false"))
        .unwrap_or(true)
}

fn global_migration_dir() -> Option<Utf8PathBuf> {
    let home = dirs::home_dir()?;
    let home = Utf8PathBuf::from_path_buf(home).ok()?;
    Some(home.join(".auto-iflow").join("migration"))
}

fn append_json_line(path: &Utf8Path, line: &str) -> std::io::Result<()> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

fn load_summary(summary_path: &Utf8Path) -> MigrationSummary {
    crate::artifact::load_json(summary_path).unwrap_or_default()
}

fn update_summary(summary_path: &Utf8Path, project_path: Option<&str>, event: &str) {
    let mut summary = load_summary(summary_path);
    if summary.version == 0 {
        summary.version = 1;
    }
    *summary.events.entry(event.to_string()).or_insert(0) += 1;

    if let Some(project_path) = project_path {
        if let Some((_, status)) = EVENT_STATUS_MAP.iter().find(|(e, _)| *e == event) {
            let entry = summary.projects.entry(project_path.to_string()).or_default();
            entry.status = (*status).to_string();
            entry.last_event = event.to_string();
            entry.last_seen = Utc::now().to_rfc3339();
        }
    }

    let mut counts = SummaryCounts::default();
    for entry in summary.projects.values() {
        match entry.status.as_str() {
            "auto_iflow" => counts.auto_iflow += 1,
            "legacy" => counts.legacy += 1,
            _ => {}
        }
    }
    counts.total = counts.auto_iflow + counts.legacy;
    summary.counts = counts;
    summary.updated_at = Some(Utc::now().to_rfc3339());

    if let Some(parent) = summary_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(json) = serde_json::to_string_pretty(&summary) {
        let _ = std::fs::write(summary_path, json);
    }
}

/// Record a migration event.
///
/// Appends to the global metrics log, updates the summary, and mirrors into
/// the project's data dir when it exists. Events are deduped per
/// (project, event) within the process unless `dedupe` is false.
pub fn record_migration_event(
    project_dir: Option<&Utf8Path>,
    event: &str,
    details: serde_json::Value,
    dedupe: bool,
) {
    if !telemetry_enabled() {
        return;
    }

    let project_path = project_dir.map(|p| p.to_string());
    let key = (project_path.clone(), event.to_string());
    {
        let mut seen = SEEN_EVENTS.lock().expect("telemetry dedupe poisoned");
        if dedupe && seen.contains(&key) {
            return;
        }
        seen.insert(key);
    }

    let line = MetricsLine {
        timestamp: Utc::now().to_rfc3339(),
        event,
        project_path: project_path.as_deref(),
        details: &details,
    };
    let Ok(json_line) = serde_json::to_string(&line) else {
        return;
    };

    if let Some(global_dir) = global_migration_dir() {
        let _ = append_json_line(&global_dir.join("metrics.jsonl"), &json_line);
        update_summary(
            &global_dir.join("summary.json"),
            project_path.as_deref(),
            event,
        );
    }

    if let Some(project_dir) = project_dir {
        if paths::data_dir(project_dir).exists() {
            let migration_dir = paths::migration_dir(project_dir);
            let _ = append_json_line(&migration_dir.join("metrics.jsonl"), &json_line);
            update_summary(
                &migration_dir.join("summary.json"),
                project_path.as_deref(),
                event,
            );
        }
    }
}

/// Whether the rollout has progressed far enough to disable the legacy
/// fallback path.
#[must_use]
pub fn should_disable_legacy_fallback() -> bool {
    let flag = |var: &str| {
        std::env::var(var)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
    if flag(FORCE_LEGACY_ENV_VAR) {
        return false;
    }
    if flag(DISABLE_LEGACY_ENV_VAR) {
        return true;
    }

    let Some(global_dir) = global_migration_dir() else {
        return false;
    };
    let summary = load_summary(&global_dir.join("summary.json"));
    let total = summary.counts.total;
    if total == 0 {
        return false;
    }

    let threshold = std::env::var(FALLBACK_THRESHOLD_ENV_VAR)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.95);
    let min_projects = std::env::var(FALLBACK_MIN_PROJECTS_ENV_VAR)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(20);

    if total < min_projects {
        return false;
    }
    f64::from(summary.counts.auto_iflow) / f64::from(total) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_summary_counts_by_status() {
        let dir = TempDir::new().unwrap();
        let summary_path =
            Utf8PathBuf::from_path_buf(dir.path().join("summary.json")).unwrap();

        update_summary(&summary_path, Some("/p1"), "migration_success");
        update_summary(&summary_path, Some("/p2"), "legacy_fallback_used");
        update_summary(&summary_path, Some("/p1"), "auto_iflow_used");

        let summary = load_summary(&summary_path);
        assert_eq!(summary.counts.auto_iflow, 1);
        assert_eq!(summary.counts.legacy, 1);
        assert_eq!(summary.counts.total, 2);
        assert_eq!(summary.events["auto_iflow_used"], 1);
    }

    #[test]
    fn test_unknown_event_counts_but_no_status() {
        let dir = TempDir::new().unwrap();
        let summary_path =
            Utf8PathBuf::from_path_buf(dir.path().join("summary.json")).unwrap();

        update_summary(&summary_path, Some("/p1"), "something_else");
        let summary = load_summary(&summary_path);
        assert_eq!(summary.events["something_else"], 1);
        assert!(summary.projects.is_empty());
    }

    #[test]
    fn test_project_mirror_requires_data_dir() {
        let dir = TempDir::new().unwrap();
        let project = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        // No data dir yet: event may be recorded globally but the project
        // mirror must not be created.
        record_migration_event(Some(&project), "migration_started", serde_json::json!({}), false);
        assert!(!paths::migration_dir(&project).exists());

        std::fs::create_dir_all(paths::data_dir(&project)).unwrap();
        record_migration_event(Some(&project), "migration_started", serde_json::json!({}), false);
        assert!(paths::migration_dir(&project).join("metrics.jsonl").exists());
    }

    #[test]
    fn test_dedupe_within_process() {
        let dir = TempDir::new().unwrap();
        let project = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(paths::data_dir(&project)).unwrap();

        record_migration_event(Some(&project), "migration_failed", serde_json::json!({}), true);
        record_migration_event(Some(&project), "migration_failed", serde_json::json!({}), true);

        let metrics = paths::migration_dir(&project).join("metrics.jsonl");
        let content = std::fs::read_to_string(metrics).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
