//! Model routing tables and legacy `task_metadata.json` migration.
//!
//! Routing lives at three levels (task metadata, project env, app settings),
//! each carrying the same `modelRouting` shape: phases, features, and
//! advanced per-feature roles.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::artifact::TASK_METADATA_FILENAME;
use crate::error::Result;

/// A single routing choice: model and/or thinking level, either may be null.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteChoice {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, rename = "thinkingLevel")]
    pub thinking_level: Option<String>,
}

/// The `modelRouting` table found in task/project/app config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRouting {
    #[serde(default)]
    pub phases: HashMap<String, RouteChoice>,
    #[serde(default)]
    pub features: HashMap<String, RouteChoice>,
    #[serde(default, rename = "advancedRoles")]
    pub advanced_roles: HashMap<String, HashMap<String, RouteChoice>>,
}

impl ModelRouting {
    /// Pick the most specific choice: role under feature, then feature,
    /// then phase. Returns `None` when nothing applies.
    #[must_use]
    pub fn select(
        &self,
        phase: Option<&str>,
        feature: Option<&str>,
        role: Option<&str>,
    ) -> Option<&RouteChoice> {
        if let (Some(feature), Some(role)) = (feature, role) {
            if let Some(choice) = self
                .advanced_roles
                .get(feature)
                .and_then(|roles| roles.get(role))
            {
                return Some(choice);
            }
        }
        if let Some(feature) = feature {
            if let Some(choice) = self.features.get(feature) {
                return Some(choice);
            }
        }
        if let Some(phase) = phase {
            if let Some(choice) = self.phases.get(phase) {
                return Some(choice);
            }
        }
        None
    }
}

/// Legacy phase names mapped onto the current routing phases.
fn normalize_legacy_phase(name: &str) -> Option<&'static str> {
    match name.trim().to_lowercase().as_str() {
        "spec" => Some("spec"),
        "planning" => Some("planning"),
        "coding" => Some("coding"),
        "qa" | "validation" => Some("validation"),
        _ => None,
    }
}

const DEFAULT_PHASES: [&str; 4] = ["spec", "planning", "coding", "validation"];

/// Migrate a legacy `task_metadata.json` in place.
///
/// Derives `modelRouting.phases` from the legacy `phaseModels`,
/// `phaseThinking`, `model`, and `thinkingLevel` fields. Idempotent: files
/// that already carry `modelRouting` are skipped. Returns true when the file
/// was rewritten.
pub fn migrate_task_metadata_file(metadata_path: &Utf8Path) -> Result<bool> {
    if !metadata_path.exists() {
        return Ok(false);
    }

    let Some(mut data) =
        crate::artifact::load_json::<serde_json::Map<String, serde_json::Value>>(metadata_path)
    else {
        return Ok(false);
    };
    if data.is_empty() || data.contains_key("modelRouting") {
        return Ok(false);
    }

    let str_map = |key: &str| -> HashMap<String, String> {
        data.get(key)
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    };
    let phase_models = str_map("phaseModels");
    let phase_thinking = str_map("phaseThinking");
    let default_model = data.get("model").and_then(|v| v.as_str()).map(String::from);
    let default_thinking = data
        .get("thinkingLevel")
        .and_then(|v| v.as_str())
        .map(String::from);

    let mut phases: HashMap<String, RouteChoice> = HashMap::new();

    for (phase, model) in &phase_models {
        if let Some(normalized) = normalize_legacy_phase(phase) {
            phases.entry(normalized.to_string()).or_default().model = Some(model.clone());
        }
    }
    for (phase, thinking) in &phase_thinking {
        if let Some(normalized) = normalize_legacy_phase(phase) {
            phases
                .entry(normalized.to_string())
                .or_default()
                .thinking_level = Some(thinking.clone());
        }
    }

    if let Some(model) = &default_model {
        for phase in DEFAULT_PHASES {
            let entry = phases.entry(phase.to_string()).or_default();
            if entry.model.is_none() {
                entry.model = Some(model.clone());
            }
        }
    }
    if let Some(thinking) = &default_thinking {
        for phase in DEFAULT_PHASES {
            let entry = phases.entry(phase.to_string()).or_default();
            if entry.thinking_level.is_none() {
                entry.thinking_level = Some(thinking.clone());
            }
        }
    }

    if phases.is_empty() {
        return Ok(false);
    }

    let routing = ModelRouting {
        phases,
        ..Default::default()
    };
    data.insert("modelRouting".to_string(), serde_json::to_value(&routing)?);
    crate::artifact::save_json(metadata_path, &data)?;
    Ok(true)
}

/// Migration counters for a specs tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationCounts {
    pub updated: u32,
    pub skipped: u32,
    pub missing: u32,
    pub errors: u32,
}

/// Run the task-metadata migration over every `NNN-*` spec directory.
#[must_use]
pub fn migrate_task_metadata_tree(specs_dir: &Utf8Path) -> MigrationCounts {
    let mut counts = MigrationCounts::default();
    let Ok(entries) = std::fs::read_dir(specs_dir) else {
        return counts;
    };

    for entry in entries.flatten() {
        let Some(name) = entry.file_name().to_str().map(String::from) else {
            continue;
        };
        let is_spec = name.len() > 4
            && name.as_bytes()[..3].iter().all(u8::is_ascii_digit)
            && name.as_bytes()[3] == b'-';
        if !is_spec || !entry.path().is_dir() {
            continue;
        }

        let metadata_path = entry.path().join(TASK_METADATA_FILENAME);
        let Ok(metadata_path) = crate::paths::to_utf8(&metadata_path) else {
            counts.errors += 1;
            continue;
        };
        if !metadata_path.exists() {
            counts.missing += 1;
            continue;
        }
        match migrate_task_metadata_file(&metadata_path) {
            Ok(true) => counts.updated += 1,
            Ok(false) => counts.skipped += 1,
            Err(_) => counts.errors += 1,
        }
    }
    counts
}

/// Load routing from a spec dir's `task_metadata.json`, if present.
#[must_use]
pub fn load_task_routing(spec_dir: &Utf8Path) -> ModelRouting {
    crate::artifact::load_json::<serde_json::Value>(&spec_dir.join(TASK_METADATA_FILENAME))
        .and_then(|v| {
            v.get("modelRouting")
                .cloned()
                .and_then(|r| serde_json::from_value(r).ok())
        })
        .unwrap_or_default()
}
