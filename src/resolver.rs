//! Model resolution with role > feature > phase priority across layered
//! routing sources, plus thinking-level budget mapping.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::Result;
use crate::paths;
use crate::registry;
use crate::routing::{ModelRouting, RouteChoice};

/// Thinking level to budget tokens mapping (None = no extended thinking).
pub const THINKING_BUDGETS: &[(&str, Option<u32>)] = &[
    ("none", None),
    ("low", Some(1024)),
    ("medium", Some(4096)),
    ("high", Some(16384)),
    ("ultrathink", Some(65536)),
];

/// Spec-runner phase-specific thinking levels. Heavy phases think deeply;
/// light phases run medium after compaction.
pub const SPEC_PHASE_THINKING_LEVELS: &[(&str, &str)] = &[
    ("discovery", "ultrathink"),
    ("spec_writing", "ultrathink"),
    ("self_critique", "ultrathink"),
    ("requirements", "medium"),
    ("research", "medium"),
    ("context", "medium"),
    ("planning", "medium"),
    ("validation", "medium"),
    ("quick_spec", "medium"),
    ("historical_context", "medium"),
    ("complexity_assessment", "medium"),
];

/// A fully resolved model choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub model_id: String,
    pub thinking_level: String,
    pub thinking_budget: Option<u32>,
}

/// Inputs for a resolution: which routing sources apply and any CLI
/// overrides.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest<'a> {
    pub phase: Option<&'a str>,
    pub feature: Option<&'a str>,
    pub role: Option<&'a str>,
    pub spec_dir: Option<&'a Utf8Path>,
    pub project_dir: Option<&'a Utf8Path>,
    pub cli_model: Option<&'a str>,
    pub cli_thinking: Option<&'a str>,
}

/// Get the thinking budget for a level; unknown levels warn and use medium.
#[must_use]
pub fn get_thinking_budget(thinking_level: &str) -> Option<u32> {
    for (level, budget) in THINKING_BUDGETS {
        if *level == thinking_level {
            return *budget;
        }
    }
    let valid: Vec<&str> = THINKING_BUDGETS.iter().map(|(l, _)| *l).collect();
    tracing::warn!(
        level = %thinking_level,
        valid = %valid.join(", "),
        "Invalid thinking level; defaulting to 'medium'"
    );
    Some(4096)
}

/// Thinking budget for a granular spec-runner phase.
#[must_use]
pub fn get_spec_phase_thinking_budget(phase_name: &str) -> Option<u32> {
    let level = SPEC_PHASE_THINKING_LEVELS
        .iter()
        .find(|(name, _)| *name == phase_name)
        .map_or("medium", |(_, level)| *level);
    get_thinking_budget(level)
}

/// The `qa` phase routes like `validation`.
fn normalize_phase(phase: Option<&str>) -> Option<&str> {
    match phase {
        Some("qa") => Some("validation"),
        other => other,
    }
}

fn load_project_routing(project_dir: &Utf8Path) -> ModelRouting {
    crate::artifact::load_json::<serde_json::Value>(&paths::project_env_path(project_dir))
        .and_then(|v| {
            v.get("modelRouting")
                .cloned()
                .and_then(|r| serde_json::from_value(r).ok())
        })
        .unwrap_or_default()
}

fn load_app_routing() -> ModelRouting {
    let Ok(path) = std::env::var("AUTO_IFLOW_SETTINGS_PATH") else {
        return ModelRouting::default();
    };
    crate::artifact::load_json::<serde_json::Value>(&Utf8PathBuf::from(path))
        .and_then(|v| {
            v.get("modelRouting")
                .cloned()
                .and_then(|r| serde_json::from_value(r).ok())
        })
        .unwrap_or_default()
}

/// Walk sources in order; the first non-null model and the first non-null
/// thinking level win independently (they may come from different sources).
fn resolve_from_sources(
    sources: &[ModelRouting],
    phase: Option<&str>,
    feature: Option<&str>,
    role: Option<&str>,
) -> RouteChoice {
    let mut resolved = RouteChoice::default();
    for routing in sources {
        let Some(choice) = routing.select(phase, feature, role) else {
            continue;
        };
        if resolved.model.is_none() && choice.model.is_some() {
            resolved.model = choice.model.clone();
        }
        if resolved.thinking_level.is_none() && choice.thinking_level.is_some() {
            resolved.thinking_level = choice.thinking_level.clone();
        }
        if resolved.model.is_some() && resolved.thinking_level.is_some() {
            break;
        }
    }
    resolved
}

/// First registry model recommended for the phase or feature; else the
/// first model.
fn recommended_model(phase: Option<&str>, feature: Option<&str>) -> Result<String> {
    let registry = registry::load_model_registry()?;
    for model in &registry.models {
        if let Some(phase) = phase {
            if model.recommended_for.iter().any(|r| r == phase) {
                return Ok(model.id.clone());
            }
        }
        if let Some(feature) = feature {
            if model.recommended_for.iter().any(|r| r == feature) {
                return Ok(model.id.clone());
            }
        }
    }
    registry
        .models
        .first()
        .map(|m| m.id.clone())
        .ok_or_else(|| crate::error::IflowError::Registry("models.json has no models".to_string()))
}

/// Resolve the model and thinking budget for a (phase, feature, role).
///
/// Priority: CLI overrides, then task metadata (advancedRoles > features >
/// phases), then project env, then app settings, then the registry's
/// recommendation. A model with `supportsThinking=false` forces the level
/// to `none` with a null budget regardless of what was requested.
pub fn resolve_model(request: &ResolveRequest<'_>) -> Result<ResolvedModel> {
    let phase = normalize_phase(request.phase);

    let mut sources = Vec::new();
    if let Some(spec_dir) = request.spec_dir {
        sources.push(crate::routing::load_task_routing(spec_dir));
    }
    if let Some(project_dir) = request.project_dir {
        sources.push(load_project_routing(project_dir));
    } else if let Some(spec_dir) = request.spec_dir {
        // Spec dirs live at <project>/<data_dir>/specs/<name>.
        if let Some(data_dir) = spec_dir.parent().and_then(Utf8Path::parent) {
            if let Some(project_dir) = data_dir.parent() {
                sources.push(load_project_routing(project_dir));
            }
        }
    }
    sources.push(load_app_routing());

    let mut choice = resolve_from_sources(&sources, phase, request.feature, request.role);

    if let Some(cli_model) = request.cli_model {
        choice.model = Some(cli_model.to_string());
    }
    if let Some(cli_thinking) = request.cli_thinking {
        choice.thinking_level = Some(cli_thinking.to_string());
    }

    let model_value = match choice.model {
        Some(model) => model,
        None => recommended_model(phase, request.feature)?,
    };
    let thinking_level = choice.thinking_level.unwrap_or_else(|| "medium".to_string());

    let model_id = registry::resolve_model_id(&model_value, None)?;

    let supports_thinking = registry::get_model_info(&model_id, None)?
        .map(|info| info.supports_thinking)
        .unwrap_or(true);
    let (resolved_level, budget) = if supports_thinking {
        let level = if THINKING_BUDGETS.iter().any(|(l, _)| *l == thinking_level) {
            thinking_level
        } else {
            "medium".to_string()
        };
        let budget = get_thinking_budget(&level);
        (level, budget)
    } else {
        ("none".to_string(), None)
    };

    Ok(ResolvedModel {
        model_id,
        thinking_level: resolved_level,
        thinking_budget: budget,
    })
}

/// The bootstrap model for cheap internal calls (summaries, compaction).
pub fn get_bootstrap_model() -> Result<String> {
    let shorthand = registry::get_bootstrap_model()?;
    registry::resolve_model_id(&shorthand, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn write_task_metadata(spec_dir: &Utf8Path, routing: serde_json::Value) {
        std::fs::create_dir_all(spec_dir).unwrap();
        std::fs::write(
            spec_dir.join("task_metadata.json"),
            json!({ "modelRouting": routing }).to_string(),
        )
        .unwrap();
    }

    #[test]
    fn test_thinking_budget_table() {
        assert_eq!(get_thinking_budget("none"), None);
        assert_eq!(get_thinking_budget("low"), Some(1024));
        assert_eq!(get_thinking_budget("medium"), Some(4096));
        assert_eq!(get_thinking_budget("high"), Some(16384));
        assert_eq!(get_thinking_budget("ultrathink"), Some(65536));
    }

    #[test]
    fn test_unknown_thinking_level_defaults_to_medium() {
        assert_eq!(get_thinking_budget("galaxy-brain"), Some(4096));
    }

    #[test]
    fn test_spec_phase_budgets() {
        assert_eq!(get_spec_phase_thinking_budget("discovery"), Some(65536));
        assert_eq!(get_spec_phase_thinking_budget("planning"), Some(4096));
        assert_eq!(get_spec_phase_thinking_budget("unknown_phase"), Some(4096));
    }

    #[test]
    fn test_role_feature_phase_precedence() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir).join("specs").join("001-test");
        write_task_metadata(
            &spec_dir,
            json!({
                "phases": {"coding": {"model": "phase-model"}},
                "features": {"github": {"model": "feature-model"}},
                "advancedRoles": {"github": {"review": {"model": "role-model"}}}
            }),
        );

        let resolve = |feature: Option<&str>, role: Option<&str>| {
            resolve_model(&ResolveRequest {
                phase: Some("coding"),
                feature,
                role,
                spec_dir: Some(&spec_dir),
                ..Default::default()
            })
            .unwrap()
            .model_id
        };

        assert_eq!(resolve(Some("github"), Some("review")), "role-model");
        assert_eq!(resolve(Some("github"), None), "feature-model");
        assert_eq!(resolve(None, None), "phase-model");
    }

    #[test]
    fn test_cli_override_wins() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir).join("specs").join("001-test");
        write_task_metadata(
            &spec_dir,
            json!({"phases": {"coding": {"model": "phase-model"}}}),
        );

        let resolved = resolve_model(&ResolveRequest {
            phase: Some("coding"),
            spec_dir: Some(&spec_dir),
            cli_model: Some("cli-model"),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(resolved.model_id, "cli-model");
    }

    #[test]
    fn test_recommended_fallback_without_sources() {
        let resolved = resolve_model(&ResolveRequest {
            phase: Some("coding"),
            ..Default::default()
        })
        .unwrap();
        // glm-4.7 is recommended for coding in the embedded registry.
        assert_eq!(resolved.model_id, "glm-4.7");
        assert_eq!(resolved.thinking_level, "medium");
        assert_eq!(resolved.thinking_budget, Some(4096));
    }

    #[test]
    fn test_qa_phase_normalizes_to_validation() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir).join("specs").join("001-test");
        write_task_metadata(
            &spec_dir,
            json!({"phases": {"validation": {"model": "validator-model"}}}),
        );

        let resolved = resolve_model(&ResolveRequest {
            phase: Some("qa"),
            spec_dir: Some(&spec_dir),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(resolved.model_id, "validator-model");
    }

    #[test]
    fn test_thinking_level_and_model_from_different_sources() {
        let dir = TempDir::new().unwrap();
        let project = utf8_dir(&dir);
        let spec_dir = crate::paths::specs_dir(&project).join("001-test");
        write_task_metadata(
            &spec_dir,
            json!({"phases": {"coding": {"thinkingLevel": "high"}}}),
        );

        // Project env supplies the model; task metadata supplies thinking.
        let env_path = crate::paths::project_env_path(&project);
        std::fs::create_dir_all(env_path.parent().unwrap()).unwrap();
        std::fs::write(
            &env_path,
            json!({"modelRouting": {"phases": {"coding": {"model": "project-model"}}}}).to_string(),
        )
        .unwrap();

        let resolved = resolve_model(&ResolveRequest {
            phase: Some("coding"),
            spec_dir: Some(&spec_dir),
            project_dir: Some(&project),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(resolved.model_id, "project-model");
        assert_eq!(resolved.thinking_level, "high");
        assert_eq!(resolved.thinking_budget, Some(16384));
    }

    #[test]
    fn test_non_thinking_model_forces_none() {
        let resolved = resolve_model(&ResolveRequest {
            phase: Some("coding"),
            cli_model: Some("glm-4.7-air"),
            cli_thinking: Some("ultrathink"),
            ..Default::default()
        })
        .unwrap();
        // glm-4.7-air declares supportsThinking=false in the registry.
        assert_eq!(resolved.thinking_level, "none");
        assert_eq!(resolved.thinking_budget, None);
    }
}
