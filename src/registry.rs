//! Model registry backed by the shared `models.json` document.
//!
//! The canonical list ships embedded in the binary; `AUTO_IFLOW_MODELS_PATH`
//! points at a replacement document for deployments that maintain their own.
//! Custom models from a user API profile overlay the base list by id.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{IflowError, Result};

/// Canonical registry document shipped with the binary.
const EMBEDDED_MODELS_JSON: &str = include_str!("../assets/models.json");

/// Env override path for the registry document.
pub const MODELS_PATH_ENV_VAR: &str = "AUTO_IFLOW_MODELS_PATH";

/// One model entry in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
    pub tier: String,
    pub supports_thinking: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub recommended_for: Vec<String>,
}

/// The registry document (`models.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRegistry {
    pub models: Vec<ModelInfo>,
    #[serde(default)]
    pub legacy_aliases: HashMap<String, String>,
    #[serde(default)]
    pub bootstrap_model: Option<String>,
}

/// User profile carrying custom model entries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiProfile {
    #[serde(default)]
    pub custom_models: Vec<serde_json::Value>,
}

fn validate_unique_ids(models: &[ModelInfo]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for model in models {
        if model.id.is_empty() {
            return Err(IflowError::Registry(
                "Model entry missing required 'id'".to_string(),
            ));
        }
        if !seen.insert(model.id.clone()) {
            return Err(IflowError::Registry(format!(
                "Duplicate model id in models.json: {}",
                model.id
            )));
        }
    }
    Ok(())
}

fn validate_unique_aliases(
    models: &[ModelInfo],
    legacy_aliases: &HashMap<String, String>,
) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (alias, target) in legacy_aliases {
        if let Some(existing) = seen.get(alias.as_str()) {
            if *existing != target {
                return Err(IflowError::Registry(format!(
                    "Duplicate legacy alias in models.json: {alias}"
                )));
            }
        }
        seen.insert(alias, target);
    }
    for model in models {
        for alias in &model.aliases {
            if let Some(existing) = seen.get(alias.as_str()) {
                if *existing != model.id {
                    return Err(IflowError::Registry(format!(
                        "Alias collision in models.json: {alias}"
                    )));
                }
            }
            seen.insert(alias, &model.id);
        }
    }
    Ok(())
}

/// Load and validate the model registry.
pub fn load_model_registry() -> Result<ModelRegistry> {
    let content = match std::env::var(MODELS_PATH_ENV_VAR) {
        Ok(path) => std::fs::read_to_string(&path)
            .map_err(|e| IflowError::Registry(format!("Cannot read {path}: {e}")))?,
        Err(_) => EMBEDDED_MODELS_JSON.to_string(),
    };

    let registry: ModelRegistry = serde_json::from_str(&content)
        .map_err(|e| IflowError::Registry(format!("Invalid models.json: {e}")))?;

    validate_unique_ids(&registry.models)?;
    validate_unique_aliases(&registry.models, &registry.legacy_aliases)?;
    Ok(registry)
}

fn validate_custom_model_entry(entry: &serde_json::Value) -> Option<ModelInfo> {
    let required = ["id", "displayName", "tier", "supportsThinking"];
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|field| entry.get(field).is_none())
        .collect();
    if !missing.is_empty() {
        tracing::warn!(
            missing = %missing.join(", "),
            id = %entry.get("id").and_then(|v| v.as_str()).unwrap_or("<unknown>"),
            "Custom model missing required fields; skipping entry"
        );
        return None;
    }
    serde_json::from_value(entry.clone()).ok()
}

/// All models, with custom profile entries overlaid by id.
pub fn get_all_models(api_profile: Option<&ApiProfile>) -> Result<Vec<ModelInfo>> {
    let registry = load_model_registry()?;

    let mut merged: Vec<ModelInfo> = registry.models;
    if let Some(profile) = api_profile {
        for entry in &profile.custom_models {
            let Some(custom) = validate_custom_model_entry(entry) else {
                continue;
            };
            if let Some(existing) = merged.iter_mut().find(|m| m.id == custom.id) {
                tracing::warn!(id = %custom.id, "Custom model overrides base model id");
                *existing = custom;
            } else {
                merged.push(custom);
            }
        }
    }
    Ok(merged)
}

/// Alias map: legacy aliases plus per-model aliases; custom aliases win
/// with a warning.
pub fn build_alias_map(api_profile: Option<&ApiProfile>) -> Result<HashMap<String, String>> {
    let registry = load_model_registry()?;
    let mut aliases = registry.legacy_aliases;

    for model in get_all_models(api_profile)? {
        for alias in &model.aliases {
            if let Some(existing) = aliases.get(alias) {
                if existing != &model.id {
                    tracing::warn!(alias = %alias, "Custom alias overrides legacy alias");
                }
            }
            aliases.insert(alias.clone(), model.id.clone());
        }
    }
    Ok(aliases)
}

/// Resolve a model shorthand/alias to a full model ID.
///
/// Tier shorthands honor `IFLOW_DEFAULT_<TIER>_MODEL` env overrides first.
pub fn resolve_model_id(model: &str, api_profile: Option<&ApiProfile>) -> Result<String> {
    let env_var = match model {
        "haiku" => Some("IFLOW_DEFAULT_HAIKU_MODEL"),
        "sonnet" => Some("IFLOW_DEFAULT_SONNET_MODEL"),
        "opus" => Some("IFLOW_DEFAULT_OPUS_MODEL"),
        _ => None,
    };
    if let Some(var) = env_var {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return Ok(value);
            }
        }
    }

    let aliases = build_alias_map(api_profile)?;
    Ok(aliases.get(model).cloned().unwrap_or_else(|| model.to_string()))
}

/// Look up a model by canonical id.
pub fn get_model_info(model_id: &str, api_profile: Option<&ApiProfile>) -> Result<Option<ModelInfo>> {
    Ok(get_all_models(api_profile)?
        .into_iter()
        .find(|m| m.id == model_id))
}

/// The cheap bootstrap model used for summarization-style calls.
pub fn get_bootstrap_model() -> Result<String> {
    let registry = load_model_registry()?;
    registry
        .bootstrap_model
        .ok_or_else(|| IflowError::Registry("bootstrapModel missing from models.json".to_string()))
}
