//! Environment reality check: paths, permissions, and required binaries.
//!
//! A pure local phase that runs before planning so the pipeline fails fast
//! on a machine that cannot carry the task, instead of mid-build.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::artifact::ENV_REALITY_CHECK_FILENAME;
use crate::error::Result;
use crate::index::ProjectIndex;
use crate::types::Requirements;

/// Env var forcing the external agent CLI to be required.
pub const REQUIRE_AGENT_CLI_ENV_VAR: &str = "AUTO_IFLOW_REQUIRE_IFLOW_CLI";
/// Env var overriding the agent CLI path.
pub const AGENT_CLI_PATH_ENV_VAR: &str = "AUTO_IFLOW_IFLOW_CLI_PATH";

/// Outcome of a single binary probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryCheck {
    pub name: String,
    pub required: bool,
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Path checks included in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathChecks {
    pub project_dir: String,
    pub project_exists: bool,
    pub project_is_dir: bool,
    pub spec_dir: String,
    pub spec_exists: bool,
    pub spec_writable: bool,
}

/// The env reality check report (`env_reality_check.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvRealityReport {
    pub status: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub paths: PathChecks,
    pub binaries: Vec<BinaryCheck>,
    pub languages: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl EnvRealityReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == "passed"
    }
}

fn resolve_binary(name: &str) -> Option<String> {
    which::which(name)
        .ok()
        .map(|p| p.display().to_string())
}

fn probe(name: &str, required: bool, reason: &str) -> BinaryCheck {
    let path = resolve_binary(name);
    BinaryCheck {
        name: name.to_string(),
        required,
        found: path.is_some(),
        path,
        reason: Some(reason.to_string()),
    }
}

fn agent_cli_required(requirements: Option<&Requirements>) -> bool {
    let from_requirements = requirements
        .and_then(|r| r.intake.as_ref())
        .and_then(|v| v.get("requires_iflow_cli"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if from_requirements {
        return true;
    }
    std::env::var(REQUIRE_AGENT_CLI_ENV_VAR)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Run the environment reality check.
///
/// `git` is always required, `node`/`npm` when the index lists JS/TS
/// services, `python` always; the agent CLI (`iflow`) only when flagged.
/// Missing required binaries are errors; missing optional ones warnings.
#[must_use]
pub fn run_env_reality_check(
    project_dir: &Utf8Path,
    spec_dir: &Utf8Path,
    index: &ProjectIndex,
    requirements: Option<&Requirements>,
) -> EnvRealityReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let project_exists = project_dir.exists();
    let project_is_dir = project_dir.is_dir();
    if !project_exists {
        errors.push("project_dir does not exist".to_string());
    } else if !project_is_dir {
        errors.push("project_dir is not a directory".to_string());
    }

    let spec_exists = spec_dir.exists();
    let spec_writable = spec_exists
        && !std::fs::metadata(spec_dir)
            .map(|m| m.permissions().readonly())
            .unwrap_or(true);
    if !spec_exists {
        errors.push("spec_dir does not exist".to_string());
    } else if !spec_writable {
        errors.push("spec_dir is not writable".to_string());
    }

    let languages: Vec<String> = index.languages().into_iter().collect();
    let mut binaries = Vec::new();

    binaries.push(probe("git", true, "git is required for worktrees and commits"));

    if index.has_js_services() {
        binaries.push(probe("node", true, "node is required for JS/TS services"));
        binaries.push(probe("npm", true, "npm is required for JS/TS services"));
    }

    binaries.push(probe("python3", true, "python is required for the backend pipeline"));

    let agent_required = agent_cli_required(requirements);
    if let Ok(override_path) = std::env::var(AGENT_CLI_PATH_ENV_VAR) {
        let found = Utf8Path::new(&override_path).exists();
        binaries.push(BinaryCheck {
            name: "iflow".to_string(),
            required: agent_required,
            found,
            path: Some(override_path),
            reason: Some("agent CLI path override".to_string()),
        });
    } else {
        binaries.push(probe("iflow", agent_required, "agent CLI on PATH"));
    }

    for check in &binaries {
        if !check.found {
            if check.required {
                errors.push(format!("required binary missing: {}", check.name));
            } else {
                warnings.push(format!("optional binary missing: {}", check.name));
            }
        }
    }

    let status = if errors.is_empty() { "passed" } else { "failed" };
    EnvRealityReport {
        status: status.to_string(),
        errors,
        warnings,
        paths: PathChecks {
            project_dir: project_dir.to_string(),
            project_exists,
            project_is_dir,
            spec_dir: spec_dir.to_string(),
            spec_exists,
            spec_writable,
        },
        binaries,
        languages,
        created_at: chrono::Utc::now(),
    }
}

/// Run the check and persist the report into the spec directory.
pub fn run_and_save(
    project_dir: &Utf8Path,
    spec_dir: &Utf8Path,
    index: &ProjectIndex,
    requirements: Option<&Requirements>,
) -> Result<EnvRealityReport> {
    let report = run_env_reality_check(project_dir, spec_dir, index, requirements);
    crate::artifact::save_json(&spec_dir.join(ENV_REALITY_CHECK_FILENAME), &report)?;
    Ok(report)
}
