//! Spec-directory artifact I/O.
//!
//! One place knows the artifact filenames and how they are read and written.
//! Reads are tolerant (missing or corrupt files yield `None` so a damaged
//! spec directory never wedges the pipeline); writes for state-bearing
//! artifacts go through the atomic temp+fsync+rename path.

use camino::Utf8Path;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::types::{
    ImplementationPlan, PostCodeReport, ProofSet, Requirements, ScopeContract, TaskIntake,
};

pub const REQUIREMENTS_FILENAME: &str = "requirements.json";
pub const TASK_INTAKE_FILENAME: &str = "task_intake.json";
pub const SCOPE_CONTRACT_FILENAME: &str = "scope_contract.json";
pub const IMPLEMENTATION_PLAN_FILENAME: &str = "implementation_plan.json";
pub const PROOFS_FILENAME: &str = "proofs.json";
pub const POST_CODE_REPORT_FILENAME: &str = "post_code_tests.json";
pub const ENV_REALITY_CHECK_FILENAME: &str = "env_reality_check.json";
pub const COMPLEXITY_ASSESSMENT_FILENAME: &str = "complexity_assessment.json";
pub const TASK_METADATA_FILENAME: &str = "task_metadata.json";
pub const RECOVERY_FILENAME: &str = "recovery.json";
pub const INTAKE_REPORT_FILENAME: &str = "intake_report.md";
pub const BUILD_PROGRESS_FILENAME: &str = "build-progress.txt";

/// Load a JSON artifact; `None` when missing or unparseable.
#[must_use]
pub fn load_json<T: DeserializeOwned>(path: &Utf8Path) -> Option<T> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Write a JSON artifact atomically (pretty-printed).
pub fn save_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    iflow_utils::write_file_atomic(path, &json)
        .map_err(|e| crate::error::IflowError::SpecDir(format!("write {path}: {e}")))?;
    Ok(())
}

pub fn load_requirements(spec_dir: &Utf8Path) -> Option<Requirements> {
    load_json(&spec_dir.join(REQUIREMENTS_FILENAME))
}

pub fn save_requirements(spec_dir: &Utf8Path, requirements: &Requirements) -> Result<()> {
    save_json(&spec_dir.join(REQUIREMENTS_FILENAME), requirements)
}

pub fn load_task_intake(spec_dir: &Utf8Path) -> Option<TaskIntake> {
    load_json(&spec_dir.join(TASK_INTAKE_FILENAME))
}

pub fn save_task_intake(spec_dir: &Utf8Path, intake: &TaskIntake) -> Result<()> {
    save_json(&spec_dir.join(TASK_INTAKE_FILENAME), intake)
}

pub fn load_scope_contract(spec_dir: &Utf8Path) -> Option<ScopeContract> {
    load_json(&spec_dir.join(SCOPE_CONTRACT_FILENAME))
}

pub fn save_scope_contract(spec_dir: &Utf8Path, contract: &ScopeContract) -> Result<()> {
    save_json(&spec_dir.join(SCOPE_CONTRACT_FILENAME), contract)
}

pub fn load_implementation_plan(spec_dir: &Utf8Path) -> Option<ImplementationPlan> {
    load_json(&spec_dir.join(IMPLEMENTATION_PLAN_FILENAME))
}

pub fn save_implementation_plan(spec_dir: &Utf8Path, plan: &ImplementationPlan) -> Result<()> {
    save_json(&spec_dir.join(IMPLEMENTATION_PLAN_FILENAME), plan)
}

pub fn load_proofs(spec_dir: &Utf8Path) -> ProofSet {
    load_json(&spec_dir.join(PROOFS_FILENAME)).unwrap_or_default()
}

pub fn save_proofs(spec_dir: &Utf8Path, proofs: &ProofSet) -> Result<()> {
    save_json(&spec_dir.join(PROOFS_FILENAME), proofs)
}

pub fn load_post_code_report(spec_dir: &Utf8Path) -> Option<PostCodeReport> {
    load_json(&spec_dir.join(POST_CODE_REPORT_FILENAME))
}

pub fn save_post_code_report(spec_dir: &Utf8Path, report: &PostCodeReport) -> Result<()> {
    save_json(&spec_dir.join(POST_CODE_REPORT_FILENAME), report)
}
