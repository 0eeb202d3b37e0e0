//! Preflight scoper: derives `task_intake.json` for routing, noise control,
//! and proof gating.

use camino::Utf8Path;
use chrono::Utc;

use crate::artifact::{self, INTAKE_REPORT_FILENAME};
use crate::complexity::{ComplexityAnalyzer, complexity_score, level_for_score};
use crate::error::Result;
use crate::index::load_project_index_cached;
use crate::types::{
    AcceptanceMapEntry, ComplexityLevel, FilesToModifySource, NoiseProfile, Requirements,
    RiskLevel, ScopeContract, TaskIntake, TaskType,
};

/// Clarifying question recorded when files to modify are unknown.
pub const FILES_QUESTION: &str = "Which files will be modified?";

const HIGH_RISK_KEYWORDS: &[&str] = &[
    "auth",
    "oauth",
    "payment",
    "payments",
    "pii",
    "personal data",
    "credit card",
    "token",
    "crypto",
    "security",
];

const TASK_TYPE_KEYWORDS: &[(TaskType, &[&str])] = &[
    (
        TaskType::Analysis,
        &["analysis", "analyze", "investigate", "root cause", "diagnose"],
    ),
    (
        TaskType::Audit,
        &["audit", "compliance", "security review", "risk review"],
    ),
    (
        TaskType::Plan,
        &["roadmap", "strategy", "proposal", "design doc", "plan "],
    ),
    (
        TaskType::Content,
        &["docs", "documentation", "readme", "changelog", "write "],
    ),
];

/// Default maximum number of derived test aliases.
pub const DEFAULT_TESTS_CAP: usize = 2;

/// Priority order for capping derived tests.
const TEST_PRIORITIES: &[&str] = &[
    "PYTEST_SECURITY",
    "PYTEST_PIPELINE",
    "PYTEST_PROOF_GATE",
    "NPM_TEST",
    "PYTEST_COLLECT",
];

/// Aliases that direct-match a touched path and survive the cap.
const DIRECT_MATCH_ALIASES: &[&str] = &["PYTEST_SECURITY", "PYTEST_PROOF_GATE", "PYTEST_PIPELINE"];

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .trim_start_matches("./")
        .to_string()
}

/// Concrete file: non-empty, not a directory, no glob characters.
fn is_concrete_file(path: &str) -> bool {
    let normalized = normalize_path(path);
    !normalized.is_empty()
        && !normalized.ends_with('/')
        && !normalized.contains(['*', '?', '['])
}

/// Infer the task type from workflow hints, then description keywords.
#[must_use]
pub fn infer_task_type(task_description: &str, workflow_type: Option<&str>) -> TaskType {
    match workflow_type.map(|w| w.trim().to_lowercase()).as_deref() {
        Some("docs" | "documentation") => return TaskType::Content,
        Some("audit" | "analysis") => return TaskType::Analysis,
        Some("plan" | "planning") => return TaskType::Plan,
        _ => {}
    }

    let description = task_description.to_lowercase();
    for (task_type, keywords) in TASK_TYPE_KEYWORDS {
        if keywords.iter().any(|kw| description.contains(kw)) {
            return *task_type;
        }
    }
    TaskType::Code
}

/// Sensitive-keyword risk scan.
#[must_use]
pub fn infer_risk(task_description: &str) -> RiskLevel {
    let description = task_description.to_lowercase();
    if HIGH_RISK_KEYWORDS.iter().any(|kw| description.contains(kw)) {
        RiskLevel::High
    } else {
        RiskLevel::Low
    }
}

fn infer_acceptance(task_description: &str, scope_contract: &ScopeContract) -> Vec<String> {
    let acceptance: Vec<String> = scope_contract
        .acceptance
        .iter()
        .filter(|item| !item.trim().is_empty())
        .cloned()
        .collect();
    if !acceptance.is_empty() {
        return acceptance;
    }
    if !task_description.trim().is_empty() {
        return vec![format!("Deliver: {}", task_description.trim())];
    }
    Vec::new()
}

/// Map a touched file path to test aliases.
fn tests_for_file(path: &str) -> Vec<&'static str> {
    let normalized = normalize_path(path).to_lowercase();
    let name = normalized.rsplit('/').next().unwrap_or("");

    if normalized.contains("prompts/") || normalized.contains("prompts_pkg/") {
        return vec!["PYTEST_PIPELINE", "PYTEST_PROMPTS"];
    }
    if normalized.ends_with(".md") {
        return vec![];
    }

    let is_runtime_config = matches!(
        name,
        "pytest.ini" | "pyproject.toml" | "package.json" | "dockerfile"
    ) || name.starts_with(".env")
        || normalized.contains(".github/workflows/");
    if is_runtime_config {
        return vec!["PYTEST_COLLECT"];
    }

    if normalized.contains("security/") {
        return vec!["PYTEST_SECURITY"];
    }
    if normalized.contains("qa/") {
        return vec!["PYTEST_PROOF_GATE"];
    }
    if normalized.contains("pipeline/") {
        return vec!["PYTEST_PIPELINE", "PYTEST_ROUTING"];
    }
    if normalized.contains("frontend/") {
        return vec!["NPM_TEST"];
    }
    if normalized.contains("shared/") || normalized.ends_with(".d.ts") {
        return vec!["NPM_TEST", "PYTEST_PIPELINE"];
    }
    if normalized.contains("backend/") {
        return vec!["PYTEST_PIPELINE"];
    }
    vec![]
}

fn apply_priority_filter(tests: Vec<String>, max_count: usize) -> Vec<String> {
    let rank = |alias: &str| {
        TEST_PRIORITIES
            .iter()
            .position(|p| *p == alias)
            .unwrap_or(TEST_PRIORITIES.len())
    };
    let mut indexed: Vec<(usize, String)> = tests.into_iter().enumerate().map(|(i, t)| (i, t)).collect();
    indexed.sort_by_key(|(i, alias)| (rank(alias), *i));
    indexed.into_iter().take(max_count).map(|(_, t)| t).collect()
}

/// Cap the derived tests, preserving direct matches first.
fn apply_smart_cap(tests: Vec<String>, files_to_modify: &[String], max_count: usize) -> Vec<String> {
    if max_count == 0 || tests.len() <= max_count {
        return tests;
    }
    if files_to_modify.is_empty() {
        return apply_priority_filter(tests, max_count);
    }

    let direct: Vec<String> = tests
        .iter()
        .filter(|alias| DIRECT_MATCH_ALIASES.contains(&alias.as_str()))
        .cloned()
        .collect();
    let indirect: Vec<String> = tests
        .into_iter()
        .filter(|alias| !direct.contains(alias))
        .collect();

    let remaining = max_count.saturating_sub(direct.len());
    let mut result = direct;
    if remaining > 0 {
        result.extend(apply_priority_filter(indirect, remaining));
    }
    result
}

/// Derive `tests_to_run` for a task. Non-code tasks never run tests; a code
/// task with unknown files records a clarifying question instead.
fn determine_tests_to_run(
    task_type: TaskType,
    files_to_modify: &[String],
    clarifying_questions: &mut Vec<String>,
) -> Vec<String> {
    if !task_type.is_code() {
        return Vec::new();
    }
    if files_to_modify.is_empty() {
        if !clarifying_questions.iter().any(|q| q == FILES_QUESTION) {
            clarifying_questions.push(FILES_QUESTION.to_string());
        }
        return Vec::new();
    }

    let mut tests = Vec::new();
    for file in files_to_modify {
        for alias in tests_for_file(file) {
            if !tests.contains(&alias.to_string()) {
                tests.push(alias.to_string());
            }
        }
    }

    if tests.len() > DEFAULT_TESTS_CAP {
        tests = apply_smart_cap(tests, files_to_modify, DEFAULT_TESTS_CAP);
    }
    tests
}

/// Resolve the files to modify: explicit requirements list, then 1-2
/// concrete candidate files from the scope contract (inferred, with a
/// confirmation question), else missing.
fn resolve_files_to_modify(
    task_type: TaskType,
    requirements: &Requirements,
    scope_contract: &ScopeContract,
    clarifying_questions: &mut Vec<String>,
) -> (Vec<String>, FilesToModifySource, bool) {
    if let Some(explicit) = &requirements.files_to_modify {
        if !explicit.is_empty() {
            return (explicit.clone(), FilesToModifySource::RequirementsJson, false);
        }
    }

    if !task_type.is_code() {
        return (Vec::new(), FilesToModifySource::None, false);
    }

    let concrete: Vec<String> = scope_contract
        .candidate_files
        .iter()
        .filter(|path| is_concrete_file(path))
        .cloned()
        .collect();
    if !concrete.is_empty() && concrete.len() <= 2 {
        clarifying_questions.push(format!(
            "Confirm the files to modify: {}",
            concrete.join(", ")
        ));
        return (concrete, FilesToModifySource::ScopeContract, true);
    }

    if scope_contract.candidate_files.is_empty() {
        clarifying_questions.push(FILES_QUESTION.to_string());
    } else {
        clarifying_questions
            .push("Narrow down the exact files to modify (candidate_files is too broad).".to_string());
    }
    (Vec::new(), FilesToModifySource::Missing, true)
}

/// Pair each acceptance criterion with the single candidate output file, if
/// exactly one exists.
fn build_acceptance_map(acceptance: &[String], output_files: &[String]) -> Vec<AcceptanceMapEntry> {
    let mapped_file = if output_files.len() == 1 {
        output_files[0].clone()
    } else {
        String::new()
    };
    acceptance
        .iter()
        .filter(|criterion| !criterion.trim().is_empty())
        .map(|criterion| AcceptanceMapEntry {
            criterion: criterion.clone(),
            file: mapped_file.clone(),
        })
        .collect()
}

fn determine_noise_profile(task_type: TaskType, complexity: ComplexityLevel) -> NoiseProfile {
    if !task_type.is_code() {
        return NoiseProfile::Low;
    }
    match complexity {
        ComplexityLevel::Simple => NoiseProfile::Low,
        ComplexityLevel::Medium => NoiseProfile::Medium,
        ComplexityLevel::Complex => NoiseProfile::High,
    }
}

/// Render the human-readable intake report.
fn render_intake_report(intake: &serde_json::Value) -> String {
    let timestamp = Utc::now().to_rfc3339();
    let mut lines = vec![
        "# Intake Report".to_string(),
        String::new(),
        format!("- Generated: {timestamp}"),
        format!(
            "- Clarity: {}",
            intake
                .get("clarity_level")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
        ),
        format!(
            "- Model: {}",
            intake
                .get("intake_model")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
        ),
        String::new(),
    ];

    let list_section = |title: &str, key: &str, lines: &mut Vec<String>| {
        if let Some(items) = intake.get(key).and_then(|v| v.as_array()) {
            if !items.is_empty() {
                lines.push(format!("## {title}"));
                for item in items {
                    let text = item
                        .get("question")
                        .and_then(|v| v.as_str())
                        .or_else(|| item.as_str())
                        .unwrap_or_default();
                    lines.push(format!("- {}", text.trim()));
                }
                lines.push(String::new());
            }
        }
    };

    if let Some(title) = intake.get("suggested_title").and_then(|v| v.as_str()) {
        lines.push(format!("## Suggested Title\n\n{title}\n"));
    }
    list_section("Risks", "risks", &mut lines);
    list_section("Assumptions", "assumptions", &mut lines);
    if let Some(notes) = intake.get("notes").and_then(|v| v.as_str()) {
        lines.push("## Notes\n".to_string());
        lines.push(notes.to_string());
        lines.push(String::new());
    }
    list_section("Clarifying Questions", "clarifying_questions", &mut lines);

    format!("{}\n", lines.join("\n").trim_end())
}

/// Write `intake_report.md`, rotating any existing report to `.vN`.
fn write_versioned_intake_report(spec_dir: &Utf8Path, intake: &serde_json::Value) -> Result<()> {
    let report_path = spec_dir.join(INTAKE_REPORT_FILENAME);
    if report_path.exists() {
        let mut max_version = 0u32;
        if let Ok(entries) = std::fs::read_dir(spec_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(version) = name
                        .strip_prefix("intake_report.v")
                        .and_then(|rest| rest.strip_suffix(".md"))
                        .and_then(|v| v.parse::<u32>().ok())
                    {
                        max_version = max_version.max(version);
                    }
                }
            }
        }
        let next = max_version + 1;
        std::fs::rename(&report_path, spec_dir.join(format!("intake_report.v{next}.md")))?;
    }
    std::fs::write(&report_path, render_intake_report(intake))?;
    Ok(())
}

/// Create `task_intake.json` from the task description, requirements, and
/// scope contract. Re-running with the same inputs yields the same intake.
pub fn run_preflight_scoper(
    spec_dir: &Utf8Path,
    project_dir: &Utf8Path,
    task_description: Option<&str>,
) -> Result<TaskIntake> {
    let requirements = artifact::load_requirements(spec_dir).unwrap_or_default();
    let scope_contract = artifact::load_scope_contract(spec_dir).unwrap_or_default();

    let task_desc = task_description
        .map(ToString::to_string)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| requirements.task_description.clone());

    let task_type = infer_task_type(&task_desc, requirements.workflow_type.as_deref());
    let risk = infer_risk(&task_desc);

    let index = load_project_index_cached(project_dir);
    let assessment = ComplexityAnalyzer::new(index).analyze(&task_desc, Some(&requirements));
    let score = complexity_score(
        assessment.estimated_files,
        assessment.estimated_services,
        assessment.external_integrations,
        assessment.infrastructure_changes,
    );
    let complexity = level_for_score(score);
    let noise_profile = determine_noise_profile(task_type, complexity);

    let mut clarifying_questions = Vec::new();

    let acceptance = infer_acceptance(&task_desc, &scope_contract);
    if acceptance.is_empty() {
        clarifying_questions.push("Provide explicit acceptance criteria.".to_string());
    }

    let input_files = requirements.input_files.clone().unwrap_or_default();
    let output_files = scope_contract.candidate_files.clone();

    let (files_to_modify, files_source, files_inferred) = resolve_files_to_modify(
        task_type,
        &requirements,
        &scope_contract,
        &mut clarifying_questions,
    );

    let acceptance_map = build_acceptance_map(&acceptance, &output_files);
    let tests_to_run =
        determine_tests_to_run(task_type, &files_to_modify, &mut clarifying_questions);

    let ralph_loop = task_type.is_code() && noise_profile == NoiseProfile::High;

    let intake = TaskIntake {
        task_type,
        complexity,
        complexity_score: score,
        risk,
        noise_profile,
        input_files,
        output_files,
        files_to_modify,
        files_to_modify_source: files_source,
        files_to_modify_inferred: files_inferred,
        tests_to_run,
        acceptance_map,
        clarifying_questions,
        ralph_loop,
        ralph_loop_max: 3,
    };

    if let Some(raw_intake) = &requirements.intake {
        write_versioned_intake_report(spec_dir, raw_intake)?;
    }

    artifact::save_task_intake(spec_dir, &intake)?;
    Ok(intake)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_workflow_hint_beats_keywords() {
        assert_eq!(
            infer_task_type("analyze the build failures", Some("docs")),
            TaskType::Content
        );
        assert_eq!(infer_task_type("whatever", Some("planning")), TaskType::Plan);
    }

    #[test]
    fn test_keyword_inference() {
        assert_eq!(infer_task_type("Investigate flaky test", None), TaskType::Analysis);
        assert_eq!(infer_task_type("Security review of uploads", None), TaskType::Audit);
        assert_eq!(infer_task_type("Update README badges", None), TaskType::Content);
        assert_eq!(infer_task_type("Fix the login bug", None), TaskType::Code);
    }

    #[test]
    fn test_risk_keywords() {
        assert_eq!(infer_risk("Rotate the oauth token"), RiskLevel::High);
        assert_eq!(infer_risk("Rename a button"), RiskLevel::Low);
    }

    #[test]
    fn test_tests_for_file_mapping() {
        assert_eq!(
            tests_for_file("apps/backend/security/hooks.py"),
            vec!["PYTEST_SECURITY"]
        );
        assert_eq!(
            tests_for_file("apps/backend/qa/proof_gate.py"),
            vec!["PYTEST_PROOF_GATE"]
        );
        assert_eq!(
            tests_for_file("apps/backend/spec/pipeline/orchestrator.py"),
            vec!["PYTEST_PIPELINE", "PYTEST_ROUTING"]
        );
        assert_eq!(tests_for_file("apps/frontend/src/App.tsx"), vec!["NPM_TEST"]);
        assert!(tests_for_file("docs/guide.md").is_empty());
        assert_eq!(tests_for_file("package.json"), vec!["PYTEST_COLLECT"]);
    }

    #[test]
    fn test_priority_filter_order() {
        let tests = vec![
            "PYTEST_COLLECT".to_string(),
            "NPM_TEST".to_string(),
            "PYTEST_SECURITY".to_string(),
        ];
        let capped = apply_priority_filter(tests, 2);
        assert_eq!(capped, vec!["PYTEST_SECURITY", "NPM_TEST"]);
    }

    #[test]
    fn test_smart_cap_keeps_direct_matches() {
        let tests = vec![
            "NPM_TEST".to_string(),
            "PYTEST_SECURITY".to_string(),
            "PYTEST_COLLECT".to_string(),
        ];
        let files = vec!["apps/backend/security/hooks.py".to_string()];
        let capped = apply_smart_cap(tests, &files, 2);
        assert!(capped.contains(&"PYTEST_SECURITY".to_string()));
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn test_acceptance_map_single_output_file() {
        let map = build_acceptance_map(
            &["Docs updated".to_string()],
            &["README.md".to_string()],
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map[0].file, "README.md");
    }

    #[test]
    fn test_acceptance_map_multiple_outputs_empty_file() {
        let map = build_acceptance_map(
            &["Docs updated".to_string()],
            &["README.md".to_string(), "CHANGES.md".to_string()],
        );
        assert_eq!(map[0].file, "");
    }

    #[test]
    fn test_scoper_docs_task() {
        let dir = TempDir::new().unwrap();
        let project = utf8_dir(&dir);
        let spec_dir = project.join("spec");
        std::fs::create_dir_all(&spec_dir).unwrap();

        artifact::save_requirements(
            &spec_dir,
            &Requirements {
                task_description: "Update README context menu section".to_string(),
                workflow_type: Some("docs".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        artifact::save_scope_contract(
            &spec_dir,
            &ScopeContract {
                candidate_files: vec!["README.md".to_string()],
                acceptance: vec!["Docs updated".to_string()],
                ..Default::default()
            },
        )
        .unwrap();

        let intake = run_preflight_scoper(&spec_dir, &project, None).unwrap();
        assert_eq!(intake.task_type, TaskType::Content);
        assert!(intake.tests_to_run.is_empty());
        assert_eq!(intake.noise_profile, NoiseProfile::Low);
        assert_eq!(intake.acceptance_map.len(), 1);
        assert_eq!(intake.acceptance_map[0].file, "README.md");
        assert!(!intake.ralph_loop);
    }

    #[test]
    fn test_scoper_code_task_without_files_records_question() {
        let dir = TempDir::new().unwrap();
        let project = utf8_dir(&dir);
        let spec_dir = project.join("spec");
        std::fs::create_dir_all(&spec_dir).unwrap();

        artifact::save_requirements(
            &spec_dir,
            &Requirements {
                task_description: "Fix the login bug".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        let intake = run_preflight_scoper(&spec_dir, &project, None).unwrap();
        assert_eq!(intake.task_type, TaskType::Code);
        assert!(intake.tests_to_run.is_empty());
        assert!(intake
            .clarifying_questions
            .iter()
            .any(|q| q == FILES_QUESTION));
        assert_eq!(intake.files_to_modify_source, FilesToModifySource::Missing);
    }

    #[test]
    fn test_scoper_pins_security_test() {
        let dir = TempDir::new().unwrap();
        let project = utf8_dir(&dir);
        let spec_dir = project.join("spec");
        std::fs::create_dir_all(&spec_dir).unwrap();

        artifact::save_requirements(
            &spec_dir,
            &Requirements {
                task_description: "Block npm test during coding sessions".to_string(),
                files_to_modify: Some(vec!["apps/backend/security/hooks.py".to_string()]),
                ..Default::default()
            },
        )
        .unwrap();

        let intake = run_preflight_scoper(&spec_dir, &project, None).unwrap();
        assert!(intake.tests_to_run.contains(&"PYTEST_SECURITY".to_string()));
        assert_eq!(
            intake.files_to_modify_source,
            FilesToModifySource::RequirementsJson
        );
    }

    #[test]
    fn test_scoper_deterministic_rerun() {
        let dir = TempDir::new().unwrap();
        let project = utf8_dir(&dir);
        let spec_dir = project.join("spec");
        std::fs::create_dir_all(&spec_dir).unwrap();

        artifact::save_requirements(
            &spec_dir,
            &Requirements {
                task_description: "Update README".to_string(),
                workflow_type: Some("docs".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let first = run_preflight_scoper(&spec_dir, &project, None).unwrap();
        let first_json = serde_json::to_string(&first).unwrap();
        let second = run_preflight_scoper(&spec_dir, &project, None).unwrap();
        let second_json = serde_json::to_string(&second).unwrap();
        assert_eq!(first_json, second_json);
    }

    #[test]
    fn test_scoper_candidate_files_inferred_with_confirmation() {
        let dir = TempDir::new().unwrap();
        let project = utf8_dir(&dir);
        let spec_dir = project.join("spec");
        std::fs::create_dir_all(&spec_dir).unwrap();

        artifact::save_requirements(
            &spec_dir,
            &Requirements {
                task_description: "Fix pipeline retry logic".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        artifact::save_scope_contract(
            &spec_dir,
            &ScopeContract {
                candidate_files: vec!["apps/backend/spec/pipeline/orchestrator.py".to_string()],
                ..Default::default()
            },
        )
        .unwrap();

        let intake = run_preflight_scoper(&spec_dir, &project, None).unwrap();
        assert_eq!(intake.files_to_modify.len(), 1);
        assert!(intake.files_to_modify_inferred);
        assert_eq!(
            intake.files_to_modify_source,
            FilesToModifySource::ScopeContract
        );
        assert!(intake
            .clarifying_questions
            .iter()
            .any(|q| q.starts_with("Confirm the files")));
    }

    #[test]
    fn test_intake_report_versioning() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir);
        let raw = serde_json::json!({
            "clarity_level": "high",
            "risks": ["scope creep"],
        });

        write_versioned_intake_report(&spec_dir, &raw).unwrap();
        write_versioned_intake_report(&spec_dir, &raw).unwrap();
        write_versioned_intake_report(&spec_dir, &raw).unwrap();

        assert!(spec_dir.join("intake_report.md").exists());
        assert!(spec_dir.join("intake_report.v1.md").exists());
        assert!(spec_dir.join("intake_report.v2.md").exists());
    }

    #[test]
    fn test_ralph_loop_for_high_noise_code() {
        let dir = TempDir::new().unwrap();
        let project = utf8_dir(&dir);
        let spec_dir = project.join("spec");
        std::fs::create_dir_all(&spec_dir).unwrap();

        artifact::save_requirements(
            &spec_dir,
            &Requirements {
                task_description:
                    "Refactor the auth integration across services with docker deploy changes"
                        .to_string(),
                files_to_modify: Some(vec![
                    "a.py".into(),
                    "b.py".into(),
                    "c.py".into(),
                    "d.py".into(),
                    "e.py".into(),
                    "f.py".into(),
                    "g.py".into(),
                ]),
                services_involved: vec!["api".into(), "web".into()],
                ..Default::default()
            },
        )
        .unwrap();

        let intake = run_preflight_scoper(&spec_dir, &project, None).unwrap();
        assert_eq!(intake.noise_profile, NoiseProfile::High);
        assert!(intake.ralph_loop);
        assert_eq!(intake.ralph_loop_max, 3);
    }
}
