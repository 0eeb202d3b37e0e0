//! CLI command handlers.
//!
//! Each handler returns the process exit code; errors print a JSON error
//! object on stderr so callers can parse failures.

use camino::Utf8PathBuf;
use serde_json::json;

use crate::cli::args::{
    ConsiliumArgs, IntakeArgs, MigrateMetadataArgs, PlanImportArgs, PostCodeTestsArgs,
    RepairGitignoreArgs,
};
use crate::complexity::{ComplexityAnalyzer, complexity_score, level_for_score};
use crate::error::IflowError;
use crate::exit_codes::{codes, exit_code_for};
use crate::index::ProjectIndex;
use crate::intake::{infer_risk, infer_task_type};
use crate::plan_import::import_plan;
use crate::post_code::{run_post_code_tests, run_post_code_tests_if_needed};
use crate::resolver::{ResolveRequest, resolve_model};
use crate::types::NoiseProfile;

fn emit_error(err: &IflowError) -> i32 {
    let payload = json!({
        "error": err.to_string(),
    });
    eprintln!("{payload}");
    exit_code_for(err)
}

fn current_dir_utf8() -> Result<Utf8PathBuf, IflowError> {
    let cwd = std::env::current_dir()?;
    crate::paths::to_utf8(&cwd)
}

fn parse_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) {
        return items
            .into_iter()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect();
    }
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `intake`: classify a free-text description and emit intake JSON.
pub fn run_intake(args: &IntakeArgs) -> i32 {
    let task_type = infer_task_type(&args.description, None);
    let risk = infer_risk(&args.description);

    let analyzer = ComplexityAnalyzer::new(ProjectIndex::default());
    let assessment = analyzer.analyze(&args.description, None);
    let score = complexity_score(
        assessment.estimated_files,
        assessment.estimated_services,
        assessment.external_integrations,
        assessment.infrastructure_changes,
    );
    let complexity = level_for_score(score);
    let noise_profile = if task_type.is_code() {
        match complexity {
            crate::types::ComplexityLevel::Simple => NoiseProfile::Low,
            crate::types::ComplexityLevel::Medium => NoiseProfile::Medium,
            crate::types::ComplexityLevel::Complex => NoiseProfile::High,
        }
    } else {
        NoiseProfile::Low
    };

    let answers: serde_json::Value = args
        .answers
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or(serde_json::Value::Null);

    let payload = json!({
        "schema": if args.intake_v2 { "intake.v2" } else { "intake.v1" },
        "task_description": args.description,
        "task_type": task_type.as_str(),
        "complexity": complexity.as_str(),
        "complexity_score": score,
        "risk": risk,
        "noise_profile": noise_profile.as_str(),
        "reasoning": assessment.reasoning,
        "attachments": parse_list(args.attachments.as_deref()),
        "answers": answers,
        "reanalyzed": args.reanalyze,
        "model": args.model,
    });
    println!("{}", serde_json::to_string_pretty(&payload).expect("intake payload serializes"));
    codes::SUCCESS
}

/// `plan-import`: normalized tasks plus schedule JSON on stdout.
pub fn run_plan_import(args: &PlanImportArgs) -> i32 {
    let content = match std::fs::read_to_string(&args.file) {
        Ok(content) => content,
        Err(e) => return emit_error(&IflowError::Io(e)),
    };

    let import = match import_plan(&content, args.max_concurrency) {
        Ok(import) => import,
        Err(e) => return emit_error(&e),
    };

    let mut payload = serde_json::to_value(&import).expect("plan import serializes");
    if args.agent_pipeline {
        // Round-robin profile assignment; overrides come from the profiles
        // JSON keyed by task id.
        let overrides: serde_json::Value = args
            .agent_profiles
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(serde_json::Value::Null);
        let assignments: Vec<serde_json::Value> = import
            .tasks
            .iter()
            .enumerate()
            .map(|(i, task)| {
                let profile = overrides
                    .get(&task.id)
                    .and_then(|v| v.as_str())
                    .unwrap_or(if i % 2 == 0 { "builder" } else { "reviewer" });
                json!({ "task": task.id, "profile": profile })
            })
            .collect();
        payload["agent_pipeline"] = serde_json::Value::Array(assignments);
    }

    println!("{}", serde_json::to_string_pretty(&payload).expect("payload serializes"));
    codes::SUCCESS
}

/// `post-code-tests`: run the derived plan, print the report JSON.
pub async fn run_post_code_tests_cmd(args: &PostCodeTestsArgs) -> i32 {
    let report = if args.force {
        run_post_code_tests(&args.spec_dir, &args.project_dir).await
    } else {
        match run_post_code_tests_if_needed(&args.spec_dir, &args.project_dir).await {
            Ok(Some(report)) => Ok(report),
            Ok(None) => {
                // Unchanged HEAD: the stored report stands.
                match crate::artifact::load_post_code_report(&args.spec_dir) {
                    Some(report) => Ok(report),
                    None => Err(IflowError::SpecDir(
                        "no post-code report and no run needed".to_string(),
                    )),
                }
            }
            Err(e) => Err(e),
        }
    };

    match report {
        Ok(report) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).expect("report serializes")
            );
            match report.status {
                crate::types::PostCodeStatus::Passed | crate::types::PostCodeStatus::Skipped => {
                    codes::SUCCESS
                }
                _ => codes::GENERAL_ERROR,
            }
        }
        Err(e) => emit_error(&e),
    }
}

/// `consilium`: resolve the per-role session configuration.
///
/// The deliberation itself runs against the external backend; this resolves
/// and emits the session plan (models per role, permission mode, workspace).
pub fn run_consilium(args: &ConsiliumArgs) -> i32 {
    const ROLES: [&str; 3] = ["innovator", "realist", "facilitator"];

    let project_dir = args.project_dir.clone().or_else(|| current_dir_utf8().ok());

    let mut roles = serde_json::Map::new();
    for role in ROLES {
        let resolved = resolve_model(&ResolveRequest {
            feature: Some("consilium"),
            role: Some(role),
            project_dir: project_dir.as_deref(),
            cli_model: args.model.as_deref(),
            ..Default::default()
        });
        match resolved {
            Ok(resolved) => {
                roles.insert(
                    role.to_string(),
                    json!({
                        "model": resolved.model_id,
                        "thinkingLevel": resolved.thinking_level,
                        "thinkingBudget": resolved.thinking_budget,
                    }),
                );
            }
            Err(e) => return emit_error(&e),
        }
    }

    let payload = json!({
        "task": args.task,
        "project_name": args.project_name,
        "workspace": args.workspace.as_ref().map(|w| w.as_str()),
        "permission_mode": format!("{:?}", args.permission_mode).to_lowercase(),
        "roles": roles,
    });
    println!("{}", serde_json::to_string_pretty(&payload).expect("payload serializes"));
    codes::SUCCESS
}

/// `repair-gitignore`: reset the marker and re-apply all entries.
pub fn run_repair_gitignore(args: &RepairGitignoreArgs) -> i32 {
    let project_dir = match args.project_dir.clone().map_or_else(current_dir_utf8, Ok) {
        Ok(dir) => dir,
        Err(e) => return emit_error(&e),
    };

    match crate::workspace::repair_gitignore(&project_dir) {
        Ok(added) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "added": added }))
                    .expect("payload serializes")
            );
            codes::SUCCESS
        }
        Err(e) => emit_error(&e),
    }
}

/// `migrate-metadata`: run the task-metadata migration over every spec.
pub fn run_migrate_metadata(args: &MigrateMetadataArgs) -> i32 {
    let project_dir = match args.project_dir.clone().map_or_else(current_dir_utf8, Ok) {
        Ok(dir) => dir,
        Err(e) => return emit_error(&e),
    };

    let specs_dir = crate::paths::specs_dir(&project_dir);
    let counts = crate::routing::migrate_task_metadata_tree(&specs_dir);
    println!(
        "{}",
        serde_json::to_string_pretty(&counts).expect("counts serialize")
    );
    codes::SUCCESS
}
