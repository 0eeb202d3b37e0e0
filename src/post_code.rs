//! Post-code test runner.
//!
//! Executes the derived test plan after a code task's last subtask
//! completes, under per-command timeouts, and records a machine-readable
//! report used by the QA gate and the UI. Tests never run during coding
//! sessions (the command gate enforces that); this runner is the only place
//! they execute.

use camino::Utf8Path;
use chrono::Utc;
use std::process::Stdio;
use std::time::Duration;

use crate::artifact::{self, POST_CODE_REPORT_FILENAME};
use crate::error::Result;
use crate::git::latest_commit;
use crate::types::{
    CommandResult, PostCodeMirror, PostCodeReport, PostCodeStatus, TaskType, TestSummary,
};

pub const TEST_TIMEOUT_ENV_VAR: &str = "IFLOW_POST_CODE_TEST_TIMEOUT_SEC";
pub const OUTPUT_LIMIT_ENV_VAR: &str = "IFLOW_POST_CODE_TEST_OUTPUT_LIMIT";
pub const TEST_CAP_ENV_VAR: &str = "IFLOW_POST_CODE_TEST_CAP";

pub const DEFAULT_TIMEOUT_SECS: f64 = 1200.0;
pub const DEFAULT_OUTPUT_LIMIT: usize = 8000;
pub const DEFAULT_SMART_CAP: usize = 2;

/// One resolved test command.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSpec {
    pub cmd: String,
    pub timeout: Duration,
}

impl TestSpec {
    fn new(cmd: &str, timeout_secs: f64) -> Self {
        Self {
            cmd: cmd.to_string(),
            timeout: Duration::from_secs_f64(timeout_secs),
        }
    }
}

/// Alias table expanding intake test aliases to full commands.
fn alias_spec(alias: &str) -> Option<TestSpec> {
    let spec = match alias {
        "PYTEST_SECURITY" => TestSpec::new("python3 -m pytest tests/test_security_hooks.py -v", 180.0),
        "PYTEST_PIPELINE" => {
            TestSpec::new("python3 -m pytest tests/integration/test_pipeline.py -v", 300.0)
        }
        "PYTEST_PROOF_GATE" => TestSpec::new("python3 -m pytest tests/test_proof_gate.py -v", 180.0),
        "PYTEST_ROUTING" => TestSpec::new("python3 -m pytest tests/test_routing.py -v", 180.0),
        "PYTEST_PROMPTS" => TestSpec::new("python3 -m pytest tests/test_prompts_syntax.py -v", 60.0),
        "PYTEST_COLLECT" => TestSpec::new("python3 -m pytest --collect-only", 60.0),
        "NPM_TEST" => TestSpec::new("cd apps/frontend && npm test", 180.0),
        _ => return None,
    };
    Some(spec)
}

/// Priority order of expanded commands for the cap filter.
fn priority_rank(cmd: &str) -> usize {
    const PRIORITY_ALIASES: [&str; 5] = [
        "PYTEST_SECURITY",
        "PYTEST_PIPELINE",
        "PYTEST_PROOF_GATE",
        "NPM_TEST",
        "PYTEST_COLLECT",
    ];
    PRIORITY_ALIASES
        .iter()
        .position(|alias| alias_spec(alias).is_some_and(|s| s.cmd == cmd))
        .unwrap_or(PRIORITY_ALIASES.len())
}

fn coerce_test_spec(entry: &str, default_timeout: Duration) -> Option<TestSpec> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }
    if let Some(spec) = alias_spec(entry) {
        return Some(spec);
    }
    Some(TestSpec {
        cmd: entry.to_string(),
        timeout: default_timeout,
    })
}

fn dedupe_specs(specs: Vec<TestSpec>) -> Vec<TestSpec> {
    let mut seen = std::collections::HashSet::new();
    specs
        .into_iter()
        .filter(|spec| seen.insert(spec.cmd.clone()))
        .collect()
}

/// Commands that direct-match a touched path survive the cap.
fn direct_match_cmds(files_to_modify: &[String]) -> std::collections::HashSet<String> {
    let mut direct = std::collections::HashSet::new();
    for file in files_to_modify {
        let normalized = file.to_lowercase();
        if normalized.contains("security/") {
            direct.insert(alias_spec("PYTEST_SECURITY").expect("known alias").cmd);
        }
        if normalized.contains("qa/") {
            direct.insert(alias_spec("PYTEST_PROOF_GATE").expect("known alias").cmd);
        }
        if normalized.contains("pipeline/") {
            direct.insert(alias_spec("PYTEST_PIPELINE").expect("known alias").cmd);
        }
    }
    direct
}

fn apply_priority_filter(specs: Vec<TestSpec>, max_count: usize) -> Vec<TestSpec> {
    let mut indexed: Vec<(usize, TestSpec)> = specs.into_iter().enumerate().collect();
    indexed.sort_by_key(|(i, spec)| (priority_rank(&spec.cmd), *i));
    indexed
        .into_iter()
        .take(max_count)
        .map(|(_, spec)| spec)
        .collect()
}

fn apply_smart_cap(
    specs: Vec<TestSpec>,
    files_to_modify: &[String],
    max_count: usize,
) -> Vec<TestSpec> {
    if max_count == 0 || specs.len() <= max_count {
        return specs;
    }
    if files_to_modify.is_empty() {
        return apply_priority_filter(specs, max_count);
    }

    let direct_cmds = direct_match_cmds(files_to_modify);
    let (direct, indirect): (Vec<TestSpec>, Vec<TestSpec>) = specs
        .into_iter()
        .partition(|spec| direct_cmds.contains(&spec.cmd));

    let remaining = max_count.saturating_sub(direct.len());
    let mut result = direct;
    if remaining > 0 {
        result.extend(apply_priority_filter(indirect, remaining));
    }
    dedupe_specs(result)
}

/// Resolve the test plan: intake `tests_to_run` preferred, else the scope
/// contract's `test_plan`, capped by the smart cap.
#[must_use]
pub fn get_test_plan_specs(spec_dir: &Utf8Path) -> Vec<TestSpec> {
    let default_timeout = iflow_utils::timeout_from_env(TEST_TIMEOUT_ENV_VAR, DEFAULT_TIMEOUT_SECS)
        .unwrap_or(Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS));
    let cap = iflow_utils::timeout::limit_from_env(TEST_CAP_ENV_VAR, DEFAULT_SMART_CAP);

    let intake = artifact::load_task_intake(spec_dir);
    let files_to_modify = intake
        .as_ref()
        .map(|i| i.files_to_modify.clone())
        .unwrap_or_default();

    let raw_plan: Vec<String> = match &intake {
        Some(intake) if !intake.tests_to_run.is_empty() => intake.tests_to_run.clone(),
        _ => artifact::load_scope_contract(spec_dir)
            .map(|c| c.test_plan)
            .unwrap_or_default(),
    };

    let specs: Vec<TestSpec> = raw_plan
        .iter()
        .filter_map(|entry| coerce_test_spec(entry, default_timeout))
        .collect();
    apply_smart_cap(dedupe_specs(specs), &files_to_modify, cap)
}

/// Commands of the resolved test plan.
#[must_use]
pub fn get_test_plan(spec_dir: &Utf8Path) -> Vec<String> {
    get_test_plan_specs(spec_dir).into_iter().map(|s| s.cmd).collect()
}

fn task_type_of(spec_dir: &Utf8Path) -> TaskType {
    if let Some(intake) = artifact::load_task_intake(spec_dir) {
        return intake.task_type;
    }
    artifact::load_scope_contract(spec_dir)
        .and_then(|c| c.task_type)
        .unwrap_or_default()
}

/// Whether the runner needs to execute: code task and either no report yet
/// or the recorded commit differs from HEAD.
#[must_use]
pub fn should_run_post_code_tests(spec_dir: &Utf8Path, project_dir: &Utf8Path) -> bool {
    if task_type_of(spec_dir) != TaskType::Code {
        return false;
    }
    let Some(report) = artifact::load_post_code_report(spec_dir) else {
        return true;
    };

    let head = latest_commit(project_dir);
    match (head, report.commit) {
        (Some(head), Some(recorded)) => head != recorded,
        _ => true,
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n...[truncated]", &text[..end])
}

fn should_use_shell(command: &str) -> bool {
    ["&&", "||", "|", ">", "<", ";"]
        .iter()
        .any(|token| command.contains(token))
}

/// Minimal shell-word splitter for direct exec (quotes respected).
fn split_words(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;

    for c in command.chars() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            c if c.is_whitespace() && !in_single && !in_double => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

async fn run_command(command: &str, cwd: &Utf8Path, timeout: Duration) -> CommandResult {
    let start = std::time::Instant::now();

    let spawn_result = if should_use_shell(command) {
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    } else {
        let words = split_words(command);
        let Some((program, args)) = words.split_first() else {
            return CommandResult {
                command: command.to_string(),
                status: "failed".to_string(),
                returncode: Some(1),
                duration_sec: 0.0,
                timed_out: false,
                stdout: String::new(),
                stderr: "Empty command".to_string(),
            };
        };
        tokio::process::Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    };

    let child = match spawn_result {
        Ok(child) => child,
        Err(e) => {
            return CommandResult {
                command: command.to_string(),
                status: "failed".to_string(),
                returncode: None,
                duration_sec: start.elapsed().as_secs_f64(),
                timed_out: false,
                stdout: String::new(),
                stderr: format!("spawn failed: {e}"),
            };
        }
    };

    let (timed_out, output) =
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => (false, Some(output)),
            Ok(Err(e)) => {
                return CommandResult {
                    command: command.to_string(),
                    status: "failed".to_string(),
                    returncode: None,
                    duration_sec: start.elapsed().as_secs_f64(),
                    timed_out: false,
                    stdout: String::new(),
                    stderr: format!("wait failed: {e}"),
                };
            }
            // kill_on_drop reaps the child when the future is dropped.
            Err(_) => (true, None),
        };

    let duration_sec = start.elapsed().as_secs_f64();
    match output {
        Some(output) => {
            let returncode = output.status.code();
            let status = if returncode == Some(0) { "passed" } else { "failed" };
            CommandResult {
                command: command.to_string(),
                status: status.to_string(),
                returncode,
                duration_sec,
                timed_out: false,
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }
        }
        None => CommandResult {
            command: command.to_string(),
            status: "timed_out".to_string(),
            returncode: None,
            duration_sec,
            timed_out,
            stdout: String::new(),
            stderr: String::new(),
        },
    }
}

fn summarize(results: &[CommandResult]) -> TestSummary {
    let total = results.len() as u32;
    let passed = results.iter().filter(|r| r.status == "passed").count() as u32;
    TestSummary {
        total,
        passed,
        failed: total - passed,
    }
}

fn mirror_into_plan(spec_dir: &Utf8Path, report: &PostCodeReport) -> Result<()> {
    let Some(mut plan) = artifact::load_implementation_plan(spec_dir) else {
        return Ok(());
    };
    plan.post_code_tests = Some(PostCodeMirror {
        status: report.status,
        summary: report.summary,
        commit: report.commit.clone(),
        report_file: POST_CODE_REPORT_FILENAME.to_string(),
        updated_at: report.completed_at,
    });
    plan.updated_at = Some(Utc::now());
    artifact::save_implementation_plan(spec_dir, &plan)
}

fn write_report(spec_dir: &Utf8Path, report: &PostCodeReport) -> Result<()> {
    artifact::save_post_code_report(spec_dir, report)?;
    mirror_into_plan(spec_dir, report)
}

/// Execute the post-code test plan and persist the report.
pub async fn run_post_code_tests(
    spec_dir: &Utf8Path,
    project_dir: &Utf8Path,
) -> Result<PostCodeReport> {
    let specs = get_test_plan_specs(spec_dir);
    let started_at = Utc::now();
    let output_limit =
        iflow_utils::timeout::limit_from_env(OUTPUT_LIMIT_ENV_VAR, DEFAULT_OUTPUT_LIMIT);

    if specs.is_empty() {
        let task_type = task_type_of(spec_dir);
        let report = if task_type != TaskType::Code {
            tracing::info!(task_type = task_type.as_str(), "Post-code tests skipped: non-code task");
            PostCodeReport {
                status: PostCodeStatus::Skipped,
                reason: Some(format!("Non-code task (task_type={})", task_type.as_str())),
                started_at,
                completed_at: Utc::now(),
                commit: latest_commit(project_dir),
                test_plan: vec![],
                results: vec![],
                summary: TestSummary::default(),
            }
        } else {
            tracing::error!("Post-code tests failed: missing test plan entries");
            PostCodeReport {
                status: PostCodeStatus::Failed,
                reason: Some("No test plan entries in scope_contract.json".to_string()),
                started_at,
                completed_at: Utc::now(),
                commit: latest_commit(project_dir),
                test_plan: vec![],
                results: vec![],
                summary: TestSummary::default(),
            }
        };
        write_report(spec_dir, &report)?;
        return Ok(report);
    }

    tracing::info!(commands = specs.len(), "Running post-code test plan");
    let mut results = Vec::new();
    for spec in &specs {
        tracing::info!(command = %spec.cmd, "Running test command");
        let mut result = run_command(&spec.cmd, project_dir, spec.timeout).await;
        result.stdout = truncate(&result.stdout, output_limit);
        result.stderr = truncate(&result.stderr, output_limit);
        tracing::info!(
            command = %result.command,
            status = %result.status,
            exit = ?result.returncode,
            duration_sec = result.duration_sec,
            "Test command finished"
        );
        results.push(result);
    }

    let summary = summarize(&results);
    let status = if summary.failed == 0 {
        PostCodeStatus::Passed
    } else {
        PostCodeStatus::Failed
    };

    let report = PostCodeReport {
        status,
        reason: None,
        started_at,
        completed_at: Utc::now(),
        commit: latest_commit(project_dir),
        test_plan: specs.iter().map(|s| s.cmd.clone()).collect(),
        results,
        summary,
    };
    write_report(spec_dir, &report)?;
    Ok(report)
}

/// Run the tests only when needed; returns `None` when skipped and the
/// stored report stands.
pub async fn run_post_code_tests_if_needed(
    spec_dir: &Utf8Path,
    project_dir: &Utf8Path,
) -> Result<Option<PostCodeReport>> {
    if !should_run_post_code_tests(spec_dir, project_dir) {
        return Ok(None);
    }
    Ok(Some(run_post_code_tests(spec_dir, project_dir).await?))
}
