//! Post-session processing.
//!
//! Runs after every agent session regardless of outcome, because the agent
//! cannot be trusted to do its own bookkeeping: plan deltas are inspected
//! here, attempts and good commits recorded, proofs appended, tests
//! triggered, and memory updated. Every side effect is best-effort with its
//! own bounded timeout; only plan loading failures surface to the caller.

use camino::Utf8Path;
use std::future::Future;
use std::time::Duration;

use crate::artifact;
use crate::error::Result;
use crate::git;
use crate::integrations::{InsightExtractor, MemoryStore, SessionSnapshot, Tracker};
use crate::post_code::run_post_code_tests_if_needed;
use crate::progress::{append_build_progress, count_subtasks, is_build_complete};
use crate::proofs::append_acceptance_proofs;
use crate::qa::downgrade_plan_after_test_failure;
use crate::recovery::RecoveryManager;
use crate::types::{PostCodeStatus, SubtaskStatus, TaskType};

pub const INSIGHTS_TIMEOUT_ENV_VAR: &str = "POST_SESSION_INSIGHTS_TIMEOUT_SEC";
pub const MEMORY_TIMEOUT_ENV_VAR: &str = "POST_SESSION_MEMORY_TIMEOUT_SEC";
pub const DEFAULT_SIDE_EFFECT_TIMEOUT_SECS: f64 = 60.0;

/// Inputs captured around one session.
pub struct PostSessionContext<'a> {
    pub spec_dir: &'a Utf8Path,
    pub project_dir: &'a Utf8Path,
    pub subtask_id: &'a str,
    pub session_num: u32,
    pub commit_before: Option<String>,
    pub commit_count_before: u32,
    /// Original spec directory when the session ran in a worktree.
    pub source_spec_dir: Option<&'a Utf8Path>,
}

/// External collaborators the processor talks to.
pub struct PostSessionHooks<'a> {
    pub memory: &'a dyn MemoryStore,
    pub insights: &'a dyn InsightExtractor,
    pub tracker: Option<&'a dyn Tracker>,
}

async fn bounded<F, T>(future: F, timeout: Option<Duration>) -> Option<T>
where
    F: Future<Output = T>,
{
    match timeout {
        Some(bound) => tokio::time::timeout(bound, future).await.ok(),
        None => Some(future.await),
    }
}

/// Copy plan/spec artifacts back to the source tree (worktree mode).
fn sync_spec_to_source(spec_dir: &Utf8Path, source_spec_dir: Option<&Utf8Path>) -> bool {
    let Some(source) = source_spec_dir else {
        return false;
    };
    if source == spec_dir {
        return false;
    }

    let mut synced = false;
    for name in [
        artifact::IMPLEMENTATION_PLAN_FILENAME,
        artifact::PROOFS_FILENAME,
        "spec.md",
    ] {
        let from = spec_dir.join(name);
        if !from.exists() {
            continue;
        }
        if let Err(e) = std::fs::create_dir_all(source)
            .and_then(|()| std::fs::copy(&from, source.join(name)).map(|_| ()))
        {
            tracing::warn!(file = name, error = %e, "Failed to sync spec artifact to source");
        } else {
            synced = true;
        }
    }
    synced
}

/// Process session results and update recovery, proofs, memory, and tests.
///
/// Returns true when the subtask completed successfully.
pub async fn post_session_processing(
    ctx: &PostSessionContext<'_>,
    recovery: &mut RecoveryManager,
    hooks: &PostSessionHooks<'_>,
) -> Result<bool> {
    let insights_timeout = iflow_utils::timeout_from_env(
        INSIGHTS_TIMEOUT_ENV_VAR,
        DEFAULT_SIDE_EFFECT_TIMEOUT_SECS,
    );
    let memory_timeout =
        iflow_utils::timeout_from_env(MEMORY_TIMEOUT_ENV_VAR, DEFAULT_SIDE_EFFECT_TIMEOUT_SECS);

    if sync_spec_to_source(ctx.spec_dir, ctx.source_spec_dir) {
        tracing::info!("Implementation plan synced to main project");
    }

    let Some(plan) = artifact::load_implementation_plan(ctx.spec_dir) else {
        tracing::warn!("Could not load implementation plan");
        return Ok(false);
    };
    let Some(subtask) = plan.find_subtask(ctx.subtask_id) else {
        tracing::warn!(subtask_id = %ctx.subtask_id, "Subtask not found in plan");
        return Ok(false);
    };
    let subtask_status = subtask.status;
    let subtask_description = subtask.description.clone();
    let task_type = plan
        .task_type
        .or_else(|| artifact::load_task_intake(ctx.spec_dir).map(|i| i.task_type))
        .unwrap_or_default();

    let commit_after = git::latest_commit(ctx.project_dir);
    let commit_count_after = git::commit_count(ctx.project_dir);
    let new_commits = commit_count_after.saturating_sub(ctx.commit_count_before);
    let has_new_commit = matches!(
        (&commit_after, &ctx.commit_before),
        (Some(after), Some(before)) if after != before
    ) || (commit_after.is_some() && ctx.commit_before.is_none());

    let mut status_message = format!(
        "subtask {} status={} new_commits={}",
        ctx.subtask_id,
        subtask_status.as_str(),
        new_commits
    );
    if let Some(commit) = &commit_after {
        status_message.push_str(&format!(" latest_commit={}", &commit[..commit.len().min(8)]));
    }

    let success = subtask_status == SubtaskStatus::Completed;
    let snapshot = SessionSnapshot {
        spec_id: ctx
            .spec_dir
            .file_name()
            .unwrap_or_default()
            .to_string(),
        subtask_id: ctx.subtask_id.to_string(),
        session: ctx.session_num,
        success,
        subtasks_completed: if success {
            vec![ctx.subtask_id.to_string()]
        } else {
            Vec::new()
        },
        discoveries: None,
    };

    match subtask_status {
        SubtaskStatus::Completed => {
            tracing::info!(subtask_id = %ctx.subtask_id, "Subtask completed successfully");
            append_build_progress(ctx.spec_dir, &format!("{status_message} outcome=completed"));

            match append_acceptance_proofs(ctx.spec_dir, ctx.project_dir) {
                Ok(appended) if appended > 0 => {
                    tracing::info!(appended, "Appended proof entries");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Proof write failed"),
            }

            let approach: String = subtask_description.chars().take(100).collect();
            recovery.record_attempt(
                ctx.subtask_id,
                ctx.session_num,
                true,
                &format!("Implemented: {approach}"),
                None,
            )?;

            if let Some(commit) = &commit_after {
                if has_new_commit {
                    recovery.record_good_commit(commit, ctx.subtask_id)?;
                    tracing::info!(commit = %&commit[..commit.len().min(8)], "Recorded good commit");
                }
            }

            if let Some(tracker) = hooks.tracker {
                let counts = count_subtasks(ctx.spec_dir);
                tracker
                    .subtask_completed(
                        &snapshot.spec_id,
                        ctx.subtask_id,
                        counts.completed,
                        counts.total,
                    )
                    .await;
            }

            run_side_effects(&snapshot, hooks, insights_timeout, memory_timeout).await;

            if is_build_complete(ctx.spec_dir) {
                if task_type == TaskType::Code {
                    match run_post_code_tests_if_needed(ctx.spec_dir, ctx.project_dir).await {
                        Ok(Some(report)) if report.status == PostCodeStatus::Failed => {
                            tracing::error!("Post-code tests failed; blocking Human Review");
                            if let Err(e) = downgrade_plan_after_test_failure(ctx.spec_dir) {
                                tracing::warn!(error = %e, "Failed to downgrade plan");
                            }
                            for result in &report.results {
                                if result.status == "passed" {
                                    continue;
                                }
                                let stderr_excerpt =
                                    result.stderr.lines().next().unwrap_or("").to_string();
                                append_build_progress(
                                    ctx.spec_dir,
                                    &format!(
                                        "post_code_tests_failed cmd={} status={} exit={} stderr={}",
                                        result.command,
                                        result.status,
                                        result
                                            .returncode
                                            .map(|c| c.to_string())
                                            .unwrap_or_else(|| "none".to_string()),
                                        stderr_excerpt
                                    ),
                                );
                            }
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "Post-code test run failed"),
                    }
                } else {
                    tracing::info!(
                        task_type = task_type.as_str(),
                        "Post-code tests skipped: non-code task"
                    );
                }
            }

            Ok(true)
        }

        SubtaskStatus::InProgress => {
            tracing::warn!(subtask_id = %ctx.subtask_id, "Subtask still in progress");
            append_build_progress(ctx.spec_dir, &format!("{status_message} outcome=in_progress"));

            recovery.record_attempt(
                ctx.subtask_id,
                ctx.session_num,
                false,
                "Session ended with subtask in_progress",
                Some("Subtask not marked as completed"),
            )?;

            // Partial progress still counts as a rollback point.
            if let Some(commit) = &commit_after {
                if has_new_commit {
                    recovery.record_good_commit(commit, ctx.subtask_id)?;
                    tracing::info!(
                        commit = %&commit[..commit.len().min(8)],
                        "Recorded partial progress commit"
                    );
                }
            }

            notify_failure(ctx, recovery, hooks, "Session ended without completion").await;
            run_side_effects(&snapshot, hooks, insights_timeout, memory_timeout).await;
            Ok(false)
        }

        SubtaskStatus::Pending | SubtaskStatus::Failed => {
            tracing::error!(
                subtask_id = %ctx.subtask_id,
                status = subtask_status.as_str(),
                "Subtask not completed"
            );
            append_build_progress(
                ctx.spec_dir,
                &format!("{status_message} outcome={}", subtask_status.as_str()),
            );

            recovery.record_attempt(
                ctx.subtask_id,
                ctx.session_num,
                false,
                "Session ended without progress",
                Some(&format!("Subtask status is {}", subtask_status.as_str())),
            )?;

            notify_failure(
                ctx,
                recovery,
                hooks,
                &format!("Subtask status: {}", subtask_status.as_str()),
            )
            .await;
            run_side_effects(&snapshot, hooks, insights_timeout, memory_timeout).await;
            Ok(false)
        }
    }
}

async fn notify_failure(
    ctx: &PostSessionContext<'_>,
    recovery: &RecoveryManager,
    hooks: &PostSessionHooks<'_>,
    reason: &str,
) {
    if let Some(tracker) = hooks.tracker {
        let attempt = recovery.attempt_count(ctx.subtask_id);
        let spec_id = ctx.spec_dir.file_name().unwrap_or_default();
        tracker
            .subtask_failed(spec_id, ctx.subtask_id, attempt, reason)
            .await;
    }
}

/// Insight extraction and memory save, each under its own timeout; failures
/// are logged and swallowed.
async fn run_side_effects(
    snapshot: &SessionSnapshot,
    hooks: &PostSessionHooks<'_>,
    insights_timeout: Option<Duration>,
    memory_timeout: Option<Duration>,
) {
    let discoveries = match bounded(hooks.insights.extract(snapshot), insights_timeout).await {
        Some(discoveries) => discoveries,
        None => {
            tracing::warn!(
                timeout_secs = insights_timeout.map(|t| t.as_secs()).unwrap_or(0),
                "Insight extraction timed out"
            );
            None
        }
    };

    let mut enriched = snapshot.clone();
    enriched.discoveries = discoveries;

    match bounded(hooks.memory.save(&enriched), memory_timeout).await {
        Some((true, backend)) => {
            tracing::info!(backend = %backend, "Session saved to memory");
        }
        Some((false, _)) => {
            tracing::warn!("Failed to save session memory");
        }
        None => {
            tracing::warn!(
                timeout_secs = memory_timeout.map(|t| t.as_secs()).unwrap_or(0),
                "Session memory save timed out"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::{NullInsightExtractor, NullMemoryStore};
    use crate::types::{
        AcceptanceMapEntry, ComplexityLevel, FilesToModifySource, ImplementationPlan,
        NoiseProfile, PlanPhase, RiskLevel, Subtask, TaskIntake,
    };
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn write_plan(spec_dir: &Utf8Path, status: SubtaskStatus, task_type: TaskType) {
        let plan = ImplementationPlan {
            task_type: Some(task_type),
            phases: vec![PlanPhase {
                phase: 1,
                name: "Build".to_string(),
                subtasks: vec![Subtask {
                    id: "1.1".to_string(),
                    description: "implement the widget".to_string(),
                    status,
                    verification: None,
                    service: None,
                }],
            }],
            ..Default::default()
        };
        artifact::save_implementation_plan(spec_dir, &plan).unwrap();
    }

    fn write_intake(spec_dir: &Utf8Path, task_type: TaskType, tests: &[&str]) {
        let intake = TaskIntake {
            task_type,
            complexity: ComplexityLevel::Simple,
            complexity_score: 1,
            risk: RiskLevel::Low,
            noise_profile: NoiseProfile::Low,
            input_files: vec![],
            output_files: vec![],
            files_to_modify: vec![],
            files_to_modify_source: FilesToModifySource::None,
            files_to_modify_inferred: false,
            tests_to_run: tests.iter().map(|s| (*s).to_string()).collect(),
            acceptance_map: vec![AcceptanceMapEntry {
                criterion: "Widget implemented".to_string(),
                file: String::new(),
            }],
            clarifying_questions: vec![],
            ralph_loop: false,
            ralph_loop_max: 3,
        };
        artifact::save_task_intake(spec_dir, &intake).unwrap();
    }

    fn hooks<'a>(
        memory: &'a NullMemoryStore,
        insights: &'a NullInsightExtractor,
    ) -> PostSessionHooks<'a> {
        PostSessionHooks {
            memory,
            insights,
            tracker: None,
        }
    }

    #[tokio::test]
    async fn test_completed_subtask_records_attempt_and_proofs() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir);
        write_plan(&spec_dir, SubtaskStatus::Completed, TaskType::Code);
        write_intake(&spec_dir, TaskType::Code, &["true"]);

        let memory = NullMemoryStore;
        let insights = NullInsightExtractor;
        let mut recovery = RecoveryManager::load(&spec_dir);
        let ctx = PostSessionContext {
            spec_dir: &spec_dir,
            project_dir: &spec_dir,
            subtask_id: "1.1",
            session_num: 1,
            commit_before: None,
            commit_count_before: 0,
            source_spec_dir: None,
        };

        let completed = post_session_processing(&ctx, &mut recovery, &hooks(&memory, &insights))
            .await
            .unwrap();
        assert!(completed);
        assert_eq!(recovery.attempt_count("1.1"), 1);

        // Acceptance proof was auto-appended.
        let proofs = artifact::load_proofs(&spec_dir);
        assert_eq!(proofs.proofs.len(), 1);

        // Build was complete with a passing test plan, so a report exists.
        let report = artifact::load_post_code_report(&spec_dir).unwrap();
        assert_eq!(report.status, PostCodeStatus::Passed);

        // Progress log carries the completion line.
        let progress =
            std::fs::read_to_string(spec_dir.join(artifact::BUILD_PROGRESS_FILENAME)).unwrap();
        assert!(progress.contains("outcome=completed"));
    }

    #[tokio::test]
    async fn test_failed_tests_downgrade_plan() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir);
        write_plan(&spec_dir, SubtaskStatus::Completed, TaskType::Code);
        write_intake(&spec_dir, TaskType::Code, &["false"]);

        let memory = NullMemoryStore;
        let insights = NullInsightExtractor;
        let mut recovery = RecoveryManager::load(&spec_dir);
        let ctx = PostSessionContext {
            spec_dir: &spec_dir,
            project_dir: &spec_dir,
            subtask_id: "1.1",
            session_num: 1,
            commit_before: None,
            commit_count_before: 0,
            source_spec_dir: None,
        };

        post_session_processing(&ctx, &mut recovery, &hooks(&memory, &insights))
            .await
            .unwrap();

        let plan = artifact::load_implementation_plan(&spec_dir).unwrap();
        assert_eq!(plan.status, crate::qa::STATUS_AI_REVIEW);

        let progress =
            std::fs::read_to_string(spec_dir.join(artifact::BUILD_PROGRESS_FILENAME)).unwrap();
        assert!(progress.contains("post_code_tests_failed"));
    }

    #[tokio::test]
    async fn test_in_progress_records_failed_attempt() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir);
        write_plan(&spec_dir, SubtaskStatus::InProgress, TaskType::Code);
        write_intake(&spec_dir, TaskType::Code, &[]);

        let memory = NullMemoryStore;
        let insights = NullInsightExtractor;
        let mut recovery = RecoveryManager::load(&spec_dir);
        let ctx = PostSessionContext {
            spec_dir: &spec_dir,
            project_dir: &spec_dir,
            subtask_id: "1.1",
            session_num: 2,
            commit_before: None,
            commit_count_before: 0,
            source_spec_dir: None,
        };

        let completed = post_session_processing(&ctx, &mut recovery, &hooks(&memory, &insights))
            .await
            .unwrap();
        assert!(!completed);

        let hints = recovery.recovery_hints("1.1");
        assert!(hints[0].contains("in_progress"));
    }

    #[tokio::test]
    async fn test_pending_subtask_records_without_progress() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir);
        write_plan(&spec_dir, SubtaskStatus::Pending, TaskType::Code);
        write_intake(&spec_dir, TaskType::Code, &[]);

        let memory = NullMemoryStore;
        let insights = NullInsightExtractor;
        let mut recovery = RecoveryManager::load(&spec_dir);
        let ctx = PostSessionContext {
            spec_dir: &spec_dir,
            project_dir: &spec_dir,
            subtask_id: "1.1",
            session_num: 1,
            commit_before: None,
            commit_count_before: 0,
            source_spec_dir: None,
        };

        let completed = post_session_processing(&ctx, &mut recovery, &hooks(&memory, &insights))
            .await
            .unwrap();
        assert!(!completed);

        let hints = recovery.recovery_hints("1.1");
        assert!(hints[0].contains("without progress"));
        assert!(hints[0].contains("pending"));
    }

    #[tokio::test]
    async fn test_missing_subtask_is_soft_failure() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir);
        write_plan(&spec_dir, SubtaskStatus::Completed, TaskType::Code);

        let memory = NullMemoryStore;
        let insights = NullInsightExtractor;
        let mut recovery = RecoveryManager::load(&spec_dir);
        let ctx = PostSessionContext {
            spec_dir: &spec_dir,
            project_dir: &spec_dir,
            subtask_id: "9.9",
            session_num: 1,
            commit_before: None,
            commit_count_before: 0,
            source_spec_dir: None,
        };

        let completed = post_session_processing(&ctx, &mut recovery, &hooks(&memory, &insights))
            .await
            .unwrap();
        assert!(!completed);
        assert_eq!(recovery.attempt_count("9.9"), 0);
    }

    #[tokio::test]
    async fn test_noncode_task_skips_test_runner() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir);
        write_plan(&spec_dir, SubtaskStatus::Completed, TaskType::Content);
        write_intake(&spec_dir, TaskType::Content, &[]);

        let memory = NullMemoryStore;
        let insights = NullInsightExtractor;
        let mut recovery = RecoveryManager::load(&spec_dir);
        let ctx = PostSessionContext {
            spec_dir: &spec_dir,
            project_dir: &spec_dir,
            subtask_id: "1.1",
            session_num: 1,
            commit_before: None,
            commit_count_before: 0,
            source_spec_dir: None,
        };

        post_session_processing(&ctx, &mut recovery, &hooks(&memory, &insights))
            .await
            .unwrap();
        assert!(artifact::load_post_code_report(&spec_dir).is_none());
    }

    #[tokio::test]
    async fn test_worktree_sync_copies_plan() {
        let dir = TempDir::new().unwrap();
        let root = utf8_dir(&dir);
        let worktree_spec = root.join("worktree-spec");
        let source_spec = root.join("source-spec");
        std::fs::create_dir_all(&worktree_spec).unwrap();
        write_plan(&worktree_spec, SubtaskStatus::Completed, TaskType::Content);
        write_intake(&worktree_spec, TaskType::Content, &[]);

        let memory = NullMemoryStore;
        let insights = NullInsightExtractor;
        let mut recovery = RecoveryManager::load(&worktree_spec);
        let ctx = PostSessionContext {
            spec_dir: &worktree_spec,
            project_dir: &root,
            subtask_id: "1.1",
            session_num: 1,
            commit_before: None,
            commit_count_before: 0,
            source_spec_dir: Some(&source_spec),
        };

        post_session_processing(&ctx, &mut recovery, &hooks(&memory, &insights))
            .await
            .unwrap();
        assert!(source_spec.join(artifact::IMPLEMENTATION_PLAN_FILENAME).exists());
    }
}
