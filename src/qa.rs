//! QA gating state machine over the implementation plan.
//!
//! Flow: once the build completes, a QA reviewer session approves or
//! rejects. Approval plus a clean proof gate and passing post-code tests
//! hands off to human review; failing tests push the plan back to coding
//! (`ai_review`). Rejection triggers a fixes round, after which QA
//! revalidates. The loop is capped.

use camino::Utf8Path;
use chrono::Utc;

use crate::artifact;
use crate::error::Result;
use crate::proofs::validate_proof_gate;
use crate::types::{ImplementationPlan, PostCodeStatus, QaSignoff, QaVerdict, TaskType};

/// Hard cap on QA review/fix iterations; exceeding it halts in rejected.
pub const MAX_QA_ITERATIONS: u32 = 4;

/// Plan status once QA and all gates pass.
pub const STATUS_HUMAN_REVIEW: &str = "human_review";
/// Plan status when work must go back to the coding loop.
pub const STATUS_AI_REVIEW: &str = "ai_review";

/// True when the post-code report for this spec passed.
#[must_use]
pub fn post_code_tests_passed(spec_dir: &Utf8Path) -> bool {
    if let Some(report) = artifact::load_post_code_report(spec_dir) {
        return report.status == PostCodeStatus::Passed;
    }
    // Fall back to the mirror on the plan when the report file is missing.
    artifact::load_implementation_plan(spec_dir)
        .and_then(|plan| plan.post_code_tests)
        .map(|mirror| mirror.status == PostCodeStatus::Passed)
        .unwrap_or(false)
}

/// Whether a QA reviewer session should run now.
///
/// True iff the build is complete, the task is a code task, and QA has not
/// already approved.
#[must_use]
pub fn should_run_qa(spec_dir: &Utf8Path) -> bool {
    let Some(plan) = artifact::load_implementation_plan(spec_dir) else {
        return false;
    };
    if !plan.is_build_complete() {
        return false;
    }
    let task_type = plan
        .task_type
        .or_else(|| artifact::load_task_intake(spec_dir).map(|i| i.task_type))
        .unwrap_or_default();
    if task_type != TaskType::Code {
        return false;
    }
    !matches!(
        plan.qa_signoff.as_ref().map(|s| s.status),
        Some(QaVerdict::Approved)
    )
}

/// Whether a fixes round should run: QA rejected and iterations remain.
#[must_use]
pub fn should_run_fixes(spec_dir: &Utf8Path) -> bool {
    let Some(plan) = artifact::load_implementation_plan(spec_dir) else {
        return false;
    };
    let Some(signoff) = &plan.qa_signoff else {
        return false;
    };
    signoff.status == QaVerdict::Rejected && signoff.qa_session < MAX_QA_ITERATIONS
}

/// Record a QA verdict on the plan.
pub fn record_qa_verdict(
    spec_dir: &Utf8Path,
    verdict: QaVerdict,
    issues_found: Vec<String>,
) -> Result<ImplementationPlan> {
    let mut plan = artifact::load_implementation_plan(spec_dir).unwrap_or_default();
    let session = plan
        .qa_signoff
        .as_ref()
        .map(|s| s.qa_session + 1)
        .unwrap_or(1);

    plan.qa_signoff = Some(QaSignoff {
        status: verdict,
        qa_session: session,
        timestamp: Utc::now(),
        tests_passed: Some(post_code_tests_passed(spec_dir)),
        issues_found: if issues_found.is_empty() {
            None
        } else {
            Some(issues_found)
        },
        ready_for_qa_revalidation: if verdict == QaVerdict::FixesApplied {
            Some(true)
        } else {
            None
        },
    });
    plan.updated_at = Some(Utc::now());

    apply_gates(spec_dir, &mut plan);
    artifact::save_implementation_plan(spec_dir, &plan)?;
    Ok(plan)
}

/// Recompute the plan status from the QA verdict and the gates.
///
/// `approved` + proof gate ok + tests passed -> `human_review`;
/// `approved` with failing tests -> `ai_review` (back to coding).
fn apply_gates(spec_dir: &Utf8Path, plan: &mut ImplementationPlan) {
    let Some(signoff) = &plan.qa_signoff else {
        return;
    };
    match signoff.status {
        QaVerdict::Approved => {
            let (proof_ok, _) = validate_proof_gate(spec_dir);
            if proof_ok && post_code_tests_passed(spec_dir) {
                plan.status = STATUS_HUMAN_REVIEW.to_string();
                plan.plan_status = "complete".to_string();
            } else {
                plan.status = STATUS_AI_REVIEW.to_string();
                plan.plan_status = "review".to_string();
            }
        }
        QaVerdict::Rejected => {
            plan.status = STATUS_AI_REVIEW.to_string();
            plan.plan_status = "review".to_string();
        }
        QaVerdict::FixesApplied => {
            plan.plan_status = "qa_revalidation".to_string();
        }
    }
}

/// Downgrade the plan after failed post-code tests, blocking human review.
pub fn downgrade_plan_after_test_failure(spec_dir: &Utf8Path) -> Result<()> {
    let Some(mut plan) = artifact::load_implementation_plan(spec_dir) else {
        return Ok(());
    };
    plan.status = STATUS_AI_REVIEW.to_string();
    plan.plan_status = "review".to_string();
    plan.updated_at = Some(Utc::now());
    artifact::save_implementation_plan(spec_dir, &plan)
}
