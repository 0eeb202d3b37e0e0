//! Core data model for pipeline artifacts.
//!
//! Everything here is persisted as JSON inside the spec directory; field
//! names match the on-disk format consumed by the UI and by older runs, so
//! renames are breaking changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of what a task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Code,
    Analysis,
    Plan,
    Audit,
    Content,
}

impl TaskType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Analysis => "analysis",
            Self::Plan => "plan",
            Self::Audit => "audit",
            Self::Content => "content",
        }
    }

    /// Non-code tasks bypass the coding pipeline and never run tests.
    #[must_use]
    pub const fn is_code(&self) -> bool {
        matches!(self, Self::Code)
    }
}

impl Default for TaskType {
    fn default() -> Self {
        Self::Code
    }
}

/// Complexity levels driving dynamic phase selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    Medium,
    Complex,
}

impl ComplexityLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

/// Risk classification from the task description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    High,
}

/// Output noise control for agent sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseProfile {
    Low,
    Medium,
    High,
}

impl NoiseProfile {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Requirements gathered for a task. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Requirements {
    pub task_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    #[serde(default)]
    pub user_requirements: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub services_involved: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_to_modify: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_files: Option<Vec<String>>,
    /// Raw intake result carried over from the interactive intake step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake: Option<serde_json::Value>,
}

/// Where `files_to_modify` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilesToModifySource {
    #[serde(rename = "requirements.json")]
    RequirementsJson,
    #[serde(rename = "scope_contract")]
    ScopeContract,
    #[serde(rename = "missing")]
    Missing,
    #[serde(rename = "none")]
    None,
}

/// One acceptance criterion paired with the file that must witness it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceMapEntry {
    pub criterion: String,
    /// Empty when no single output file could be determined.
    #[serde(default)]
    pub file: String,
}

/// Machine-readable task classification produced by the preflight scoper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskIntake {
    pub task_type: TaskType,
    pub complexity: ComplexityLevel,
    pub complexity_score: u32,
    pub risk: RiskLevel,
    pub noise_profile: NoiseProfile,
    #[serde(default)]
    pub input_files: Vec<String>,
    #[serde(default)]
    pub output_files: Vec<String>,
    #[serde(default)]
    pub files_to_modify: Vec<String>,
    pub files_to_modify_source: FilesToModifySource,
    #[serde(default)]
    pub files_to_modify_inferred: bool,
    #[serde(default)]
    pub tests_to_run: Vec<String>,
    #[serde(default)]
    pub acceptance_map: Vec<AcceptanceMapEntry>,
    #[serde(default)]
    pub clarifying_questions: Vec<String>,
    #[serde(rename = "ralphLoop")]
    pub ralph_loop: bool,
    #[serde(rename = "ralphLoopMax")]
    pub ralph_loop_max: u32,
}

/// Declared intent of a scope contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeIntent {
    Create,
    Change,
    Delete,
    Investigate,
}

/// Authoritative declaration of what the agent may touch and how the work
/// is verified.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScopeContract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<ScopeIntent>,
    #[serde(default)]
    pub outcome: String,
    #[serde(default, rename = "where")]
    pub where_: String,
    #[serde(default)]
    pub why: String,
    #[serde(default, rename = "when")]
    pub when_: String,
    #[serde(default)]
    pub acceptance: Vec<String>,
    #[serde(default)]
    pub test_plan: Vec<String>,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default)]
    pub forbidden_paths: Vec<String>,
    #[serde(default)]
    pub candidate_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
}

/// Subtask lifecycle inside the implementation plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SubtaskStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One unit of session work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub description: String,
    pub status: SubtaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

/// A plan phase grouping ordered subtasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPhase {
    pub phase: u32,
    pub name: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

/// QA reviewer verdict recorded on the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaVerdict {
    Approved,
    Rejected,
    FixesApplied,
}

/// QA sign-off state embedded in the implementation plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaSignoff {
    pub status: QaVerdict,
    pub qa_session: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues_found: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_for_qa_revalidation: Option<bool>,
}

/// Mirror of the post-code test report stored on the plan for UI access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCodeMirror {
    pub status: PostCodeStatus,
    pub summary: TestSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub report_file: String,
    pub updated_at: DateTime<Utc>,
}

/// The implementation plan the agent works through session by session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImplementationPlan {
    #[serde(default)]
    pub feature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    #[serde(default)]
    pub phases: Vec<PlanPhase>,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "planStatus")]
    pub plan_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_signoff: Option<QaSignoff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_code_tests: Option<PostCodeMirror>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ImplementationPlan {
    /// All subtasks across phases, in plan order.
    pub fn subtasks(&self) -> impl Iterator<Item = &Subtask> {
        self.phases.iter().flat_map(|p| p.subtasks.iter())
    }

    /// Find a subtask by id.
    #[must_use]
    pub fn find_subtask(&self, subtask_id: &str) -> Option<&Subtask> {
        self.subtasks().find(|s| s.id == subtask_id)
    }

    /// Build-complete predicate: every subtask is completed (and there is at
    /// least one subtask).
    #[must_use]
    pub fn is_build_complete(&self) -> bool {
        let mut any = false;
        for subtask in self.subtasks() {
            any = true;
            if subtask.status != SubtaskStatus::Completed {
                return false;
            }
        }
        any
    }
}

/// Aggregate status of a post-code test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostCodeStatus {
    Passed,
    Failed,
    Skipped,
    TimedOut,
}

/// Per-command outcome inside a post-code report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub status: String,
    #[serde(default)]
    pub returncode: Option<i32>,
    pub duration_sec: f64,
    #[serde(default)]
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Pass/fail counts for a test run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
}

/// Machine-readable post-code test report (`post_code_tests.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCodeReport {
    pub status: PostCodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub test_plan: Vec<String>,
    #[serde(default)]
    pub results: Vec<CommandResult>,
    pub summary: TestSummary,
}

/// Origin of a proof entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofSource {
    Auto,
    Agent,
}

/// A snippet anchored in a file witnessing an acceptance criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    pub criterion: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub snippet: String,
    pub source: ProofSource,
    pub created_at: DateTime<Utc>,
}

/// The proofs document (`proofs.json`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProofSet {
    #[serde(default)]
    pub proofs: Vec<Proof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Result of a single orchestrator phase.
#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub phase: String,
    pub success: bool,
    pub output_files: Vec<String>,
    pub errors: Vec<String>,
    pub retries: u32,
}

impl PhaseResult {
    #[must_use]
    pub fn ok(phase: impl Into<String>, output_files: Vec<String>) -> Self {
        Self {
            phase: phase.into(),
            success: true,
            output_files,
            errors: Vec::new(),
            retries: 0,
        }
    }

    #[must_use]
    pub fn failed(phase: impl Into<String>, errors: Vec<String>, retries: u32) -> Self {
        Self {
            phase: phase.into(),
            success: false,
            output_files: Vec::new(),
            errors,
            retries,
        }
    }
}

/// User-visible outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failed { phase: String },
    PendingReview,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subtask(id: &str, status: SubtaskStatus) -> Subtask {
        Subtask {
            id: id.to_string(),
            description: format!("subtask {id}"),
            status,
            verification: None,
            service: None,
        }
    }

    fn plan_with(statuses: &[SubtaskStatus]) -> ImplementationPlan {
        ImplementationPlan {
            phases: vec![PlanPhase {
                phase: 1,
                name: "Build".to_string(),
                subtasks: statuses
                    .iter()
                    .enumerate()
                    .map(|(i, s)| subtask(&format!("1.{}", i + 1), *s))
                    .collect(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_build_complete_all_completed() {
        let plan = plan_with(&[SubtaskStatus::Completed, SubtaskStatus::Completed]);
        assert!(plan.is_build_complete());
    }

    #[test]
    fn test_build_incomplete_with_pending() {
        let plan = plan_with(&[SubtaskStatus::Completed, SubtaskStatus::Pending]);
        assert!(!plan.is_build_complete());
    }

    #[test]
    fn test_build_incomplete_when_empty() {
        let plan = ImplementationPlan::default();
        assert!(!plan.is_build_complete());
    }

    #[test]
    fn test_find_subtask() {
        let plan = plan_with(&[SubtaskStatus::Pending, SubtaskStatus::InProgress]);
        assert!(plan.find_subtask("1.2").is_some());
        assert!(plan.find_subtask("9.9").is_none());
    }

    #[test]
    fn test_task_intake_round_trip_preserves_camelcase_fields() {
        let intake = TaskIntake {
            task_type: TaskType::Code,
            complexity: ComplexityLevel::Medium,
            complexity_score: 3,
            risk: RiskLevel::Low,
            noise_profile: NoiseProfile::Medium,
            input_files: vec![],
            output_files: vec![],
            files_to_modify: vec!["src/main.rs".into()],
            files_to_modify_source: FilesToModifySource::RequirementsJson,
            files_to_modify_inferred: false,
            tests_to_run: vec!["PYTEST_PIPELINE".into()],
            acceptance_map: vec![],
            clarifying_questions: vec![],
            ralph_loop: true,
            ralph_loop_max: 3,
        };

        let json = serde_json::to_string(&intake).unwrap();
        assert!(json.contains("\"ralphLoop\":true"));
        assert!(json.contains("\"ralphLoopMax\":3"));
        assert!(json.contains("\"files_to_modify_source\":\"requirements.json\""));

        let back: TaskIntake = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_type, TaskType::Code);
        assert!(back.ralph_loop);
    }

    #[test]
    fn test_scope_contract_where_when_keywords() {
        let contract = ScopeContract {
            where_: "src/".to_string(),
            when_: "now".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&contract).unwrap();
        assert!(json.contains("\"where\":\"src/\""));
        assert!(json.contains("\"when\":\"now\""));
    }

    #[test]
    fn test_subtask_status_serde_snake_case() {
        let json = serde_json::to_string(&SubtaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
