//! Phase orchestrator.
//!
//! Walks a task through the ordered pipeline: discovery, requirements, env
//! reality check, preflight scoping, senior review, complexity assessment,
//! then a dynamic phase set chosen by the assessment, finishing at the
//! human review checkpoint. Non-code tasks bypass the coding phases and run
//! quick_spec + validation only.

pub mod compaction;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::artifact;
use crate::complexity::{self, ComplexityAssessment, ComplexityAnalyzer};
use crate::env_check;
use crate::error::{IflowError, Result};
use crate::index::{invalidate_project_index, load_project_index_cached};
use crate::integrations::Summarizer;
use crate::intake::run_preflight_scoper;
use crate::proofs::ensure_noncode_proof;
use crate::resolver::{ResolveRequest, ResolvedModel, get_spec_phase_thinking_budget, resolve_model};
use crate::scope::{derive_scope_contract, validate_scope_contract};
use crate::types::{
    ComplexityLevel, PhaseResult, Requirements, RunOutcome, TaskType,
};
use crate::workspace;
use compaction::{
    PhaseSummaries, format_phase_summaries, gather_phase_outputs, summarize_phase_output,
};
use iflow_gate::constants::{NOISE_PROFILE_ENV_VAR, SPEC_DIR_ENV_VAR, TASK_TYPE_ENV_VAR};

/// Retry cap for agent-driven phases. Deterministic local phases never
/// retry.
pub const MAX_PHASE_RETRIES: u32 = 2;

/// Drives one agent-backed phase: prompt in, raw response out.
///
/// The orchestrator owns sequencing and artifacts; the driver owns the LLM
/// interaction. Prompt templates are opaque to the core.
#[async_trait]
pub trait AgentDriver: Send + Sync {
    async fn run_phase(
        &self,
        phase_name: &str,
        prompt: &str,
        thinking_budget: Option<u32>,
    ) -> Result<String>;
}

/// Review checkpoint state (`review_state.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewState {
    pub status: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ReviewState {
    pub const APPROVED: &'static str = "approved";
    pub const PENDING: &'static str = "pending";
    pub const REJECTED: &'static str = "rejected";
}

const REVIEW_STATE_FILENAME: &str = "review_state.json";

/// Orchestrates the spec creation process with dynamic complexity
/// adaptation.
pub struct SpecOrchestrator<'a> {
    project_dir: Utf8PathBuf,
    spec_dir: Utf8PathBuf,
    task_description: Option<String>,
    resolved: ResolvedModel,
    complexity_override: Option<ComplexityLevel>,
    driver: &'a dyn AgentDriver,
    summarizer: &'a dyn Summarizer,
    assessment: Option<ComplexityAssessment>,
    phase_summaries: PhaseSummaries,
    // Cell so the phase wrapper can count while phase futures borrow self.
    phase_num: std::cell::Cell<u32>,
}

impl<'a> SpecOrchestrator<'a> {
    /// Create an orchestrator, allocating a fresh spec directory unless one
    /// is supplied.
    pub fn new(
        project_dir: &Utf8Path,
        task_description: Option<String>,
        spec_dir: Option<Utf8PathBuf>,
        cli_model: Option<&str>,
        cli_thinking: Option<&str>,
        complexity_override: Option<ComplexityLevel>,
        driver: &'a dyn AgentDriver,
        summarizer: &'a dyn Summarizer,
    ) -> Result<Self> {
        workspace::init_auto_build_dir(project_dir)?;
        let specs_dir = crate::paths::specs_dir(project_dir);
        let removed = workspace::cleanup_orphaned_pending_folders(&specs_dir);
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "Cleaned up orphaned pending spec dirs");
        }

        let spec_dir = match spec_dir {
            Some(dir) => {
                iflow_utils::ensure_dir_all(&dir)?;
                dir
            }
            None => workspace::create_spec_dir(project_dir)?,
        };

        let resolved = resolve_model(&ResolveRequest {
            phase: Some("spec"),
            spec_dir: Some(&spec_dir),
            project_dir: Some(project_dir),
            cli_model,
            cli_thinking,
            ..Default::default()
        })?;

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            spec_dir,
            task_description,
            resolved,
            complexity_override,
            driver,
            summarizer,
            assessment: None,
            phase_summaries: PhaseSummaries::new(),
            phase_num: std::cell::Cell::new(0),
        })
    }

    #[must_use]
    pub fn spec_dir(&self) -> &Utf8Path {
        &self.spec_dir
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.resolved.model_id
    }

    /// Prompt prefix: prior phase summaries plus the intake context block.
    fn phase_context(&self) -> String {
        let mut context = format_phase_summaries(&self.phase_summaries);
        if let Some(intake) = artifact::load_task_intake(&self.spec_dir) {
            context.push_str(&format!(
                "\n## TASK INTAKE (Preflight)\n- task_type: {}\n- noise_profile: {}\n- tests_to_run: {:?}\n",
                intake.task_type.as_str(),
                intake.noise_profile.as_str(),
                intake.tests_to_run,
            ));
        }
        context
    }

    fn build_prompt(&self, phase_name: &str) -> String {
        let mut prompt = String::new();
        let context = self.phase_context();
        if !context.trim().is_empty() {
            prompt.push_str(&context);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!("## PHASE: {phase_name}\n"));
        if let Some(task) = &self.task_description {
            prompt.push_str(&format!("Task: {task}\n"));
        }
        prompt
    }

    /// Run a phase with numbering, banner, and structured failure logging.
    async fn run_phase<F>(&self, name: &str, phase: F) -> PhaseResult
    where
        F: std::future::Future<Output = PhaseResult>,
    {
        let phase_num = self.phase_num.get() + 1;
        self.phase_num.set(phase_num);
        let spec_id = self.spec_dir.file_name().unwrap_or_default().to_string();
        tracing::info!(phase_num, phase = %name, "=== PHASE {}: {} ===", phase_num, name.to_uppercase());
        iflow_utils::logging::log_phase_start(&spec_id, name);

        let start = std::time::Instant::now();
        let result = phase.await;
        let elapsed = start.elapsed().as_millis();

        if result.success {
            iflow_utils::logging::log_phase_complete(&spec_id, name, elapsed);
        } else {
            iflow_utils::logging::log_phase_error(
                &spec_id,
                name,
                &result.errors.join("; "),
                elapsed,
            );
            tracing::error!(
                phase = %name,
                errors = ?result.errors,
                output_files = ?result.output_files,
                retries = result.retries,
                "Phase failed"
            );
        }
        result
    }

    /// Summarize a successful phase's outputs for downstream prompts.
    async fn store_phase_summary(&mut self, phase_name: &str, output_files: &[String]) {
        let content = gather_phase_outputs(&self.spec_dir, output_files);
        if let Some(summary) =
            summarize_phase_output(self.summarizer, phase_name, &content).await
        {
            self.phase_summaries.insert(phase_name.to_string(), summary);
        }
    }

    /// Agent-driven phase writing its response to `<phase>.md`, with the
    /// retry cap applied.
    async fn agent_phase(&self, phase_name: &str, output_file: &str) -> PhaseResult {
        let prompt = self.build_prompt(phase_name);
        // The phase's own level never exceeds what the model supports.
        let budget = match (
            get_spec_phase_thinking_budget(phase_name),
            self.resolved.thinking_budget,
        ) {
            (Some(phase_budget), Some(model_budget)) => Some(phase_budget.min(model_budget)),
            _ => None,
        };

        let mut errors = Vec::new();
        for retry in 0..=MAX_PHASE_RETRIES {
            match self.driver.run_phase(phase_name, &prompt, budget).await {
                Ok(response) if !response.trim().is_empty() => {
                    let path = self.spec_dir.join(output_file);
                    if let Err(e) = std::fs::write(&path, &response) {
                        errors.push(format!("failed to write {output_file}: {e}"));
                        return PhaseResult::failed(phase_name, errors, retry);
                    }
                    let mut result =
                        PhaseResult::ok(phase_name, vec![output_file.to_string()]);
                    result.retries = retry;
                    return result;
                }
                Ok(_) => errors.push("agent returned empty output".to_string()),
                Err(e) => errors.push(e.to_string()),
            }
        }
        PhaseResult::failed(phase_name, errors, MAX_PHASE_RETRIES)
    }

    /// Requirements phase: agent-driven when possible, synthesized from the
    /// task description otherwise. Always leaves `requirements.json` behind.
    async fn phase_requirements(&self) -> PhaseResult {
        if artifact::load_requirements(&self.spec_dir).is_some() {
            return PhaseResult::ok(
                "requirements",
                vec![artifact::REQUIREMENTS_FILENAME.to_string()],
            );
        }

        let prompt = self.build_prompt("requirements");
        let budget = get_spec_phase_thinking_budget("requirements");
        let mut requirements: Option<Requirements> = None;

        match self.driver.run_phase("requirements", &prompt, budget).await {
            Ok(response) => {
                if let Ok(parsed) = serde_json::from_str::<Requirements>(&response) {
                    requirements = Some(parsed);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Requirements agent failed; synthesizing from task description");
            }
        }

        let requirements = requirements.unwrap_or_else(|| Requirements {
            task_description: self.task_description.clone().unwrap_or_default(),
            ..Default::default()
        });
        if requirements.task_description.trim().is_empty() {
            return PhaseResult::failed(
                "requirements",
                vec!["no task description available".to_string()],
                0,
            );
        }

        match artifact::save_requirements(&self.spec_dir, &requirements) {
            Ok(()) => PhaseResult::ok(
                "requirements",
                vec![artifact::REQUIREMENTS_FILENAME.to_string()],
            ),
            Err(e) => PhaseResult::failed("requirements", vec![e.to_string()], 0),
        }
    }

    /// Env reality check: pure local validation, never retried.
    fn phase_env_reality_check(&self) -> PhaseResult {
        let index = load_project_index_cached(&self.project_dir);
        let requirements = artifact::load_requirements(&self.spec_dir);
        match env_check::run_and_save(
            &self.project_dir,
            &self.spec_dir,
            &index,
            requirements.as_ref(),
        ) {
            Ok(report) if report.passed() => PhaseResult::ok(
                "env_reality_check",
                vec![artifact::ENV_REALITY_CHECK_FILENAME.to_string()],
            ),
            Ok(report) => PhaseResult::failed("env_reality_check", report.errors, 0),
            Err(e) => PhaseResult::failed("env_reality_check", vec![e.to_string()], 0),
        }
    }

    /// Preflight: derive the scope contract when missing, then run the
    /// scoper.
    fn phase_preflight(&self) -> PhaseResult {
        let index = load_project_index_cached(&self.project_dir);

        if artifact::load_scope_contract(&self.spec_dir).is_none() {
            let requirements = artifact::load_requirements(&self.spec_dir).unwrap_or_default();
            let task_type = crate::intake::infer_task_type(
                &requirements.task_description,
                requirements.workflow_type.as_deref(),
            );
            let mut contract = derive_scope_contract(&index, task_type);
            contract.outcome = requirements.task_description.clone();
            contract.where_ = contract.allowed_paths.join(", ");
            contract.why = "Requested task".to_string();
            contract.acceptance = if requirements.acceptance_criteria.is_empty() {
                vec![format!("Deliver: {}", requirements.task_description.trim())]
            } else {
                requirements.acceptance_criteria.clone()
            };
            contract.candidate_files = requirements
                .files_to_modify
                .clone()
                .unwrap_or_default();
            if let Err(e) = artifact::save_scope_contract(&self.spec_dir, &contract) {
                return PhaseResult::failed("preflight", vec![e.to_string()], 0);
            }
        }

        match run_preflight_scoper(
            &self.spec_dir,
            &self.project_dir,
            self.task_description.as_deref(),
        ) {
            Ok(intake) => {
                let contract = artifact::load_scope_contract(&self.spec_dir).unwrap_or_default();
                let (errors, warnings) = validate_scope_contract(&contract);
                let report = serde_json::json!({
                    "task_type": intake.task_type.as_str(),
                    "tests_to_run": intake.tests_to_run,
                    "clarifying_questions": intake.clarifying_questions,
                    "contract_valid": errors.is_empty(),
                    "errors": errors,
                    "warnings": warnings,
                    "created_at": chrono::Utc::now().to_rfc3339(),
                });
                if let Err(e) =
                    artifact::save_json(&self.spec_dir.join("scope_preflight_report.json"), &report)
                {
                    tracing::warn!(error = %e, "Failed to write scope preflight report");
                }
                PhaseResult::ok(
                    "preflight",
                    vec![
                        artifact::SCOPE_CONTRACT_FILENAME.to_string(),
                        artifact::TASK_INTAKE_FILENAME.to_string(),
                    ],
                )
            }
            Err(e) => PhaseResult::failed("preflight", vec![e.to_string()], 0),
        }
    }

    /// Senior review: strict scope-contract validation, never retried.
    fn phase_senior_review(&self) -> PhaseResult {
        let Some(contract) = artifact::load_scope_contract(&self.spec_dir) else {
            return PhaseResult::failed(
                "senior_review",
                vec!["scope_contract.json not found".to_string()],
                0,
            );
        };
        let (errors, warnings) = validate_scope_contract(&contract);
        for warning in &warnings {
            tracing::warn!(warning = %warning, "Scope contract warning");
        }
        if errors.is_empty() {
            PhaseResult::ok("senior_review", vec![])
        } else {
            PhaseResult::failed("senior_review", errors, 0)
        }
    }

    /// Complexity assessment: override, then AI through the driver, then
    /// heuristics. Persisted once.
    async fn phase_complexity_assessment(&mut self) -> PhaseResult {
        let assessment = if let Some(level) = self.complexity_override {
            ComplexityAssessment {
                complexity: level,
                confidence: 1.0,
                reasoning: format!("Manual override: {}", level.as_str()),
                needs_research: false,
                needs_self_critique: level == ComplexityLevel::Complex,
                estimated_files: 0,
                estimated_services: 0,
                external_integrations: false,
                infrastructure_changes: false,
            }
        } else {
            match self.run_ai_assessment().await {
                Some(assessment) => assessment,
                None => {
                    tracing::warn!("AI assessment failed, falling back to heuristics");
                    self.heuristic_assessment()
                }
            }
        };

        tracing::info!(
            complexity = assessment.complexity.as_str(),
            confidence = assessment.confidence,
            reasoning = %assessment.reasoning,
            "Complexity assessed"
        );

        if complexity::load_assessment(&self.spec_dir).is_none() {
            if let Err(e) = complexity::save_assessment(&self.spec_dir, &assessment) {
                return PhaseResult::failed("complexity_assessment", vec![e.to_string()], 0);
            }
        }
        self.assessment = Some(assessment);
        PhaseResult::ok(
            "complexity_assessment",
            vec![artifact::COMPLEXITY_ASSESSMENT_FILENAME.to_string()],
        )
    }

    async fn run_ai_assessment(&self) -> Option<ComplexityAssessment> {
        let prompt = self.build_prompt("complexity_assessment");
        let budget = get_spec_phase_thinking_budget("complexity_assessment");
        let response = self
            .driver
            .run_phase("complexity_assessment", &prompt, budget)
            .await
            .ok()?;
        serde_json::from_str(&response).ok()
    }

    fn heuristic_assessment(&self) -> ComplexityAssessment {
        let index = load_project_index_cached(&self.project_dir);
        let requirements = artifact::load_requirements(&self.spec_dir);
        ComplexityAnalyzer::new(index).analyze(
            self.task_description.as_deref().unwrap_or(""),
            requirements.as_ref(),
        )
    }

    /// Validation phase: the plan and spec artifacts must exist and parse.
    fn phase_validation(&self) -> PhaseResult {
        let mut errors = Vec::new();
        let task_type = artifact::load_task_intake(&self.spec_dir)
            .map(|i| i.task_type)
            .unwrap_or_default();

        if !self.spec_dir.join("spec.md").exists() {
            errors.push("spec.md not found".to_string());
        }
        if task_type.is_code() && artifact::load_implementation_plan(&self.spec_dir).is_none() {
            errors.push("implementation_plan.json not found or invalid".to_string());
        }

        if errors.is_empty() {
            PhaseResult::ok("validation", vec![])
        } else {
            PhaseResult::failed("validation", errors, 0)
        }
    }

    /// Planning phase: the agent's plan JSON is persisted when parseable;
    /// otherwise a single-subtask skeleton plan is written.
    async fn phase_planning(&self) -> PhaseResult {
        let prompt = self.build_prompt("planning");
        let budget = get_spec_phase_thinking_budget("planning");

        let mut errors = Vec::new();
        for retry in 0..=MAX_PHASE_RETRIES {
            match self.driver.run_phase("planning", &prompt, budget).await {
                Ok(response) => {
                    let plan = serde_json::from_str::<crate::types::ImplementationPlan>(&response)
                        .unwrap_or_else(|_| skeleton_plan(self.task_description.as_deref()));
                    return match artifact::save_implementation_plan(&self.spec_dir, &plan) {
                        Ok(()) => {
                            let mut result = PhaseResult::ok(
                                "planning",
                                vec![artifact::IMPLEMENTATION_PLAN_FILENAME.to_string()],
                            );
                            result.retries = retry;
                            result
                        }
                        Err(e) => PhaseResult::failed("planning", vec![e.to_string()], retry),
                    };
                }
                Err(e) => errors.push(e.to_string()),
            }
        }
        PhaseResult::failed("planning", errors, MAX_PHASE_RETRIES)
    }

    async fn run_dynamic_phase(&self, phase_name: &str) -> Option<PhaseResult> {
        let result = match phase_name {
            "historical_context" => {
                self.run_phase("historical_context", self.agent_phase("historical_context", "graph_hints.json"))
                    .await
            }
            "research" => {
                self.run_phase("research", self.agent_phase("research", "research.json"))
                    .await
            }
            "context" => {
                self.run_phase("context", self.agent_phase("context", "context.md"))
                    .await
            }
            "spec_writing" => {
                self.run_phase("spec_writing", self.agent_phase("spec_writing", "spec.md"))
                    .await
            }
            "quick_spec" => {
                self.run_phase("quick_spec", self.agent_phase("quick_spec", "spec.md"))
                    .await
            }
            "self_critique" => {
                self.run_phase("self_critique", self.agent_phase("self_critique", "self_critique.md"))
                    .await
            }
            "planning" => {
                let fut = self.phase_planning();
                self.run_phase("planning", fut).await
            }
            "validation" => {
                let result = self.phase_validation();
                self.run_phase("validation", async { result }).await
            }
            _ => {
                tracing::warn!(phase = %phase_name, "Unknown phase, skipping");
                return None;
            }
        };
        Some(result)
    }

    /// Run the full pipeline. Returns the user-visible outcome.
    pub async fn run(&mut self, auto_approve: bool) -> Result<RunOutcome> {
        tracing::info!(
            spec_dir = %self.spec_dir,
            project = %self.project_dir,
            model = %self.resolved.model_id,
            "SPEC CREATION ORCHESTRATOR"
        );

        // Refresh the project index cache before anything reads it.
        invalidate_project_index(&self.project_dir);

        // === DISCOVERY ===
        let result = self
            .run_phase("discovery", self.agent_phase("discovery", "discovery.md"))
            .await;
        if !result.success {
            return Ok(RunOutcome::Failed {
                phase: "discovery".to_string(),
            });
        }
        self.store_phase_summary("discovery", &result.output_files).await;

        // === REQUIREMENTS ===
        let fut = self.phase_requirements();
        let result = self.run_phase("requirements", fut).await;
        if !result.success {
            return Ok(RunOutcome::Failed {
                phase: "requirements".to_string(),
            });
        }
        self.store_phase_summary("requirements", &result.output_files).await;

        // Rename the spec folder now that requirements carry a real title.
        self.spec_dir = workspace::rename_spec_dir_from_requirements(&self.spec_dir)?;
        if let Some(requirements) = artifact::load_requirements(&self.spec_dir) {
            if !requirements.task_description.trim().is_empty() {
                self.task_description = Some(requirements.task_description);
            }
        }

        // === ENV REALITY CHECK ===
        let result = self.phase_env_reality_check();
        let result = self.run_phase("env_reality_check", async { result }).await;
        if !result.success {
            return Ok(RunOutcome::Failed {
                phase: "env_reality_check".to_string(),
            });
        }

        // === SCOPE PREFLIGHT ===
        let result = self.phase_preflight();
        let result = self.run_phase("preflight", async { result }).await;
        if !result.success {
            return Ok(RunOutcome::Failed {
                phase: "preflight".to_string(),
            });
        }
        self.store_phase_summary("preflight", &result.output_files).await;

        // === SENIOR REVIEW ===
        let result = self.phase_senior_review();
        let result = self.run_phase("senior_review", async { result }).await;
        if !result.success {
            return Ok(RunOutcome::Failed {
                phase: "senior_review".to_string(),
            });
        }

        // === COMPLEXITY ASSESSMENT ===
        let result = self.phase_complexity_assessment().await;
        let result = self.run_phase("complexity_assessment", async { result }).await;
        if !result.success {
            return Ok(RunOutcome::Failed {
                phase: "complexity_assessment".to_string(),
            });
        }

        // Export routing context for the command gate's process context.
        let intake = artifact::load_task_intake(&self.spec_dir);
        let task_type = intake.as_ref().map(|i| i.task_type).unwrap_or_default();
        unsafe {
            std::env::set_var(SPEC_DIR_ENV_VAR, self.spec_dir.as_str());
            std::env::set_var(TASK_TYPE_ENV_VAR, task_type.as_str());
            std::env::set_var(
                NOISE_PROFILE_ENV_VAR,
                intake
                    .as_ref()
                    .map(|i| i.noise_profile.as_str())
                    .unwrap_or("medium"),
            );
        }

        if task_type != TaskType::Code {
            return self.run_noncode_pipeline(auto_approve).await;
        }

        // === DYNAMIC PHASES ===
        let already_run = ["discovery", "requirements", "preflight", "senior_review"];
        let phases_to_run: Vec<String> = self
            .assessment
            .as_ref()
            .map(|a| a.phases_to_run())
            .unwrap_or_default()
            .into_iter()
            .filter(|p| !already_run.contains(p))
            .map(ToString::to_string)
            .collect();

        tracing::info!(phases = ?phases_to_run, "Running dynamic phase set");

        for phase_name in phases_to_run {
            let Some(result) = self.run_dynamic_phase(&phase_name).await else {
                continue;
            };
            if result.success {
                self.store_phase_summary(&phase_name, &result.output_files).await;
            } else {
                tracing::error!(
                    phase = %phase_name,
                    retries = result.retries,
                    "Phase failed after retries"
                );
                return Ok(RunOutcome::Failed { phase: phase_name });
            }
        }

        self.run_review_checkpoint(auto_approve)
    }

    /// Non-code pipeline: quick_spec + validation, a default proof, then
    /// review.
    async fn run_noncode_pipeline(&mut self, auto_approve: bool) -> Result<RunOutcome> {
        for phase_name in ["quick_spec", "validation"] {
            let Some(result) = self.run_dynamic_phase(phase_name).await else {
                continue;
            };
            if result.success {
                self.store_phase_summary(phase_name, &result.output_files).await;
            } else {
                return Ok(RunOutcome::Failed {
                    phase: phase_name.to_string(),
                });
            }
        }

        if let Err(e) = ensure_noncode_proof(&self.spec_dir) {
            tracing::warn!(error = %e, "Failed to write non-code proof");
        }

        self.run_review_checkpoint(auto_approve)
    }

    /// Human review checkpoint. Blocks on persisted approval unless
    /// auto-approve; interrupt leaves the state resumable.
    fn run_review_checkpoint(&self, auto_approve: bool) -> Result<RunOutcome> {
        let review_path = self.spec_dir.join(REVIEW_STATE_FILENAME);

        if auto_approve {
            let state = ReviewState {
                status: ReviewState::APPROVED.to_string(),
                updated_at: chrono::Utc::now(),
            };
            artifact::save_json(&review_path, &state)?;
            tracing::info!("Review auto-approved");
            return Ok(RunOutcome::Success);
        }

        let existing: Option<ReviewState> = artifact::load_json(&review_path);
        match existing.map(|s| s.status) {
            Some(status) if status == ReviewState::APPROVED => Ok(RunOutcome::Success),
            Some(status) if status == ReviewState::REJECTED => Err(IflowError::Cancelled {
                checkpoint: "human_review".to_string(),
            }),
            _ => {
                let state = ReviewState {
                    status: ReviewState::PENDING.to_string(),
                    updated_at: chrono::Utc::now(),
                };
                artifact::save_json(&review_path, &state)?;
                tracing::info!("Awaiting human review; run again after approval");
                Ok(RunOutcome::PendingReview)
            }
        }
    }
}

/// Fallback single-subtask plan when the agent's plan is unparseable.
fn skeleton_plan(task_description: Option<&str>) -> crate::types::ImplementationPlan {
    crate::types::ImplementationPlan {
        feature: task_description.unwrap_or("task").to_string(),
        phases: vec![crate::types::PlanPhase {
            phase: 1,
            name: "Implementation".to_string(),
            subtasks: vec![crate::types::Subtask {
                id: "1.1".to_string(),
                description: task_description.unwrap_or("Implement the task").to_string(),
                status: crate::types::SubtaskStatus::Pending,
                verification: None,
                service: None,
            }],
        }],
        status: "building".to_string(),
        plan_status: "draft".to_string(),
        task_type: Some(TaskType::Code),
        ..Default::default()
    }
}
