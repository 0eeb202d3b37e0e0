//! The command gate: pre-tool-use validation of shell commands.
//!
//! Main security enforcement point. Invoked synchronously before every
//! shell tool call; returns either allow or a block with a reason the agent
//! can read and adapt to. The gate is a pure function of the payload and a
//! [`GateContext`] captured by the caller; it performs no I/O itself.

use serde::Deserialize;

use crate::constants::{
    BLOCK_TEST_COMMANDS_ENV_VAR, DEFAULT_BLOCKED_TEST_COMMANDS,
    MANUAL_VERIFICATION_ENV_VAR, MANUAL_VERIFICATION_SUBTASK_ENV_VAR,
    NON_CODE_BLOCKED_COMMANDS, TASK_TYPE_ENV_VAR, TEST_PLAN_ENV_VAR,
};
use crate::parser::{extract_commands, get_command_for_validation, split_command_segments};
use crate::profile::SecurityProfile;
use crate::validators::VALIDATORS;

/// Gate verdict for a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Block { reason: String },
}

impl GateDecision {
    fn block(reason: impl Into<String>) -> Self {
        Self::Block {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Tool-call payload as delivered by the agent backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolUsePayload {
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Option<serde_json::Value>,
}

/// Process context the gate evaluates against.
///
/// Captured once per session (or per call) from environment and task intake;
/// passing it by value keeps the gate free of I/O and trivially testable.
#[derive(Debug, Clone, Default)]
pub struct GateContext {
    pub profile: SecurityProfile,
    /// Task type from intake; anything but "code" activates the non-code
    /// deny list.
    pub task_type: String,
    /// Manual verification mode: all shell commands are blocked.
    pub manual_verification: bool,
    /// Subtask cited in manual-verification block reasons.
    pub manual_verification_subtask: Option<String>,
    /// Reserve test commands for the post-code test phase.
    pub block_test_commands: bool,
    /// Active test plan commands (normalized); empty falls back to the
    /// built-in blocked-test list.
    pub test_plan: Vec<String>,
}

impl GateContext {
    /// Capture the gate context from process environment.
    #[must_use]
    pub fn from_env(profile: SecurityProfile) -> Self {
        let flag = |var: &str| {
            std::env::var(var)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        Self {
            profile,
            task_type: std::env::var(TASK_TYPE_ENV_VAR).unwrap_or_else(|_| "code".to_string()),
            manual_verification: flag(MANUAL_VERIFICATION_ENV_VAR),
            manual_verification_subtask: std::env::var(MANUAL_VERIFICATION_SUBTASK_ENV_VAR)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            block_test_commands: flag(BLOCK_TEST_COMMANDS_ENV_VAR),
            test_plan: load_test_plan_from_env(),
        }
    }
}

/// Parse `AUTO_IFLOW_TEST_PLAN`: a JSON array of strings, or a
/// comma/newline-separated list.
#[must_use]
pub fn load_test_plan_from_env() -> Vec<String> {
    let raw = match std::env::var(TEST_PLAN_ENV_VAR) {
        Ok(raw) => raw.trim().to_string(),
        Err(_) => return Vec::new(),
    };
    if raw.is_empty() {
        return Vec::new();
    }

    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(&raw) {
        return items
            .into_iter()
            .filter_map(|v| v.as_str().map(normalize_command))
            .filter(|s| !s.is_empty())
            .collect();
    }

    raw.replace(',', "\n")
        .lines()
        .map(normalize_command)
        .filter(|s| !s.is_empty())
        .collect()
}

fn normalize_command(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-normalized equality, or prefix match in either direction.
fn segment_matches_plan(segment: &str, plan_commands: &[String]) -> bool {
    let segment_norm = normalize_command(segment);
    if segment_norm.is_empty() {
        return false;
    }
    for plan_cmd in plan_commands {
        let plan_norm = normalize_command(plan_cmd);
        if plan_norm.is_empty() {
            continue;
        }
        if segment_norm == plan_norm
            || segment_norm.starts_with(&format!("{plan_norm} "))
            || plan_norm.starts_with(&format!("{segment_norm} "))
        {
            return true;
        }
    }
    false
}

/// Validate a tool call against the allowlist and context rules.
#[must_use]
pub fn gate_tool_use(payload: &ToolUsePayload, ctx: &GateContext) -> GateDecision {
    if payload.tool_name != "Bash" {
        return GateDecision::Allow;
    }

    if ctx.manual_verification {
        let suffix = ctx
            .manual_verification_subtask
            .as_deref()
            .map(|s| format!(" for subtask {s}"))
            .unwrap_or_default();
        return GateDecision::block(format!(
            "Manual verification mode{suffix}: command execution disabled"
        ));
    }

    let command = match &payload.tool_input {
        None => {
            return GateDecision::block("Bash tool_input is missing - malformed tool call");
        }
        Some(serde_json::Value::Object(map)) => match map.get("command") {
            Some(serde_json::Value::String(cmd)) if !cmd.trim().is_empty() => cmd.clone(),
            _ => {
                return GateDecision::block(
                    "Bash tool_input.command must be a non-empty string",
                );
            }
        },
        Some(other) => {
            return GateDecision::block(format!(
                "Bash tool_input must be an object, got {}",
                json_type_name(other)
            ));
        }
    };

    let segments = split_command_segments(&command);

    if ctx.block_test_commands {
        let blocked: Vec<String> = if ctx.test_plan.is_empty() {
            DEFAULT_BLOCKED_TEST_COMMANDS
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        } else {
            ctx.test_plan.clone()
        };
        if segments.iter().any(|s| segment_matches_plan(s, &blocked)) {
            return GateDecision::block(
                "Test commands are reserved for Post-Code Tests. Run tests only after coding completes.",
            );
        }
    }

    if ctx.task_type != "code" {
        let deny: Vec<String> = NON_CODE_BLOCKED_COMMANDS
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        if segments.iter().any(|s| segment_matches_plan(s, &deny)) {
            return GateDecision::block(
                "Non-code task: command execution limited to read-only operations.",
            );
        }
    }

    let commands = extract_commands(&command);
    if commands.is_empty() {
        // Could not parse - fail safe by blocking
        return GateDecision::block(format!(
            "Could not parse command for security validation: {command}"
        ));
    }

    for cmd in &commands {
        let (allowed, reason) = ctx.profile.is_command_allowed(cmd);
        if !allowed {
            return GateDecision::block(reason);
        }

        if let Some(validator) = VALIDATORS.get(cmd.as_str()) {
            let segment =
                get_command_for_validation(cmd, &segments).unwrap_or_else(|| command.clone());
            let (allowed, reason) = validator(&segment);
            if !allowed {
                return GateDecision::block(reason);
            }
        }
    }

    GateDecision::Allow
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
