//! Agent stream message shapes and the internal event model.
//!
//! Two backend variants exist in the wild: a block-structured shape
//! (`Assistant { content: [Text | ToolUse] }` with tool results arriving in
//! `User` messages) and a flat shape (`ToolCall` / `ToolResult` messages,
//! where a `ToolCall` may carry an inline output making it self-contained).
//! The session loop consumes only [`SessionEvent`]; the translation lives
//! here so backend quirks never leak into the loop.

use serde::Deserialize;

/// Content block inside an assistant message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
}

/// Content block inside a user message (tool results).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserBlock {
    ToolResult {
        #[serde(default)]
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// Raw message from the agent backend stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    Assistant {
        #[serde(default)]
        content: Vec<ContentBlock>,
    },
    User {
        #[serde(default)]
        content: Vec<UserBlock>,
    },
    ToolCall {
        name: String,
        #[serde(default)]
        input: Option<serde_json::Value>,
        #[serde(default)]
        output: Option<String>,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        is_error: bool,
    },
    ToolResult {
        #[serde(default)]
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    Finish {
        #[serde(default)]
        stop_reason: Option<String>,
    },
}

/// How a tool result is classified by the session runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    Success,
    Error,
    /// Denied by the agent-side file scope guard.
    ScopeViolation,
    /// Blocked by the security command gate.
    SecurityBlock,
}

impl ToolOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Internal event stream the session loop operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TextChunk(String),
    ToolStart {
        name: String,
        input_preview: Option<String>,
    },
    ToolEnd {
        name: String,
        outcome: ToolOutcome,
        result: Option<String>,
        detail: Option<String>,
    },
    Finish,
}

/// Denial phrases emitted by the scope guard, matched lowercase.
const SCOPE_GUARD_PHRASES: &[&str] = &[
    "file access",
    "not in allowed",
    "not allowed",
    "outside allowed",
    "permission denied",
    "access denied",
    "allowed dirs",
    "allowed directories",
];

/// Tools whose full output is worth keeping as collapsible detail.
const DETAIL_TOOLS: &[&str] = &["Read", "Grep", "Bash", "Edit", "Write"];

/// Outputs beyond this keep only the head.
pub const DETAIL_MAX_CHARS: usize = 50_000;

/// Classify a tool-result message as a scope-guard denial.
#[must_use]
pub fn is_scope_guard_violation(message: &str) -> bool {
    let lowered = message.to_lowercase();
    SCOPE_GUARD_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

/// Classify a tool result into an outcome.
#[must_use]
pub fn classify_tool_result(content: &str, is_error: bool) -> ToolOutcome {
    if !is_error {
        return ToolOutcome::Success;
    }
    if is_scope_guard_violation(content) {
        return ToolOutcome::ScopeViolation;
    }
    if content.to_lowercase().contains("blocked") {
        return ToolOutcome::SecurityBlock;
    }
    ToolOutcome::Error
}

/// One-line preview of a tool's input for logging.
///
/// Paths keep their tail, commands their head, both capped at 50 chars.
#[must_use]
pub fn format_tool_input_preview(input: Option<&serde_json::Value>) -> Option<String> {
    let input = input?;
    if let Some(map) = input.as_object() {
        if let Some(pattern) = map.get("pattern").and_then(|v| v.as_str()) {
            return Some(format!("pattern: {pattern}"));
        }
        if let Some(file_path) = map.get("file_path").and_then(|v| v.as_str()) {
            return Some(truncate_tail(file_path, 50));
        }
        if let Some(command) = map.get("command").and_then(|v| v.as_str()) {
            return Some(truncate_head(command, 50));
        }
        if let Some(path) = map.get("path").and_then(|v| v.as_str()) {
            return Some(path.to_string());
        }
    }
    if input.is_null() {
        return None;
    }
    Some(truncate_head(&input.to_string(), 50))
}

fn truncate_head(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

fn truncate_tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        text.to_string()
    } else {
        let tail: String = text
            .chars()
            .skip(count - max.saturating_sub(3))
            .collect();
        format!("...{tail}")
    }
}

/// Detail payload for a successful tool result: full output for known
/// inspection tools, head-only beyond the cap, nothing for the rest.
#[must_use]
pub fn detail_for_tool(tool_name: &str, content: &str) -> Option<String> {
    if !DETAIL_TOOLS.contains(&tool_name) {
        return None;
    }
    if content.len() <= DETAIL_MAX_CHARS {
        Some(content.to_string())
    } else {
        let mut end = DETAIL_MAX_CHARS;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        Some(content[..end].to_string())
    }
}
