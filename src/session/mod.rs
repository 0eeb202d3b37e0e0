//! Agent session runtime.
//!
//! One session is one bounded interaction with the agent covering one
//! subtask. The loop sends the prompt, consumes the message stream until a
//! finish marker (or the stream ends), enforces the idle timeout between
//! consecutive messages, aggregates assistant text, and emits tool
//! start/end events to the sink. Tool use is sequential: a single
//! `current_tool` slot pairs each result with the most recent start.

pub mod events;

use async_trait::async_trait;
use camino::Utf8Path;
use std::time::Duration;

use crate::integrations::SessionSink;
use crate::progress::is_build_complete;
use events::{
    AgentMessage, ContentBlock, ToolOutcome, UserBlock, classify_tool_result, detail_for_tool,
    format_tool_input_preview,
};

/// Idle timeout env var (seconds). `<= 0` disables the bound.
pub const STREAM_IDLE_TIMEOUT_ENV_VAR: &str = "IFLOW_STREAM_IDLE_TIMEOUT_SEC";
/// Default idle timeout between consecutive stream messages.
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: f64 = 300.0;

/// Client abstraction over the LLM agent process.
#[async_trait]
pub trait AgentClient: Send {
    /// Send the prompt that opens this session.
    async fn send(&mut self, prompt: &str) -> crate::error::Result<()>;

    /// Next message from the stream; `None` when the stream ends.
    async fn next_message(&mut self) -> Option<AgentMessage>;
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Work remains; run another session.
    Continue,
    /// Every subtask in the plan is completed.
    Complete,
    /// The session failed (idle timeout or transport error).
    Error,
}

/// Result of one agent session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    /// Aggregated assistant text, or the error message on failure.
    pub response: String,
    pub message_count: u32,
    pub tool_count: u32,
}

/// Resolve the configured idle timeout.
#[must_use]
pub fn stream_idle_timeout() -> Option<Duration> {
    iflow_utils::timeout_from_env(STREAM_IDLE_TIMEOUT_ENV_VAR, DEFAULT_STREAM_IDLE_TIMEOUT_SECS)
}

/// Run a single agent session.
///
/// Returns `Complete` when the plan's build-complete predicate holds after
/// the stream ends, `Continue` otherwise, and `Error` with the reason in
/// `response` when the idle timeout fires.
pub async fn run_agent_session(
    client: &mut dyn AgentClient,
    prompt: &str,
    spec_dir: &Utf8Path,
    sink: &dyn SessionSink,
    idle_timeout: Option<Duration>,
) -> SessionOutcome {
    let mut response_text = String::new();
    let mut message_count: u32 = 0;
    let mut tool_count: u32 = 0;
    let mut current_tool: Option<String> = None;

    if let Err(e) = client.send(prompt).await {
        let message = format!("Failed to send prompt: {e}");
        sink.note(&message);
        return SessionOutcome {
            status: SessionStatus::Error,
            response: message,
            message_count,
            tool_count,
        };
    }

    loop {
        let next = match idle_timeout {
            Some(bound) => match tokio::time::timeout(bound, client.next_message()).await {
                Ok(message) => message,
                Err(_) => {
                    let message = format!(
                        "No agent output for {}s; aborting session",
                        bound.as_secs()
                    );
                    tracing::error!(timeout_secs = bound.as_secs(), "Agent response timeout");
                    sink.note(&message);
                    return SessionOutcome {
                        status: SessionStatus::Error,
                        response: message,
                        message_count,
                        tool_count,
                    };
                }
            },
            None => client.next_message().await,
        };

        let Some(message) = next else {
            break;
        };
        message_count += 1;

        match message {
            AgentMessage::Assistant { content } => {
                for block in content {
                    match block {
                        ContentBlock::Text { text } => {
                            response_text.push_str(&text);
                            sink.text(&text);
                        }
                        ContentBlock::ToolUse { name, input } => {
                            tool_count += 1;
                            let preview = format_tool_input_preview(input.as_ref());
                            tracing::debug!(
                                tool = %name,
                                count = tool_count,
                                input = preview.as_deref().unwrap_or(""),
                                "tool call"
                            );
                            sink.tool_start(&name, preview.as_deref());
                            current_tool = Some(name);
                        }
                    }
                }
            }

            AgentMessage::ToolCall {
                name,
                input,
                output,
                status,
                is_error,
            } => {
                tool_count += 1;
                let preview = format_tool_input_preview(input.as_ref());
                sink.tool_start(&name, preview.as_deref());
                current_tool = Some(name.clone());

                // Self-contained call: the result rides along, so the end
                // event is emitted immediately.
                if output.is_some() || status.is_some() {
                    let content = output.unwrap_or_default();
                    let failed = is_error
                        || matches!(status.as_deref(), Some("error" | "failed" | "blocked"));
                    let outcome = classify_tool_result(&content, failed);
                    emit_tool_end(sink, &name, outcome, &content);
                    current_tool = None;
                }
            }

            AgentMessage::ToolResult { content, is_error } => {
                handle_tool_result(sink, &mut current_tool, &content, is_error);
            }

            AgentMessage::User { content } => {
                for block in content {
                    let UserBlock::ToolResult { content, is_error } = block;
                    handle_tool_result(sink, &mut current_tool, &content, is_error);
                }
            }

            AgentMessage::Finish { stop_reason } => {
                tracing::debug!(stop_reason = stop_reason.as_deref().unwrap_or(""), "agent finished turn");
                break;
            }
        }
    }

    let status = if is_build_complete(spec_dir) {
        SessionStatus::Complete
    } else {
        SessionStatus::Continue
    };
    tracing::debug!(
        message_count,
        tool_count,
        response_length = response_text.len(),
        complete = status == SessionStatus::Complete,
        "session finished"
    );

    SessionOutcome {
        status,
        response: response_text,
        message_count,
        tool_count,
    }
}

fn handle_tool_result(
    sink: &dyn SessionSink,
    current_tool: &mut Option<String>,
    content: &str,
    is_error: bool,
) {
    let outcome = classify_tool_result(content, is_error);
    let Some(tool) = current_tool.take() else {
        // Result without a start: note it, nothing to pair with.
        if !outcome.is_success() {
            sink.note(&format!("Orphan tool result: {}", head(content, 200)));
        }
        return;
    };
    emit_tool_end(sink, &tool, outcome, content);
}

fn emit_tool_end(sink: &dyn SessionSink, tool: &str, outcome: ToolOutcome, content: &str) {
    match outcome {
        ToolOutcome::ScopeViolation => {
            tracing::warn!(tool = %tool, "scope guard blocked tool call");
            sink.tool_end(tool, false, Some("BLOCKED"), Some(content));
        }
        ToolOutcome::SecurityBlock => {
            tracing::warn!(tool = %tool, "security gate blocked tool call");
            sink.tool_end(tool, false, Some("BLOCKED"), Some(content));
        }
        ToolOutcome::Error => {
            sink.tool_end(tool, false, Some(&head(content, 100)), Some(content));
        }
        ToolOutcome::Success => {
            let detail = detail_for_tool(tool, content);
            sink.tool_end(tool, true, None, detail.as_deref());
        }
    }
}

fn head(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
