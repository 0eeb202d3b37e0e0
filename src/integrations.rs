//! Contracts for external collaborators.
//!
//! Auth discovery, the knowledge-graph memory backend, the issue tracker,
//! the LLM process manager, the phase summarizer, and the output sink are
//! all outside the core; the pipeline talks to them through these traits.
//! No-op implementations ship for tests and disabled integrations.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Snapshot of a session handed to the memory store.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub spec_id: String,
    pub subtask_id: String,
    pub session: u32,
    pub success: bool,
    pub subtasks_completed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discoveries: Option<serde_json::Value>,
}

/// Credential discovery. `ensure_env` populates process env with whatever
/// the backend needs; `has_auth` is side-effect-free.
pub trait AuthProvider: Send + Sync {
    fn ensure_env(&self) -> Result<()>;
    fn has_auth(&self) -> bool;
}

/// Knowledge-graph memory backend.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Save a session snapshot; returns (saved, backend-name).
    async fn save(&self, snapshot: &SessionSnapshot) -> (bool, String);

    /// Hints relevant to a task description, best first.
    async fn query_hints(&self, task: &str) -> Vec<String>;
}

/// Issue-tracker / VCS-hosting integration.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn task_completed(&self, spec_id: &str, completed: u32, total: u32);
    async fn task_failed(&self, spec_id: &str, attempt: u32, reason: &str);
    async fn subtask_completed(&self, spec_id: &str, subtask_id: &str, completed: u32, total: u32);
    async fn subtask_failed(&self, spec_id: &str, subtask_id: &str, attempt: u32, reason: &str);
}

/// Lifecycle of the external LLM agent process.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// LLM-powered session insight extraction (patterns, file insights).
#[async_trait]
pub trait InsightExtractor: Send + Sync {
    /// Extract structured insights from a session; `None` on failure.
    async fn extract(&self, snapshot: &SessionSnapshot) -> Option<serde_json::Value>;
}

/// Extractor that yields nothing (insights disabled).
pub struct NullInsightExtractor;

#[async_trait]
impl InsightExtractor for NullInsightExtractor {
    async fn extract(&self, _snapshot: &SessionSnapshot) -> Option<serde_json::Value> {
        None
    }
}

/// Bounded summarizer used for phase-summary compaction.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a summary of at most `target_words` words; `None` on failure.
    async fn summarize(&self, phase_name: &str, content: &str, target_words: usize)
    -> Option<String>;
}

/// Output sink for session text and tool events (the terminal UI lives
/// behind this).
pub trait SessionSink: Send + Sync {
    fn text(&self, chunk: &str);
    fn tool_start(&self, name: &str, input_preview: Option<&str>);
    fn tool_end(&self, name: &str, success: bool, result: Option<&str>, detail: Option<&str>);
    fn note(&self, message: &str);
}

/// No-op auth provider for environments with ambient credentials.
pub struct EnvAuthProvider;

impl AuthProvider for EnvAuthProvider {
    fn ensure_env(&self) -> Result<()> {
        Ok(())
    }

    fn has_auth(&self) -> bool {
        true
    }
}

/// Memory store that drops everything (memory disabled).
pub struct NullMemoryStore;

#[async_trait]
impl MemoryStore for NullMemoryStore {
    async fn save(&self, _snapshot: &SessionSnapshot) -> (bool, String) {
        (false, "disabled".to_string())
    }

    async fn query_hints(&self, _task: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Tracker that records nothing.
pub struct NullTracker;

#[async_trait]
impl Tracker for NullTracker {
    async fn task_completed(&self, _spec_id: &str, _completed: u32, _total: u32) {}
    async fn task_failed(&self, _spec_id: &str, _attempt: u32, _reason: &str) {}
    async fn subtask_completed(
        &self,
        _spec_id: &str,
        _subtask_id: &str,
        _completed: u32,
        _total: u32,
    ) {
    }
    async fn subtask_failed(&self, _spec_id: &str, _subtask_id: &str, _attempt: u32, _reason: &str) {
    }
}

/// Summarizer that truncates instead of calling a model. Used in tests and
/// when no bootstrap model is reachable.
pub struct TruncatingSummarizer;

#[async_trait]
impl Summarizer for TruncatingSummarizer {
    async fn summarize(
        &self,
        _phase_name: &str,
        content: &str,
        target_words: usize,
    ) -> Option<String> {
        let words: Vec<&str> = content.split_whitespace().take(target_words).collect();
        if words.is_empty() {
            None
        } else {
            Some(words.join(" "))
        }
    }
}

/// Sink that forwards to tracing, for headless runs.
pub struct LogSink;

impl SessionSink for LogSink {
    fn text(&self, chunk: &str) {
        tracing::info!(target: "auto_iflow::session", "{chunk}");
    }

    fn tool_start(&self, name: &str, input_preview: Option<&str>) {
        tracing::info!(
            target: "auto_iflow::session",
            tool = %name,
            input = input_preview.unwrap_or(""),
            "tool start"
        );
    }

    fn tool_end(&self, name: &str, success: bool, result: Option<&str>, _detail: Option<&str>) {
        tracing::info!(
            target: "auto_iflow::session",
            tool = %name,
            success,
            result = result.unwrap_or(""),
            "tool end"
        );
    }

    fn note(&self, message: &str) {
        tracing::info!(target: "auto_iflow::session", "{message}");
    }
}
