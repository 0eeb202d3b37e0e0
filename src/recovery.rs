//! Recovery manager: per-subtask attempt history, good commits for
//! rollback, and stuck detection.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::artifact::{self, RECOVERY_FILENAME};
use crate::error::Result;

/// Attempts before a subtask is considered stuck.
pub const STUCK_ATTEMPT_THRESHOLD: u32 = 3;

/// One session attempt at a subtask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub session: u32,
    pub success: bool,
    pub approach: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A commit known to leave the tree in a good state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoodCommit {
    pub sha: String,
    pub subtask_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-subtask recovery state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtaskRecovery {
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
    #[serde(default)]
    pub stuck: bool,
}

/// The recovery document (`recovery.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryState {
    #[serde(default)]
    pub subtasks: HashMap<String, SubtaskRecovery>,
    #[serde(default)]
    pub good_commits: Vec<GoodCommit>,
}

/// Manages recovery state for one spec directory.
pub struct RecoveryManager {
    path: Utf8PathBuf,
    state: RecoveryState,
}

impl RecoveryManager {
    /// Load (or initialize) recovery state for a spec directory.
    #[must_use]
    pub fn load(spec_dir: &Utf8Path) -> Self {
        let path = spec_dir.join(RECOVERY_FILENAME);
        let state = artifact::load_json(&path).unwrap_or_default();
        Self { path, state }
    }

    fn save(&self) -> Result<()> {
        artifact::save_json(&self.path, &self.state)
    }

    /// Record a session attempt; automatically marks the subtask stuck once
    /// the failed-attempt threshold is reached.
    pub fn record_attempt(
        &mut self,
        subtask_id: &str,
        session: u32,
        success: bool,
        approach: &str,
        error: Option<&str>,
    ) -> Result<()> {
        let entry = self.state.subtasks.entry(subtask_id.to_string()).or_default();
        entry.attempts.push(AttemptRecord {
            session,
            success,
            approach: approach.to_string(),
            error: error.map(ToString::to_string),
            timestamp: Utc::now(),
        });

        if success {
            entry.stuck = false;
        } else {
            let failed = entry.attempts.iter().filter(|a| !a.success).count() as u32;
            if failed >= STUCK_ATTEMPT_THRESHOLD {
                entry.stuck = true;
                tracing::warn!(subtask_id = %subtask_id, failed, "Subtask marked stuck");
            }
        }
        self.save()
    }

    /// Record a commit that represents good (or partial) progress.
    pub fn record_good_commit(&mut self, sha: &str, subtask_id: &str) -> Result<()> {
        if self.state.good_commits.iter().any(|c| c.sha == sha) {
            return Ok(());
        }
        self.state.good_commits.push(GoodCommit {
            sha: sha.to_string(),
            subtask_id: subtask_id.to_string(),
            timestamp: Utc::now(),
        });
        self.save()
    }

    /// Manually mark a subtask stuck.
    pub fn mark_subtask_stuck(&mut self, subtask_id: &str) -> Result<()> {
        self.state
            .subtasks
            .entry(subtask_id.to_string())
            .or_default()
            .stuck = true;
        self.save()
    }

    /// Total attempts recorded for a subtask.
    #[must_use]
    pub fn attempt_count(&self, subtask_id: &str) -> u32 {
        self.state
            .subtasks
            .get(subtask_id)
            .map(|s| s.attempts.len() as u32)
            .unwrap_or(0)
    }

    /// Stable summary of the last few attempts, for retry prompts.
    #[must_use]
    pub fn recovery_hints(&self, subtask_id: &str) -> Vec<String> {
        let Some(entry) = self.state.subtasks.get(subtask_id) else {
            return Vec::new();
        };
        entry
            .attempts
            .iter()
            .rev()
            .take(3)
            .map(|attempt| {
                let outcome = if attempt.success { "ok" } else { "failed" };
                match &attempt.error {
                    Some(error) => format!(
                        "session {}: {} ({}) - {}",
                        attempt.session, attempt.approach, outcome, error
                    ),
                    None => format!(
                        "session {}: {} ({})",
                        attempt.session, attempt.approach, outcome
                    ),
                }
            })
            .collect()
    }

    /// Subtasks currently marked stuck, sorted for stable output.
    #[must_use]
    pub fn stuck_subtasks(&self) -> Vec<String> {
        let mut stuck: Vec<String> = self
            .state
            .subtasks
            .iter()
            .filter(|(_, s)| s.stuck)
            .map(|(id, _)| id.clone())
            .collect();
        stuck.sort();
        stuck
    }

    /// Most recent good commit, if any.
    #[must_use]
    pub fn last_good_commit(&self) -> Option<&GoodCommit> {
        self.state.good_commits.last()
    }
}
