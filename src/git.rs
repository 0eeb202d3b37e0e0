//! Thin git queries used for session bookkeeping.
//!
//! Best-effort: a project without git (or git missing from PATH) yields
//! `None`/zero rather than an error, since commit tracking is advisory.

use camino::Utf8Path;
use std::process::Stdio;

fn git_stdout(project_dir: &Utf8Path, args: &[&str]) -> Option<String> {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(project_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

/// Current HEAD sha, if resolvable.
#[must_use]
pub fn latest_commit(project_dir: &Utf8Path) -> Option<String> {
    git_stdout(project_dir, &["rev-parse", "HEAD"])
}

/// Number of commits reachable from HEAD.
#[must_use]
pub fn commit_count(project_dir: &Utf8Path) -> u32 {
    git_stdout(project_dir, &["rev-list", "--count", "HEAD"])
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
