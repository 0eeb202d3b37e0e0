//! Build progress tracking over the implementation plan.

use camino::Utf8Path;
use chrono::Utc;

use crate::artifact::{self, BUILD_PROGRESS_FILENAME};
use crate::types::SubtaskStatus;

/// Subtask counts across the plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubtaskCounts {
    pub total: u32,
    pub completed: u32,
    pub in_progress: u32,
    pub pending: u32,
    pub failed: u32,
}

/// Count subtasks by status.
#[must_use]
pub fn count_subtasks(spec_dir: &Utf8Path) -> SubtaskCounts {
    let mut counts = SubtaskCounts::default();
    let Some(plan) = artifact::load_implementation_plan(spec_dir) else {
        return counts;
    };
    for subtask in plan.subtasks() {
        counts.total += 1;
        match subtask.status {
            SubtaskStatus::Completed => counts.completed += 1,
            SubtaskStatus::InProgress => counts.in_progress += 1,
            SubtaskStatus::Pending => counts.pending += 1,
            SubtaskStatus::Failed => counts.failed += 1,
        }
    }
    counts
}

/// Build-complete predicate over the on-disk plan.
#[must_use]
pub fn is_build_complete(spec_dir: &Utf8Path) -> bool {
    artifact::load_implementation_plan(spec_dir)
        .map(|plan| plan.is_build_complete())
        .unwrap_or(false)
}

/// Append a line to `build-progress.txt` (`ISO8601 | message`).
///
/// The file is created with a short header on first use. Failures are
/// logged and swallowed; progress notes never fail the pipeline.
pub fn append_build_progress(spec_dir: &Utf8Path, message: &str) {
    let progress_path = spec_dir.join(BUILD_PROGRESS_FILENAME);
    let timestamp = Utc::now().to_rfc3339();

    let write = || -> std::io::Result<()> {
        use std::io::Write;
        if !progress_path.exists() {
            std::fs::write(
                &progress_path,
                "# Build Progress\n# Timestamp (UTC) | Message\n",
            )?;
        }
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&progress_path)?;
        writeln!(file, "{timestamp} | {message}")?;
        Ok(())
    };

    if let Err(e) = write() {
        tracing::debug!(error = %e, "Failed to append build-progress.txt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImplementationPlan, PlanPhase, Subtask};
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn write_plan(spec_dir: &Utf8Path, statuses: &[SubtaskStatus]) {
        let plan = ImplementationPlan {
            phases: vec![PlanPhase {
                phase: 1,
                name: "Build".to_string(),
                subtasks: statuses
                    .iter()
                    .enumerate()
                    .map(|(i, status)| Subtask {
                        id: format!("1.{}", i + 1),
                        description: "work".to_string(),
                        status: *status,
                        verification: None,
                        service: None,
                    })
                    .collect(),
            }],
            ..Default::default()
        };
        artifact::save_implementation_plan(spec_dir, &plan).unwrap();
    }

    #[test]
    fn test_counts() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir);
        write_plan(
            &spec_dir,
            &[
                SubtaskStatus::Completed,
                SubtaskStatus::InProgress,
                SubtaskStatus::Pending,
            ],
        );

        let counts = count_subtasks(&spec_dir);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.pending, 1);
    }

    #[test]
    fn test_build_complete() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir);
        assert!(!is_build_complete(&spec_dir));

        write_plan(&spec_dir, &[SubtaskStatus::Completed]);
        assert!(is_build_complete(&spec_dir));

        write_plan(&spec_dir, &[SubtaskStatus::Completed, SubtaskStatus::Failed]);
        assert!(!is_build_complete(&spec_dir));
    }

    #[test]
    fn test_build_progress_append() {
        let dir = TempDir::new().unwrap();
        let spec_dir = utf8_dir(&dir);

        append_build_progress(&spec_dir, "subtask 1.1 outcome=completed");
        append_build_progress(&spec_dir, "post_code_tests_failed cmd=npm-test");

        let content =
            std::fs::read_to_string(spec_dir.join(BUILD_PROGRESS_FILENAME)).unwrap();
        assert!(content.starts_with("# Build Progress\n"));
        assert_eq!(content.lines().count(), 4);
        assert!(content.contains(" | subtask 1.1 outcome=completed"));
        assert!(content.contains("post_code_tests_failed"));
    }
}
