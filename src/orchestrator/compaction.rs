//! Phase-summary compaction.
//!
//! Raw phase artifacts grow without bound; downstream prompts instead carry
//! a bounded summary of each completed phase. Summarization is best-effort
//! and bounded; a missing summary just means the next phase gets less
//! context.

use camino::Utf8Path;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::integrations::Summarizer;

/// Upper bound on each stored phase summary.
pub const SUMMARY_TARGET_WORDS: usize = 500;

/// Bound on a single summarization call.
pub const SUMMARIZER_TIMEOUT: Duration = Duration::from_secs(60);

/// Ordered map of phase name to stored summary.
pub type PhaseSummaries = BTreeMap<String, String>;

/// Read and concatenate a phase's output files.
#[must_use]
pub fn gather_phase_outputs(spec_dir: &Utf8Path, output_files: &[String]) -> String {
    let mut combined = String::new();
    for file in output_files {
        let path = spec_dir.join(file);
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        if !combined.is_empty() {
            combined.push_str("\n\n");
        }
        combined.push_str(&content);
    }
    combined
}

/// Summarize a phase's output under the summarizer timeout.
///
/// Returns `None` on timeout or failure; the pipeline continues without.
pub async fn summarize_phase_output(
    summarizer: &dyn Summarizer,
    phase_name: &str,
    content: &str,
) -> Option<String> {
    if content.trim().is_empty() {
        return None;
    }
    match tokio::time::timeout(
        SUMMARIZER_TIMEOUT,
        summarizer.summarize(phase_name, content, SUMMARY_TARGET_WORDS),
    )
    .await
    {
        Ok(summary) => summary,
        Err(_) => {
            tracing::info!(phase = %phase_name, "Phase summarization timed out; continuing without summary");
            None
        }
    }
}

/// Format stored summaries as a prompt prefix.
#[must_use]
pub fn format_phase_summaries(summaries: &PhaseSummaries) -> String {
    if summaries.is_empty() {
        return String::new();
    }
    let mut formatted = String::from("## PRIOR PHASE SUMMARIES\n");
    for (phase, summary) in summaries {
        formatted.push_str(&format!("\n### {phase}\n{summary}\n"));
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::TruncatingSummarizer;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_gather_reads_existing_files_only() {
        let dir = TempDir::new().unwrap();
        let spec_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::write(spec_dir.join("a.md"), "alpha").unwrap();
        std::fs::write(spec_dir.join("b.md"), "beta").unwrap();

        let combined = gather_phase_outputs(
            &spec_dir,
            &["a.md".to_string(), "missing.md".to_string(), "b.md".to_string()],
        );
        assert_eq!(combined, "alpha\n\nbeta");
    }

    #[tokio::test]
    async fn test_summarize_empty_content_is_none() {
        let summarizer = TruncatingSummarizer;
        assert!(summarize_phase_output(&summarizer, "discovery", "  ").await.is_none());
    }

    #[tokio::test]
    async fn test_summarize_caps_words() {
        let summarizer = TruncatingSummarizer;
        let content = "word ".repeat(SUMMARY_TARGET_WORDS * 2);
        let summary = summarize_phase_output(&summarizer, "discovery", &content)
            .await
            .unwrap();
        assert_eq!(summary.split_whitespace().count(), SUMMARY_TARGET_WORDS);
    }

    #[test]
    fn test_format_summaries_prefix() {
        let mut summaries = PhaseSummaries::new();
        assert_eq!(format_phase_summaries(&summaries), "");

        summaries.insert("discovery".to_string(), "found things".to_string());
        let formatted = format_phase_summaries(&summaries);
        assert!(formatted.starts_with("## PRIOR PHASE SUMMARIES"));
        assert!(formatted.contains("### discovery"));
        assert!(formatted.contains("found things"));
    }
}
