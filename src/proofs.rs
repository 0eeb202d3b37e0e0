//! Proof writer and proof gate.
//!
//! A proof is a snippet anchored in a file that witnesses an acceptance
//! criterion. The writer appends auto-generated proofs after completed
//! sessions; the gate checks that every acceptance-map entry is witnessed
//! before QA can hand off to human review.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;

use crate::artifact;
use crate::error::Result;
use crate::types::{Proof, ProofSource, TaskType};

/// Lines captured from the target file for an auto proof.
const SNIPPET_MAX_LINES: usize = 15;

/// Criterion used for the default non-code proof.
pub const NONCODE_CRITERION: &str = "Non-code deliverable";

fn resolve_file_path(
    project_dir: &Utf8Path,
    spec_dir: &Utf8Path,
    file_ref: &str,
) -> Option<Utf8PathBuf> {
    if file_ref.is_empty() {
        return None;
    }
    let candidate = project_dir.join(file_ref);
    if candidate.exists() {
        return Some(candidate);
    }
    let candidate = spec_dir.join(file_ref);
    if candidate.exists() {
        return Some(candidate);
    }
    None
}

fn snippet_from_file(path: Option<&Utf8Path>) -> String {
    let Some(path) = path else {
        return String::new();
    };
    let Ok(content) = std::fs::read_to_string(path) else {
        return String::new();
    };
    content
        .lines()
        .take(SNIPPET_MAX_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

fn has_proof(proofs: &[Proof], criterion: &str, file_ref: &str) -> bool {
    proofs.iter().any(|proof| {
        proof.criterion == criterion && (file_ref.is_empty() || proof.file == file_ref)
    })
}

/// Append auto-generated proofs for acceptance-map entries lacking one.
///
/// Returns how many entries were appended.
pub fn append_acceptance_proofs(spec_dir: &Utf8Path, project_dir: &Utf8Path) -> Result<usize> {
    let Some(intake) = artifact::load_task_intake(spec_dir) else {
        return Ok(0);
    };
    if intake.acceptance_map.is_empty() {
        return Ok(0);
    }

    let mut proof_set = artifact::load_proofs(spec_dir);
    let mut appended = 0;

    for entry in &intake.acceptance_map {
        if entry.criterion.trim().is_empty() {
            continue;
        }
        let file_ref = if entry.file.is_empty() {
            intake.output_files.first().cloned().unwrap_or_default()
        } else {
            entry.file.clone()
        };
        if has_proof(&proof_set.proofs, &entry.criterion, &file_ref) {
            continue;
        }
        let path = resolve_file_path(project_dir, spec_dir, &file_ref);
        proof_set.proofs.push(Proof {
            criterion: entry.criterion.clone(),
            file: file_ref,
            snippet: snippet_from_file(path.as_deref()),
            source: ProofSource::Auto,
            created_at: Utc::now(),
        });
        appended += 1;
    }

    if appended > 0 {
        proof_set.updated_at = Some(Utc::now());
        artifact::save_proofs(spec_dir, &proof_set)?;
    }
    Ok(appended)
}

/// Write the default proof for a non-code task, if none exists yet.
///
/// The proof anchors in `spec.md` and is a one-time witness; it is not
/// regenerated when the spec changes later.
pub fn ensure_noncode_proof(spec_dir: &Utf8Path) -> Result<bool> {
    let task_type = artifact::load_task_intake(spec_dir)
        .map(|i| i.task_type)
        .unwrap_or_default();
    if task_type.is_code() {
        return Ok(false);
    }

    let mut proof_set = artifact::load_proofs(spec_dir);
    if !proof_set.proofs.is_empty() {
        return Ok(false);
    }

    let spec_file = spec_dir.join("spec.md");
    let snippet = if spec_file.exists() {
        snippet_from_file(Some(&spec_file))
    } else {
        String::new()
    };

    proof_set.proofs.push(Proof {
        criterion: NONCODE_CRITERION.to_string(),
        file: "spec.md".to_string(),
        snippet,
        source: ProofSource::Auto,
        created_at: Utc::now(),
    });
    proof_set.updated_at = Some(Utc::now());
    artifact::save_proofs(spec_dir, &proof_set)?;
    Ok(true)
}

/// Validate the proof gate for a spec.
///
/// Code tasks: every acceptance-map entry needs a proof with matching
/// criterion (and file, when the map names one). Non-code tasks: at least
/// one proof entry must exist. Returns `(ok, missing)` where `missing` is a
/// human-readable gap list.
#[must_use]
pub fn validate_proof_gate(spec_dir: &Utf8Path) -> (bool, Vec<String>) {
    let intake = artifact::load_task_intake(spec_dir);
    let task_type = intake.as_ref().map(|i| i.task_type).unwrap_or_default();
    let acceptance_map = intake.map(|i| i.acceptance_map).unwrap_or_default();
    let proofs = artifact::load_proofs(spec_dir).proofs;

    if task_type != TaskType::Code {
        if proofs.is_empty() {
            return (false, vec!["Non-code task missing proof entry".to_string()]);
        }
        return (true, Vec::new());
    }

    if acceptance_map.is_empty() {
        return (true, Vec::new());
    }

    let mut missing = Vec::new();
    for entry in &acceptance_map {
        if entry.criterion.trim().is_empty() {
            continue;
        }
        if !has_proof(&proofs, &entry.criterion, &entry.file) {
            let suffix = if entry.file.is_empty() {
                String::new()
            } else {
                format!(" (file: {})", entry.file)
            };
            missing.push(format!(
                "Missing proof for criterion '{}'{suffix}",
                entry.criterion
            ));
        }
    }

    (missing.is_empty(), missing)
}
