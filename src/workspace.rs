//! Workspace persistence: data directory bootstrap, gitignore hygiene, and
//! locked spec-directory allocation.

use camino::{Utf8Path, Utf8PathBuf};
use iflow_lock::SpecNumberLock;
use std::time::{Duration, SystemTime};

use crate::error::{IflowError, Result};
use crate::paths;

/// Gitignore entries for everything the pipeline writes into a project.
pub const GITIGNORE_ENTRIES: &[&str] = &[
    ".auto-iflow/",
    ".auto-iflow-security.json",
    ".auto-iflow-allowlist",
    ".auto-iflow-status",
    ".worktrees/",
    "logs/security/",
];

const GITIGNORE_HEADER: &str = "# Auto-iFlow generated files";
const GITIGNORE_MARKER: &str = ".gitignore_checked";

/// Orphaned `NNN-pending` directories older than this are removed at startup.
const PENDING_ORPHAN_AGE: Duration = Duration::from_secs(24 * 3600);

fn entry_exists_in_gitignore(lines: &[&str], entry: &str) -> bool {
    let normalized = entry.trim_end_matches('/');
    lines.iter().any(|line| {
        let line = line.trim();
        line == entry || line == normalized || line == format!("{normalized}/")
    })
}

/// Ensure a single entry exists in the project's `.gitignore`.
///
/// Creates the file when absent. Idempotent: a second call adds nothing.
/// Returns true when the entry was added.
pub fn ensure_gitignore_entry(project_dir: &Utf8Path, entry: &str) -> Result<bool> {
    let gitignore_path = project_dir.join(".gitignore");

    if gitignore_path.exists() {
        let mut content = std::fs::read_to_string(&gitignore_path)?;
        let lines: Vec<&str> = content.lines().collect();
        if entry_exists_in_gitignore(&lines, entry) {
            return Ok(false);
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&format!("\n{GITIGNORE_HEADER}\n{entry}\n"));
        std::fs::write(&gitignore_path, content)?;
    } else {
        std::fs::write(&gitignore_path, format!("{GITIGNORE_HEADER}\n{entry}\n"))?;
    }
    Ok(true)
}

/// Ensure every data-directory entry exists in `.gitignore`.
///
/// Returns the entries that were added (empty when all existed).
pub fn ensure_all_gitignore_entries(project_dir: &Utf8Path) -> Result<Vec<String>> {
    let gitignore_path = project_dir.join(".gitignore");

    let mut content = if gitignore_path.exists() {
        std::fs::read_to_string(&gitignore_path)?
    } else {
        String::new()
    };
    let lines: Vec<&str> = content.lines().collect();

    let to_add: Vec<&str> = GITIGNORE_ENTRIES
        .iter()
        .copied()
        .filter(|entry| !entry_exists_in_gitignore(&lines, entry))
        .collect();

    if to_add.is_empty() {
        return Ok(Vec::new());
    }

    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&format!("\n{GITIGNORE_HEADER}\n"));
    let mut added = Vec::new();
    for entry in to_add {
        content.push_str(entry);
        content.push('\n');
        added.push(entry.to_string());
    }
    std::fs::write(&gitignore_path, content)?;
    Ok(added)
}

/// Initialize the project data directory.
///
/// Creates the directory and ensures the gitignore entries. A marker file in
/// the data directory records that gitignore was checked so repeat runs skip
/// the scan. Returns `(data_dir, gitignore_was_updated)`.
pub fn init_auto_build_dir(project_dir: &Utf8Path) -> Result<(Utf8PathBuf, bool)> {
    let data_dir = paths::data_dir(project_dir);

    let dir_created = !data_dir.exists();
    iflow_utils::ensure_dir_all(&data_dir)?;

    let marker = data_dir.join(GITIGNORE_MARKER);
    let mut gitignore_updated = false;
    if dir_created || !marker.exists() {
        // Gitignore maintenance is best-effort: a read-only project must not
        // stop the pipeline.
        match ensure_all_gitignore_entries(project_dir) {
            Ok(added) => gitignore_updated = !added.is_empty(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not update .gitignore");
            }
        }
        let _ = std::fs::write(&marker, "");
    }

    Ok((data_dir, gitignore_updated))
}

/// Reset the gitignore marker and re-apply all entries.
///
/// For projects created before every entry was added, or after manual edits.
pub fn repair_gitignore(project_dir: &Utf8Path) -> Result<Vec<String>> {
    let data_dir = paths::data_dir(project_dir);
    let marker = data_dir.join(GITIGNORE_MARKER);
    if marker.exists() {
        let _ = std::fs::remove_file(&marker);
    }

    let added = ensure_all_gitignore_entries(project_dir)?;

    if data_dir.exists() {
        let _ = std::fs::write(&marker, "");
    }
    Ok(added)
}

/// Spec directory name parsing: `NNN-slug` prefixes.
fn spec_number_of(name: &str) -> Option<u32> {
    let (prefix, rest) = name.split_at_checked(3)?;
    if !rest.starts_with('-') {
        return None;
    }
    prefix.parse::<u32>().ok()
}

/// Next available spec number in a specs directory (max + 1).
fn next_spec_number(specs_dir: &Utf8Path) -> u32 {
    let mut max = 0;
    if let Ok(entries) = std::fs::read_dir(specs_dir) {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(number) = spec_number_of(name) {
                    max = max.max(number);
                }
            }
        }
    }
    max + 1
}

/// Allocate a new `NNN-pending` spec directory.
///
/// Allocation is serialized by an exclusive file lock on the data directory
/// so concurrent worktrees never pick the same number; the directory is
/// created while the lock is held.
pub fn create_spec_dir(project_dir: &Utf8Path) -> Result<Utf8PathBuf> {
    let data_dir = paths::data_dir(project_dir);
    let specs_dir = paths::specs_dir(project_dir);
    iflow_utils::ensure_dir_all(&specs_dir)?;

    let mut lock = SpecNumberLock::new(data_dir.as_std_path())?;
    let spec_dir = lock.exclusive(|| {
        let number = next_spec_number(&specs_dir);
        let spec_dir = specs_dir.join(format!("{number:03}-pending"));
        std::fs::create_dir_all(&spec_dir)?;
        Ok(spec_dir)
    })?;

    Ok(spec_dir)
}

/// Generate a directory slug from a task description.
///
/// Lowercased alphanumeric words joined by dashes, capped at 40 chars.
#[must_use]
pub fn generate_spec_name(task_description: &str) -> String {
    let mut slug = String::new();
    for word in task_description.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if cleaned.is_empty() {
            continue;
        }
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&cleaned);
        if slug.len() >= 40 {
            break;
        }
    }
    slug.truncate(40);
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "task".to_string()
    } else {
        slug
    }
}

/// Rename `NNN-pending` to `NNN-<slug>` using the requirements description.
///
/// No-op when the directory is already named or requirements are missing.
/// Returns the (possibly new) spec directory path.
pub fn rename_spec_dir_from_requirements(spec_dir: &Utf8Path) -> Result<Utf8PathBuf> {
    let name = spec_dir
        .file_name()
        .ok_or_else(|| IflowError::SpecDir(format!("invalid spec dir: {spec_dir}")))?;

    if !name.ends_with("-pending") {
        return Ok(spec_dir.to_path_buf());
    }

    let Some(requirements) = crate::artifact::load_requirements(spec_dir) else {
        return Ok(spec_dir.to_path_buf());
    };
    if requirements.task_description.trim().is_empty() {
        return Ok(spec_dir.to_path_buf());
    }

    let prefix = &name[..4]; // "NNN-"
    let slug = generate_spec_name(&requirements.task_description);
    let parent = spec_dir
        .parent()
        .ok_or_else(|| IflowError::SpecDir(format!("spec dir has no parent: {spec_dir}")))?;
    let target = parent.join(format!("{prefix}{slug}"));

    if target.exists() {
        // Slug collision: keep the pending name rather than clobber.
        return Ok(spec_dir.to_path_buf());
    }

    std::fs::rename(spec_dir, &target)?;
    Ok(target)
}

/// Remove stale `NNN-pending` directories with no artifacts.
///
/// A pending folder is orphaned when a previous run crashed before
/// requirements were gathered; anything older than a day with no JSON
/// artifacts inside is deleted. Returns the removed directory names.
pub fn cleanup_orphaned_pending_folders(specs_dir: &Utf8Path) -> Vec<String> {
    let mut removed = Vec::new();
    let Ok(entries) = std::fs::read_dir(specs_dir) else {
        return removed;
    };

    for entry in entries.flatten() {
        let Some(name) = entry.file_name().to_str().map(String::from) else {
            continue;
        };
        if !name.ends_with("-pending") || spec_number_of(&name).is_none() {
            continue;
        }
        let path = entry.path();

        let has_artifacts = std::fs::read_dir(&path)
            .map(|mut it| it.any(|e| e.is_ok()))
            .unwrap_or(false);
        if has_artifacts {
            continue;
        }

        let old_enough = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(|modified| {
                SystemTime::now()
                    .duration_since(modified)
                    .map(|age| age > PENDING_ORPHAN_AGE)
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        if !old_enough {
            continue;
        }

        if std::fs::remove_dir_all(&path).is_ok() {
            removed.push(name);
        }
    }
    removed
}
