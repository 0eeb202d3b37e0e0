//! Security profile: the dynamic allowlist a project grants the agent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::constants::{ALLOWLIST_FILENAME, BASE_COMMANDS, PROFILE_FILENAME, SHELL_INTERPRETERS};

/// Allowlist of commands the agent may run in a project.
///
/// `base_commands` is the fixed starter set; `project_commands` come from the
/// project's allowlist/profile files. Membership is checked on extracted
/// program names only, so path-qualified invocations never match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityProfile {
    #[serde(default)]
    pub base_commands: BTreeSet<String>,
    #[serde(default)]
    pub project_commands: BTreeSet<String>,
}

impl SecurityProfile {
    /// Profile with only the base command set.
    #[must_use]
    pub fn base() -> Self {
        Self {
            base_commands: BASE_COMMANDS.iter().map(|s| (*s).to_string()).collect(),
            project_commands: BTreeSet::new(),
        }
    }

    /// Union of base and project commands.
    #[must_use]
    pub fn all_allowed_commands(&self) -> BTreeSet<String> {
        self.base_commands
            .union(&self.project_commands)
            .cloned()
            .collect()
    }

    /// Check a single extracted program name against the profile.
    ///
    /// Returns `(allowed, reason)`; the reason is non-empty only on denial.
    #[must_use]
    pub fn is_command_allowed(&self, cmd: &str) -> (bool, String) {
        if cmd.contains('/') || cmd.contains('\\') {
            return (
                false,
                format!("Command '{cmd}' uses a path; only bare command names are allowed"),
            );
        }
        if SHELL_INTERPRETERS.contains(&cmd) {
            return (
                false,
                format!("Shell interpreter '{cmd}' is not allowed; run the command directly"),
            );
        }
        if self.base_commands.contains(cmd) || self.project_commands.contains(cmd) {
            return (true, String::new());
        }
        (
            false,
            format!(
                "Command '{cmd}' is not in the security allowlist. Add it to {ALLOWLIST_FILENAME} if it should be permitted."
            ),
        )
    }
}

/// Load the project's security profile from its configuration files.
///
/// Reads `.auto-iflow-allowlist` (one command per line, `#` comments) and
/// `.auto-iflow-security.json` (a serialized [`SecurityProfile`]); both are
/// optional. Falls back to the base profile on any read or parse failure.
/// This is the only I/O in the crate; the gate itself takes the profile as
/// a value.
#[must_use]
pub fn load_security_profile(project_dir: &Path) -> SecurityProfile {
    let mut profile = SecurityProfile::base();

    let profile_path = project_dir.join(PROFILE_FILENAME);
    if profile_path.exists() {
        match std::fs::read_to_string(&profile_path) {
            Ok(content) => match serde_json::from_str::<SecurityProfile>(&content) {
                Ok(mut loaded) => {
                    if loaded.base_commands.is_empty() {
                        loaded.base_commands = profile.base_commands.clone();
                    }
                    profile = loaded;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %profile_path.display(),
                        error = %e,
                        "Ignoring unparseable security profile"
                    );
                }
            },
            Err(e) => {
                tracing::warn!(
                    path = %profile_path.display(),
                    error = %e,
                    "Could not read security profile"
                );
            }
        }
    }

    let allowlist_path = project_dir.join(ALLOWLIST_FILENAME);
    if allowlist_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&allowlist_path) {
            for line in content.lines() {
                let entry = line.trim();
                if entry.is_empty() || entry.starts_with('#') {
                    continue;
                }
                profile.project_commands.insert(entry.to_string());
            }
        }
    }

    profile
}
