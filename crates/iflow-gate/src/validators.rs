//! Per-command validators for sensitive programs.
//!
//! A program can be on the allowlist yet still need argument-level checks:
//! `git` is fine, `git push --force` is not. Validators receive the segment
//! that invokes their program and return `(allowed, reason)`.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Validator signature: full segment in, verdict out.
pub type CommandValidator = fn(&str) -> (bool, String);

/// Process-lifetime validator registry keyed by program name.
pub static VALIDATORS: Lazy<HashMap<&'static str, CommandValidator>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, CommandValidator> = HashMap::new();
    map.insert("git", validate_git);
    map.insert("npm", validate_package_manager);
    map.insert("pnpm", validate_package_manager);
    map.insert("yarn", validate_package_manager);
    map.insert("pip", validate_pip);
    map.insert("pip3", validate_pip);
    map
});

fn tokens(segment: &str) -> Vec<&str> {
    segment.split_whitespace().collect()
}

/// Block history-destroying and force operations; everything else passes.
fn validate_git(segment: &str) -> (bool, String) {
    let toks = tokens(segment);
    let has = |flag: &str| toks.iter().any(|t| *t == flag);

    if toks.contains(&"push") && (has("--force") || has("-f")) {
        return (
            false,
            "git push --force is not allowed; use a new branch instead".to_string(),
        );
    }
    if toks.contains(&"clean") && toks.iter().any(|t| t.starts_with('-') && t.contains('f')) {
        return (
            false,
            "git clean -f deletes untracked files and is not allowed".to_string(),
        );
    }
    if toks.contains(&"config") && has("--global") {
        return (
            false,
            "git config --global modifies user-level settings and is not allowed".to_string(),
        );
    }
    (true, String::new())
}

/// Block publishing and global installs for JS package managers.
fn validate_package_manager(segment: &str) -> (bool, String) {
    let toks = tokens(segment);
    if toks.contains(&"publish") {
        return (
            false,
            "Package publishing is not allowed from agent sessions".to_string(),
        );
    }
    if toks.iter().any(|t| *t == "-g" || *t == "--global") {
        return (
            false,
            "Global package installs are not allowed; install into the project".to_string(),
        );
    }
    (true, String::new())
}

/// Block installs from URLs and VCS refs; requirements files are fine.
fn validate_pip(segment: &str) -> (bool, String) {
    let toks = tokens(segment);
    if toks.contains(&"install")
        && toks.iter().any(|t| {
            t.starts_with("http://") || t.starts_with("https://") || t.starts_with("git+")
        })
    {
        return (
            false,
            "pip install from a URL is not allowed; pin the package in requirements".to_string(),
        );
    }
    (true, String::new())
}
