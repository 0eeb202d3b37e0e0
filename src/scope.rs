//! Scope contracts: derivation rules, validation, and enforcement helpers.
//!
//! The scope contract is the authoritative declaration of what the agent may
//! touch. Rules here derive defaults from the project index, validate the
//! allowed/forbidden path relationship, and translate the globs into the
//! concrete write roots handed to the agent-side guard.

use camino::Utf8Path;
use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::index::ProjectIndex;
use crate::paths;
use crate::types::{ScopeContract, ScopeIntent, TaskType};

/// Paths no task may ever write into.
pub const DEFAULT_FORBIDDEN_PATHS: &[&str] = &[
    ".git/**",
    ".auto-iflow/**",
    ".venv/**",
    ".pytest_cache/**",
    "__pycache__/**",
    "node_modules/**",
    "dist/**",
    "build/**",
    "coverage/**",
    "target/**",
];

fn normalize_path(path: &str) -> String {
    let cleaned = path.trim().replace('\\', "/");
    cleaned.trim_end_matches('/').to_string()
}

fn strip_glob(path: &str) -> String {
    let cleaned = normalize_path(path);
    cleaned
        .strip_suffix("/**")
        .map_or(cleaned.clone(), ToString::to_string)
}

fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|item| normalize_path(&item))
        .filter(|item| !item.is_empty() && seen.insert(item.clone()))
        .collect()
}

fn relativize(path: &str, project_root: Option<&str>) -> Option<String> {
    let cleaned = normalize_path(path);
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.starts_with('/') {
        let root = project_root?;
        let root = normalize_path(root);
        return cleaned
            .strip_prefix(&format!("{root}/"))
            .map(ToString::to_string);
    }
    Some(cleaned)
}

/// Derive allowed path globs from the project index: service roots and
/// their key directories, else the top-level dirs, else `src/**`.
#[must_use]
pub fn derive_allowed_paths(index: &ProjectIndex) -> Vec<String> {
    let root = index.project_root.as_deref();
    let mut allowed = Vec::new();

    for service in index.services.values() {
        if let Some(service_rel) = relativize(&service.path, root) {
            allowed.push(format!("{service_rel}/**"));
            for entry in service.key_directories.values() {
                if !entry.path.is_empty() {
                    allowed.push(format!("{service_rel}/{}/**", normalize_path(&entry.path)));
                }
            }
        }
    }

    if allowed.is_empty() {
        for entry in &index.top_level_dirs {
            let Some(entry_rel) = relativize(entry, root) else {
                continue;
            };
            if entry_rel.starts_with('.') {
                continue;
            }
            allowed.push(format!("{entry_rel}/**"));
        }
    }

    if allowed.is_empty() {
        allowed.push("src/**".to_string());
    }

    dedupe(allowed)
}

/// Derive forbidden path globs: the fixed deny set plus documentation dirs.
#[must_use]
pub fn derive_forbidden_paths(index: &ProjectIndex) -> Vec<String> {
    let mut forbidden: Vec<String> = DEFAULT_FORBIDDEN_PATHS
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    for entry in &index.top_level_dirs {
        if matches!(entry.as_str(), "docs" | "doc" | "documentation") {
            forbidden.push(format!("{entry}/**"));
        }
    }
    dedupe(forbidden)
}

/// Derive the default test plan from service languages.
#[must_use]
pub fn derive_test_plan(index: &ProjectIndex) -> Vec<String> {
    let mut commands = Vec::new();
    for service in index.services.values() {
        match service.language.to_lowercase().as_str() {
            "python" => commands.push("npm run test:backend".to_string()),
            "javascript" | "typescript" => commands.push("npm test".to_string()),
            _ => {}
        }
    }

    if commands.is_empty() {
        if index.project_type.as_deref() == Some("monorepo") {
            commands.push("npm test".to_string());
            commands.push("npm run test:backend".to_string());
        } else {
            commands.push("npm test".to_string());
        }
    }
    dedupe(commands)
}

/// Validate allowed/forbidden path rules.
///
/// Errors: empty allowed list, absolute allowed entries, and any allowed
/// path equal to or nested under a forbidden base. An empty forbidden list
/// is only a warning.
#[must_use]
pub fn validate_scope_rules(
    allowed_paths: &[String],
    forbidden_paths: &[String],
) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if allowed_paths.is_empty() {
        errors.push("allowed_paths must not be empty".to_string());
    }

    for path in allowed_paths {
        if normalize_path(path).starts_with('/') {
            errors.push(format!("allowed_paths must be relative: {path}"));
        }
    }

    let forbidden_bases: Vec<String> = forbidden_paths.iter().map(|p| strip_glob(p)).collect();
    for allowed in allowed_paths {
        let allowed_base = strip_glob(allowed);
        for forbidden_base in &forbidden_bases {
            if forbidden_base.is_empty() {
                continue;
            }
            if allowed_base == *forbidden_base
                || allowed_base.starts_with(&format!("{forbidden_base}/"))
            {
                errors.push(format!(
                    "allowed_paths overlaps forbidden_paths: {allowed} -> {forbidden_base}"
                ));
            }
        }
    }

    if forbidden_paths.is_empty() {
        warnings.push("forbidden_paths is empty".to_string());
    }

    (errors, warnings)
}

/// Full contract validation: required fields, intent enum, and path rules.
///
/// `test_plan` may be empty for non-code tasks.
#[must_use]
pub fn validate_scope_contract(contract: &ScopeContract) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();

    let require = |value: &str, field: &str, errors: &mut Vec<String>| {
        if value.trim().is_empty() {
            errors.push(format!("Missing required field: {field}"));
        }
    };
    if contract.intent.is_none() {
        errors.push("Missing required field: intent".to_string());
    }
    require(&contract.outcome, "outcome", &mut errors);
    require(&contract.where_, "where", &mut errors);
    require(&contract.why, "why", &mut errors);
    if contract.acceptance.is_empty() {
        errors.push("Missing required field: acceptance".to_string());
    }

    let is_code = contract.task_type.map_or(true, |t| t.is_code());
    if is_code && contract.test_plan.is_empty() {
        errors.push("Missing required field: test_plan".to_string());
    }

    let (rule_errors, warnings) =
        validate_scope_rules(&contract.allowed_paths, &contract.forbidden_paths);
    errors.extend(rule_errors);

    (errors, warnings)
}

/// Derive a full default scope contract from the project index.
#[must_use]
pub fn derive_scope_contract(index: &ProjectIndex, task_type: TaskType) -> ScopeContract {
    ScopeContract {
        intent: Some(ScopeIntent::Change),
        allowed_paths: derive_allowed_paths(index),
        forbidden_paths: derive_forbidden_paths(index),
        test_plan: if task_type.is_code() {
            derive_test_plan(index)
        } else {
            Vec::new()
        },
        task_type: Some(task_type),
        ..Default::default()
    }
}

/// Compiled matcher over the contract's allowed/forbidden globs.
pub struct ScopeMatcher {
    allowed: GlobSet,
    forbidden: GlobSet,
}

impl ScopeMatcher {
    /// Compile the contract's globs; invalid patterns are skipped.
    #[must_use]
    pub fn new(contract: &ScopeContract) -> Self {
        let build = |patterns: &[String]| {
            let mut builder = GlobSetBuilder::new();
            for pattern in patterns {
                if let Ok(glob) = Glob::new(&normalize_path(pattern)) {
                    builder.add(glob);
                }
            }
            builder.build().unwrap_or_else(|_| GlobSet::empty())
        };
        Self {
            allowed: build(&contract.allowed_paths),
            forbidden: build(&contract.forbidden_paths),
        }
    }

    /// A path is in scope when it matches an allowed glob and no forbidden
    /// glob.
    #[must_use]
    pub fn path_in_scope(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        self.allowed.is_match(&normalized) && !self.forbidden.is_match(&normalized)
    }
}

static WILDCARD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*?\[]").expect("valid regex"));

/// Extract the concrete root directory of a path pattern, if any.
fn extract_root(path: &str) -> Option<String> {
    let mut cleaned = normalize_path(path);
    cleaned = cleaned.trim_start_matches('/').to_string();
    if cleaned.is_empty() {
        return None;
    }
    if let Some(stripped) = cleaned.strip_suffix("/**") {
        cleaned = stripped.to_string();
    }
    if let Some(m) = WILDCARD.find(&cleaned) {
        cleaned = cleaned[..m.start()].to_string();
    }
    cleaned = cleaned.trim_end_matches('/').to_string();
    if cleaned.is_empty() {
        return None;
    }

    // A file path contributes its parent directory.
    let candidate = Utf8Path::new(&cleaned);
    let root = if candidate.extension().is_some() {
        candidate.parent().map(|p| p.to_string()).unwrap_or_default()
    } else {
        cleaned
    };
    if root.is_empty() || root == "." {
        None
    } else {
        Some(root)
    }
}

/// Resolve allowed write directories from the scope contract.
///
/// The spec dir and data dir are always writable; beyond that, every usable
/// root from the allowed globs is included. Returns `(dirs, error)` where a
/// non-`None` error means enforcement must fail closed.
#[must_use]
pub fn resolve_scope_write_dirs(
    contract: Option<&ScopeContract>,
    spec_dir: &Utf8Path,
    project_dir: &Utf8Path,
) -> (Vec<String>, Option<String>) {
    let Some(contract) = contract else {
        return (Vec::new(), Some("scope_contract.json not found".to_string()));
    };
    if contract.allowed_paths.is_empty() {
        return (
            Vec::new(),
            Some("scope_contract.json missing allowed_paths".to_string()),
        );
    }

    let mut roots = Vec::new();
    for entry in &contract.allowed_paths {
        if let Some(root) = extract_root(entry) {
            roots.push(project_dir.join(root));
        }
    }
    if roots.is_empty() {
        return (
            Vec::new(),
            Some("allowed_paths produced no usable roots".to_string()),
        );
    }

    let mut dirs = vec![spec_dir.to_path_buf(), paths::data_dir(project_dir)];
    dirs.extend(roots);

    let mut seen = std::collections::HashSet::new();
    let deduped: Vec<String> = dirs
        .into_iter()
        .map(|p| p.to_string())
        .filter(|p| seen.insert(p.clone()))
        .collect();
    (deduped, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ServiceInfo;
    use camino::Utf8PathBuf;

    fn index_with_services(services: &[(&str, &str, &str)]) -> ProjectIndex {
        let mut index = ProjectIndex::default();
        for (name, path, language) in services {
            index.services.insert(
                (*name).to_string(),
                ServiceInfo {
                    path: (*path).to_string(),
                    language: (*language).to_string(),
                    key_directories: Default::default(),
                },
            );
        }
        index
    }

    #[test]
    fn test_derive_allowed_from_services() {
        let index = index_with_services(&[("api", "apps/api", "python")]);
        let allowed = derive_allowed_paths(&index);
        assert_eq!(allowed, vec!["apps/api/**".to_string()]);
    }

    #[test]
    fn test_derive_allowed_falls_back_to_top_level() {
        let mut index = ProjectIndex::default();
        index.top_level_dirs = vec!["lib".to_string(), ".hidden".to_string()];
        let allowed = derive_allowed_paths(&index);
        assert_eq!(allowed, vec!["lib/**".to_string()]);
    }

    #[test]
    fn test_derive_allowed_default_src() {
        let allowed = derive_allowed_paths(&ProjectIndex::default());
        assert_eq!(allowed, vec!["src/**".to_string()]);
    }

    #[test]
    fn test_derive_forbidden_includes_docs() {
        let mut index = ProjectIndex::default();
        index.top_level_dirs = vec!["docs".to_string(), "src".to_string()];
        let forbidden = derive_forbidden_paths(&index);
        assert!(forbidden.contains(&"docs/**".to_string()));
        assert!(forbidden.contains(&".git/**".to_string()));
        assert!(!forbidden.contains(&"src/**".to_string()));
    }

    #[test]
    fn test_validate_rules_empty_allowed_is_error() {
        let (errors, _) = validate_scope_rules(&[], &[]);
        assert!(errors.iter().any(|e| e.contains("must not be empty")));
    }

    #[test]
    fn test_validate_rules_absolute_allowed_is_error() {
        let (errors, _) = validate_scope_rules(&["/etc/**".to_string()], &[]);
        assert!(errors.iter().any(|e| e.contains("must be relative")));
    }

    #[test]
    fn test_validate_rules_overlap_is_error() {
        let allowed = vec!["node_modules/pkg/**".to_string()];
        let forbidden = vec!["node_modules/**".to_string()];
        let (errors, _) = validate_scope_rules(&allowed, &forbidden);
        assert!(errors.iter().any(|e| e.contains("overlaps")));
    }

    #[test]
    fn test_validate_rules_equal_base_is_error() {
        let allowed = vec!["dist/**".to_string()];
        let forbidden = vec!["dist/**".to_string()];
        let (errors, _) = validate_scope_rules(&allowed, &forbidden);
        assert!(errors.iter().any(|e| e.contains("overlaps")));
    }

    #[test]
    fn test_validate_rules_disjoint_paths_ok() {
        let allowed = vec!["src/**".to_string()];
        let forbidden = vec!["dist/**".to_string()];
        let (errors, warnings) = validate_scope_rules(&allowed, &forbidden);
        assert!(errors.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_validate_rules_empty_forbidden_warns() {
        let (errors, warnings) = validate_scope_rules(&["src/**".to_string()], &[]);
        assert!(errors.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_validate_contract_noncode_skips_test_plan() {
        let contract = ScopeContract {
            intent: Some(ScopeIntent::Investigate),
            outcome: "report".to_string(),
            where_: "docs".to_string(),
            why: "audit".to_string(),
            acceptance: vec!["Report delivered".to_string()],
            allowed_paths: vec!["docs-out/**".to_string()],
            forbidden_paths: vec![".git/**".to_string()],
            task_type: Some(TaskType::Analysis),
            ..Default::default()
        };
        let (errors, _) = validate_scope_contract(&contract);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn test_validate_contract_code_requires_test_plan() {
        let contract = ScopeContract {
            intent: Some(ScopeIntent::Change),
            outcome: "feature".to_string(),
            where_: "src".to_string(),
            why: "requested".to_string(),
            acceptance: vec!["Works".to_string()],
            allowed_paths: vec!["src/**".to_string()],
            forbidden_paths: vec![".git/**".to_string()],
            task_type: Some(TaskType::Code),
            ..Default::default()
        };
        let (errors, _) = validate_scope_contract(&contract);
        assert!(errors.iter().any(|e| e.contains("test_plan")));
    }

    #[test]
    fn test_scope_matcher() {
        let contract = ScopeContract {
            allowed_paths: vec!["src/**".to_string()],
            forbidden_paths: vec!["src/generated/**".to_string()],
            ..Default::default()
        };
        let matcher = ScopeMatcher::new(&contract);
        assert!(matcher.path_in_scope("src/main.rs"));
        assert!(!matcher.path_in_scope("src/generated/schema.rs"));
        assert!(!matcher.path_in_scope("docs/readme.md"));
    }

    #[test]
    fn test_extract_root() {
        assert_eq!(extract_root("src/**"), Some("src".to_string()));
        assert_eq!(extract_root("apps/api/"), Some("apps/api".to_string()));
        assert_eq!(extract_root("src/*.rs"), Some("src".to_string()));
        assert_eq!(
            extract_root("src/main.rs"),
            Some("src".to_string()),
            "file paths contribute their directory"
        );
        assert_eq!(extract_root("**"), None);
        assert_eq!(extract_root(""), None);
    }

    #[test]
    fn test_resolve_write_dirs() {
        let spec_dir = Utf8PathBuf::from("/proj/.auto-iflow/specs/001-x");
        let project = Utf8PathBuf::from("/proj");
        let contract = ScopeContract {
            allowed_paths: vec!["src/**".to_string(), "apps/api/**".to_string()],
            ..Default::default()
        };

        let (dirs, error) = resolve_scope_write_dirs(Some(&contract), &spec_dir, &project);
        assert!(error.is_none());
        assert!(dirs.contains(&"/proj/src".to_string()));
        assert!(dirs.contains(&"/proj/apps/api".to_string()));
        assert!(dirs.contains(&spec_dir.to_string()));
    }

    #[test]
    fn test_resolve_write_dirs_missing_contract_fails_closed() {
        let spec_dir = Utf8PathBuf::from("/proj/.auto-iflow/specs/001-x");
        let project = Utf8PathBuf::from("/proj");
        let (dirs, error) = resolve_scope_write_dirs(None, &spec_dir, &project);
        assert!(dirs.is_empty());
        assert!(error.unwrap().contains("not found"));
    }
}
