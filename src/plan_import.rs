//! Markdown plan import: parse, normalize, schedule.
//!
//! Turns a human-written Markdown plan into normalized tasks plus a wave
//! schedule that respects declared dependencies under a concurrency bound.
//! Used by the `plan-import` CLI entry point.

use serde::Serialize;

use crate::error::{IflowError, Result};

/// A task as found in the Markdown source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTask {
    pub title: String,
    pub description: String,
    pub depends_on: Vec<String>,
}

/// Normalized task with a stable slug id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImportedTask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub depends_on: Vec<String>,
}

/// Execution schedule: waves of task ids that may run concurrently.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Schedule {
    pub waves: Vec<Vec<String>>,
    pub max_concurrency: usize,
}

/// Full output of a plan import.
#[derive(Debug, Clone, Serialize)]
pub struct PlanImport {
    pub tasks: Vec<ImportedTask>,
    pub schedule: Schedule,
}

/// Parse a Markdown plan.
///
/// Each `##` heading opens a task; its body is the description. Checklist
/// items (`- [ ]` / `- [x]`) outside any heading are tasks of their own.
/// A body line `depends on: a, b` declares dependencies by title or id.
#[must_use]
pub fn parse_plan_markdown(content: &str) -> Vec<ParsedTask> {
    let mut tasks: Vec<ParsedTask> = Vec::new();
    let mut current: Option<ParsedTask> = None;

    for line in content.lines() {
        let trimmed = line.trim();

        if let Some(heading) = trimmed.strip_prefix("## ") {
            if let Some(task) = current.take() {
                tasks.push(task);
            }
            current = Some(ParsedTask {
                title: heading.trim().to_string(),
                description: String::new(),
                depends_on: Vec::new(),
            });
            continue;
        }
        // Top-level headings separate plan sections, not tasks.
        if trimmed.starts_with("# ") {
            if let Some(task) = current.take() {
                tasks.push(task);
            }
            continue;
        }

        let checklist_item = trimmed
            .strip_prefix("- [ ] ")
            .or_else(|| trimmed.strip_prefix("- [x] "));
        if let Some(item) = checklist_item {
            if current.is_none() {
                tasks.push(ParsedTask {
                    title: item.trim().to_string(),
                    description: String::new(),
                    depends_on: Vec::new(),
                });
                continue;
            }
        }

        if let Some(task) = current.as_mut() {
            let lowered = trimmed.to_lowercase();
            if let Some(deps) = lowered
                .strip_prefix("- depends on:")
                .or_else(|| lowered.strip_prefix("depends on:"))
            {
                task.depends_on.extend(
                    deps.split(',')
                        .map(|d| d.trim().to_string())
                        .filter(|d| !d.is_empty()),
                );
            } else if !trimmed.is_empty() {
                if !task.description.is_empty() {
                    task.description.push('\n');
                }
                task.description.push_str(trimmed);
            }
        }
    }
    if let Some(task) = current.take() {
        tasks.push(task);
    }
    tasks
}

fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for word in title.split_whitespace() {
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
    }
    if slug.is_empty() {
        "task".to_string()
    } else {
        slug
    }
}

/// Normalize parsed tasks: slug ids (deduplicated with numeric suffixes)
/// and dependency references resolved to ids.
#[must_use]
pub fn normalize_tasks(parsed: Vec<ParsedTask>) -> Vec<ImportedTask> {
    let mut used_ids = std::collections::HashSet::new();
    let mut tasks: Vec<ImportedTask> = Vec::new();

    for task in &parsed {
        let base = slugify(&task.title);
        let mut id = base.clone();
        let mut counter = 2;
        while !used_ids.insert(id.clone()) {
            id = format!("{base}-{counter}");
            counter += 1;
        }
        tasks.push(ImportedTask {
            id,
            title: task.title.clone(),
            description: task.description.clone(),
            depends_on: Vec::new(),
        });
    }

    // Resolve dependency references: exact id, else slug of the referenced
    // title. Unresolvable references are dropped with a warning.
    let known: std::collections::HashSet<String> =
        tasks.iter().map(|t| t.id.clone()).collect();
    for (task, source) in tasks.iter_mut().zip(parsed.iter()) {
        for dep in &source.depends_on {
            let resolved = if known.contains(dep) {
                Some(dep.clone())
            } else {
                let slug = slugify(dep);
                known.contains(&slug).then_some(slug)
            };
            match resolved {
                Some(id) if id != task.id => task.depends_on.push(id),
                Some(_) => {}
                None => {
                    tracing::warn!(task = %task.id, dep = %dep, "Dropping unresolvable dependency");
                }
            }
        }
    }
    tasks
}

/// Schedule tasks into dependency-respecting waves.
///
/// Each wave holds at most `max_concurrency` tasks whose dependencies are
/// all satisfied by earlier waves. A dependency cycle is an error.
pub fn schedule_tasks(tasks: &[ImportedTask], max_concurrency: usize) -> Result<Schedule> {
    let max_concurrency = max_concurrency.max(1);
    let mut remaining: Vec<&ImportedTask> = tasks.iter().collect();
    let mut done: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut waves: Vec<Vec<String>> = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<String> = remaining
            .iter()
            .filter(|t| t.depends_on.iter().all(|d| done.contains(d)))
            .take(max_concurrency)
            .map(|t| t.id.clone())
            .collect();

        if ready.is_empty() {
            let stuck: Vec<String> = remaining.iter().map(|t| t.id.clone()).collect();
            return Err(IflowError::validation(
                "plan_import",
                vec![format!("dependency cycle among tasks: {}", stuck.join(", "))],
            ));
        }

        for id in &ready {
            done.insert(id.clone());
        }
        remaining.retain(|t| !done.contains(&t.id));
        waves.push(ready);
    }

    Ok(Schedule {
        waves,
        max_concurrency,
    })
}

/// Parse, normalize, and schedule a Markdown plan.
pub fn import_plan(content: &str, max_concurrency: usize) -> Result<PlanImport> {
    let tasks = normalize_tasks(parse_plan_markdown(content));
    let schedule = schedule_tasks(&tasks, max_concurrency)?;
    Ok(PlanImport { tasks, schedule })
}
