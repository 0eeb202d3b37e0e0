//! Spec-number allocation stays monotonic and unique under concurrency.

mod test_support;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use auto_iflow::{paths, workspace};
use tempfile::TempDir;
use test_support::utf8_dir;

#[test]
fn test_two_workers_allocate_distinct_numbers() {
    let dir = TempDir::new().unwrap();
    let project = Arc::new(utf8_dir(&dir));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let project = project.clone();
        handles.push(thread::spawn(move || {
            workspace::create_spec_dir(&project).unwrap()
        }));
    }
    let created: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    let names: HashSet<String> = created
        .iter()
        .map(|p| p.file_name().unwrap().to_string())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains("001-pending"));
    assert!(names.contains("002-pending"));

    // Exactly the two directories exist; no third appeared.
    let specs_dir = paths::specs_dir(&project);
    let dir_count = std::fs::read_dir(&specs_dir)
        .unwrap()
        .flatten()
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.ends_with("-pending"))
                .unwrap_or(false)
        })
        .count();
    assert_eq!(dir_count, 2);
}

#[test]
fn test_many_workers_stay_monotonic() {
    let dir = TempDir::new().unwrap();
    let project = Arc::new(utf8_dir(&dir));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let project = project.clone();
        handles.push(thread::spawn(move || {
            workspace::create_spec_dir(&project).unwrap()
        }));
    }
    let mut numbers: Vec<u32> = handles
        .into_iter()
        .map(|h| {
            let path = h.join().unwrap();
            path.file_name().unwrap()[..3].parse().unwrap()
        })
        .collect();
    numbers.sort_unstable();

    assert_eq!(numbers, (1..=8).collect::<Vec<u32>>());
}

#[test]
fn test_allocation_resumes_after_existing_specs() {
    let dir = TempDir::new().unwrap();
    let project = utf8_dir(&dir);
    let specs_dir = paths::specs_dir(&project);
    std::fs::create_dir_all(specs_dir.join("041-existing-task")).unwrap();

    let created = workspace::create_spec_dir(&project).unwrap();
    assert_eq!(created.file_name().unwrap(), "042-pending");
}
