//! Reconciliation of the legacy and shared snapshots into one project list.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::Project;

/// Merge both snapshots into a deduplicated list, newest first.
///
/// An id present in `shared` always wins over the same id in `legacy`. Within
/// a single snapshot the first occurrence of an id is kept. Never fails:
/// records with unreadable fields are kept and sort last.
pub fn merge(legacy: &[Project], shared: &[Project]) -> Vec<Project> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(legacy.len() + shared.len());
    let mut merged = Vec::with_capacity(legacy.len() + shared.len());

    for project in shared.iter().chain(legacy.iter()) {
        if seen.insert(project.id.as_str()) {
            merged.push(project.clone());
        }
    }

    sort_newest_first(&mut merged);
    merged
}

/// Order by `createdAt` descending. Unparseable timestamps go last; ties break on id.
pub fn sort_newest_first(projects: &mut [Project]) {
    projects.sort_by(compare_newest_first);
}

fn compare_newest_first(a: &Project, b: &Project) -> Ordering {
    match (a.created_at_millis(), b.created_at_millis()) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    }
}
