//! Mirror base-directory detection (§4.4) and the mirror planner (§4.5),
//! used only when a target's `sync_mode` is `mirror` and no server-side
//! diff is available.

use common::filter::{FilterResult, FilterSettings};
use std::collections::BTreeSet;

/// The longest directory prefix shared by every upload path, split on `/`.
/// Empty when the set has no common leading segment.
pub fn detect_base_dir(relative_paths: &[String]) -> String {
    if relative_paths.is_empty() {
        return String::new();
    }
    let mut segments: Option<Vec<&str>> = None;
    for path in relative_paths {
        let parts: Vec<&str> = path.split('/').collect();
        // only directory segments participate; the file's own name never does.
        let dir_parts = &parts[..parts.len().saturating_sub(1)];
        segments = Some(match segments {
            None => dir_parts.to_vec(),
            Some(prev) => {
                let common_len = prev
                    .iter()
                    .zip(dir_parts.iter())
                    .take_while(|(a, b)| a == b)
                    .count();
                prev[..common_len].to_vec()
            }
        });
        if segments.as_ref().is_some_and(Vec::is_empty) {
            return String::new();
        }
    }
    segments.unwrap_or_default().join("/")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub relative_path: String,
    pub action: PlanAction,
}

/// A remote path is a deletion candidate iff it is not in the source set
/// and does not match any ignore pattern. The planner never deletes
/// anything itself, it only plans.
pub fn plan(
    remote_files: &[String],
    source_paths: &[String],
    ignore: &FilterSettings,
) -> Vec<PlanEntry> {
    let source_set: BTreeSet<&str> = source_paths.iter().map(String::as_str).collect();
    let mut entries: Vec<PlanEntry> = source_paths
        .iter()
        .map(|path| PlanEntry {
            relative_path: path.clone(),
            // the planner doesn't itself know create vs update; that
            // distinction comes from the per-file remote-status probe.
            action: PlanAction::Update,
        })
        .collect();
    for remote_path in remote_files {
        if source_set.contains(remote_path.as_str()) {
            continue;
        }
        let is_ignored = matches!(
            ignore.should_include(std::path::Path::new(remote_path), false),
            FilterResult::ExcludedByPattern(_)
        );
        if is_ignored {
            continue;
        }
        entries.push(PlanEntry {
            relative_path: remote_path.clone(),
            action: PlanAction::Delete,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_base_dir() {
        let paths = vec!["app/src/a.rs".to_string(), "app/src/b.rs".to_string()];
        assert_eq!(detect_base_dir(&paths), "app/src");
    }

    #[test]
    fn no_common_base_is_empty() {
        let paths = vec!["a.rs".to_string(), "b/c.rs".to_string()];
        assert_eq!(detect_base_dir(&paths), "");
    }

    #[test]
    fn single_path_base_is_its_directory() {
        let paths = vec!["app/src/a.rs".to_string()];
        assert_eq!(detect_base_dir(&paths), "app/src");
    }

    #[test]
    fn mirror_invariant_deletions_equal_remote_minus_source_minus_ignore() {
        let remote = vec!["a".to_string(), "b".to_string(), "old".to_string(), "debug.log".to_string()];
        let source = vec!["a".to_string(), "b".to_string()];
        let mut ignore = FilterSettings::new();
        ignore.add_exclude("*.log").unwrap();
        let entries = plan(&remote, &source, &ignore);
        let deletes: Vec<&str> = entries
            .iter()
            .filter(|e| e.action == PlanAction::Delete)
            .map(|e| e.relative_path.as_str())
            .collect();
        assert_eq!(deletes, vec!["old"]);
    }
}
