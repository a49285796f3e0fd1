//! Per-target diff probe (§4.3): produces a [`TargetDiff`] for one target,
//! trying server-side diff first, then the mirror planner, then falling
//! back to treating every source entry as changed.

use crate::mirror;
use common::types::{ChangeKind, DiffEntry, RemoteFileStatus, ResolvedTarget, TargetDiff};
use std::collections::HashMap;
use std::path::Path;
use transport::{GetDiffOptions, Uploader};

/// Whether the profile's `from` section gives us a local directory to
/// compare against (i.e. `from.type: file`, or a checked-out git worktree).
/// Non-`file` source modes fall back to the raw source diff with no
/// remote probe at all.
pub struct ProbeContext<'a> {
    pub local_base_dir: Option<&'a Path>,
    pub source_paths: Vec<String>,
    pub source_change_kinds: HashMap<String, ChangeKind>,
    pub concurrency: usize,
}

pub async fn probe_target(
    target_index: usize,
    target: &ResolvedTarget,
    ctx: &ProbeContext<'_>,
) -> TargetDiff {
    let Some(local_base_dir) = ctx.local_base_dir else {
        return source_only_diff(target_index, ctx);
    };

    let mut uploader = transport::make_uploader(target);
    if let Err(e) = uploader.connect().await {
        return TargetDiff {
            target_index,
            error: Some(e.to_string()),
            ..Default::default()
        };
    }

    let result = probe_connected(target_index, target, uploader.as_ref(), local_base_dir, ctx).await;
    uploader.disconnect().await;
    match result {
        Ok(diff) => diff,
        Err(e) => TargetDiff {
            target_index,
            error: Some(e.to_string()),
            ..Default::default()
        },
    }
}

fn source_only_diff(target_index: usize, ctx: &ProbeContext<'_>) -> TargetDiff {
    let mut added = 0;
    let mut modified = 0;
    let mut deleted = 0;
    for kind in ctx.source_change_kinds.values() {
        match kind {
            ChangeKind::Added => added += 1,
            ChangeKind::Modified => modified += 1,
            ChangeKind::Deleted => deleted += 1,
            _ => {}
        }
    }
    TargetDiff {
        target_index,
        changed_paths: ctx.source_paths.clone(),
        added,
        modified,
        deleted,
        total: ctx.source_paths.len(),
        ..Default::default()
    }
}

async fn probe_connected(
    target_index: usize,
    target: &ResolvedTarget,
    uploader: &dyn Uploader,
    local_base_dir: &Path,
    ctx: &ProbeContext<'_>,
) -> anyhow::Result<TargetDiff> {
    let is_mirror = matches!(target.sync_mode, common::types::SyncMode::Mirror);
    let base_dir = mirror::detect_base_dir(&ctx.source_paths);
    let remote_dir = if base_dir.is_empty() {
        String::new()
    } else {
        base_dir.clone()
    };

    if let Some(diff_capable) = uploader.as_diff_capable() {
        let file_paths: Vec<String> = if is_mirror {
            Vec::new()
        } else {
            ctx.source_paths
                .iter()
                .map(|p| strip_base(p, &base_dir))
                .collect()
        };
        let ignore_patterns: Vec<String> = target
            .ignore
            .excludes
            .iter()
            .map(|p| p.original.clone())
            .collect();
        let scoped_local_dir = if base_dir.is_empty() {
            local_base_dir.to_path_buf()
        } else {
            local_base_dir.join(&base_dir)
        };
        let entries = diff_capable
            .get_diff(
                &scoped_local_dir,
                &file_paths,
                GetDiffOptions {
                    checksum: false,
                    ignore_patterns: &ignore_patterns,
                    remote_dir: &remote_dir,
                },
            )
            .await?;
        let reprefixed: Vec<DiffEntry> = entries
            .into_iter()
            .map(|mut e| {
                if !base_dir.is_empty() {
                    e.relative_path = format!("{base_dir}/{}", e.relative_path);
                    // NOTE: from_path (rename source) intentionally left
                    // un-reprefixed, matching the upstream tool's behavior.
                }
                e
            })
            .collect();

        let mut remote_status = HashMap::new();
        let changed: std::collections::HashSet<&str> =
            reprefixed.iter().map(|e| e.relative_path.as_str()).collect();
        for path in &ctx.source_paths {
            let has_changes = changed.contains(path.as_str());
            let exists = !reprefixed.iter().any(|e| {
                e.relative_path == *path && e.kind == ChangeKind::Added
            });
            remote_status.insert(path.clone(), RemoteFileStatus { exists, has_changes });
        }

        let added = reprefixed.iter().filter(|e| e.kind == ChangeKind::Added).count();
        let modified = reprefixed.iter().filter(|e| e.kind == ChangeKind::Modified).count();
        let deleted = reprefixed.iter().filter(|e| e.kind == ChangeKind::Deleted).count();
        let changed_paths: Vec<String> = reprefixed
            .iter()
            .filter(|e| e.kind != ChangeKind::Deleted)
            .map(|e| e.relative_path.clone())
            .collect();
        let delete_list = if is_mirror {
            Some(
                reprefixed
                    .iter()
                    .filter(|e| e.kind == ChangeKind::Deleted)
                    .map(|e| e.relative_path.clone())
                    .collect(),
            )
        } else {
            None
        };
        return Ok(TargetDiff {
            target_index,
            rsync_entries: Some(reprefixed),
            changed_paths,
            added,
            modified,
            deleted,
            total: added + modified + deleted,
            delete_list,
            remote_status_by_file: Some(remote_status),
            error: None,
        });
    }

    if is_mirror {
        if let Some(list_capable) = uploader.as_list_capable() {
            let remote_files = list_capable.list_remote_files(&target.dest).await?;
            let plan = mirror::plan(&remote_files, &ctx.source_paths, &target.ignore);
            let delete_list: Vec<String> = plan
                .iter()
                .filter(|e| e.action == mirror::PlanAction::Delete)
                .map(|e| e.relative_path.clone())
                .collect();
            let remote_status =
                probe_remote_status(uploader, &ctx.source_paths, ctx.concurrency).await;
            return Ok(TargetDiff {
                target_index,
                changed_paths: ctx.source_paths.clone(),
                added: ctx.source_paths.len(),
                modified: 0,
                deleted: delete_list.len(),
                total: ctx.source_paths.len() + delete_list.len(),
                delete_list: Some(delete_list),
                remote_status_by_file: Some(remote_status),
                error: None,
            });
        }
    }

    // no remote comparison is possible: treat all source entries as changed.
    let remote_status = probe_remote_status(uploader, &ctx.source_paths, ctx.concurrency).await;
    Ok(TargetDiff {
        target_index,
        changed_paths: ctx.source_paths.clone(),
        added: ctx.source_paths.len(),
        modified: 0,
        deleted: 0,
        total: ctx.source_paths.len(),
        delete_list: None,
        remote_status_by_file: Some(remote_status),
        error: None,
    })
}

async fn probe_remote_status(
    uploader: &dyn Uploader,
    source_paths: &[String],
    concurrency: usize,
) -> HashMap<String, RemoteFileStatus> {
    // the uploader is borrowed, not owned, so the fan-out stays on the
    // current task (can't spawn borrowed futures) but is still bounded.
    let limiter = throttle::Limiter::new(concurrency);
    let futures = source_paths.iter().map(|path| async {
        let _permit = limiter.acquire().await;
        let status = match uploader.read_file(path).await {
            Ok(Some(_)) => RemoteFileStatus { exists: true, has_changes: true },
            _ => RemoteFileStatus { exists: false, has_changes: true },
        };
        (path.clone(), status)
    });
    futures::future::join_all(futures).await.into_iter().collect()
}

fn strip_base(path: &str, base_dir: &str) -> String {
    if base_dir.is_empty() {
        return path.to_string();
    }
    path.strip_prefix(base_dir)
        .and_then(|s| s.strip_prefix('/'))
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_base_removes_shared_prefix() {
        assert_eq!(strip_base("app/src/a.rs", "app/src"), "a.rs");
        assert_eq!(strip_base("a.rs", ""), "a.rs");
    }
}
