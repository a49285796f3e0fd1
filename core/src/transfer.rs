//! Transfer coordinator (§4.6): sequential or parallel per-target
//! orchestration, bounded per-file concurrency, retry with exponential
//! backoff, and a `progress` event stream back to the review UI.

use crate::cancel::AbortHandle;
use crate::message::{ProgressStatus, ServerMessage};
use common::types::{
    FileResult, FileStatus, ResolvedTarget, TargetDiff, TargetResult, TargetStatus, UploadFile,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use transport::Uploader;

const BACKOFF_BASE: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

fn backoff_for(attempt: u32) -> Duration {
    let scaled = BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    scaled.min(BACKOFF_CAP)
}

pub struct TransferPlan<'a> {
    pub targets: &'a [ResolvedTarget],
    pub diffs: &'a [Option<TargetDiff>],
    pub source_files: &'a [UploadFile],
    pub parallel_targets: bool,
    pub concurrency: usize,
    pub abort: AbortHandle,
}

pub async fn run_transfer(
    plan: TransferPlan<'_>,
    events: UnboundedSender<ServerMessage>,
) -> Vec<TargetResult> {
    if plan.parallel_targets {
        run_parallel(plan, events).await
    } else {
        run_sequential(plan, events).await
    }
}

async fn run_sequential(
    plan: TransferPlan<'_>,
    events: UnboundedSender<ServerMessage>,
) -> Vec<TargetResult> {
    let mut results = Vec::with_capacity(plan.targets.len());
    for (index, target) in plan.targets.iter().enumerate() {
        let diff = plan.diffs.get(index).and_then(|d| d.as_ref());
        let result = run_one_target(
            target,
            diff,
            plan.source_files,
            plan.concurrency,
            &plan.abort,
            &events,
        )
        .await;
        results.push(result);
    }
    results
}

async fn run_parallel(
    plan: TransferPlan<'_>,
    events: UnboundedSender<ServerMessage>,
) -> Vec<TargetResult> {
    let source_files = plan.source_files;
    let abort = plan.abort.clone();
    let futures = plan.targets.iter().enumerate().map(|(index, target)| {
        let diff = plan.diffs.get(index).and_then(|d| d.as_ref());
        let events = events.clone();
        let abort = abort.clone();
        run_one_target(target, diff, source_files, plan.concurrency, &abort, &events)
    });
    futures::future::join_all(futures).await
}

fn files_for_target(diff: Option<&TargetDiff>, source_files: &[UploadFile]) -> Vec<UploadFile> {
    let Some(diff) = diff else {
        return source_files.to_vec();
    };
    let changed: std::collections::HashSet<&str> =
        diff.changed_paths.iter().map(String::as_str).collect();
    let mut files: Vec<UploadFile> = source_files
        .iter()
        .filter(|f| changed.contains(f.relative_path.as_str()))
        .cloned()
        .collect();
    if files.is_empty() && diff.changed_paths.is_empty() && diff.delete_list.is_none() {
        // no cached diff narrowed the set: fall back to the raw source set.
        files = source_files.to_vec();
    }
    files
}

async fn run_one_target(
    target: &ResolvedTarget,
    diff: Option<&TargetDiff>,
    source_files: &[UploadFile],
    concurrency: usize,
    abort: &AbortHandle,
    events: &UnboundedSender<ServerMessage>,
) -> TargetResult {
    let mut result = TargetResult::new(target.host.clone());
    result.status = TargetStatus::Connecting;

    let mut uploader = transport::make_uploader(target);
    if let Err(e) = uploader.connect().await {
        result.status = TargetStatus::Failed;
        result.error = Some(e.to_string());
        let _ = events.send(ServerMessage::Error {
            message: format!("{}: {e}", target.host),
        });
        return result;
    }

    result.status = TargetStatus::Uploading;
    let mut files = files_for_target(diff, source_files);
    if matches!(target.sync_mode, common::types::SyncMode::Mirror) {
        if let Some(delete_list) = diff.and_then(|d| d.delete_list.as_ref()) {
            for path in delete_list {
                files.push(UploadFile {
                    relative_path: path.clone(),
                    bytes: None,
                    source_path: None,
                    is_directory: false,
                });
            }
        }
    }
    let delete_set: std::collections::HashSet<&str> = diff
        .and_then(|d| d.delete_list.as_ref())
        .map(|list| list.iter().map(String::as_str).collect())
        .unwrap_or_default();

    let total_files = files.len();
    let limiter = throttle::Limiter::new(concurrency);
    let uploader_ref: &dyn Uploader = uploader.as_ref();

    // the uploader is borrowed, not owned, so the fan-out stays on the
    // current task (can't spawn borrowed futures) but is still bounded,
    // same shape as diff.rs's probe_remote_status.
    let file_futures = files.into_iter().enumerate().map(|(file_index, file)| {
        let limiter = &limiter;
        let is_delete = delete_set.contains(file.relative_path.as_str());
        async move {
            if abort.is_tripped() {
                return None;
            }
            let _permit = limiter.acquire().await;
            if abort.is_tripped() {
                return None;
            }

            let _ = events.send(ServerMessage::Progress {
                host: target.host.clone(),
                file_index,
                total_files,
                current_file: file.relative_path.clone(),
                bytes_transferred: 0,
                file_size: 0,
                status: ProgressStatus::Uploading,
            });

            let started = Instant::now();
            let outcome = attempt_with_retry(
                uploader_ref,
                &file,
                is_delete,
                target.retry,
                target.timeout_secs,
                abort,
            )
            .await;
            let duration = started.elapsed();

            let (status, error, progress_status) = match outcome {
                Ok(()) => (FileStatus::Completed, None, ProgressStatus::Completed),
                Err(AttemptError::Cancelled) => (
                    FileStatus::Skipped,
                    Some("cancelled".to_string()),
                    ProgressStatus::Skipped,
                ),
                Err(AttemptError::Failed(e)) => {
                    (FileStatus::Failed, Some(e.to_string()), ProgressStatus::Failed)
                }
            };
            let size = file.bytes.as_ref().map(|b| b.len() as u64).unwrap_or(0);
            let _ = events.send(ServerMessage::Progress {
                host: target.host.clone(),
                file_index,
                total_files,
                current_file: file.relative_path.clone(),
                bytes_transferred: size,
                file_size: size,
                status: progress_status,
            });
            Some(FileResult {
                relative_path: file.relative_path.clone(),
                status,
                size,
                duration,
                error,
            })
        }
    });

    let file_results: Vec<FileResult> = futures::future::join_all(file_futures)
        .await
        .into_iter()
        .flatten()
        .collect();

    result.total_bytes = file_results.iter().map(|f| f.size).sum();
    result.total_duration = file_results.iter().map(|f| f.duration).sum();
    let had_failure = file_results.iter().any(|f| f.status == FileStatus::Failed);
    result.files = file_results;
    result.status = if had_failure {
        TargetStatus::Failed
    } else {
        TargetStatus::Completed
    };

    uploader.disconnect().await;
    result
}

enum AttemptError {
    Cancelled,
    Failed(anyhow::Error),
}

async fn attempt_with_retry(
    uploader: &dyn Uploader,
    file: &UploadFile,
    is_delete: bool,
    retry: u32,
    timeout_secs: u64,
    abort: &AbortHandle,
) -> Result<(), AttemptError> {
    let mut attempt = 0u32;
    loop {
        if abort.is_tripped() {
            return Err(AttemptError::Cancelled);
        }
        let call = async {
            if is_delete {
                uploader.delete_file(&file.relative_path).await
            } else {
                uploader.transfer_file(file).await
            }
        };
        let timed = tokio::time::timeout(Duration::from_secs(timeout_secs), call).await;
        let outcome = match timed {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::anyhow!(e)),
            Err(_) => Err(anyhow::anyhow!("operation timed out after {timeout_secs}s")),
        };
        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= retry => return Err(AttemptError::Failed(e)),
            Err(_) => {
                let backoff = backoff_for(attempt);
                if abort.guard(tokio::time::sleep(backoff)).await.is_err() {
                    return Err(AttemptError::Cancelled);
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        assert_eq!(backoff_for(0), Duration::from_millis(100));
        assert_eq!(backoff_for(1), Duration::from_millis(200));
        assert_eq!(backoff_for(2), Duration::from_millis(400));
        assert_eq!(backoff_for(10), BACKOFF_CAP);
    }
}
