//! Orchestrates one `wharf run` invocation: load the profile, resolve the
//! source set, run the review server, and on confirmation run the transfer.
//! Kept separate from `src/bin/wharf.rs` so the flow can be exercised
//! without going through `clap`.

use common::filesource::{FileListSource, FileSource, GitSource};
use common::loader::LoadedProfile;
use common::types::ChangeKind;
use core::message::ReviewOutcome;
use core::server::ReviewSession;
use core::transfer::TransferPlan;
use std::collections::HashMap;
use std::path::PathBuf;

/// Mirrors the exit-code contract: 0 success, 1 failure, 2 user cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    AnyTargetFailed,
    Cancelled,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::AnyTargetFailed => 1,
            RunOutcome::Cancelled => 2,
        }
    }
}

pub async fn run_profile(
    config_path: &std::path::Path,
    profile_name: &str,
    yes: bool,
    port_override: Option<u16>,
) -> anyhow::Result<RunOutcome> {
    let content = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("failed to read {:?}: {e}", config_path))?;
    let loaded = common::loader::load_profile_from_str(&content, profile_name)?;
    run_loaded_profile(loaded, yes, port_override).await
}

async fn run_loaded_profile(
    mut loaded: LoadedProfile,
    yes: bool,
    port_override: Option<u16>,
) -> anyhow::Result<RunOutcome> {
    if let Some(port) = port_override {
        loaded.run.port = port;
    }
    let (source_files, local_base_dir, source_change_kinds) = resolve_source(&loaded.from).await?;

    if yes {
        tracing::info!("--yes given, skipping interactive review");
        let diffs = vec![None; loaded.targets.len()];
        return run_transfer_phase(&loaded, source_files, diffs).await;
    }

    let session = ReviewSession {
        from: loaded.from.clone(),
        targets: loaded.targets.clone(),
        source_files: source_files.clone(),
        source_change_kinds,
        local_base_dir,
        concurrency: loaded.run.concurrency,
        probe_concurrency: loaded.run.probe_concurrency,
        uploader_idle_timeout_secs: loaded.run.uploader_idle_timeout_secs,
    };

    tracing::info!(port = loaded.run.port, "starting review server");
    let (outcome, diffs) = core::server::run_review_server(loaded.run.port, session).await?;

    match outcome {
        ReviewOutcome::Cancelled { reason } => {
            tracing::info!(reason = %reason, "upload cancelled");
            Ok(RunOutcome::Cancelled)
        }
        ReviewOutcome::Confirmed => run_transfer_phase(&loaded, source_files, diffs).await,
    }
}

async fn run_transfer_phase(
    loaded: &LoadedProfile,
    source_files: Vec<common::types::UploadFile>,
    diffs: Vec<Option<common::types::TargetDiff>>,
) -> anyhow::Result<RunOutcome> {
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let progress_task = tokio::spawn(async move {
        while let Some(message) = events_rx.recv().await {
            tracing::debug!(?message, "transfer progress");
        }
    });

    let plan = TransferPlan {
        targets: &loaded.targets,
        diffs: &diffs,
        source_files: &source_files,
        parallel_targets: loaded.run.parallel_targets,
        concurrency: loaded.run.concurrency,
        abort: core::cancel::AbortHandle::new(),
    };
    let results = core::transfer::run_transfer(plan, events_tx).await;
    let _ = progress_task.await;

    let failed = results
        .iter()
        .filter(|r| r.status == common::types::TargetStatus::Failed)
        .count();
    for result in &results {
        if result.status == common::types::TargetStatus::Failed {
            tracing::error!(host = %result.host, error = ?result.error, "target failed");
        } else {
            tracing::info!(host = %result.host, files = result.files.len(), "target completed");
        }
    }
    if failed > 0 {
        Ok(RunOutcome::AnyTargetFailed)
    } else {
        Ok(RunOutcome::Success)
    }
}

type SourceResolution = (
    Vec<common::types::UploadFile>,
    Option<PathBuf>,
    HashMap<String, ChangeKind>,
);

async fn resolve_source(from: &common::profile::FromConfig) -> anyhow::Result<SourceResolution> {
    match from {
        common::profile::FromConfig::Git {
            base,
            target,
            include_untracked,
        } => {
            let repo_root = std::env::current_dir()?;
            let source = GitSource {
                repo_root: repo_root.clone(),
                base: base.clone(),
                target: target.clone(),
                include_untracked: *include_untracked,
            };
            let (files, kinds) = source.resolve_with_kinds().await?;
            Ok((files, Some(repo_root), kinds))
        }
        common::profile::FromConfig::File { src } => {
            let paths: Vec<PathBuf> = src.iter().map(PathBuf::from).collect();
            let common_base = paths
                .first()
                .and_then(|p| p.parent())
                .map(|p| p.to_path_buf());
            let source = FileListSource { src: paths };
            let files = source.resolve().await?;
            // every resolved entry is simply "present"; there is no
            // historical comparison, so everything is `Added` until diffed
            // against a target.
            let kinds = files
                .iter()
                .map(|f| (f.relative_path.clone(), ChangeKind::Added))
                .collect();
            Ok((files, common_base, kinds))
        }
    }
}

pub fn list_profiles(config_path: &std::path::Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("failed to read {:?}: {e}", config_path))?;
    common::loader::list_profiles(&content)
}

pub const INIT_TEMPLATE: &str = r#"_global:
  ignore_groups:
    vcs: [".git/", ".hg/"]
  default_ignore: [vcs]

deploy:
  from:
    type: git
    base: HEAD~1
  to:
    defaults:
      protocol: sftp
      user: deployer
      auth_type: ssh_key
      key_file: ~/.ssh/id_rsa
    targets:
      - host: example.com
        dest: /srv/app
"#;
