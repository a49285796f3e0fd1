//! The review WebSocket server (§4.2, §4.7, §4.8): accepts exactly one
//! client connection, drives the diff/review protocol, and resolves to a
//! [`ReviewOutcome`] once the user confirms, cancels, or disconnects.

use crate::diff::{self, ProbeContext};
use crate::message::{
    ClientMessage, DiffSummary, FileContent, LoadingResult, ReviewOutcome, ServerMessage,
    TargetSummary, TreeNode, UploadButtonState,
};
use crate::state::ServerState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use common::profile::FromConfig;
use common::types::{ChangeKind, ResolvedTarget, TargetDiff, UploadFile};
use futures::stream::StreamExt;
use futures::SinkExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Source files are listed eagerly up to this count; above it the UI gets a
/// collapsed tree and expands directories on demand.
const LAZY_LOADING_THRESHOLD: usize = 100;
const IDLE_REAP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

pub struct ReviewSession {
    pub from: FromConfig,
    pub targets: Vec<ResolvedTarget>,
    pub source_files: Vec<UploadFile>,
    pub source_change_kinds: HashMap<String, ChangeKind>,
    pub local_base_dir: Option<PathBuf>,
    pub concurrency: usize,
    pub probe_concurrency: usize,
    pub uploader_idle_timeout_secs: i64,
}

struct Shared {
    state: Mutex<ServerState>,
    session: ReviewSession,
    outcome: Mutex<Option<oneshot::Sender<ReviewOutcome>>>,
}

/// Runs the review server on `port`, bound to localhost only, and returns
/// once the session resolves. The second element carries whatever diff was
/// cached for each target by index, so a caller that gets `Confirmed` can
/// narrow the transfer to the files the review actually showed as changed.
pub async fn run_review_server(
    port: u16,
    session: ReviewSession,
) -> anyhow::Result<(ReviewOutcome, Vec<Option<TargetDiff>>)> {
    let (tx, rx) = oneshot::channel();
    let state = ServerState::new(
        session.targets.clone(),
        TargetDiff::default(),
        session.source_files.len() > LAZY_LOADING_THRESHOLD,
        session.uploader_idle_timeout_secs,
    );
    let shared = Arc::new(Shared {
        state: Mutex::new(state),
        session,
        outcome: Mutex::new(Some(tx)),
    });

    let reaper = shared.clone();
    let reaper_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(IDLE_REAP_INTERVAL);
        loop {
            ticker.tick().await;
            reaper.state.lock().await.reap_if_idle().await;
        }
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(shared.clone());
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "review server listening");

    let outcome = tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
            ReviewOutcome::Cancelled { reason: "server_stopped".to_string() }
        }
        received = rx => received.unwrap_or(ReviewOutcome::Cancelled { reason: "connection_closed".to_string() }),
    };
    reaper_handle.abort();
    let diffs = {
        let state = shared.state.lock().await;
        (0..shared.session.targets.len())
            .map(|i| state.get_diff(i).cloned())
            .collect()
    };
    Ok((outcome, diffs))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(shared): State<Arc<Shared>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, shared))
}

async fn handle_socket(socket: WebSocket, shared: Arc<Shared>) {
    let (sink, mut stream) = socket.split();
    let sink = Arc::new(Mutex::new(sink));

    send_init(&shared, &sink).await;
    spawn_background_probe(shared.clone(), sink.clone());

    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let parsed: Result<ClientMessage, _> = serde_json::from_str(&message);
        let client_msg = match parsed {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("ignoring malformed client message: {e}");
                continue;
            }
        };
        match client_msg {
            ClientMessage::Confirm => {
                resolve(&shared, ReviewOutcome::Confirmed).await;
                break;
            }
            ClientMessage::Cancel => {
                resolve(
                    &shared,
                    ReviewOutcome::Cancelled {
                        reason: "user_cancel".to_string(),
                    },
                )
                .await;
                break;
            }
            ClientMessage::SwitchTarget { target_index } => {
                handle_switch_target(&shared, &sink, target_index).await;
            }
            ClientMessage::FileRequest { path } => {
                handle_file_request(&shared, &sink, path).await;
            }
            ClientMessage::ExpandDirectory { path } => {
                handle_expand_directory(&shared, &sink, path).await;
            }
        }
    }

    resolve(
        &shared,
        ReviewOutcome::Cancelled {
            reason: "connection_closed".to_string(),
        },
    )
    .await;
}

async fn resolve(shared: &Arc<Shared>, outcome: ReviewOutcome) {
    if let Some(tx) = shared.outcome.lock().await.take() {
        let _ = tx.send(outcome);
    }
}

type Sink = Arc<Mutex<futures::stream::SplitSink<WebSocket, Message>>>;

async fn send_message(sink: &Sink, message: &ServerMessage) {
    let Ok(json) = serde_json::to_string(message) else {
        tracing::error!("failed to serialize server message");
        return;
    };
    if sink.lock().await.send(Message::Text(json)).await.is_err() {
        tracing::debug!("client disconnected mid-send");
    }
}

async fn send_init(shared: &Arc<Shared>, sink: &Sink) {
    let ctx = build_probe_context(&shared.session);
    let target_index = 0;
    let target_diff = if shared.session.targets.is_empty() {
        TargetDiff::default()
    } else {
        diff::probe_target(target_index, &shared.session.targets[target_index], &ctx).await
    };
    let mut state = shared.state.lock().await;
    if !shared.session.targets.is_empty() {
        state.store_diff(target_index, target_diff.clone());
    }

    let lazy_loading = state.lazy_loading;
    let tree = if lazy_loading {
        // root level only; directories are expanded on demand via
        // handle_expand_directory instead of eagerly recursing.
        Some(build_children(
            &shared.session.source_files,
            &shared.session.source_change_kinds,
            "",
        ))
    } else {
        Some(build_tree(
            &shared.session.source_files,
            &shared.session.source_change_kinds,
            "",
        ))
    };
    let remote_targets: Vec<TargetSummary> = shared
        .session
        .targets
        .iter()
        .map(|t| TargetSummary {
            host: t.host.clone(),
            error: None,
        })
        .collect();
    let button_state = if shared.session.targets.len() <= 1 {
        if target_diff.total == 0 {
            UploadButtonState::NoChanges
        } else {
            UploadButtonState::Enabled
        }
    } else {
        UploadButtonState::Checking
    };
    state.has_changes_to_upload = target_diff.total > 0;
    drop(state);

    let (base, diff_mode) = diff_label(&shared.session.from);
    let init = ServerMessage::Init {
        base,
        target: shared
            .session
            .targets
            .first()
            .map(|t| t.host.clone())
            .unwrap_or_default(),
        diff_mode,
        files: target_diff.changed_paths.clone(),
        summary: DiffSummary {
            added: target_diff.added,
            modified: target_diff.modified,
            deleted: target_diff.deleted,
            total: target_diff.total,
        },
        remote_targets,
        tree,
        lazy_loading,
        upload_button_state: button_state,
    };
    send_message(sink, &init).await;
}

fn diff_label(from: &FromConfig) -> (String, String) {
    match from {
        FromConfig::Git { base, target, .. } => (
            target.clone().unwrap_or_else(|| "HEAD".to_string()),
            base.clone(),
        ),
        FromConfig::File { .. } => ("local files".to_string(), "filesystem".to_string()),
    }
}

fn build_probe_context(session: &ReviewSession) -> ProbeContext<'_> {
    ProbeContext {
        local_base_dir: session.local_base_dir.as_deref(),
        source_paths: session
            .source_files
            .iter()
            .map(|f| f.relative_path.clone())
            .collect(),
        source_change_kinds: session.source_change_kinds.clone(),
        concurrency: session.probe_concurrency,
    }
}

/// Probes every target beyond the first in the background, reporting
/// progress and flipping the upload button once all targets are checked.
fn spawn_background_probe(shared: Arc<Shared>, sink: Sink) {
    tokio::spawn(async move {
        let remaining: Vec<usize> = (1..shared.session.targets.len()).collect();
        if remaining.is_empty() {
            finalize_button_state(&shared, &sink).await;
            return;
        }
        let total = remaining.len();
        let mut completed = 0usize;
        let ctx = build_probe_context(&shared.session);
        let limiter = throttle::Limiter::new(shared.session.probe_concurrency);
        let mut results = Vec::with_capacity(total);
        let futures = remaining.iter().map(|&index| {
            let ctx = &ctx;
            let limiter = &limiter;
            let target = &shared.session.targets[index];
            async move {
                let _permit = limiter.acquire().await;
                (index, diff::probe_target(index, target, ctx).await)
            }
        });
        for (index, target_diff) in futures::future::join_all(futures).await {
            completed += 1;
            let host = shared.session.targets[index].host.clone();
            let error = target_diff.error.clone();
            shared.state.lock().await.store_diff(index, target_diff);
            results.push(LoadingResult {
                target_index: index,
                host,
                error,
            });
            send_message(
                &sink,
                &ServerMessage::LoadingProgress {
                    checking_targets: completed < total,
                    completed_count: completed,
                    total_count: total,
                    results: results.clone(),
                },
            )
            .await;
        }
        shared.state.lock().await.all_targets_checked = true;
        finalize_button_state(&shared, &sink).await;
    });
}

async fn finalize_button_state(shared: &Arc<Shared>, sink: &Sink) {
    let mut state = shared.state.lock().await;
    state.diff_check_completed = true;
    let any_changes = (0..shared.session.targets.len())
        .any(|i| state.get_diff(i).map(|d| d.total > 0).unwrap_or(false));
    state.has_changes_to_upload = any_changes;
    drop(state);
    let (disabled, reason) = if any_changes {
        (false, None)
    } else {
        (true, Some("no_changes".to_string()))
    };
    send_message(
        sink,
        &ServerMessage::UploadState {
            disabled,
            reason,
            message: None,
        },
    )
    .await;
}

async fn handle_switch_target(shared: &Arc<Shared>, sink: &Sink, target_index: usize) {
    if target_index >= shared.session.targets.len() {
        send_message(
            sink,
            &ServerMessage::Error {
                message: format!("no such target index {target_index}"),
            },
        )
        .await;
        return;
    }
    let already_cached = shared.state.lock().await.is_cached(target_index);
    if !already_cached {
        let ctx = build_probe_context(&shared.session);
        let target_diff =
            diff::probe_target(target_index, &shared.session.targets[target_index], &ctx).await;
        shared
            .state
            .lock()
            .await
            .store_diff(target_index, target_diff);
    }
    let mut state = shared.state.lock().await;
    state.current_target = target_index;
    let diff = state.get_diff(target_index).cloned().unwrap_or_default();
    drop(state);
    send_message(
        sink,
        &ServerMessage::LoadingProgress {
            checking_targets: false,
            completed_count: 1,
            total_count: 1,
            results: vec![LoadingResult {
                target_index,
                host: shared.session.targets[target_index].host.clone(),
                error: diff.error,
            }],
        },
    )
    .await;
}

async fn handle_file_request(shared: &Arc<Shared>, sink: &Sink, path: String) {
    let local = shared
        .session
        .source_files
        .iter()
        .find(|f| f.relative_path == path)
        .and_then(|f| f.source_path.as_ref())
        .and_then(|p| std::fs::read(p).ok())
        .map(|bytes| FileContent {
            exists: true,
            size: Some(bytes.len() as u64),
            bytes_base64: Some(base64_encode(&bytes)),
        })
        .unwrap_or(FileContent {
            exists: false,
            bytes_base64: None,
            size: None,
        });

    let state = shared.state.lock().await;
    let target_index = state.current_target;
    let remote_status = state
        .get_diff(target_index)
        .and_then(|d| d.remote_status_by_file.as_ref())
        .and_then(|m| m.get(&path))
        .map(|s| {
            if !s.exists {
                "missing"
            } else if s.has_changes {
                "changed"
            } else {
                "unchanged"
            }
            .to_string()
        });
    drop(state);

    send_message(
        sink,
        &ServerMessage::FileResponse {
            path,
            request_type: "diff".to_string(),
            local: Some(local),
            remote: None,
            remote_status,
        },
    )
    .await;
}

async fn handle_expand_directory(shared: &Arc<Shared>, sink: &Sink, path: String) {
    let children = build_children(
        &shared.session.source_files,
        &shared.session.source_change_kinds,
        &path,
    );
    send_message(sink, &ServerMessage::DirectoryContents { path, children }).await;
}

fn build_tree(
    files: &[UploadFile],
    change_kinds: &HashMap<String, ChangeKind>,
    prefix: &str,
) -> Vec<TreeNode> {
    let mut nodes = build_children(files, change_kinds, prefix);
    for node in &mut nodes {
        if node.is_directory {
            node.children = Some(build_tree(files, change_kinds, &node.path));
        }
    }
    nodes
}

fn build_children(
    files: &[UploadFile],
    change_kinds: &HashMap<String, ChangeKind>,
    prefix: &str,
) -> Vec<TreeNode> {
    let mut seen_dirs = std::collections::BTreeSet::new();
    let mut nodes = Vec::new();
    for file in files {
        let rel = file.relative_path.as_str();
        let rest = if prefix.is_empty() {
            rel
        } else if let Some(stripped) = rel.strip_prefix(prefix).and_then(|s| s.strip_prefix('/')) {
            stripped
        } else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        match rest.find('/') {
            Some(slash) => {
                let dir_name = &rest[..slash];
                if seen_dirs.insert(dir_name.to_string()) {
                    let path = if prefix.is_empty() {
                        dir_name.to_string()
                    } else {
                        format!("{prefix}/{dir_name}")
                    };
                    nodes.push(TreeNode {
                        name: dir_name.to_string(),
                        path,
                        is_directory: true,
                        change_kind: None,
                        children: None,
                    });
                }
            }
            None => {
                let kind = change_kinds.get(rel).map(change_kind_label);
                nodes.push(TreeNode {
                    name: rest.to_string(),
                    path: rel.to_string(),
                    is_directory: false,
                    change_kind: kind,
                    children: None,
                });
            }
        }
    }
    nodes
}

fn change_kind_label(kind: &ChangeKind) -> String {
    match kind {
        ChangeKind::Added => "added",
        ChangeKind::Modified => "modified",
        ChangeKind::Deleted => "deleted",
        ChangeKind::Renamed => "renamed",
        ChangeKind::Unchanged => "unchanged",
    }
    .to_string()
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_children_groups_immediate_level() {
        let files = vec![
            UploadFile::file("src/a.rs", PathBuf::from("/tmp/a.rs")),
            UploadFile::file("src/b.rs", PathBuf::from("/tmp/b.rs")),
            UploadFile::file("README.md", PathBuf::from("/tmp/README.md")),
        ];
        let kinds = HashMap::new();
        let top = build_children(&files, &kinds, "");
        assert_eq!(top.len(), 2);
        let src = build_children(&files, &kinds, "src");
        assert_eq!(src.len(), 2);
    }

    #[test]
    fn base64_encode_matches_known_vector() {
        assert_eq!(base64_encode(b"Man"), "TWFu");
        assert_eq!(base64_encode(b"Ma"), "TWE=");
    }
}
