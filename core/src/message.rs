//! The bidirectional JSON message protocol exchanged with the review UI.
//! Field names are part of the external contract and are camelCase on the
//! wire even though the Rust fields are snake_case.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    FileRequest { path: String },
    ExpandDirectory { path: String },
    SwitchTarget { target_index: usize },
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub change_kind: Option<String>,
    /// only populated for eagerly-loaded (non-lazy) trees.
    pub children: Option<Vec<TreeNode>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
    pub host: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingResult {
    pub target_index: usize,
    pub host: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub exists: bool,
    pub bytes_base64: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadButtonState {
    Checking,
    NoChanges,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Uploading,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Init {
        base: String,
        target: String,
        #[serde(rename = "diffMode")]
        diff_mode: String,
        files: Vec<String>,
        summary: DiffSummary,
        #[serde(rename = "remoteTargets")]
        remote_targets: Vec<TargetSummary>,
        tree: Option<Vec<TreeNode>>,
        #[serde(rename = "lazyLoading")]
        lazy_loading: bool,
        #[serde(rename = "uploadButtonState")]
        upload_button_state: UploadButtonState,
    },
    LoadingProgress {
        #[serde(rename = "checkingTargets")]
        checking_targets: bool,
        #[serde(rename = "completedCount")]
        completed_count: usize,
        #[serde(rename = "totalCount")]
        total_count: usize,
        results: Vec<LoadingResult>,
    },
    FileResponse {
        path: String,
        #[serde(rename = "requestType")]
        request_type: String,
        local: Option<FileContent>,
        remote: Option<FileContent>,
        #[serde(rename = "remoteStatus")]
        remote_status: Option<String>,
    },
    DirectoryContents {
        path: String,
        children: Vec<TreeNode>,
    },
    UploadState {
        disabled: bool,
        reason: Option<String>,
        message: Option<String>,
    },
    Progress {
        host: String,
        #[serde(rename = "fileIndex")]
        file_index: usize,
        #[serde(rename = "totalFiles")]
        total_files: usize,
        #[serde(rename = "currentFile")]
        current_file: String,
        #[serde(rename = "bytesTransferred")]
        bytes_transferred: u64,
        #[serde(rename = "fileSize")]
        file_size: u64,
        status: ProgressStatus,
    },
    Complete {
        #[serde(rename = "successTargets")]
        success_targets: usize,
        #[serde(rename = "failedTargets")]
        failed_targets: usize,
        #[serde(rename = "totalFiles")]
        total_files: usize,
        #[serde(rename = "totalSize")]
        total_size: u64,
        #[serde(rename = "totalDuration")]
        total_duration_ms: u128,
    },
    Error {
        message: String,
    },
}

/// What the review phase resolves with once the UI session ends, either by
/// user confirmation/cancellation or by connection loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Confirmed,
    Cancelled { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_parses_switch_target() {
        let json = r#"{"type":"switch_target","target_index":2}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::SwitchTarget { target_index: 2 }));
    }

    #[test]
    fn server_message_uses_camel_case_fields() {
        let msg = ServerMessage::Complete {
            success_targets: 1,
            failed_targets: 0,
            total_files: 3,
            total_size: 10,
            total_duration_ms: 42,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"successTargets\":1"));
        assert!(json.contains("\"totalDuration\":42"));
    }
}
