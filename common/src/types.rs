//! Core data model shared by the file-source resolvers, transport adapters,
//! and the diff/review core: [`UploadFile`], [`ResolvedTarget`],
//! [`DiffEntry`], [`FileResult`] and [`TargetResult`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One file in the resolved source set.
///
/// `relative_path` is always POSIX-separated and never begins with `/`.
/// Exactly one of `bytes`/`source_path` is populated unless `is_directory`.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub relative_path: String,
    pub bytes: Option<Vec<u8>>,
    pub source_path: Option<PathBuf>,
    pub is_directory: bool,
}

impl UploadFile {
    pub fn file(relative_path: impl Into<String>, source_path: PathBuf) -> Self {
        Self {
            relative_path: relative_path.into(),
            bytes: None,
            source_path: Some(source_path),
            is_directory: false,
        }
    }

    pub fn directory(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            bytes: None,
            source_path: None,
            is_directory: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Sftp,
    Scp,
    Rsync,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Update,
    Mirror,
}

#[derive(Debug, Clone)]
pub enum Auth {
    SshKey { key_file: PathBuf, passphrase: Option<String> },
    Password { password: String },
}

/// A fully validated, environment-expanded target: everything a transport
/// adapter needs to open a session and transfer files. Immutable once built
/// by the profile loader.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub host: String,
    pub transport: TransportKind,
    pub port: u16,
    pub user: Option<String>,
    pub auth: Option<Auth>,
    /// normalized without a trailing slash for display; the transport gets
    /// this same value, trailing-slash semantics are a transport concern.
    pub dest: String,
    pub sync_mode: SyncMode,
    pub preserve: crate::preserve::Settings,
    pub timeout_secs: u64,
    pub retry: u32,
    pub ignore: crate::filter::FilterSettings,
    pub rsync_options: Vec<String>,
    pub legacy_mode: bool,
}

/// A single changed-path entry, produced either by the source resolver or
/// by a transport's `get_diff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    /// never appears in a diff result's entry list; unchanged files are
    /// represented by absence, kept here only so transports can discard it.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub relative_path: String,
    pub kind: ChangeKind,
    pub from_path: Option<String>,
    pub size: Option<u64>,
}

/// Per-file remote status used to populate `remoteStatusByFile` in the
/// `init`/`loading_progress` protocol messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteFileStatus {
    pub exists: bool,
    pub has_changes: bool,
}

/// One target's diff cache slot. Becomes immutable once populated.
#[derive(Debug, Clone, Default)]
pub struct TargetDiff {
    pub target_index: usize,
    pub rsync_entries: Option<Vec<DiffEntry>>,
    pub changed_paths: Vec<String>,
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub total: usize,
    pub delete_list: Option<Vec<String>>,
    pub remote_status_by_file: Option<std::collections::HashMap<String, RemoteFileStatus>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct FileResult {
    pub relative_path: String,
    pub status: FileStatus,
    pub size: u64,
    pub duration: std::time::Duration,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Pending,
    Connecting,
    Uploading,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TargetResult {
    pub host: String,
    pub status: TargetStatus,
    pub files: Vec<FileResult>,
    pub total_bytes: u64,
    pub total_duration: std::time::Duration,
    pub error: Option<String>,
}

impl TargetResult {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            status: TargetStatus::Pending,
            files: Vec::new(),
            total_bytes: 0,
            total_duration: std::time::Duration::ZERO,
            error: None,
        }
    }
}
