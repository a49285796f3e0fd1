//! The base `Uploader` capability every transport implements, plus the two
//! optional capabilities (`DiffCapable`, `ListCapable`) a caller discovers
//! by feature-test rather than by downcasting a class hierarchy.

use async_trait::async_trait;
use common::types::{DiffEntry, ResolvedTarget, UploadFile};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(#[source] anyhow::Error),
    #[error("remote operation failed: {0}")]
    Remote(#[source] anyhow::Error),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Contents read back from a remote path, for the review UI's side-by-side
/// file view.
pub struct RemoteFile {
    pub bytes: Vec<u8>,
    pub size: u64,
}

/// An open session to one target. Borrowed, never co-owned, by the diff
/// path and the transfer path — only one phase holds it at a time.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn connect(&mut self) -> TransportResult<()>;

    /// Best-effort; implementations must not raise to the caller.
    async fn disconnect(&mut self);

    /// Returns `None` when the remote path does not exist.
    async fn read_file(&self, relative_path: &str) -> TransportResult<Option<RemoteFile>>;

    async fn transfer_file(&self, file: &UploadFile) -> TransportResult<()>;

    async fn delete_file(&self, relative_path: &str) -> TransportResult<()>;

    /// Feature-test for [`DiffCapable`]; only `rsync` answers `true`.
    fn as_diff_capable(&self) -> Option<&dyn DiffCapable> {
        None
    }

    /// Feature-test for [`ListCapable`]; `sftp` and `local` answer `true`.
    fn as_list_capable(&self) -> Option<&dyn ListCapable> {
        None
    }
}

pub struct GetDiffOptions<'a> {
    pub checksum: bool,
    pub ignore_patterns: &'a [String],
    pub remote_dir: &'a str,
}

#[async_trait]
pub trait DiffCapable: Send + Sync {
    /// `file_paths` empty means "compare whole tree and allow deletions".
    async fn get_diff(
        &self,
        local_base_dir: &Path,
        file_paths: &[String],
        options: GetDiffOptions<'_>,
    ) -> TransportResult<Vec<DiffEntry>>;
}

#[async_trait]
pub trait ListCapable: Send + Sync {
    /// All paths (files only) underneath the remote destination, relative
    /// to it.
    async fn list_remote_files(&self, remote_dir: &str) -> TransportResult<Vec<String>>;
}

/// Builds the uploader for `target`'s configured transport kind.
pub fn make_uploader(target: &ResolvedTarget) -> Box<dyn Uploader> {
    match target.transport {
        common::types::TransportKind::Sftp => Box::new(crate::sftp::SftpUploader::new(target)),
        common::types::TransportKind::Scp => Box::new(crate::scp::ScpUploader::new(target)),
        common::types::TransportKind::Rsync => Box::new(crate::rsync::RsyncUploader::new(target)),
        common::types::TransportKind::Local => Box::new(crate::local::LocalUploader::new(target)),
    }
}
