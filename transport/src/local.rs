//! Local-filesystem transport: `connect`/`disconnect` are no-ops, every
//! call is a direct `tokio::fs` operation under the target's `dest`.
//! Implements `ListCapable` so mirror mode can plan deletions without a
//! remote diff.

use crate::uploader::{ListCapable, RemoteFile, TransportError, TransportResult, Uploader};
use async_trait::async_trait;
use common::types::{ResolvedTarget, UploadFile};
use std::path::{Path, PathBuf};

pub struct LocalUploader {
    target: ResolvedTarget,
}

impl LocalUploader {
    pub fn new(target: &ResolvedTarget) -> Self {
        Self {
            target: target.clone(),
        }
    }

    fn resolve(&self, relative_path: &str) -> PathBuf {
        Path::new(&self.target.dest).join(relative_path)
    }
}

#[async_trait]
impl Uploader for LocalUploader {
    async fn connect(&mut self) -> TransportResult<()> {
        tokio::fs::create_dir_all(&self.target.dest)
            .await
            .map_err(|e| TransportError::Connection(e.into()))?;
        Ok(())
    }

    async fn disconnect(&mut self) {}

    async fn read_file(&self, relative_path: &str) -> TransportResult<Option<RemoteFile>> {
        let path = self.resolve(relative_path);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let size = bytes.len() as u64;
                Ok(Some(RemoteFile { bytes, size }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TransportError::Remote(e.into())),
        }
    }

    async fn transfer_file(&self, file: &UploadFile) -> TransportResult<()> {
        let path = self.resolve(&file.relative_path);
        if file.is_directory {
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| TransportError::Remote(e.into()))?;
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransportError::Remote(e.into()))?;
        }
        match (&file.bytes, &file.source_path) {
            (Some(bytes), _) => {
                tokio::fs::write(&path, bytes)
                    .await
                    .map_err(|e| TransportError::Remote(e.into()))?;
            }
            (None, Some(source_path)) => {
                tokio::fs::copy(source_path, &path)
                    .await
                    .map_err(|e| TransportError::Remote(e.into()))?;
            }
            (None, None) => {}
        }
        if let Ok(metadata) = tokio::fs::metadata(&path).await {
            let _ = common::preserve::set_file_metadata(&self.target.preserve, &metadata, &path)
                .await;
        }
        Ok(())
    }

    async fn delete_file(&self, relative_path: &str) -> TransportResult<()> {
        let path = self.resolve(relative_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransportError::Remote(e.into())),
        }
    }

    fn as_list_capable(&self) -> Option<&dyn ListCapable> {
        Some(self)
    }
}

#[async_trait]
impl ListCapable for LocalUploader {
    async fn list_remote_files(&self, remote_dir: &str) -> TransportResult<Vec<String>> {
        let root = self.resolve(remote_dir);
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<String>> {
            if !root.exists() {
                return Ok(Vec::new());
            }
            let mut files = Vec::new();
            for entry in walkdir::WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() {
                    if let Ok(rel) = entry.path().strip_prefix(&root) {
                        files.push(rel.to_string_lossy().replace('\\', "/"));
                    }
                }
            }
            Ok(files)
        })
        .await
        .map_err(|e| TransportError::Remote(e.into()))?
        .map_err(TransportError::Remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::TransportKind;

    fn target_for(dir: &Path) -> ResolvedTarget {
        ResolvedTarget {
            host: "localhost".to_string(),
            transport: TransportKind::Local,
            port: 0,
            user: None,
            auth: None,
            dest: dir.to_string_lossy().to_string(),
            sync_mode: common::types::SyncMode::Update,
            preserve: common::preserve::preserve_default(),
            timeout_secs: 30,
            retry: 0,
            ignore: common::filter::FilterSettings::new(),
            rsync_options: Vec::new(),
            legacy_mode: false,
        }
    }

    #[tokio::test]
    async fn writes_and_reads_back_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut uploader = LocalUploader::new(&target_for(dir.path()));
        uploader.connect().await.unwrap();
        let file = UploadFile {
            relative_path: "hello.txt".to_string(),
            bytes: Some(b"hi".to_vec()),
            source_path: None,
            is_directory: false,
        };
        uploader.transfer_file(&file).await.unwrap();
        let read_back = uploader.read_file("hello.txt").await.unwrap().unwrap();
        assert_eq!(read_back.bytes, b"hi");
    }

    #[tokio::test]
    async fn list_remote_files_on_empty_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(&target_for(dir.path()));
        let listed = uploader.list_remote_files("").await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(&target_for(dir.path()));
        uploader.delete_file("nope.txt").await.unwrap();
    }
}
