//! SFTP transport: a blocking `ssh2::Session`/`ssh2::Sftp` pair wrapped in
//! `spawn_blocking` for every call, following the connect/auth flow used by
//! `ssh2`-based sync tools in the wild.

use crate::uploader::{ListCapable, RemoteFile, TransportError, TransportResult, Uploader};
use async_trait::async_trait;
use common::types::{Auth, ResolvedTarget, UploadFile};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::{Arc, Mutex};

struct Session {
    _tcp: TcpStream,
    session: ssh2::Session,
    sftp: ssh2::Sftp,
}

/// Owns the blocking session on a background thread; every call is
/// dispatched through `spawn_blocking` since `ssh2` offers no async API.
pub struct SftpUploader {
    target: ResolvedTarget,
    session: Arc<Mutex<Option<Session>>>,
}

impl SftpUploader {
    pub fn new(target: &ResolvedTarget) -> Self {
        Self {
            target: target.clone(),
            session: Arc::new(Mutex::new(None)),
        }
    }

    fn connect_blocking(target: &ResolvedTarget) -> anyhow::Result<Session> {
        let addr = format!("{}:{}", target.host, target.port);
        let tcp = TcpStream::connect(&addr)?;
        let mut session = ssh2::Session::new()?;
        session.set_tcp_stream(tcp.try_clone()?);
        session.handshake()?;
        let user = target.user.as_deref().unwrap_or("");
        match &target.auth {
            Some(Auth::SshKey { key_file, passphrase }) => {
                session.userauth_pubkey_file(
                    user,
                    None,
                    key_file,
                    passphrase.as_deref(),
                )?;
            }
            Some(Auth::Password { password }) => {
                session.userauth_password(user, password)?;
            }
            None => anyhow::bail!("sftp target {} has no auth configured", target.host),
        }
        if !session.authenticated() {
            anyhow::bail!("authentication to {} failed", target.host);
        }
        let sftp = session.sftp()?;
        Ok(Session {
            _tcp: tcp,
            session,
            sftp,
        })
    }

    fn remote_path(&self, relative_path: &str) -> std::path::PathBuf {
        Path::new(&self.target.dest).join(relative_path)
    }

    fn ensure_parent_dirs(sftp: &ssh2::Sftp, path: &Path) -> anyhow::Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let mut to_create = Vec::new();
        let mut cursor = parent.to_path_buf();
        loop {
            if sftp.stat(&cursor).is_ok() {
                break;
            }
            to_create.push(cursor.clone());
            match cursor.parent() {
                Some(p) if p != cursor => cursor = p.to_path_buf(),
                _ => break,
            }
        }
        for dir in to_create.into_iter().rev() {
            let _ = sftp.mkdir(&dir, 0o755);
        }
        Ok(())
    }
}

#[async_trait]
impl Uploader for SftpUploader {
    async fn connect(&mut self) -> TransportResult<()> {
        let target = self.target.clone();
        let established = tokio::task::spawn_blocking(move || Self::connect_blocking(&target))
            .await
            .map_err(|e| TransportError::Connection(e.into()))?
            .map_err(TransportError::Connection)?;
        *self.session.lock().expect("session mutex poisoned") = Some(established);
        Ok(())
    }

    async fn disconnect(&mut self) {
        // best-effort: dropping the session closes the socket; any error
        // from the remote end during close is not surfaced to the caller.
        self.session.lock().expect("session mutex poisoned").take();
    }

    async fn read_file(&self, relative_path: &str) -> TransportResult<Option<RemoteFile>> {
        let session = self.session.clone();
        let path = self.remote_path(relative_path);
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<RemoteFile>> {
            let guard = session.lock().expect("session mutex poisoned");
            let Some(session) = guard.as_ref() else {
                anyhow::bail!("read_file called before connect");
            };
            match session.sftp.open(&path) {
                Ok(mut file) => {
                    let mut bytes = Vec::new();
                    file.read_to_end(&mut bytes)?;
                    let size = bytes.len() as u64;
                    Ok(Some(RemoteFile { bytes, size }))
                }
                // SSH_FX_NO_SUCH_FILE == 2
                Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(|e| TransportError::Remote(e.into()))?
        .map_err(TransportError::Remote)
    }

    async fn transfer_file(&self, file: &UploadFile) -> TransportResult<()> {
        if file.is_directory {
            let session = self.session.clone();
            let path = self.remote_path(&file.relative_path);
            return tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                let guard = session.lock().expect("session mutex poisoned");
                let Some(session) = guard.as_ref() else {
                    anyhow::bail!("transfer_file called before connect");
                };
                let _ = session.sftp.mkdir(&path, 0o755);
                Ok(())
            })
            .await
            .map_err(|e| TransportError::Remote(e.into()))?
            .map_err(TransportError::Remote);
        }
        let bytes = match (&file.bytes, &file.source_path) {
            (Some(bytes), _) => bytes.clone(),
            (None, Some(source_path)) => {
                tokio::fs::read(source_path)
                    .await
                    .map_err(|e| TransportError::Remote(e.into()))?
            }
            (None, None) => return Ok(()),
        };
        let session = self.session.clone();
        let path = self.remote_path(&file.relative_path);
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let guard = session.lock().expect("session mutex poisoned");
            let Some(session) = guard.as_ref() else {
                anyhow::bail!("transfer_file called before connect");
            };
            Self::ensure_parent_dirs(&session.sftp, &path)?;
            let mut remote = session.sftp.create(&path)?;
            remote.write_all(&bytes)?;
            Ok(())
        })
        .await
        .map_err(|e| TransportError::Remote(e.into()))?
        .map_err(TransportError::Remote)
    }

    async fn delete_file(&self, relative_path: &str) -> TransportResult<()> {
        let session = self.session.clone();
        let path = self.remote_path(relative_path);
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let guard = session.lock().expect("session mutex poisoned");
            let Some(session) = guard.as_ref() else {
                anyhow::bail!("delete_file called before connect");
            };
            match session.sftp.unlink(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(|e| TransportError::Remote(e.into()))?
        .map_err(TransportError::Remote)
    }

    fn as_list_capable(&self) -> Option<&dyn ListCapable> {
        Some(self)
    }
}

#[async_trait]
impl ListCapable for SftpUploader {
    async fn list_remote_files(&self, remote_dir: &str) -> TransportResult<Vec<String>> {
        let session = self.session.clone();
        let root = Path::new(&self.target.dest).join(remote_dir);
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<String>> {
            let guard = session.lock().expect("session mutex poisoned");
            let Some(session) = guard.as_ref() else {
                anyhow::bail!("list_remote_files called before connect");
            };
            let mut files = Vec::new();
            let mut stack = vec![root.clone()];
            while let Some(dir) = stack.pop() {
                let entries = match session.sftp.readdir(&dir) {
                    Ok(entries) => entries,
                    Err(_) => continue,
                };
                for (path, stat) in entries {
                    if stat.is_dir() {
                        stack.push(path);
                    } else {
                        if let Ok(rel) = path.strip_prefix(&root) {
                            files.push(rel.to_string_lossy().replace('\\', "/"));
                        }
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
