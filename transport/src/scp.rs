//! SCP transport: same `ssh2::Session` connect/auth flow as the SFTP
//! transport, but transfers over the `scp_send`/`scp_recv` channel instead
//! of the SFTP subsystem. Neither `DiffCapable` nor `ListCapable`.

use crate::uploader::{RemoteFile, TransportError, TransportResult, Uploader};
use async_trait::async_trait;
use common::types::{Auth, ResolvedTarget, UploadFile};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::{Arc, Mutex};

struct Session {
    _tcp: TcpStream,
    session: ssh2::Session,
}

pub struct ScpUploader {
    target: ResolvedTarget,
    session: Arc<Mutex<Option<Session>>>,
}

impl ScpUploader {
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
                session.userauth_pubkey_file(user, None, key_file, passphrase.as_deref())?;
            }
            Some(Auth::Password { password }) => {
                session.userauth_password(user, password)?;
            }
            None => anyhow::bail!("scp target {} has no auth configured", target.host),
        }
        if !session.authenticated() {
            anyhow::bail!("authentication to {} failed", target.host);
        }
        Ok(Session { _tcp: tcp, session })
    }

    fn remote_path(&self, relative_path: &str) -> std::path::PathBuf {
        Path::new(&self.target.dest).join(relative_path)
    }
}

#[async_trait]
impl Uploader for ScpUploader {
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
            match session.session.scp_recv(&path) {
                Ok((mut channel, stat)) => {
                    let mut bytes = Vec::with_capacity(stat.size() as usize);
                    channel.read_to_end(&mut bytes)?;
                    let size = bytes.len() as u64;
                    Ok(Some(RemoteFile { bytes, size }))
                }
                Err(_) => Ok(None),
            }
        })
        .await
        .map_err(|e| TransportError::Remote(e.into()))?
        .map_err(TransportError::Remote)
    }

    async fn transfer_file(&self, file: &UploadFile) -> TransportResult<()> {
        if file.is_directory {
            return Ok(());
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
            let mut channel = session.session.scp_send(&path, 0o644, bytes.len() as u64, None)?;
            channel.write_all(&bytes)?;
            channel.send_eof()?;
            channel.wait_eof()?;
            channel.close()?;
            channel.wait_close()?;
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
            let cmd = format!("rm -f {}", path.display());
            let mut channel = session.session.channel_session()?;
            channel.exec(&cmd)?;
            channel.wait_close()?;
            Ok(())
        })
        .await
        .map_err(|e| TransportError::Remote(e.into()))?
        .map_err(TransportError::Remote)
    }
}
