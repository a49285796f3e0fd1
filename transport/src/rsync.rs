//! `rsync`-over-ssh transport: the only transport that implements
//! [`DiffCapable`], by shelling out to a real `rsync --dry-run
//! --itemize-changes` and parsing its `--out-format` output.

use crate::uploader::{
    DiffCapable, GetDiffOptions, RemoteFile, TransportError, TransportResult, Uploader,
};
use async_trait::async_trait;
use common::types::{Auth, ChangeKind, DiffEntry, ResolvedTarget, UploadFile};
use regex::Regex;
use std::path::Path;

/// Per-file modification flags decoded from an rsync itemize-changes code,
/// e.g. `>f.st.....`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModFlags {
    pub checksum: bool,
    pub size: bool,
    pub mod_time: bool,
    pub perms: bool,
    pub owner: bool,
    pub group: bool,
    pub update_time: bool,
    pub acl: bool,
    pub ext_attr: bool,
}

impl ModFlags {
    /// `details` is the 11-byte itemize code with the leading update-type
    /// and file-type characters already stripped, e.g. `st......`.
    pub fn parse(details: &[u8]) -> Self {
        let at = |i: usize| details.get(i).copied().unwrap_or(b'.');
        ModFlags {
            checksum: at(0) == b'c',
            size: at(1) == b's',
            mod_time: at(2) == b't',
            perms: at(3) == b'p',
            owner: at(4) == b'o',
            group: at(5) == b'g',
            update_time: at(6) == b'u',
            acl: at(8) == b'a',
            ext_attr: at(9) == b'x',
        }
    }

    pub fn is_modified_content(&self) -> bool {
        self.checksum || self.size
    }

    pub fn is_modified_chmod(&self) -> bool {
        self.perms
    }

    pub fn is_modified_chown(&self) -> bool {
        self.owner || self.group
    }

    fn any(&self) -> bool {
        self.checksum
            || self.size
            || self.mod_time
            || self.perms
            || self.owner
            || self.group
            || self.update_time
            || self.acl
            || self.ext_attr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsyncFileType {
    File,
    Dir,
    Symlink,
    Device,
    Special,
}

impl RsyncFileType {
    fn parse(t: u8) -> Option<Self> {
        match t {
            b'f' => Some(RsyncFileType::File),
            b'd' => Some(RsyncFileType::Dir),
            b'L' => Some(RsyncFileType::Symlink),
            b'D' => Some(RsyncFileType::Device),
            b'S' => Some(RsyncFileType::Special),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsyncState {
    Identical,
    Modified(ModFlags),
    Missing,
    Extraneous,
}

/// Parses the 11-character `%i` itemize code (already split from `%f`/`%l`).
fn parse_item(details: &str) -> Option<(RsyncState, Option<RsyncFileType>)> {
    let bytes = details.as_bytes();
    if details.starts_with("*deleting") {
        return Some((RsyncState::Extraneous, None));
    }
    if bytes.len() < 2 {
        return None;
    }
    let file_type = RsyncFileType::parse(bytes[1]);
    let rest = &bytes[2..];
    if rest.iter().all(|&b| b == b'+') {
        return Some((RsyncState::Missing, file_type));
    }
    if rest.iter().all(|&b| b == b'.' || b == b' ') {
        return Some((RsyncState::Identical, file_type));
    }
    Some((RsyncState::Modified(ModFlags::parse(rest)), file_type))
}

fn state_to_kind(state: RsyncState) -> ChangeKind {
    match state {
        RsyncState::Identical => ChangeKind::Unchanged,
        RsyncState::Missing => ChangeKind::Added,
        RsyncState::Extraneous => ChangeKind::Deleted,
        RsyncState::Modified(_) => ChangeKind::Modified,
    }
}

/// Builds the dry-run rsync invocation used for diffing. `checksum` adds
/// `--checksum` so size/mtime heuristics are not trusted.
fn build_compare_cmd(
    local_dir: &Path,
    remote_spec: &str,
    checksum: bool,
    ignore_patterns: &[String],
) -> Vec<String> {
    let mut cmd = vec![
        "rsync".to_string(),
        "--verbose".to_string(),
        "--recursive".to_string(),
        "--dry-run".to_string(),
        "--super".to_string(),
        "--archive".to_string(),
        "--delete".to_string(),
        "-ii".to_string(),
        "--out-format=###%i [%f][%l]".to_string(),
    ];
    if checksum {
        cmd.push("--checksum".to_string());
    }
    for pattern in ignore_patterns {
        cmd.push(format!("--exclude={pattern}"));
    }
    cmd.push(format!("{}/", local_dir.display()));
    cmd.push(remote_spec.to_string());
    cmd
}

fn parse_output(output: &str, splitter: &Regex) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        if !line.starts_with("###") || line.len() <= 15 {
            continue;
        }
        let details = &line[3..14];
        let rest = &line[15..];
        let parts: Vec<&str> = splitter.split(rest).collect();
        let file_path = parts.first().copied().unwrap_or_default();
        if file_path.is_empty() {
            continue;
        }
        let Some((state, file_type)) = parse_item(details) else {
            continue;
        };
        if matches!(file_type, Some(RsyncFileType::Dir)) {
            continue;
        }
        if matches!(state, RsyncState::Identical) {
            continue;
        }
        entries.push(DiffEntry {
            relative_path: file_path.to_string(),
            kind: state_to_kind(state),
            from_path: None,
            size: None,
        });
    }
    entries
}

pub struct RsyncUploader {
    target: ResolvedTarget,
    connected: bool,
}

impl RsyncUploader {
    pub fn new(target: &ResolvedTarget) -> Self {
        Self {
            target: target.clone(),
            connected: false,
        }
    }

    fn remote_spec(&self, remote_dir: &str) -> String {
        match &self.target.user {
            Some(user) => format!("{}@{}:{}", user, self.target.host, remote_dir),
            None => format!("{}:{}", self.target.host, remote_dir),
        }
    }

    fn ssh_command(&self) -> String {
        let mut ssh = format!("ssh -p {}", self.target.port);
        if let Some(Auth::SshKey { key_file, .. }) = &self.target.auth {
            ssh.push_str(&format!(" -i {}", key_file.display()));
        }
        ssh
    }

    async fn run_rsync(&self, args: Vec<String>) -> TransportResult<String> {
        tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            let (mut reader, writer) = os_pipe::pipe()?;
            let mut command = std::process::Command::new(&args[0]);
            command
                .args(&args[1..])
                .stdout(writer.try_clone()?)
                .stderr(std::process::Stdio::piped());
            let mut child = shared_child::SharedChild::spawn(&mut command)?;
            drop(writer);
            let mut output = String::new();
            std::io::Read::read_to_string(&mut reader, &mut output)?;
            let status = child.wait()?;
            if !status.success() {
                anyhow::bail!("rsync exited with {:?}", status.code());
            }
            Ok(output)
        })
        .await
        .map_err(|e| TransportError::Remote(e.into()))?
        .map_err(TransportError::Remote)
    }
}

#[async_trait]
impl Uploader for RsyncUploader {
    async fn connect(&mut self) -> TransportResult<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    async fn read_file(&self, relative_path: &str) -> TransportResult<Option<RemoteFile>> {
        let remote = format!("{}/{}", self.target.dest, relative_path);
        let dest_dir = tempfile::tempdir().map_err(|e| TransportError::Remote(e.into()))?;
        let local_path = dest_dir.path().join("fetched");
        let args = vec![
            "rsync".to_string(),
            "-e".to_string(),
            self.ssh_command(),
            self.remote_spec(&remote),
            local_path.to_string_lossy().to_string(),
        ];
        match self.run_rsync(args).await {
            Ok(_) => {
                let bytes = std::fs::read(&local_path).map_err(|e| TransportError::Remote(e.into()))?;
                let size = bytes.len() as u64;
                Ok(Some(RemoteFile { bytes, size }))
            }
            Err(_) => Ok(None),
        }
    }

    async fn transfer_file(&self, file: &UploadFile) -> TransportResult<()> {
        let Some(source_path) = &file.source_path else {
            return Ok(());
        };
        let remote = format!("{}/{}", self.target.dest, file.relative_path);
        let args = vec![
            "rsync".to_string(),
            "-e".to_string(),
            self.ssh_command(),
            "--archive".to_string(),
            "--relative".to_string(),
            source_path.to_string_lossy().to_string(),
            self.remote_spec(&remote),
        ];
        self.run_rsync(args).await?;
        Ok(())
    }

    async fn delete_file(&self, relative_path: &str) -> TransportResult<()> {
        let remote = format!("{}/{}", self.target.dest, relative_path);
        let ssh = self.ssh_command();
        let mut parts = ssh.split_whitespace();
        let program = parts.next().unwrap_or("ssh").to_string();
        let mut args: Vec<String> = parts.map(str::to_string).collect();
        args.push(
            self.target
                .user
                .as_ref()
                .map(|u| format!("{}@{}", u, self.target.host))
                .unwrap_or_else(|| self.target.host.clone()),
        );
        args.push(format!("rm -f {remote}"));
        let mut full = vec![program];
        full.extend(args);
        self.run_rsync(full).await.map(|_| ())
    }

    fn as_diff_capable(&self) -> Option<&dyn DiffCapable> {
        Some(self)
    }
}

#[async_trait]
impl DiffCapable for RsyncUploader {
    async fn get_diff(
        &self,
        local_base_dir: &Path,
        file_paths: &[String],
        options: GetDiffOptions<'_>,
    ) -> TransportResult<Vec<DiffEntry>> {
        let remote_spec = self.remote_spec(options.remote_dir);
        let mut args = build_compare_cmd(
            local_base_dir,
            &remote_spec,
            options.checksum,
            options.ignore_patterns,
        );
        args.insert(1, "-e".to_string());
        args.insert(2, self.ssh_command());
        if !file_paths.is_empty() {
            // scope the dry run to just these files via --files-from
            let list = file_paths.join("\n");
            let list_file =
                tempfile::NamedTempFile::new().map_err(|e| TransportError::Remote(e.into()))?;
            std::fs::write(list_file.path(), list).map_err(|e| TransportError::Remote(e.into()))?;
            args.push(format!("--files-from={}", list_file.path().display()));
            let output = self.run_rsync(args).await?;
            let splitter = Regex::new(r"[\[\]]").expect("static regex");
            return Ok(parse_output(&output, &splitter));
        }
        let output = self.run_rsync(args).await?;
        let splitter = Regex::new(r"[\[\]]").expect("static regex");
        Ok(parse_output(&output, &splitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mod_flags_parse_content_change() {
        let flags = ModFlags::parse(b"st......");
        assert!(flags.is_modified_content());
        assert!(!flags.is_modified_chmod());
        assert!(flags.any());
    }

    #[test]
    fn mod_flags_parse_chmod_only() {
        let flags = ModFlags::parse(b"..p.....");
        assert!(flags.is_modified_chmod());
        assert!(!flags.is_modified_content());
    }

    #[test]
    fn item_missing_is_added() {
        let (state, file_type) = parse_item("<f+++++++++").unwrap();
        assert_eq!(state, RsyncState::Missing);
        assert_eq!(file_type, Some(RsyncFileType::File));
        assert_eq!(state_to_kind(state), ChangeKind::Added);
    }

    #[test]
    fn item_deleting_is_extraneous() {
        let (state, _) = parse_item("*deleting  ").unwrap();
        assert_eq!(state, RsyncState::Extraneous);
    }

    #[test]
    fn item_identical_is_skipped() {
        let (state, _) = parse_item(">f.........").unwrap();
        assert_eq!(state, RsyncState::Identical);
    }

    #[test]
    fn parse_output_extracts_entries() {
        let splitter = Regex::new(r"[\[\]]").unwrap();
        let output = "###<f+++++++++ [new_file.txt][0]\n###>f.st..... [changed.txt][42]\n";
        let entries = parse_output(output, &splitter);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].relative_path, "new_file.txt");
        assert_eq!(entries[0].kind, ChangeKind::Added);
        assert_eq!(entries[1].relative_path, "changed.txt");
        assert_eq!(entries[1].kind, ChangeKind::Modified);
    }

    #[test]
    fn build_compare_cmd_includes_itemize_flags() {
        let cmd = build_compare_cmd(
            Path::new("/tmp/src"),
            "user@host:/srv/app",
            true,
            &["*.log".to_string()],
        );
        assert!(cmd.contains(&"--dry-run".to_string()));
        assert!(cmd.contains(&"-ii".to_string()));
        assert!(cmd.contains(&"--checksum".to_string()));
        assert!(cmd.iter().any(|a| a == "--exclude=*.log"));
        assert_eq!(cmd.last().unwrap(), "user@host:/srv/app");
    }
}
