//! Resolves a profile's `from` section into a concrete [`crate::types::UploadFile`] list.
//!
//! Both resolvers are oblivious to ignore patterns; filtering happens later,
//! once in the core, against the resolved set.

use crate::types::{ChangeKind, UploadFile};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait FileSource: Send + Sync {
    async fn resolve(&self) -> Result<Vec<UploadFile>>;
}

/// `from.type: git` — diffs two revisions via `git diff --name-status`,
/// optionally folding in untracked files from `git ls-files`.
pub struct GitSource {
    pub repo_root: PathBuf,
    pub base: String,
    pub target: Option<String>,
    pub include_untracked: bool,
}

impl GitSource {
    fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = std::process::Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(args)
            .output()?;
        if !output.status.success() {
            anyhow::bail!(
                "git {:?} failed: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8(output.stdout)?)
    }

    /// Reads a path's content as it exists in `target`, via `git show`,
    /// rather than off disk — the working tree may not match a historical
    /// revision at all.
    fn read_blob(&self, target: &str, path: &str) -> Result<Vec<u8>> {
        let output = std::process::Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(["show", &format!("{target}:{path}")])
            .output()?;
        if !output.status.success() {
            anyhow::bail!(
                "git show {target}:{path} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(output.stdout)
    }

    /// Builds the `UploadFile` for a surviving (non-deleted) path. When
    /// `target` names a specific revision, content comes from that
    /// revision's blob; otherwise `target` is the working tree and the
    /// on-disk file is the source of truth.
    fn build_upload_file(&self, path: &str) -> Result<UploadFile> {
        match &self.target {
            Some(target) => Ok(UploadFile {
                relative_path: path.to_string(),
                bytes: Some(self.read_blob(target, path)?),
                source_path: None,
                is_directory: false,
            }),
            None => Ok(UploadFile::file(path, self.repo_root.join(path))),
        }
    }

    fn diff_name_status(&self) -> Result<Vec<(UploadFile, ChangeKind)>> {
        let range = match &self.target {
            Some(target) => format!("{}..{}", self.base, target),
            None => self.base.clone(),
        };
        let stdout = self.run_git(&["diff", "--name-status", &range])?;
        let mut files = Vec::new();
        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, '\t');
            let status = parts.next().unwrap_or_default();
            let rest = parts.next().unwrap_or_default();
            if status.starts_with('D') {
                // deleted paths have no on-disk source; record path only.
                files.push((
                    UploadFile {
                        relative_path: rest.to_string(),
                        bytes: None,
                        source_path: None,
                        is_directory: false,
                    },
                    ChangeKind::Deleted,
                ));
                continue;
            }
            // renames carry "R100\told\tnew"
            let (kind, path) = if status.starts_with('R') {
                (ChangeKind::Renamed, rest.rsplit('\t').next().unwrap_or(rest))
            } else if status.starts_with('A') {
                (ChangeKind::Added, rest)
            } else {
                (ChangeKind::Modified, rest)
            };
            files.push((self.build_upload_file(path)?, kind));
        }
        Ok(files)
    }

    fn untracked(&self) -> Result<Vec<UploadFile>> {
        let stdout = self.run_git(&["ls-files", "--others", "--exclude-standard"])?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|path| UploadFile::file(path, self.repo_root.join(path)))
            .collect())
    }
}

#[async_trait]
impl FileSource for GitSource {
    async fn resolve(&self) -> Result<Vec<UploadFile>> {
        let (files, _) = self.resolve_with_kinds().await?;
        Ok(files)
    }
}

impl GitSource {
    /// Like [`FileSource::resolve`] but also returns each path's
    /// [`ChangeKind`] as derived from `git diff --name-status`, so callers
    /// don't have to re-derive it (and lose rename information doing so).
    pub async fn resolve_with_kinds(&self) -> Result<(Vec<UploadFile>, HashMap<String, ChangeKind>)> {
        let repo_root = self.repo_root.clone();
        let base = self.base.clone();
        let target = self.target.clone();
        let include_untracked = self.include_untracked;
        tokio::task::spawn_blocking(move || {
            let source = GitSource {
                repo_root,
                base,
                target,
                include_untracked,
            };
            let mut pairs = source.diff_name_status()?;
            if source.include_untracked {
                pairs.extend(
                    source
                        .untracked()?
                        .into_iter()
                        .map(|f| (f, ChangeKind::Added)),
                );
            }
            let mut kinds = HashMap::new();
            let files = pairs
                .into_iter()
                .map(|(file, kind)| {
                    kinds.insert(file.relative_path.clone(), kind);
                    file
                })
                .collect();
            Ok((files, kinds))
        })
        .await?
    }
}

/// `from.type: file` — an explicit list of filesystem paths; directories
/// are walked, everything else is taken as a single file.
pub struct FileListSource {
    pub src: Vec<PathBuf>,
}

#[async_trait]
impl FileSource for FileListSource {
    async fn resolve(&self) -> Result<Vec<UploadFile>> {
        let src = self.src.clone();
        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            for entry_path in &src {
                if entry_path.is_dir() {
                    // preserve the listed directory's own name as a path prefix
                    let walk_base = entry_path.parent().unwrap_or(Path::new(""));
                    for entry in walkdir::WalkDir::new(entry_path)
                        .into_iter()
                        .filter_map(|e| e.ok())
                    {
                        if entry.file_type().is_file() {
                            let rel = relative_posix(walk_base, entry.path());
                            files.push(UploadFile::file(rel, entry.path().to_path_buf()));
                        }
                    }
                } else {
                    let rel = entry_path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    files.push(UploadFile::file(rel, entry_path.clone()));
                }
            }
            Ok(files)
        })
        .await?
    }
}

fn relative_posix(base: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_list_source_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();
        let source = FileListSource {
            src: vec![dir.path().to_path_buf()],
        };
        let mut files = source.resolve().await.unwrap();
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        assert_eq!(files.len(), 2);
        assert!(files[0].relative_path.ends_with("a.txt"));
        assert!(files[1].relative_path.ends_with("sub/b.txt"));
    }
}
