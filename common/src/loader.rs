//! Three-pass profile loader: parse untyped YAML, select and validate one
//! profile plus `_global`, then expand `${NAME}` environment references and
//! leading `~` against the user's home directory.

use crate::filter::FilterSettings;
use crate::preserve;
use crate::profile::{ConfigDocument, GlobalConfig, ProfileConfig, TargetConfig};
use crate::types::{Auth, ResolvedTarget, SyncMode, TransportKind};
use anyhow::{anyhow, Context, Result};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("profile '{0}' not found in configuration")]
    ProfileNotFound(String),
    #[error("_global.ignore and _global.ignore_groups/default_ignore may not both be set")]
    ConflictingGlobalIgnore,
    #[error("target ignore.use references unknown group '{0}'")]
    UnknownIgnoreGroup(String),
    #[error("invalid protocol '{0}', expected one of sftp, scp, rsync, local")]
    InvalidProtocol(String),
    #[error("invalid auth_type '{0}', expected one of ssh_key, password")]
    InvalidAuthType(String),
    #[error("invalid sync_mode '{0}', expected one of update, mirror")]
    InvalidSyncMode(String),
    #[error("target #{0} ({1}) is missing required field 'dest'")]
    MissingDest(usize, String),
    #[error("target #{index} ({host}) uses protocol '{protocol}' and must resolve user and host")]
    MissingUserOrHost {
        index: usize,
        host: String,
        protocol: String,
    },
    #[error("invalid ignore pattern: {0}")]
    BadIgnorePattern(#[source] anyhow::Error),
}

/// Run-scoped knobs that aren't per-target: concurrency, port, etc.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub concurrency: usize,
    pub probe_concurrency: usize,
    pub parallel_targets: bool,
    pub uploader_idle_timeout_secs: i64,
    pub port: u16,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            probe_concurrency: 3,
            parallel_targets: false,
            uploader_idle_timeout_secs: 300,
            port: 3000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedProfile {
    pub from: crate::profile::FromConfig,
    pub targets: Vec<ResolvedTarget>,
    pub run: RunConfig,
}

/// Parses `path` as YAML and resolves `profile_name` against it.
pub fn load_profile(path: &Path, profile_name: &str) -> Result<LoadedProfile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    load_profile_from_str(&content, profile_name)
}

pub fn load_profile_from_str(content: &str, profile_name: &str) -> Result<LoadedProfile> {
    let doc: ConfigDocument =
        serde_yaml_ng::from_str(content).context("failed to parse YAML configuration")?;
    let profile = doc
        .profiles
        .get(profile_name)
        .ok_or_else(|| ConfigValidationError::ProfileNotFound(profile_name.to_string()))?
        .clone();
    resolve_profile(&doc.global, profile)
}

/// Returns the names of every profile declared in `content` (excluding `_global`).
pub fn list_profiles(content: &str) -> Result<Vec<String>> {
    let doc: ConfigDocument =
        serde_yaml_ng::from_str(content).context("failed to parse YAML configuration")?;
    let mut names: Vec<String> = doc.profiles.keys().cloned().collect();
    names.sort();
    Ok(names)
}

fn resolve_profile(global: &GlobalConfig, profile: ProfileConfig) -> Result<LoadedProfile> {
    validate_global_ignore(global)?;
    let default_ignore = resolve_group_names(global, global.default_ignore.as_deref())?;

    let run = RunConfig {
        concurrency: profile.concurrency.unwrap_or(10),
        probe_concurrency: profile.probe_concurrency.unwrap_or(3),
        parallel_targets: profile.parallel_targets.unwrap_or(false),
        uploader_idle_timeout_secs: profile.uploader_idle_timeout.unwrap_or(300),
        port: profile.port.unwrap_or(3000),
    };

    let mut targets = Vec::with_capacity(profile.to.targets.len());
    for (index, raw_target) in profile.to.targets.iter().enumerate() {
        let merged = raw_target.merged_with(&profile.to.defaults);
        let resolved = resolve_target(index, &merged, global, &default_ignore)?;
        targets.push(resolved);
    }

    Ok(LoadedProfile {
        from: profile.from,
        targets,
        run,
    })
}

fn validate_global_ignore(global: &GlobalConfig) -> Result<(), ConfigValidationError> {
    let has_flat = global.ignore.is_some();
    let has_grouped = global.ignore_groups.is_some() || global.default_ignore.is_some();
    if has_flat && has_grouped {
        return Err(ConfigValidationError::ConflictingGlobalIgnore);
    }
    Ok(())
}

fn resolve_group_names(
    global: &GlobalConfig,
    names: Option<&[String]>,
) -> Result<Vec<String>, ConfigValidationError> {
    let Some(names) = names else {
        return Ok(Vec::new());
    };
    let groups = global.ignore_groups.as_ref();
    let mut patterns = Vec::new();
    for name in names {
        let group = groups
            .and_then(|g| g.get(name))
            .ok_or_else(|| ConfigValidationError::UnknownIgnoreGroup(name.clone()))?;
        patterns.extend(group.iter().cloned());
    }
    Ok(patterns)
}

fn resolve_target(
    index: usize,
    merged: &TargetConfig,
    global: &GlobalConfig,
    default_ignore: &[String],
) -> Result<ResolvedTarget> {
    let host = merged.host.clone().unwrap_or_default();
    let protocol_str = merged.protocol.as_deref().unwrap_or("sftp");
    let transport = match protocol_str {
        "sftp" => TransportKind::Sftp,
        "scp" => TransportKind::Scp,
        "rsync" => TransportKind::Rsync,
        "local" => TransportKind::Local,
        other => {
            return Err(ConfigValidationError::InvalidProtocol(other.to_string()).into());
        }
    };

    if transport != TransportKind::Local && (merged.user.is_none() || host.is_empty()) {
        return Err(ConfigValidationError::MissingUserOrHost {
            index,
            host,
            protocol: protocol_str.to_string(),
        }
        .into());
    }

    let dest_raw = merged
        .dest
        .clone()
        .ok_or_else(|| ConfigValidationError::MissingDest(index, host.clone()))?;
    let dest_expanded = expand(&dest_raw)?;
    let dest = dest_expanded.trim_end_matches('/').to_string();

    let sync_mode = match merged.sync_mode.as_deref().unwrap_or("update") {
        "update" => SyncMode::Update,
        "mirror" => SyncMode::Mirror,
        other => return Err(ConfigValidationError::InvalidSyncMode(other.to_string()).into()),
    };

    let auth = if transport == TransportKind::Local {
        None
    } else {
        match merged.auth_type.as_deref().unwrap_or("ssh_key") {
            "ssh_key" => Some(Auth::SshKey {
                key_file: Path::new(&expand(
                    merged.key_file.as_deref().unwrap_or("~/.ssh/id_rsa"),
                )?)
                .to_path_buf(),
                passphrase: None,
            }),
            "password" => Some(Auth::Password {
                password: expand(merged.password.as_deref().unwrap_or(""))?,
            }),
            other => return Err(ConfigValidationError::InvalidAuthType(other.to_string()).into()),
        }
    };

    let mut ignore = FilterSettings::new();
    if let Some(ignore_cfg) = &merged.ignore {
        let mut patterns = resolve_group_names(global, Some(ignore_cfg.r#use.as_slice()))?;
        patterns.extend(ignore_cfg.add.iter().cloned());
        for pattern in patterns {
            ignore
                .add_exclude(&pattern)
                .map_err(ConfigValidationError::BadIgnorePattern)?;
        }
    } else {
        let flat = global.ignore.clone().unwrap_or_default();
        for pattern in flat.into_iter().chain(default_ignore.iter().cloned()) {
            ignore
                .add_exclude(&pattern)
                .map_err(ConfigValidationError::BadIgnorePattern)?;
        }
    }

    let preserve = merged
        .preserve
        .as_ref()
        .map(|p| {
            let mut settings = preserve::preserve_default();
            settings.file.user_and_time.uid = p.uid;
            settings.file.user_and_time.gid = p.gid;
            settings.file.user_and_time.time = p.time;
            settings.dir.user_and_time = settings.file.user_and_time;
            settings.symlink.user_and_time = settings.file.user_and_time;
            if !p.mode {
                settings.file.mode_mask = 0o7777;
                settings.dir.mode_mask = 0o7777;
            }
            settings
        })
        .unwrap_or_else(preserve::preserve_default);

    Ok(ResolvedTarget {
        host: expand(&host)?,
        transport,
        port: merged.port.unwrap_or(22),
        user: merged.user.as_deref().map(expand).transpose()?,
        auth,
        dest,
        sync_mode,
        preserve,
        timeout_secs: merged.timeout.unwrap_or(30),
        retry: merged.retry.unwrap_or(3),
        ignore,
        rsync_options: merged.rsync_options.clone().unwrap_or_default(),
        legacy_mode: merged.legacy_mode.unwrap_or(false),
    })
}

/// Expands `${NAME}` environment references, erroring on an unset variable,
/// then expands a leading `~` against the user's home directory.
fn expand(value: &str) -> Result<String> {
    let env_expanded = shellexpand::env(value)
        .map_err(|e| anyhow!("unresolved environment variable '${{{}}}': {}", e.var_name, e.cause))?;
    let full = shellexpand::tilde(env_expanded.as_ref());
    Ok(full.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC_YAML: &str = r#"
_global:
  ignore_groups:
    vcs: ["*.git/"]
  default_ignore: ["vcs"]
deploy:
  from:
    type: git
    base: HEAD~1
  to:
    defaults:
      protocol: sftp
      user: deployer
      auth_type: ssh_key
      key_file: /tmp/key
    targets:
      - host: example.com
        dest: /srv/app
"#;

    #[test]
    fn loads_a_simple_profile() {
        let loaded = load_profile_from_str(BASIC_YAML, "deploy").unwrap();
        assert_eq!(loaded.targets.len(), 1);
        let target = &loaded.targets[0];
        assert_eq!(target.host, "example.com");
        assert_eq!(target.dest, "/srv/app");
        assert_eq!(target.user.as_deref(), Some("deployer"));
    }

    #[test]
    fn unknown_profile_errors() {
        let err = load_profile_from_str(BASIC_YAML, "nope").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn missing_dest_errors() {
        let yaml = r#"
deploy:
  from:
    type: file
    src: ["a.txt"]
  to:
    targets:
      - host: example.com
        protocol: local
"#;
        let err = load_profile_from_str(yaml, "deploy").unwrap_err();
        assert!(err.to_string().contains("dest"));
    }

    #[test]
    fn conflicting_global_ignore_errors() {
        let yaml = r#"
_global:
  ignore: ["*.log"]
  default_ignore: ["vcs"]
deploy:
  from:
    type: file
    src: ["a.txt"]
  to:
    targets:
      - host: x
        protocol: local
        dest: /tmp/x
"#;
        let err = load_profile_from_str(yaml, "deploy").unwrap_err();
        assert!(err.to_string().contains("may not both be set"));
    }

    #[test]
    fn local_targets_do_not_require_user_or_host() {
        let yaml = r#"
deploy:
  from:
    type: file
    src: ["a.txt"]
  to:
    targets:
      - protocol: local
        dest: /tmp/out
"#;
        let loaded = load_profile_from_str(yaml, "deploy").unwrap();
        assert_eq!(loaded.targets[0].transport, TransportKind::Local);
    }
}
