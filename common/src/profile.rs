//! Deserialized shape of the profile configuration file, before environment
//! expansion and cross-field validation (see [`crate::loader`]).

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FromConfig {
    Git {
        base: String,
        target: Option<String>,
        #[serde(default)]
        include_untracked: bool,
    },
    File {
        src: Vec<String>,
    },
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct IgnoreConfig {
    #[serde(default)]
    pub r#use: Vec<String>,
    #[serde(default)]
    pub add: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PreserveConfig {
    #[serde(default)]
    pub uid: bool,
    #[serde(default)]
    pub gid: bool,
    #[serde(default)]
    pub time: bool,
    #[serde(default)]
    pub mode: bool,
}

/// Raw per-target fields; `TargetConfig::merged_with` fills gaps from
/// `to.defaults` before the loader turns this into a [`crate::types::ResolvedTarget`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TargetConfig {
    pub host: Option<String>,
    pub protocol: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub auth_type: Option<String>,
    pub key_file: Option<String>,
    pub password: Option<String>,
    pub dest: Option<String>,
    pub sync_mode: Option<String>,
    pub preserve: Option<PreserveConfig>,
    pub timeout: Option<u64>,
    pub retry: Option<u32>,
    pub ignore: Option<IgnoreConfig>,
    pub rsync_options: Option<Vec<String>>,
    pub legacy_mode: Option<bool>,
    pub concurrency: Option<usize>,
}

impl TargetConfig {
    /// Fills every `None` field from `defaults`; `dest` is never inherited.
    pub fn merged_with(&self, defaults: &TargetConfig) -> TargetConfig {
        TargetConfig {
            host: self.host.clone().or_else(|| defaults.host.clone()),
            protocol: self.protocol.clone().or_else(|| defaults.protocol.clone()),
            port: self.port.or(defaults.port),
            user: self.user.clone().or_else(|| defaults.user.clone()),
            auth_type: self.auth_type.clone().or_else(|| defaults.auth_type.clone()),
            key_file: self.key_file.clone().or_else(|| defaults.key_file.clone()),
            password: self.password.clone().or_else(|| defaults.password.clone()),
            dest: self.dest.clone(),
            sync_mode: self.sync_mode.clone().or_else(|| defaults.sync_mode.clone()),
            preserve: self.preserve.clone().or_else(|| defaults.preserve.clone()),
            timeout: self.timeout.or(defaults.timeout),
            retry: self.retry.or(defaults.retry),
            ignore: self.ignore.clone().or_else(|| defaults.ignore.clone()),
            rsync_options: self
                .rsync_options
                .clone()
                .or_else(|| defaults.rsync_options.clone()),
            legacy_mode: self.legacy_mode.or(defaults.legacy_mode),
            concurrency: self.concurrency.or(defaults.concurrency),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToConfig {
    #[serde(default)]
    pub defaults: TargetConfig,
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    pub from: FromConfig,
    pub to: ToConfig,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub probe_concurrency: Option<usize>,
    #[serde(default)]
    pub parallel_targets: Option<bool>,
    #[serde(default)]
    pub uploader_idle_timeout: Option<i64>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub ignore: Option<Vec<String>>,
    #[serde(default)]
    pub ignore_groups: Option<HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub default_ignore: Option<Vec<String>>,
}

/// Top-level YAML document: every key is a profile name except the
/// reserved `_global`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigDocument {
    #[serde(rename = "_global", default)]
    pub global: GlobalConfig,
    #[serde(flatten)]
    pub profiles: HashMap<String, ProfileConfig>,
}
