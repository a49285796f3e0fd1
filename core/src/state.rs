//! `ServerState`: process-lifetime, single-owner state for the diff/review
//! phase. All mutation happens from the protocol message handler or its
//! awaited helpers — the cache map and cached uploader are never touched
//! concurrently.

use crate::cancel::AbortHandle;
use common::types::{ResolvedTarget, TargetDiff};
use std::collections::HashMap;
use std::time::Instant;
use transport::Uploader;

/// The single cached uploader for the currently-displayed target, plus its
/// last-use timestamp for the idle reaper.
struct CachedUploader {
    target_index: usize,
    uploader: Box<dyn Uploader>,
    last_used: Instant,
}

pub struct ServerState {
    pub targets: Vec<ResolvedTarget>,
    pub source_diff: TargetDiff,
    cache: HashMap<usize, TargetDiff>,
    pub current_target: usize,
    cached_uploader: Option<CachedUploader>,
    pub connection_error: Option<String>,
    pub lazy_loading: bool,
    pub all_targets_checked: bool,
    pub diff_check_completed: bool,
    pub has_changes_to_upload: bool,
    pub abort: AbortHandle,
    pub uploader_idle_timeout_secs: i64,
}

impl ServerState {
    pub fn new(
        targets: Vec<ResolvedTarget>,
        source_diff: TargetDiff,
        lazy_loading: bool,
        uploader_idle_timeout_secs: i64,
    ) -> Self {
        Self {
            targets,
            source_diff,
            cache: HashMap::new(),
            current_target: 0,
            cached_uploader: None,
            connection_error: None,
            lazy_loading,
            all_targets_checked: false,
            diff_check_completed: false,
            has_changes_to_upload: false,
            abort: AbortHandle::new(),
            uploader_idle_timeout_secs,
        }
    }

    /// Becomes immutable once populated: a second `store` for the same
    /// index is a logic error and is ignored rather than overwriting.
    pub fn store_diff(&mut self, index: usize, diff: TargetDiff) {
        self.cache.entry(index).or_insert(diff);
    }

    pub fn get_diff(&self, index: usize) -> Option<&TargetDiff> {
        self.cache.get(&index)
    }

    pub fn is_cached(&self, index: usize) -> bool {
        self.cache.contains_key(&index)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Replaces the single cached uploader, disconnecting whatever was
    /// cached before (if anything) first.
    pub async fn set_cached_uploader(&mut self, target_index: usize, uploader: Box<dyn Uploader>) {
        if let Some(mut previous) = self.cached_uploader.take() {
            previous.uploader.disconnect().await;
        }
        self.cached_uploader = Some(CachedUploader {
            target_index,
            uploader,
            last_used: Instant::now(),
        });
    }

    pub fn touch_cached_uploader(&mut self) {
        if let Some(cached) = &mut self.cached_uploader {
            cached.last_used = Instant::now();
        }
    }

    pub fn cached_uploader_for(&mut self, target_index: usize) -> Option<&mut Box<dyn Uploader>> {
        match &mut self.cached_uploader {
            Some(cached) if cached.target_index == target_index => {
                cached.last_used = Instant::now();
                Some(&mut cached.uploader)
            }
            _ => None,
        }
    }

    /// Disconnects and clears the cached uploader if it's been idle past
    /// `uploader_idle_timeout_secs`. A timeout `<= 0` disables reaping.
    pub async fn reap_if_idle(&mut self) {
        if self.uploader_idle_timeout_secs <= 0 {
            return;
        }
        let idle_for = self
            .cached_uploader
            .as_ref()
            .map(|c| c.last_used.elapsed().as_secs() as i64);
        if let Some(idle_secs) = idle_for {
            if idle_secs > self.uploader_idle_timeout_secs {
                if let Some(mut cached) = self.cached_uploader.take() {
                    cached.uploader.disconnect().await;
                }
            }
        }
    }

    pub async fn disconnect_cached_uploader(&mut self) {
        if let Some(mut cached) = self.cached_uploader.take() {
            cached.uploader.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_diff_is_immutable_once_populated() {
        let mut state = ServerState::new(Vec::new(), TargetDiff::default(), false, 300);
        state.store_diff(0, TargetDiff {
            target_index: 0,
            total: 1,
            ..Default::default()
        });
        state.store_diff(0, TargetDiff {
            target_index: 0,
            total: 99,
            ..Default::default()
        });
        assert_eq!(state.get_diff(0).unwrap().total, 1);
    }

    #[tokio::test]
    async fn idle_reaper_disabled_when_timeout_non_positive() {
        let mut state = ServerState::new(Vec::new(), TargetDiff::default(), false, 0);
        state.reap_if_idle().await;
        assert!(state.cached_uploader.is_none());
    }
}
