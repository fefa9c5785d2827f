// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Workspace configuration loading with the precedence env > CLI flag >
//! workspace config file > store config.
//!
//! This module owns only the env/file layers; the CLI-flag layer is the
//! CLI's own concern and the store-config layer lives in `beads-storage`'s
//! `Storage::get_config`. Callers merge all four by calling into this
//! module last (lowest precedence) and letting whatever already resolved
//! from a higher layer take priority.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The minimum tombstone TTL floor, regardless of configuration.
pub const TOMBSTONE_TTL_HARD_MINIMUM_DAYS: i64 = 1;
pub const TOMBSTONE_TTL_DEFAULT_DAYS: i64 = 30;

/// Parsed `.beads/config.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub routing: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    pub mode: Option<String>,
    pub branch: Option<String>,
    pub conflict_strategy: Option<String>,
    pub interval_secs: Option<u64>,
    pub tombstone_ttl_days: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub http_addr: Option<String>,
    pub token: Option<String>,
}

impl Config {
    /// Loads `<workspace>/.beads/config.yaml`. A missing file yields
    /// defaults (no error); a present-but-malformed file is a loud error,
    /// never silently defaulted.
    pub fn load(workspace_config_path: &Path) -> Result<Self, CoreError> {
        if !workspace_config_path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(workspace_config_path)?;
        serde_yaml::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("{}: {e}", workspace_config_path.display())))
    }

    /// Clamps a configured tombstone TTL to the hard minimum, logging at
    /// the call site is left to the caller (this function is pure).
    pub fn effective_tombstone_ttl_days(&self) -> i64 {
        self.sync
            .tombstone_ttl_days
            .unwrap_or(TOMBSTONE_TTL_DEFAULT_DAYS)
            .max(TOMBSTONE_TTL_HARD_MINIMUM_DAYS)
    }
}

/// Resolves a config key via the env > file precedence chain, for the
/// subset of settings expressed as simple env vars.
///
/// `env_var` is checked first; if unset, `file_value` (already resolved
/// from the CLI-flag/config-file/store-config layers by the caller) is
/// used.
pub fn resolve_str(env_var: &str, file_value: Option<&str>) -> Option<String> {
    std::env::var(env_var).ok().or_else(|| file_value.map(str::to_string))
}

fn resolve_bool(env_var: &str, file_value: Option<bool>) -> Option<bool> {
    if let Ok(v) = std::env::var(env_var) {
        return Some(matches!(v.as_str(), "1" | "true" | "yes" | "on"));
    }
    file_value
}

/// Resolution of the `BEADS_AUTO_SYNC` / `BEADS_AUTO_COMMIT` /
/// `BEADS_AUTO_PUSH` / `BEADS_AUTO_PULL` precedence:
/// `BEADS_AUTO_SYNC`, when set, is a coarse switch that overrides the
/// three finer-grained flags; when unset, each finer-grained flag
/// defaults to `true` unless explicitly disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSyncPolicy {
    pub commit: bool,
    pub push: bool,
    pub pull: bool,
}

impl AutoSyncPolicy {
    /// Resolves the policy from environment variables only (the config
    /// file does not currently carry per-action auto-sync toggles).
    pub fn from_env() -> Self {
        Self::resolve(
            resolve_bool("BEADS_AUTO_SYNC", None),
            resolve_bool("BEADS_AUTO_COMMIT", None),
            resolve_bool("BEADS_AUTO_PUSH", None),
            resolve_bool("BEADS_AUTO_PULL", None),
        )
    }

    /// Pure resolution function, exercised directly in tests without
    /// mutating process environment.
    pub fn resolve(
        auto_sync: Option<bool>,
        auto_commit: Option<bool>,
        auto_push: Option<bool>,
        auto_pull: Option<bool>,
    ) -> Self {
        if let Some(false) = auto_sync {
            return Self { commit: false, push: false, pull: false };
        }
        Self {
            commit: auto_commit.unwrap_or(true),
            push: auto_push.unwrap_or(true),
            pull: auto_pull.unwrap_or(true),
        }
    }
}

impl Default for AutoSyncPolicy {
    fn default() -> Self {
        Self { commit: true, push: true, pull: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("config.yaml")).unwrap();
        assert!(cfg.sync.mode.is_none());
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sync: [this is not a mapping").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn tombstone_ttl_floor_is_enforced() {
        let cfg = Config {
            sync: SyncConfig { tombstone_ttl_days: Some(0), ..Default::default() },
            ..Default::default()
        };
        assert_eq!(cfg.effective_tombstone_ttl_days(), TOMBSTONE_TTL_HARD_MINIMUM_DAYS);
    }

    #[test]
    fn auto_sync_false_overrides_individual_flags() {
        let policy = AutoSyncPolicy::resolve(Some(false), Some(true), Some(true), Some(true));
        assert_eq!(policy, AutoSyncPolicy { commit: false, push: false, pull: false });
    }

    #[test]
    fn individual_flags_used_when_auto_sync_unset() {
        let policy = AutoSyncPolicy::resolve(None, Some(false), None, None);
        assert_eq!(policy, AutoSyncPolicy { commit: false, push: true, pull: true });
    }

    #[test]
    fn defaults_to_all_enabled() {
        assert_eq!(AutoSyncPolicy::resolve(None, None, None, None), AutoSyncPolicy::default());
    }
}
