// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Sync-mode router: a pure function of the resolved `sync.mode`
//! config value, consulted by the flush manager and sync pipeline.
//! No state, no I/O.

/// The resolved sync mode. Unknown config values fall back to
/// [`SyncMode::GitPortable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Export file written and committed/pushed through a plain git repo
    /// alongside the caller's own repo; no versioned (`GitStore`) remote
    /// involvement.
    #[default]
    GitPortable,
    /// Export file written on every local write rather than only on a
    /// timer/explicit sync; no versioned remote involvement. Exports the
    /// same way `GitPortable` does — the distinction is a flush-cadence
    /// policy owned by C4, not a different predicate pair.
    Realtime,
    /// No plain-text export file; the versioned (`GitStore`) backend is
    /// the sole sync medium (`Commit`/`Push`/`Pull`/`Merge`).
    DoltNative,
    /// Both: export file written *and* the versioned remote used, for
    /// maximum redundancy at the cost of double the sync work.
    BeltAndSuspenders,
}

impl SyncMode {
    /// Parses a `sync.mode` config string, falling back to the default
    /// on anything unrecognized rather than erroring.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "git-portable" => SyncMode::GitPortable,
            "realtime" => SyncMode::Realtime,
            "dolt-native" => SyncMode::DoltNative,
            "belt-and-suspenders" => SyncMode::BeltAndSuspenders,
            _ => SyncMode::default(),
        }
    }

    /// Whether this mode writes the plain-text JSONL export file at all.
    pub fn should_export_jsonl(&self) -> bool {
        !matches!(self, SyncMode::DoltNative)
    }

    /// Whether this mode drives the versioned (`GitStore`) remote for
    /// commit/push/pull/merge.
    pub fn should_use_versioned_remote(&self) -> bool {
        matches!(self, SyncMode::DoltNative | SyncMode::BeltAndSuspenders)
    }
}

/// Resolves `sync.mode` with the precedence that applies to this one key:
/// workspace config file, then store config. (Env/CLI-flag layers are
/// resolved by the caller before this is reached.)
pub fn resolve_sync_mode(workspace_config_value: Option<&str>, store_config_value: Option<&str>) -> SyncMode {
    workspace_config_value.or(store_config_value).map(SyncMode::parse).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_mode_falls_back_to_git_portable() {
        assert_eq!(SyncMode::parse("something-made-up"), SyncMode::GitPortable);
    }

    #[test]
    fn mode_predicate_table_matches_exactly() {
        assert!(SyncMode::GitPortable.should_export_jsonl());
        assert!(!SyncMode::GitPortable.should_use_versioned_remote());

        assert!(SyncMode::Realtime.should_export_jsonl());
        assert!(!SyncMode::Realtime.should_use_versioned_remote());

        assert!(!SyncMode::DoltNative.should_export_jsonl());
        assert!(SyncMode::DoltNative.should_use_versioned_remote());

        assert!(SyncMode::BeltAndSuspenders.should_export_jsonl());
        assert!(SyncMode::BeltAndSuspenders.should_use_versioned_remote());
    }

    #[test]
    fn workspace_config_takes_precedence_over_store_config() {
        let mode = resolve_sync_mode(Some("realtime"), Some("dolt-native"));
        assert_eq!(mode, SyncMode::Realtime);
    }

    #[test]
    fn falls_back_to_store_config_then_default() {
        assert_eq!(resolve_sync_mode(None, Some("dolt-native")), SyncMode::DoltNative);
        assert_eq!(resolve_sync_mode(None, None), SyncMode::GitPortable);
    }
}
