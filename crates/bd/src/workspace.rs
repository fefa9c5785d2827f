// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Workspace resolution for the `bd` binary (C10 caller side): locate
//! `.beads/`, load its metadata and config, apply the env-var path
//! overrides `bd::env` exposes, and decide whether this workspace's
//! backend permits daemon auto-start at all.

use std::path::{Path, PathBuf};

use beads_core::{Config, CoreError};
use beads_sync::{Metadata, WorkspacePaths};
use thiserror::Error;

use crate::env;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("no .beads directory found in this directory or any parent")]
    NotFound,
    #[error("a .beads directory already exists at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] beads_storage::StoreError),
    #[error(transparent)]
    Config(#[from] CoreError),
}

/// Backends whose own concurrency story doesn't mix well with a
/// long-lived daemon holding the only handle to them: a versioned
/// backend's commit/push/pull sequence is itself a serialization point
/// (`.sync.lock`), and a second writer racing the daemon for it is worse
/// than just serializing every command through direct store access.
const NO_AUTO_START_BACKENDS: &[&str] = &["dolt", "git", "versioned"];

/// A resolved `.beads/` workspace plus everything a command needs to
/// either talk to the daemon or open the store directly.
pub struct CliWorkspace {
    pub workspace_dir: PathBuf,
    pub paths: WorkspacePaths,
    pub metadata: Metadata,
    pub config: Config,
    pub token: Option<String>,
}

impl CliWorkspace {
    /// Walks upward from `start` for an existing `.beads/` directory,
    /// applying `BEADS_DB`/`BD_SOCKET` overrides on top of the resolved
    /// paths.
    pub fn resolve_from(start: &Path) -> Result<Self, WorkspaceError> {
        let paths = WorkspacePaths::resolve_from(start)?.ok_or(WorkspaceError::NotFound)?;
        Self::from_paths(start.to_path_buf(), paths)
    }

    /// Creates a fresh `.beads/` directory rooted at `start` with the
    /// given backend (`"plain"` or `"dolt"`/`"git"`/`"versioned"`),
    /// refusing to clobber an existing one.
    pub fn init(start: &Path, backend: &str) -> Result<Self, WorkspaceError> {
        let beads_dir = start.join(".beads");
        if beads_dir.join("metadata.json").is_file() {
            return Err(WorkspaceError::AlreadyInitialized(beads_dir));
        }
        let metadata = Metadata { backend: backend.to_string(), ..Metadata::default() };
        let paths = WorkspacePaths::for_beads_dir(beads_dir, &metadata);
        paths.write_metadata(&metadata)?;
        Self::from_paths(start.to_path_buf(), paths)
    }

    fn from_paths(workspace_dir: PathBuf, mut paths: WorkspacePaths) -> Result<Self, WorkspaceError> {
        let metadata: Metadata = serde_json::from_str(&std::fs::read_to_string(&paths.metadata_path)?)?;

        if let Some(db) = env::database_override() {
            paths.database_path = db;
        }
        if let Some(socket) = env::socket_override() {
            paths.socket_path = socket;
        }

        let config = Config::load(&paths.config_path)?;
        let token = std::env::var("BD_TOKEN").ok().or_else(|| config.daemon.token.clone());

        Ok(Self { workspace_dir, paths, metadata, config, token })
    }

    /// Whether `bd` should try to connect-or-start a daemon for this
    /// workspace at all. `BEADS_AUTO_START_DAEMON` always wins when set;
    /// otherwise the backend's own policy decides.
    pub fn auto_start_allowed(&self) -> bool {
        if let Some(forced) = env::auto_start_daemon_forced() {
            return forced;
        }
        !NO_AUTO_START_BACKENDS.contains(&self.metadata.backend.as_str())
    }

    /// Opens this workspace's store directly, bypassing the daemon
    /// entirely. Used both by the policy carve-out above and as the
    /// fallback when a daemon that should exist can't be reached.
    pub fn open_storage_direct(&self) -> Result<std::sync::Arc<dyn beads_storage::Storage>, WorkspaceError> {
        Ok(match self.metadata.backend.as_str() {
            "dolt" | "git" | "versioned" => {
                std::sync::Arc::new(beads_storage::GitStore::open(&self.paths.database_path, &self.paths.dolt_dir)?)
            }
            _ => std::sync::Arc::new(beads_storage::PlainStore::open(&self.paths.database_path)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_resolve_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ws = CliWorkspace::init(dir.path(), "plain").unwrap();
        assert_eq!(ws.metadata.backend, "plain");

        let resolved = CliWorkspace::resolve_from(dir.path()).unwrap();
        assert_eq!(resolved.paths.database_path, ws.paths.database_path);
    }

    #[test]
    fn init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        CliWorkspace::init(dir.path(), "plain").unwrap();
        assert!(matches!(CliWorkspace::init(dir.path(), "plain"), Err(WorkspaceError::AlreadyInitialized(_))));
    }

    #[test]
    fn resolve_missing_workspace_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(CliWorkspace::resolve_from(dir.path()), Err(WorkspaceError::NotFound)));
    }

    #[test]
    fn plain_backend_allows_auto_start_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let ws = CliWorkspace::init(dir.path(), "plain").unwrap();
        assert!(ws.auto_start_allowed());
    }

    #[test]
    fn versioned_backend_disables_auto_start_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let ws = CliWorkspace::init(dir.path(), "dolt").unwrap();
        assert!(!ws.auto_start_allowed());
    }
}
