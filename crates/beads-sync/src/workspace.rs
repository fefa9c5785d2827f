// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Workspace resolver: locates `.beads/`, derives every other
//! workspace-relative path from it, and keeps the Unix-socket path under
//! the OS `sun_path` limit.

use std::path::{Path, PathBuf};

use beads_storage::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Conservative cross-platform ceiling for `sockaddr_un.sun_path`
/// (Linux allows 108 bytes, macOS 104 including the NUL terminator).
const SUN_PATH_LIMIT: usize = 104;

/// `.beads/metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub database: String,
    pub jsonl_export: String,
    pub backend: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            database: "beads.db".to_string(),
            jsonl_export: "issues.jsonl".to_string(),
            backend: "plain".to_string(),
        }
    }
}

/// Every path the daemon and CLI need, derived once from the resolved
/// `.beads/` directory.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub beads_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub config_path: PathBuf,
    pub database_path: PathBuf,
    pub export_path: PathBuf,
    pub events_path: PathBuf,
    pub dolt_dir: PathBuf,
    pub pid_path: PathBuf,
    pub version_path: PathBuf,
    pub log_path: PathBuf,
    pub socket_path: PathBuf,
    pub start_lock_path: PathBuf,
    pub sync_lock_path: PathBuf,
    pub scoreboard_path: PathBuf,
}

impl WorkspacePaths {
    /// Builds the full path set for an already-located (or about-to-be-
    /// created, e.g. by `bd init`) `.beads/` directory.
    pub fn for_beads_dir(beads_dir: PathBuf, metadata: &Metadata) -> Self {
        let socket_path = resolve_socket_path(&beads_dir);
        Self {
            database_path: beads_dir.join(&metadata.database),
            export_path: beads_dir.join(&metadata.jsonl_export),
            dolt_dir: beads_dir.join("dolt"),
            metadata_path: beads_dir.join("metadata.json"),
            config_path: beads_dir.join("config.yaml"),
            events_path: beads_dir.join("events.jsonl"),
            pid_path: beads_dir.join("daemon.pid"),
            version_path: beads_dir.join("daemon.version"),
            log_path: beads_dir.join("daemon.log"),
            start_lock_path: beads_dir.join("bd.sock.startlock"),
            sync_lock_path: beads_dir.join(".sync.lock"),
            scoreboard_path: beads_dir.join("scoreboard.json"),
            socket_path,
            beads_dir,
        }
    }

    /// Walks upward from `start` looking for a `.beads/` directory that
    /// contains `metadata.json`. Ties (multiple qualifying ancestors) are
    /// broken in favor of the closest one, with a warning.
    pub fn resolve_from(start: &Path) -> Result<Option<Self>> {
        let Some(beads_dir) = find_beads_dir(start) else {
            return Ok(None);
        };
        let raw = std::fs::read_to_string(beads_dir.join("metadata.json"))?;
        let metadata: Metadata = serde_json::from_str(&raw)?;
        Ok(Some(Self::for_beads_dir(beads_dir, &metadata)))
    }

    pub fn write_metadata(&self, metadata: &Metadata) -> Result<()> {
        std::fs::create_dir_all(&self.beads_dir)?;
        let raw = serde_json::to_string_pretty(metadata)?;
        std::fs::write(&self.metadata_path, raw)?;
        Ok(())
    }
}

/// Upward walk from `start` for a directory named `.beads` with a
/// `metadata.json` inside it. If a second, more distant candidate exists
/// it is noted with a warning but never preferred over the closest one.
pub fn find_beads_dir(start: &Path) -> Option<PathBuf> {
    let mut closest: Option<PathBuf> = None;
    let mut current = Some(start.to_path_buf());

    while let Some(dir) = current {
        let candidate = dir.join(".beads");
        if candidate.join("metadata.json").is_file() {
            match &closest {
                None => closest = Some(candidate),
                Some(first) => {
                    tracing::warn!(
                        using = %first.display(),
                        also_found = %candidate.display(),
                        "multiple .beads directories in ancestry; using the closest"
                    );
                    break;
                }
            }
        }
        current = dir.parent().map(Path::to_path_buf);
    }
    closest
}

/// Returns `<beads_dir>/bd.sock` unless that path would exceed
/// `sun_path`'s length limit, in which case it falls back to a short
/// hash of the absolute workspace path under the system temp directory.
fn resolve_socket_path(beads_dir: &Path) -> PathBuf {
    let natural = beads_dir.join("bd.sock");
    if natural.as_os_str().len() <= SUN_PATH_LIMIT {
        return natural;
    }
    let hash = short_hash(beads_dir);
    std::env::temp_dir().join(format!("beads-{hash}.sock"))
}

fn short_hash(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let mut s = String::with_capacity(24);
    for b in &digest[..12] {
        use std::fmt::Write as _;
        let _ = write!(s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_from_finds_beads_dir_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        let beads_dir = dir.path().join(".beads");
        std::fs::create_dir_all(&beads_dir).unwrap();
        std::fs::write(beads_dir.join("metadata.json"), serde_json::to_string(&Metadata::default()).unwrap())
            .unwrap();

        let nested = dir.path().join("src/inner");
        std::fs::create_dir_all(&nested).unwrap();

        let paths = WorkspacePaths::resolve_from(&nested).unwrap().unwrap();
        assert_eq!(paths.beads_dir, beads_dir);
        assert_eq!(paths.database_path, beads_dir.join("beads.db"));
    }

    #[test]
    fn resolve_from_returns_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WorkspacePaths::resolve_from(dir.path()).unwrap().is_none());
    }

    #[test]
    fn natural_socket_path_used_when_short_enough() {
        let dir = tempfile::tempdir().unwrap();
        let beads_dir = dir.path().join(".beads");
        let paths = WorkspacePaths::for_beads_dir(beads_dir.clone(), &Metadata::default());
        assert_eq!(paths.socket_path, beads_dir.join("bd.sock"));
    }

    #[test]
    fn long_workspace_path_falls_back_to_hashed_socket() {
        let deeply_nested = PathBuf::from("/").join("a".repeat(40)).join("b".repeat(40)).join("c".repeat(40));
        let beads_dir = deeply_nested.join(".beads");
        let paths = WorkspacePaths::for_beads_dir(beads_dir, &Metadata::default());
        assert!(paths.socket_path.as_os_str().len() <= SUN_PATH_LIMIT);
        assert_eq!(paths.socket_path.parent().unwrap(), std::env::temp_dir());
    }
}
