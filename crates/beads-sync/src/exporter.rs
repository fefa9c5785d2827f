// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! The plain-text export writer shared by the flush manager and the
//! sync pipeline: one JSONL record per issue, written atomically.
//! Uses the same durability ordering as `beads-storage::checkpoint` — temp
//! file → fsync → rename → fsync directory — applied here to the export
//! file instead of the snapshot.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use beads_core::{Dependency, Issue, IssueFilter};
use beads_storage::{Result, Storage, StoreError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One line of the export file: an issue plus its outgoing dependency
/// edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord {
    #[serde(flatten)]
    pub issue: Issue,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub content_hash: String,
    pub issue_count: usize,
}

/// Writes every issue (including tombstones, including deferred ones) to
/// `path` as one JSON record per line, atomically. Refuses to overwrite a
/// non-empty existing export with zero rows.
pub fn write_export(path: &Path, storage: &dyn Storage) -> Result<ExportSummary> {
    let issues = storage.search_issues(&IssueFilter {
        include_tombstones: true,
        include_deferred: true,
        ..Default::default()
    })?;

    if issues.is_empty() && existing_export_is_nonempty(path) {
        return Err(StoreError::internal(format!(
            "refusing to export 0 issues over non-empty {}",
            path.display()
        )));
    }

    let mut deps_by_issue: HashMap<String, Vec<Dependency>> = HashMap::new();
    for dep in storage.all_dependencies()? {
        deps_by_issue.entry(dep.issue_id.clone()).or_default().push(dep);
    }

    let mut bytes = Vec::new();
    for issue in &issues {
        let record = ExportRecord {
            issue: issue.clone(),
            dependencies: deps_by_issue.remove(&issue.id).unwrap_or_default(),
        };
        serde_json::to_writer(&mut bytes, &record)?;
        bytes.push(b'\n');
    }

    write_atomic(path, &bytes)?;

    let content_hash = hex_sha256(&bytes);

    let ids: Vec<String> = issues.iter().map(|i| i.id.clone()).collect();
    storage.clear_dirty_issues_by_id(&ids)?;
    storage.set_metadata("jsonl_content_hash", &content_hash)?;
    storage.set_metadata("last_import_time", &chrono::Utc::now().to_rfc3339())?;

    Ok(ExportSummary { content_hash, issue_count: issues.len() })
}

/// Reads an export file back into records, skipping (and warning about)
/// malformed lines rather than failing the whole read.
pub fn read_export(path: &Path) -> Result<Vec<ExportRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ExportRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(line = lineno + 1, error = %e, "skipping malformed export record"),
        }
    }
    Ok(records)
}

/// SHA-256 over the file's current bytes, for content-hash comparisons
/// against the stored `jsonl_content_hash` metadata.
pub fn current_export_hash(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    Ok(Some(hex_sha256(&bytes)))
}

fn existing_export_is_nonempty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("export")
    ));

    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::IssueBuilder;
    use beads_storage::PlainStore;

    fn store() -> (PlainStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = PlainStore::open(&dir.path().join("beads.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn export_then_read_round_trips_issue_and_dependency() {
        let (store, dir) = store();
        store.create_issue(&IssueBuilder::new("bd-1", "Fix login").build(), "alice").unwrap();
        store.create_issue(&IssueBuilder::new("bd-2", "Search").build(), "alice").unwrap();
        store.add_dependency(&Dependency::new("bd-2", "bd-1"), "alice").unwrap();

        let export_path = dir.path().join("issues.jsonl");
        let summary = write_export(&export_path, &store).unwrap();
        assert_eq!(summary.issue_count, 2);

        let records = read_export(&export_path).unwrap();
        let bd2 = records.iter().find(|r| r.issue.id == "bd-2").unwrap();
        assert_eq!(bd2.dependencies.len(), 1);
        assert_eq!(bd2.dependencies[0].depends_on_id, "bd-1");
    }

    #[test]
    fn refuses_to_wipe_nonempty_export_with_empty_store() {
        let (store, dir) = store();
        let export_path = dir.path().join("issues.jsonl");
        std::fs::write(&export_path, "{\"id\":\"bd-1\"}\n").unwrap();
        let err = write_export(&export_path, &store).unwrap_err();
        assert_eq!(err.kind(), beads_core::StoreErrorKind::Internal);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let (store, dir) = store();
        store.create_issue(&IssueBuilder::new("bd-1", "Fix login").build(), "alice").unwrap();
        let export_path = dir.path().join("issues.jsonl");
        write_export(&export_path, &store).unwrap();

        let mut raw = std::fs::read_to_string(&export_path).unwrap();
        raw.push_str("not json at all\n");
        std::fs::write(&export_path, raw).unwrap();

        let records = read_export(&export_path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].issue.id, "bd-1");
    }
}
