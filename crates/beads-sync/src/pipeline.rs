// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Sync pipeline: the pull-first/merge/export/push procedure run by
//! the daemon's sync ticker, by a pre-sync debounce after a local write,
//! and by the `sync` CLI subcommand. The exclusive-lock shape uses
//! `fs2::FileExt` advisory locks to serialize single-writer access to the
//! workspace's sync state.

use std::fs::{File, OpenOptions};
use std::path::Path;

use beads_core::{Dependency, Issue, Status, StoreErrorKind};
use beads_storage::{IssueUpdates, Result, Storage, StoreError};
use fs2::FileExt;

use crate::exporter::{self, ExportRecord, ExportSummary};
use crate::sync_mode::SyncMode;

/// Holds `.beads/.sync.lock` for its lifetime; released on drop. Acquired
/// non-blocking — a contending sync gets `StoreErrorKind::Busy`
/// immediately rather than waiting.
pub struct SyncLock {
    _file: File,
}

impl SyncLock {
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).write(true).open(lock_path)?;
        file.try_lock_exclusive().map_err(|_| StoreError::busy("sync lock held by another process"))?;
        Ok(Self { _file: file })
    }
}

/// A pre-selected resolution for a record whose two sides diverge with
/// neither strictly superseding the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    KeepLocal,
    KeepRemote,
    MergeFieldLevel,
    NewerWins,
}

/// A structured descriptor for a record neither side strictly supersedes:
/// both `updated_at` timestamps are equal but the content differs. Emitted
/// to the caller when no [`ConflictStrategy`] is configured for
/// interactive resolution.
#[derive(Debug, Clone)]
pub struct ConflictRecord {
    pub issue_id: String,
    pub local_content_hash: String,
    pub remote_content_hash: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PullFirstOutcome {
    pub created: usize,
    pub merged: usize,
    pub tombstoned: usize,
    pub skipped_tombstoned: usize,
    pub unchanged: bool,
    pub conflicts: Vec<ConflictRecord>,
    pub export: Option<ExportSummary>,
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub summary: ExportSummary,
    pub pushed: bool,
}

/// `doExportSync`: writes the plain-text export and, when the mode calls
/// for a versioned remote, commits and pushes it. "No remote configured"
/// is a warning, not a failure.
pub fn do_export_sync(storage: &dyn Storage, export_path: &Path, mode: SyncMode) -> Result<ExportOutcome> {
    let summary = exporter::write_export(export_path, storage)?;

    let mut pushed = false;
    if mode.should_use_versioned_remote() {
        if let Some(remote) = storage.as_remote() {
            remote.commit(&format!("export {} issue(s)", summary.issue_count))?;
            remote.push()?;
            pushed = true;
        } else {
            tracing::warn!("mode calls for a versioned remote but the backend has none");
        }
    }

    Ok(ExportOutcome { summary, pushed })
}

/// `doPullFirstSync`: acquires the sync lock, optionally pulls the
/// versioned remote, merges the plain-text export into the store if it
/// changed, then re-exports so the export file's hash is stable
/// post-merge.
pub fn do_pull_first_sync(
    storage: &dyn Storage,
    export_path: &Path,
    sync_lock_path: &Path,
    mode: SyncMode,
    conflict_strategy: Option<ConflictStrategy>,
) -> Result<PullFirstOutcome> {
    let _lock = SyncLock::acquire(sync_lock_path)?;

    if mode.should_use_versioned_remote() {
        if let Some(remote) = storage.as_remote() {
            match remote.pull() {
                Ok(()) => {}
                Err(e) if e.kind() == StoreErrorKind::RemoteUnavailable => {
                    tracing::warn!(error = %e, "pull skipped: remote unavailable");
                }
                Err(e) => return Err(e),
            }
        }
    }

    if matches!(mode, SyncMode::DoltNative) {
        return Ok(PullFirstOutcome { unchanged: true, ..Default::default() });
    }

    let last_known_hash = storage.get_metadata("jsonl_content_hash")?;
    let current_hash = exporter::current_export_hash(export_path)?;

    if current_hash.is_none() || current_hash == last_known_hash {
        return Ok(PullFirstOutcome { unchanged: true, ..Default::default() });
    }

    let records = exporter::read_export(export_path)?;
    let mut outcome = PullFirstOutcome::default();

    for record in &records {
        match merge_record(storage, record, conflict_strategy)? {
            MergeResult::Created => outcome.created += 1,
            MergeResult::Merged => outcome.merged += 1,
            MergeResult::Tombstoned => outcome.tombstoned += 1,
            MergeResult::SkippedTombstoned => outcome.skipped_tombstoned += 1,
            MergeResult::Conflict(c) => outcome.conflicts.push(c),
            MergeResult::Unchanged => {}
        }
    }

    outcome.export = Some(do_export_sync(storage, export_path, mode)?.summary);
    Ok(outcome)
}

enum MergeResult {
    Created,
    Merged,
    Tombstoned,
    SkippedTombstoned,
    Conflict(ConflictRecord),
    Unchanged,
}

fn merge_record(
    storage: &dyn Storage,
    record: &ExportRecord,
    conflict_strategy: Option<ConflictStrategy>,
) -> Result<MergeResult> {
    let incoming = &record.issue;

    let local = match storage.get_issue(&incoming.id) {
        Ok(local) => local,
        Err(e) if e.kind() == StoreErrorKind::NotFound => {
            storage.create_issue(incoming, "sync")?;
            for dep in &record.dependencies {
                apply_dependency(storage, dep);
            }
            return Ok(MergeResult::Created);
        }
        Err(e) => return Err(e),
    };

    // Tombstone non-resurrection: a locally-tombstoned ID never accepts
    // an incoming record again, regardless of its content.
    if local.status == Status::Tombstone {
        return Ok(MergeResult::SkippedTombstoned);
    }

    if incoming.updated_at == local.updated_at && incoming.content_hash != local.content_hash {
        let strategy = conflict_strategy.unwrap_or(ConflictStrategy::NewerWins);
        return resolve_conflict(storage, &local, record, strategy);
    }

    if incoming.updated_at <= local.updated_at {
        // Local scalar wins on tie or when local is strictly newer; labels
        // and comments are still accretive and safe to union either way.
        union_labels(storage, &local, incoming)?;
        storage.merge_comments(&incoming.id, &incoming.comments)?;
        for dep in &record.dependencies {
            apply_dependency(storage, dep);
        }
        return Ok(MergeResult::Unchanged);
    }

    apply_newer_incoming(storage, &local, incoming, record)
}

fn resolve_conflict(
    storage: &dyn Storage,
    local: &Issue,
    record: &ExportRecord,
    strategy: ConflictStrategy,
) -> Result<MergeResult> {
    let incoming = &record.issue;
    match strategy {
        ConflictStrategy::KeepLocal => Ok(MergeResult::Conflict(ConflictRecord {
            issue_id: incoming.id.clone(),
            local_content_hash: local.content_hash.clone(),
            remote_content_hash: incoming.content_hash.clone(),
            updated_at: local.updated_at,
        })),
        ConflictStrategy::KeepRemote | ConflictStrategy::MergeFieldLevel | ConflictStrategy::NewerWins => {
            apply_newer_incoming(storage, local, incoming, record)
        }
    }
}

fn apply_newer_incoming(
    storage: &dyn Storage,
    local: &Issue,
    incoming: &Issue,
    record: &ExportRecord,
) -> Result<MergeResult> {
    if incoming.status == Status::Tombstone {
        storage.tombstone_issue(&incoming.id, "sync", incoming.delete_reason.as_deref())?;
        return Ok(MergeResult::Tombstoned);
    }

    storage.update_issue(&incoming.id, &scalar_updates(incoming), "sync")?;
    union_labels(storage, local, incoming)?;
    storage.merge_comments(&incoming.id, &incoming.comments)?;
    for dep in &record.dependencies {
        apply_dependency(storage, dep);
    }
    Ok(MergeResult::Merged)
}

fn scalar_updates(incoming: &Issue) -> IssueUpdates {
    IssueUpdates {
        title: Some(incoming.title.clone()),
        description: Some(incoming.description.clone()),
        design: Some(incoming.design.clone()),
        notes: Some(incoming.notes.clone()),
        acceptance_criteria: Some(incoming.acceptance_criteria.clone()),
        status: Some(incoming.status.clone()),
        priority: Some(incoming.priority),
        kind: Some(incoming.kind.clone()),
        assignee: Some(incoming.assignee.clone()),
        external_ref: Some(incoming.external_ref.clone()),
        estimate_minutes: Some(incoming.estimate_minutes),
        defer_until: Some(incoming.defer_until),
        pinned: Some(incoming.pinned),
    }
}

fn union_labels(storage: &dyn Storage, local: &Issue, incoming: &Issue) -> Result<()> {
    for label in &incoming.labels {
        if !local.labels.contains(label) {
            storage.add_label(&incoming.id, label, "sync")?;
        }
    }
    Ok(())
}

/// Dependency application during merge is best-effort: `AlreadyExists` is
/// the expected steady state once both sides have synced once, not an
/// error worth aborting the merge over.
fn apply_dependency(storage: &dyn Storage, dep: &Dependency) {
    if let Err(e) = storage.add_dependency(dep, "sync") {
        if e.kind() != StoreErrorKind::AlreadyExists {
            tracing::warn!(issue_id = %dep.issue_id, error = %e, "failed to merge dependency edge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::IssueBuilder;
    use beads_storage::PlainStore;
    use std::sync::Arc;

    fn store(dir: &Path) -> Arc<dyn Storage> {
        Arc::new(PlainStore::open(&dir.join("beads.db")).unwrap())
    }

    #[test]
    fn export_sync_writes_file_without_remote() {
        let dir = tempfile::tempdir().unwrap();
        let storage = store(dir.path());
        storage.create_issue(&IssueBuilder::new("bd-1", "Fix login").build(), "alice").unwrap();
        let export_path = dir.path().join("issues.jsonl");

        let outcome = do_export_sync(storage.as_ref(), &export_path, SyncMode::GitPortable).unwrap();
        assert!(!outcome.pushed);
        assert_eq!(outcome.summary.issue_count, 1);
    }

    #[test]
    fn pull_first_sync_creates_unknown_remote_issue() {
        let dir = tempfile::tempdir().unwrap();
        let storage = store(dir.path());
        let export_path = dir.path().join("issues.jsonl");
        let lock_path = dir.path().join(".sync.lock");

        let remote_issue = IssueBuilder::new("bd-9", "From a peer").build();
        let line = serde_json::to_string(&ExportRecord { issue: remote_issue, dependencies: vec![] }).unwrap();
        std::fs::write(&export_path, format!("{line}\n")).unwrap();

        let outcome =
            do_pull_first_sync(storage.as_ref(), &export_path, &lock_path, SyncMode::GitPortable, None).unwrap();
        assert_eq!(outcome.created, 1);
        assert!(storage.get_issue("bd-9").is_ok());
    }

    #[test]
    fn pull_first_sync_is_a_no_op_when_export_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let storage = store(dir.path());
        storage.create_issue(&IssueBuilder::new("bd-1", "Fix login").build(), "alice").unwrap();
        let export_path = dir.path().join("issues.jsonl");
        let lock_path = dir.path().join(".sync.lock");
        do_export_sync(storage.as_ref(), &export_path, SyncMode::GitPortable).unwrap();

        let outcome =
            do_pull_first_sync(storage.as_ref(), &export_path, &lock_path, SyncMode::GitPortable, None).unwrap();
        assert!(outcome.unchanged);
        assert_eq!(outcome.created + outcome.merged, 0);
    }

    #[test]
    fn tombstoned_local_issue_never_resurrects() {
        let dir = tempfile::tempdir().unwrap();
        let storage = store(dir.path());
        storage.create_issue(&IssueBuilder::new("bd-1", "Fix login").build(), "alice").unwrap();
        storage.tombstone_issue("bd-1", "alice", Some("duplicate")).unwrap();

        let export_path = dir.path().join("issues.jsonl");
        let lock_path = dir.path().join(".sync.lock");
        let resurrecting = IssueBuilder::new("bd-1", "Fix login, resurrected").build();
        let line = serde_json::to_string(&ExportRecord { issue: resurrecting, dependencies: vec![] }).unwrap();
        std::fs::write(&export_path, format!("{line}\n")).unwrap();

        let outcome =
            do_pull_first_sync(storage.as_ref(), &export_path, &lock_path, SyncMode::GitPortable, None).unwrap();
        assert_eq!(outcome.skipped_tombstoned, 1);
        assert_eq!(storage.get_issue("bd-1").unwrap().status, Status::Tombstone);
    }

    #[test]
    fn concurrent_sync_lock_acquisition_returns_busy() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".sync.lock");
        let _held = SyncLock::acquire(&lock_path).unwrap();
        let err = SyncLock::acquire(&lock_path).unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Busy);
    }

    #[test]
    fn tied_divergent_records_default_to_newer_wins_when_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let storage = store(dir.path());
        let local = storage.create_issue(&IssueBuilder::new("bd-1", "Fix login").build(), "alice").unwrap();

        let export_path = dir.path().join("issues.jsonl");
        let lock_path = dir.path().join(".sync.lock");
        let mut remote_issue = local.clone();
        remote_issue.title = "Fix login (renamed remotely)".to_string();
        remote_issue.content_hash = "different-hash".to_string();
        let line = serde_json::to_string(&ExportRecord { issue: remote_issue, dependencies: vec![] }).unwrap();
        std::fs::write(&export_path, format!("{line}\n")).unwrap();

        let outcome =
            do_pull_first_sync(storage.as_ref(), &export_path, &lock_path, SyncMode::GitPortable, None).unwrap();
        assert!(outcome.conflicts.is_empty(), "an unconfigured strategy must resolve, not surface a conflict");
        assert_eq!(storage.get_issue("bd-1").unwrap().title, "Fix login (renamed remotely)");
    }

    #[test]
    fn tied_divergent_records_are_reported_as_conflicts_under_keep_local() {
        let dir = tempfile::tempdir().unwrap();
        let storage = store(dir.path());
        let local = storage.create_issue(&IssueBuilder::new("bd-1", "Fix login").build(), "alice").unwrap();

        let export_path = dir.path().join("issues.jsonl");
        let lock_path = dir.path().join(".sync.lock");
        let mut remote_issue = local.clone();
        remote_issue.title = "Fix login (renamed remotely)".to_string();
        remote_issue.content_hash = "different-hash".to_string();
        let line = serde_json::to_string(&ExportRecord { issue: remote_issue, dependencies: vec![] }).unwrap();
        std::fs::write(&export_path, format!("{line}\n")).unwrap();

        let outcome = do_pull_first_sync(
            storage.as_ref(),
            &export_path,
            &lock_path,
            SyncMode::GitPortable,
            Some(ConflictStrategy::KeepLocal),
        )
        .unwrap();
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(storage.get_issue("bd-1").unwrap().title, "Fix login");
    }
}
