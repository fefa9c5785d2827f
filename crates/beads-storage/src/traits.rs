// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! The `Storage` and `RemoteStorage` traits — the public API for issue
//! persistence. Scoped to issue CRUD, dependencies, labels, comments,
//! ready-work queries, and config/metadata rather than the broader contract
//! of a general-purpose tracker; operations like statistics, dependency-tree
//! traversal, or transactions are left out rather than carried as dead
//! surface.

use std::collections::HashMap;

use beads_core::{Comment, Dependency, Issue, IssueFilter, MutationEvent, WorkFilter};

use crate::error::Result;

/// Typed partial-update struct for `UpdateIssue`. Only `Some` fields are
/// applied; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdates {
    pub title: Option<String>,
    pub description: Option<String>,
    pub design: Option<String>,
    pub notes: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub status: Option<beads_core::Status>,
    pub priority: Option<u8>,
    pub kind: Option<beads_core::IssueKind>,
    pub assignee: Option<Option<String>>,
    pub external_ref: Option<Option<String>>,
    pub estimate_minutes: Option<Option<u32>>,
    pub defer_until: Option<Option<chrono::DateTime<chrono::Utc>>>,
    pub pinned: Option<bool>,
}

/// A dependency edge paired with the related issue, for
/// `AddDependency`/`GetAllDependencyRecords` callers that want the issue
/// alongside the raw edge without a second round trip.
#[derive(Debug, Clone)]
pub struct IssueWithDependency {
    pub issue: Issue,
    pub dependency: Dependency,
}

/// Result of [`Storage::set_state`]: the `dimension:value` label's prior
/// value (if any), the value it now holds, the id of the `StateChange`
/// event that recorded the transition, and whether anything actually
/// changed (writing the same value twice is a no-op, `changed: false`,
/// but still echoes back the current state).
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub old: Option<String>,
    pub new: String,
    pub event_id: i64,
    pub changed: bool,
}

/// Primary storage interface for issue persistence. Object-safe so a
/// caller can hold `Arc<dyn Storage>` without knowing the concrete
/// backend.
pub trait Storage: Send + Sync {
    /// Creates a new issue, assigning its ID if not already set, and
    /// appends a `Create` event. Refuses `ephemeral: true` issues
    /// with `StoreErrorKind::InvalidArgument`.
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<Issue>;

    fn get_issue(&self, id: &str) -> Result<Issue>;

    /// Resolves a (possibly partial, unique-prefix) ID or external ref.
    /// Returns `Ambiguous` on multiple matches, `NotFound` on zero.
    fn resolve_id(&self, partial: &str) -> Result<String>;

    fn search_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>>;

    /// Applies partial updates, recomputes `content_hash`, bumps
    /// `updated_at`, and appends an `Update` event.
    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<Issue>;

    /// Sets `status = Closed`, `closed_at = now`, appends a `Close` event.
    fn close_issue(&self, id: &str, actor: &str) -> Result<Issue>;

    /// Sets `status = Tombstone`, `deleted_at = now`, records
    /// `deleted_by`/`delete_reason`, appends a `Tombstone` event.
    fn tombstone_issue(&self, id: &str, actor: &str, reason: Option<&str>) -> Result<Issue>;

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()>;

    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()>;

    fn get_all_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>>;

    /// Every dependency edge in the store, in one call. Used by the sync
    /// pipeline's export phase so populating an exported issue's
    /// dependencies is a single query rather than one per issue.
    fn all_dependencies(&self) -> Result<Vec<Dependency>>;

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()>;

    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()>;

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>>;

    /// Atomically rewrites the `dimension:value` label tracking a state
    /// dimension and appends the corresponding `StateChange` event as a
    /// single transaction. Last-writer-wins on concurrent calls
    /// for the same dimension; both events are recorded regardless.
    fn set_state(
        &self,
        issue_id: &str,
        dimension: &str,
        new_value: &str,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<StateUpdate>;

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment>;

    /// Merges `incoming` comments into `issue_id`'s comment list, deduping
    /// by [`Comment::merge_key`] and preserving each comment's original
    /// `created_at`. Unlike [`Storage::add_comment`], the timestamp is not
    /// restamped to now — needed by the sync pipeline's pull-first merge
    /// so a remote comment's original time survives round-trips.
    fn merge_comments(&self, issue_id: &str, incoming: &[Comment]) -> Result<()>;

    /// Returns issues ready to work on: open, not blocked by an open
    /// blocking dependency, not deferred, not a template.
    fn get_ready_work(&self, filter: &WorkFilter) -> Result<Vec<Issue>>;

    /// Generates the next unused `<parent_id>.<n>` child ID.
    fn get_next_child_id(&self, parent_id: &str) -> Result<String>;

    fn get_config(&self, key: &str) -> Result<Option<String>>;

    fn set_config(&self, key: &str, value: &str) -> Result<()>;

    fn get_all_config(&self) -> Result<HashMap<String, String>>;

    fn get_metadata(&self, key: &str) -> Result<Option<String>>;

    fn set_metadata(&self, key: &str, value: &str) -> Result<()>;

    fn get_all_events_since(&self, since_id: i64) -> Result<Vec<MutationEvent>>;

    /// Clears the dirty-since-last-export bit for the given IDs, called
    /// by the flush manager only after the export file is durable.
    fn clear_dirty_issues_by_id(&self, ids: &[String]) -> Result<()>;

    fn dirty_issue_ids(&self) -> Result<Vec<String>>;

    /// Forces a checkpoint (snapshot + WAL truncation) now, used by
    /// orderly daemon shutdown.
    fn checkpoint(&self) -> Result<()>;

    /// Downcasts to the `RemoteStorage` capability, if this backend has
    /// one. Capability discrimination by structure, not inheritance.
    fn as_remote(&self) -> Option<&dyn RemoteStorage> {
        None
    }
}

/// Capability implemented only by version-controlled backends
/// (`GitStore`). Exposed via [`Storage::as_remote`] rather than a
/// downcast on the concrete type.
pub trait RemoteStorage: Send + Sync {
    fn commit(&self, message: &str) -> Result<String>;
    fn push(&self) -> Result<()>;
    fn pull(&self) -> Result<()>;
    fn branch(&self, name: &str) -> Result<()>;
    fn current_branch(&self) -> Result<String>;
    fn merge(&self, branch: &str) -> Result<()>;
    fn history(&self, path: &str, limit: usize) -> Result<Vec<String>>;
    fn as_of(&self, commit: &str, path: &str) -> Result<Vec<u8>>;
    fn diff(&self, from: &str, to: &str, path: &str) -> Result<String>;
    fn get_current_commit(&self) -> Result<String>;
    fn get_conflicts(&self) -> Result<Vec<String>>;
    fn resolve_conflicts(&self, path: &str) -> Result<()>;
}
