// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! `PlainStore`: the WAL + snapshot backed [`Storage`] implementation
//! used by every sync mode except the versioned ones (`GitStore` wraps
//! this same machinery and adds `RemoteStorage` on top).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use beads_core::{
    compute_content_hash, Comment, Dependency, Issue, IssueFilter, MutationEvent, Status, WorkFilter,
};
use beads_core::{EventType, StoreErrorKind};
use chrono::Utc;
use parking_lot::Mutex;

use crate::checkpoint::Checkpointer;
use crate::error::StoreError;
use crate::snapshot::Snapshot;
use crate::state::{MaterializedState, WalOp};
use crate::traits::{IssueUpdates, Storage};
use crate::wal::Wal;

/// Bound on dependency-cycle traversal depth:
/// a `parent-child` insert that would require visiting more than this
/// many nodes to detect a cycle is rejected rather than traversed
/// unboundedly.
const CYCLE_CHECK_LIMIT: usize = 100;

struct Inner {
    state: MaterializedState,
    wal: Wal,
}

pub struct PlainStore {
    inner: Mutex<Inner>,
    snapshot_path: PathBuf,
    checkpointer: Checkpointer,
}

impl PlainStore {
    /// Opens (or creates) a store rooted at `db_dir` (conventionally
    /// `.beads/beads.db/`), loading the latest snapshot and replaying any
    /// WAL entries written after it.
    pub fn open(db_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(db_dir)?;
        let snapshot_path = db_dir.join("snapshot.json.zst");
        let wal_path = db_dir.join("wal.jsonl");

        let snapshot = crate::checkpoint::load_snapshot(&snapshot_path)
            .map_err(|e| StoreError::with_source(StoreErrorKind::Internal, "loading snapshot", e))?;

        let (mut state, processed_seq) = match snapshot {
            Some(Snapshot { state, seq, .. }) => (state, seq),
            None => (MaterializedState::default(), 0),
        };

        let mut wal =
            Wal::open(&wal_path, processed_seq).map_err(|e| StoreError::with_source(StoreErrorKind::Internal, "opening WAL", e))?;

        for entry in wal
            .entries_after(processed_seq)
            .map_err(|e| StoreError::with_source(StoreErrorKind::Internal, "replaying WAL", e))?
        {
            apply_entry(&mut state, &entry.op, entry.event.as_ref());
        }
        wal.mark_processed(wal.write_seq());

        let checkpointer = Checkpointer::new(snapshot_path.clone());

        Ok(Self { inner: Mutex::new(Inner { state, wal }), snapshot_path, checkpointer })
    }

    /// Appends `op` (the actual state delta) and, for user-visible
    /// mutations, `event` to the WAL and materialized state. Every
    /// mutation goes through here so the WAL record carries enough to
    /// reconstruct the issue on replay, not just the event describing it
    /// (see [`crate::state::WalOp`]'s doc comment for why that distinction
    /// matters), and so the event log's id sequence stays the single
    /// source of truth.
    fn append(&self, inner: &mut Inner, op: WalOp, event: Option<MutationEvent>) -> Result<Option<i64>, StoreError> {
        let mut event = event;
        if let Some(e) = event.as_mut() {
            e.id = inner.state.next_event_id();
        }
        let seq = inner
            .wal
            .append(&op, event.as_ref())
            .map_err(|e| StoreError::with_source(StoreErrorKind::Internal, "appending WAL entry", e))?;
        inner
            .wal
            .flush()
            .map_err(|e| StoreError::with_source(StoreErrorKind::Internal, "flushing WAL", e))?;
        apply_entry(&mut inner.state, &op, event.as_ref());
        inner.wal.mark_processed(seq);
        Ok(event.map(|e| e.id))
    }

    /// Convenience wrapper for the common case: a state delta paired with
    /// a real mutation event, returning the event's assigned id.
    fn append_event(&self, inner: &mut Inner, op: WalOp, event: MutationEvent) -> Result<i64, StoreError> {
        Ok(self.append(inner, op, Some(event))?.unwrap_or_default())
    }

    fn require_issue<'a>(state: &'a MaterializedState, id: &str) -> Result<&'a Issue, StoreError> {
        state.issues.get(id).ok_or_else(|| StoreError::not_found(format!("issue {id} not found")))
    }

    /// Depth-bounded check: does inserting `child -> parent` as
    /// `parent-child` create a cycle? Walks existing `parent-child` edges
    /// from `parent` upward, capped at [`CYCLE_CHECK_LIMIT`] nodes.
    fn would_cycle(state: &MaterializedState, child: &str, parent: &str) -> bool {
        if child == parent {
            return true;
        }
        let mut frontier = vec![parent.to_string()];
        let mut visited = std::collections::HashSet::new();
        while let Some(node) = frontier.pop() {
            if visited.len() > CYCLE_CHECK_LIMIT {
                return true;
            }
            if node == child {
                return true;
            }
            if !visited.insert(node.clone()) {
                continue;
            }
            for dep in state.dependencies_of(&node) {
                if dep.dep_type == beads_core::DependencyType::ParentChild {
                    frontier.push(dep.depends_on_id.clone());
                }
            }
        }
        false
    }
}

/// Applies one WAL entry's state delta and, if present, its event. The
/// single function used both for live writes (via `PlainStore::append`)
/// and for replaying the WAL on open, so the two code paths cannot
/// diverge.
fn apply_entry(state: &mut MaterializedState, op: &WalOp, event: Option<&MutationEvent>) {
    state.apply_op(op);
    if let Some(event) = event {
        state.events.push(event.clone());
    }
}

/// Bound on ID-generation retries before giving up on a collision run
/// that the adaptive token length should make effectively impossible.
const ID_GENERATION_ATTEMPTS: u64 = 10;

impl Storage for PlainStore {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<Issue, StoreError> {
        if issue.ephemeral {
            return Err(StoreError::invalid_argument("ephemeral issues cannot be persisted"));
        }
        let mut inner = self.inner.lock();
        let mut issue = issue.clone();
        if issue.id.is_empty() {
            let prefix = inner.state.config.get("issue_prefix").cloned().unwrap_or_else(|| "bd".to_string());
            let existing_count = inner.state.issues.len() as u64;
            let timestamp_nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
            let mut candidate = None;
            for nonce in 0..ID_GENERATION_ATTEMPTS {
                let id = beads_core::generate_issue_id(&prefix, &issue.title, actor, timestamp_nanos, existing_count, nonce);
                if !inner.state.issues.contains_key(&id) {
                    candidate = Some(id);
                    break;
                }
            }
            issue.id = candidate.ok_or_else(|| {
                StoreError::internal(format!("could not generate a unique id after {ID_GENERATION_ATTEMPTS} attempts"))
            })?;
        } else if inner.state.issues.contains_key(&issue.id) {
            return Err(StoreError::already_exists(format!("issue {} already exists", issue.id)));
        }
        issue.content_hash = compute_content_hash(&issue);
        self.append_event(
            &mut inner,
            WalOp::UpsertIssue(issue.clone()),
            MutationEvent::new(EventType::Create, &issue.id, &issue.title, actor, Utc::now()),
        )?;
        Ok(issue)
    }

    fn get_issue(&self, id: &str) -> Result<Issue, StoreError> {
        let inner = self.inner.lock();
        Self::require_issue(&inner.state, id).cloned()
    }

    fn resolve_id(&self, partial: &str) -> Result<String, StoreError> {
        let inner = self.inner.lock();
        if inner.state.issues.contains_key(partial) {
            return Ok(partial.to_string());
        }
        let matches: Vec<&String> = inner.state.issues.keys().filter(|id| id.starts_with(partial)).collect();
        match matches.len() {
            0 => Err(StoreError::not_found(format!("no issue matches {partial}"))),
            1 => Ok(matches[0].clone()),
            _ => Err(StoreError::ambiguous(format!("{} issues match {partial}", matches.len()))),
        }
    }

    fn search_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>, StoreError> {
        let inner = self.inner.lock();
        let now = Utc::now();
        let mut results: Vec<Issue> = inner
            .state
            .issues
            .values()
            .filter(|issue| {
                if !filter.include_tombstones && issue.status == Status::Tombstone {
                    return false;
                }
                if !filter.include_deferred && issue.is_deferred(now) {
                    return false;
                }
                if let Some(status) = &filter.status {
                    if &issue.status != status {
                        return false;
                    }
                }
                if let Some(assignee) = &filter.assignee {
                    if issue.assignee.as_deref() != Some(assignee.as_str()) {
                        return false;
                    }
                }
                if let Some(priority) = filter.priority {
                    if issue.priority != priority {
                        return false;
                    }
                }
                if let Some(is_template) = filter.is_template {
                    if issue.is_template != is_template {
                        return false;
                    }
                }
                filter.labels.iter().all(|l| issue.labels.contains(l))
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| {
            a.priority.cmp(&b.priority).then_with(|| b.updated_at.cmp(&a.updated_at)).then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<Issue, StoreError> {
        let mut inner = self.inner.lock();
        let mut issue = Self::require_issue(&inner.state, id)?.clone();

        let old_status = issue.status.clone();

        if let Some(v) = &updates.title {
            issue.title = v.clone();
        }
        if let Some(v) = &updates.description {
            issue.description = v.clone();
        }
        if let Some(v) = &updates.design {
            issue.design = v.clone();
        }
        if let Some(v) = &updates.notes {
            issue.notes = v.clone();
        }
        if let Some(v) = &updates.acceptance_criteria {
            issue.acceptance_criteria = v.clone();
        }
        if let Some(v) = &updates.status {
            issue.status = v.clone();
        }
        if let Some(v) = updates.priority {
            issue.priority = v;
        }
        if let Some(v) = &updates.kind {
            issue.kind = v.clone();
        }
        if let Some(v) = &updates.assignee {
            issue.assignee = v.clone();
        }
        if let Some(v) = &updates.external_ref {
            issue.external_ref = v.clone();
        }
        if let Some(v) = updates.estimate_minutes {
            issue.estimate_minutes = v;
        }
        if let Some(v) = updates.defer_until {
            issue.defer_until = v;
        }
        if let Some(v) = updates.pinned {
            issue.pinned = v;
        }

        if issue.status != old_status && issue.status.requires_terminal_timestamp() && issue.closed_at.is_none() {
            issue.closed_at = Some(Utc::now());
        }

        issue.updated_at = Utc::now();
        issue.content_hash = compute_content_hash(&issue);

        let event_type = if issue.status != old_status { EventType::StatusChange } else { EventType::Update };
        let mut event = MutationEvent::new(event_type, &issue.id, &issue.title, actor, Utc::now());
        if issue.status != old_status {
            event = event.with_status_change(Some(old_status), Some(issue.status.clone()));
        }
        self.append_event(&mut inner, WalOp::UpsertIssue(issue.clone()), event)?;
        Ok(issue)
    }

    fn close_issue(&self, id: &str, actor: &str) -> Result<Issue, StoreError> {
        let mut inner = self.inner.lock();
        let mut issue = Self::require_issue(&inner.state, id)?.clone();
        let old_status = issue.status.clone();
        issue.status = Status::Closed;
        issue.closed_at = Some(Utc::now());
        issue.updated_at = Utc::now();
        issue.content_hash = compute_content_hash(&issue);
        let event = MutationEvent::new(EventType::Close, &issue.id, &issue.title, actor, Utc::now())
            .with_status_change(Some(old_status), Some(Status::Closed));
        self.append_event(&mut inner, WalOp::UpsertIssue(issue.clone()), event)?;
        Ok(issue)
    }

    fn tombstone_issue(&self, id: &str, actor: &str, reason: Option<&str>) -> Result<Issue, StoreError> {
        let mut inner = self.inner.lock();
        let mut issue = Self::require_issue(&inner.state, id)?.clone();
        let old_status = issue.status.clone();
        issue.status = Status::Tombstone;
        issue.deleted_at = Some(Utc::now());
        issue.deleted_by = Some(actor.to_string());
        issue.delete_reason = reason.map(str::to_string);
        issue.updated_at = Utc::now();
        issue.content_hash = compute_content_hash(&issue);
        let event = MutationEvent::new(EventType::Tombstone, &issue.id, &issue.title, actor, Utc::now())
            .with_status_change(Some(old_status), Some(Status::Tombstone));
        self.append_event(&mut inner, WalOp::UpsertIssue(issue.clone()), event)?;
        Ok(issue)
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::require_issue(&inner.state, &dep.issue_id)?;
        if let beads_core::DependencyTarget::Local(target) = dep.target() {
            Self::require_issue(&inner.state, &target)?;
            if dep.dep_type == beads_core::DependencyType::ParentChild
                && Self::would_cycle(&inner.state, &dep.issue_id, &target)
            {
                return Err(StoreError::invalid_argument("dependency would introduce a parent-child cycle"));
            }
        }
        if inner.state.dependencies.contains(dep) {
            return Ok(());
        }
        let title = inner.state.issues.get(&dep.issue_id).map(|i| i.title.clone()).unwrap_or_default();
        self.append_event(
            &mut inner,
            WalOp::AddDependency(dep.clone()),
            MutationEvent::new(EventType::DependencyAdded, &dep.issue_id, title, actor, Utc::now()),
        )?;
        Ok(())
    }

    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let exists = inner.state.dependencies.iter().any(|d| d.issue_id == issue_id && d.depends_on_id == depends_on_id);
        if !exists {
            return Err(StoreError::not_found("dependency not found"));
        }
        let title = inner.state.issues.get(issue_id).map(|i| i.title.clone()).unwrap_or_default();
        self.append_event(
            &mut inner,
            WalOp::RemoveDependency { issue_id: issue_id.to_string(), depends_on_id: depends_on_id.to_string() },
            MutationEvent::new(EventType::DependencyRemoved, issue_id, title, actor, Utc::now()),
        )?;
        Ok(())
    }

    fn get_all_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.state.dependencies_of(issue_id).cloned().collect())
    }

    fn all_dependencies(&self) -> Result<Vec<Dependency>, StoreError> {
        Ok(self.inner.lock().state.dependencies.clone())
    }

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let mut issue = Self::require_issue(&inner.state, issue_id)?.clone();
        if issue.labels.iter().any(|l| l == label) {
            return Ok(());
        }
        issue.labels.push(label.to_string());
        issue.content_hash = compute_content_hash(&issue);
        self.append_event(
            &mut inner,
            WalOp::UpsertIssue(issue.clone()),
            MutationEvent::new(EventType::LabelAdded, issue_id, &issue.title, actor, Utc::now())
                .with_labels(vec![label.to_string()]),
        )?;
        Ok(())
    }

    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let mut issue = Self::require_issue(&inner.state, issue_id)?.clone();
        let before = issue.labels.len();
        issue.labels.retain(|l| l != label);
        if issue.labels.len() == before {
            return Err(StoreError::not_found(format!("label {label} not present on {issue_id}")));
        }
        issue.content_hash = compute_content_hash(&issue);
        self.append_event(
            &mut inner,
            WalOp::UpsertIssue(issue.clone()),
            MutationEvent::new(EventType::LabelRemoved, issue_id, &issue.title, actor, Utc::now())
                .with_labels(vec![label.to_string()]),
        )?;
        Ok(())
    }

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock();
        Ok(Self::require_issue(&inner.state, issue_id)?.labels.clone())
    }

    fn set_state(
        &self,
        issue_id: &str,
        dimension: &str,
        new_value: &str,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<crate::traits::StateUpdate, StoreError> {
        let mut inner = self.inner.lock();
        let mut issue = Self::require_issue(&inner.state, issue_id)?.clone();
        let dimension_prefix = format!("{dimension}:");
        let old = issue.labels.iter().find_map(|l| l.strip_prefix(&dimension_prefix).map(str::to_string));

        if old.as_deref() == Some(new_value) {
            let event_id = inner.state.events.iter().rev().find(|e| e.issue_id == issue_id).map(|e| e.id).unwrap_or(0);
            return Ok(crate::traits::StateUpdate { old, new: new_value.to_string(), event_id, changed: false });
        }

        issue.labels.retain(|l| !l.starts_with(&dimension_prefix));
        issue.labels.push(format!("{dimension}:{new_value}"));
        issue.content_hash = compute_content_hash(&issue);

        let mut event = MutationEvent::new(EventType::StateChange, issue_id, &issue.title, actor, Utc::now())
            .with_labels(vec![format!("{dimension}:{new_value}")]);
        if let Some(reason) = reason {
            event = event.with_payload(reason.to_string());
        }
        let event_id = self.append_event(&mut inner, WalOp::UpsertIssue(issue.clone()), event)?;

        Ok(crate::traits::StateUpdate { old, new: new_value.to_string(), event_id, changed: true })
    }

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment, StoreError> {
        let mut inner = self.inner.lock();
        let mut issue = Self::require_issue(&inner.state, issue_id)?.clone();
        let comment = Comment::new(author, text, Utc::now());
        issue.comments.push(comment.clone());
        issue.content_hash = compute_content_hash(&issue);
        self.append_event(
            &mut inner,
            WalOp::UpsertIssue(issue.clone()),
            MutationEvent::new(EventType::Comment, issue_id, &issue.title, author, Utc::now()),
        )?;
        Ok(comment)
    }

    fn merge_comments(&self, issue_id: &str, incoming: &[Comment]) -> Result<(), StoreError> {
        if incoming.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        let mut issue = Self::require_issue(&inner.state, issue_id)?.clone();

        let existing_keys: std::collections::HashSet<(String, i64)> =
            issue.comments.iter().map(|c| (c.author.clone(), c.created_at.timestamp())).collect();

        let mut appended = 0usize;
        for comment in incoming {
            let key = (comment.author.clone(), comment.created_at.timestamp());
            if existing_keys.contains(&key) {
                continue;
            }
            issue.comments.push(comment.clone());
            appended += 1;
        }
        if appended == 0 {
            return Ok(());
        }

        issue.comments.sort_by_key(|c| c.created_at);
        issue.content_hash = compute_content_hash(&issue);
        self.append_event(
            &mut inner,
            WalOp::UpsertIssue(issue.clone()),
            MutationEvent::new(EventType::Comment, issue_id, &issue.title, "sync", Utc::now())
                .with_payload(format!("merged {appended} comment(s) from remote")),
        )?;
        Ok(())
    }

    fn get_ready_work(&self, filter: &WorkFilter) -> Result<Vec<Issue>, StoreError> {
        let inner = self.inner.lock();
        let now = Utc::now();
        let mut results: Vec<Issue> = inner
            .state
            .issues
            .values()
            .filter(|issue| {
                if issue.status != Status::Open && issue.status != Status::InProgress {
                    return false;
                }
                if issue.is_template {
                    return false;
                }
                if !filter.include_deferred && issue.is_deferred(now) {
                    return false;
                }
                let assignee_ok = match filter.effective_assignee() {
                    beads_core::filter::EffectiveAssignee::None => issue.assignee.is_none(),
                    beads_core::filter::EffectiveAssignee::Some(a) => issue.assignee.as_deref() == Some(a),
                    beads_core::filter::EffectiveAssignee::Any => true,
                };
                let priority_ok = match filter.priority {
                    Some(p) => issue.priority == p,
                    None => true,
                };
                let labels_ok = filter.labels.iter().all(|l| issue.labels.contains(l));
                let not_blocked = !inner.state.dependencies_of(&issue.id).any(|dep| {
                    dep.dep_type.is_blocking()
                        && matches!(
                            inner.state.issues.get(&dep.depends_on_id).map(|b| &b.status),
                            Some(s) if **s != Status::Closed && **s != Status::Tombstone
                        )
                });
                assignee_ok && priority_ok && labels_ok && not_blocked
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(results)
    }

    fn get_next_child_id(&self, parent_id: &str) -> Result<String, StoreError> {
        let inner = self.inner.lock();
        let prefix = format!("{parent_id}.");
        let next = inner
            .state
            .issues
            .keys()
            .filter_map(|id| id.strip_prefix(&prefix))
            .filter_map(|suffix| suffix.parse::<u32>().ok())
            .max()
            .map(|n| n + 1)
            .unwrap_or(1);
        Ok(format!("{parent_id}.{next}"))
    }

    fn get_config(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().state.config.get(key).cloned())
    }

    fn set_config(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        self.append(&mut inner, WalOp::SetConfig { key: key.to_string(), value: value.to_string() }, None)?;
        Ok(())
    }

    fn get_all_config(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.inner.lock().state.config.clone())
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().state.metadata.get(key).cloned())
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        self.append(&mut inner, WalOp::SetMetadata { key: key.to_string(), value: value.to_string() }, None)?;
        Ok(())
    }

    fn get_all_events_since(&self, since_id: i64) -> Result<Vec<MutationEvent>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.state.events.iter().filter(|e| e.id > since_id).cloned().collect())
    }

    fn clear_dirty_issues_by_id(&self, ids: &[String]) -> Result<(), StoreError> {
        self.inner.lock().state.clear_dirty(ids);
        Ok(())
    }

    fn dirty_issue_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.lock().state.dirty_issue_ids.iter().cloned().collect())
    }

    fn checkpoint(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let seq = inner.wal.write_seq();
        let result = self
            .checkpointer
            .checkpoint_sync(seq, &inner.state)
            .map_err(|e| StoreError::with_source(StoreErrorKind::Internal, "checkpoint failed", e))?;
        inner
            .wal
            .truncate_before(result.seq + 1)
            .map_err(|e| StoreError::with_source(StoreErrorKind::Internal, "truncating WAL", e))?;
        let _ = &self.snapshot_path;
        Ok(())
    }
}
