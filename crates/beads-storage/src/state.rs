// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! The complete in-memory materialization of a workspace's issue store:
//! issues, dependencies, labels, comments (embedded on `Issue`), the
//! mutation event log, config, and metadata key/value space. A single
//! snapshot-and-replay unit.

use std::collections::{BTreeMap, HashMap};

use beads_core::{Dependency, Issue, MutationEvent};
use serde::{Deserialize, Serialize};

/// Snapshot format version. Bumped whenever the on-disk shape changes in a
/// way that needs a migration step; no migrations exist yet.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

/// The full state mutation carried by one WAL entry.
///
/// Early revisions of this store logged only the [`MutationEvent`]
/// alongside each write, which carries actor/title/status-change metadata
/// but not the mutated `Issue`/`Dependency`/config value itself. That left
/// WAL replay (crash recovery before the next checkpoint) able to rebuild
/// the event log but not the issues it described. `WalOp` is the actual
/// state delta; it and the optional `MutationEvent` travel together in
/// every WAL record so replay and live application use the same
/// [`MaterializedState::apply_op`] path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalOp {
    UpsertIssue(Issue),
    AddDependency(Dependency),
    RemoveDependency { issue_id: String, depends_on_id: String },
    SetConfig { key: String, value: String },
    SetMetadata { key: String, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializedState {
    /// Issues keyed by ID. `BTreeMap` for stable export iteration order.
    pub issues: BTreeMap<String, Issue>,
    /// Dependency edges, deduplicated by `(issue_id, depends_on_id, dep_type)`.
    pub dependencies: Vec<Dependency>,
    /// Append-only mutation event log, ordered by `id`.
    pub events: Vec<MutationEvent>,
    /// Workspace config key/value space (`issue_prefix`, `sync.mode`, ...).
    pub config: HashMap<String, String>,
    /// Free-form metadata (`jsonl_content_hash`, `last_import_time`, ...).
    pub metadata: HashMap<String, String>,
    /// IDs marked dirty since the last successful export.
    pub dirty_issue_ids: std::collections::HashSet<String>,
    /// `true` once any full (non-incremental) export has ever completed.
    pub full_export_done: bool,
}

impl MaterializedState {
    pub fn next_event_id(&self) -> i64 {
        self.events.last().map(|e| e.id + 1).unwrap_or(1)
    }

    pub fn mark_dirty(&mut self, issue_id: &str) {
        self.dirty_issue_ids.insert(issue_id.to_string());
    }

    pub fn clear_dirty(&mut self, ids: &[String]) {
        for id in ids {
            self.dirty_issue_ids.remove(id);
        }
    }

    pub fn dependencies_of(&self, issue_id: &str) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(move |d| d.issue_id == issue_id)
    }

    pub fn dependents_of(&self, issue_id: &str) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(move |d| d.depends_on_id == issue_id)
    }

    /// Applies a single [`WalOp`] to this state. The only path that
    /// mutates `issues`/`dependencies`/`config`/`metadata`; both live
    /// writes (via `PlainStore::append`) and WAL replay on open go
    /// through here so the two can never diverge.
    pub fn apply_op(&mut self, op: &WalOp) {
        match op {
            WalOp::UpsertIssue(issue) => {
                self.issues.insert(issue.id.clone(), issue.clone());
                self.mark_dirty(&issue.id);
            }
            WalOp::AddDependency(dep) => {
                if !self.dependencies.contains(dep) {
                    self.dependencies.push(dep.clone());
                }
                self.mark_dirty(&dep.issue_id);
            }
            WalOp::RemoveDependency { issue_id, depends_on_id } => {
                self.dependencies.retain(|d| !(&d.issue_id == issue_id && &d.depends_on_id == depends_on_id));
                self.mark_dirty(issue_id);
            }
            WalOp::SetConfig { key, value } => {
                self.config.insert(key.clone(), value.clone());
            }
            WalOp::SetMetadata { key, value } => {
                self.metadata.insert(key.clone(), value.clone());
            }
        }
    }
}
