// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Direct-store operations, used when a command opens the store without
//! a daemon in front of it: either because this workspace's backend
//! disables auto-start or because a daemon that should be
//! reachable isn't. Mirrors `beads_daemon::listener`'s dispatch one
//! request at a time, minus the event bus and agent-pod registry a
//! daemon alone owns.

use beads_core::{Dependency, DependencyType, IssueKind, Status};
use beads_daemon::protocol::{
    issue_json, BusEmitArgs, BusEmitResult, CreateArgs, DecisionInfo, ExportResult, SetStateArgs, SetStateResult,
    UpdateArgs,
};
use beads_storage::{IssueUpdates, Storage, StoreError};
use serde_json::Value;

pub fn create(storage: &dyn Storage, args: CreateArgs) -> Result<Value, StoreError> {
    let mut builder = beads_core::IssueBuilder::new(args.id.unwrap_or_default(), args.title)
        .priority(args.priority)
        .labels(args.labels);
    if let Some(kind) = args.kind {
        builder = builder.kind(IssueKind::from(kind));
    }
    if let Some(assignee) = args.assignee {
        builder = builder.assignee(assignee);
    }
    let mut issue = builder.build();
    issue.description = args.description;
    issue.content_hash = beads_core::compute_content_hash(&issue);
    storage.create_issue(&issue, &args.actor).map(|i| issue_json(&i))
}

pub fn update(storage: &dyn Storage, args: UpdateArgs) -> Result<Value, StoreError> {
    let updates = IssueUpdates {
        title: args.title,
        description: args.description,
        design: args.design,
        notes: args.notes,
        acceptance_criteria: args.acceptance_criteria,
        status: args.status.map(Status::from),
        priority: args.priority,
        kind: args.kind.map(IssueKind::from),
        assignee: args.assignee,
        pinned: args.pinned,
        ..Default::default()
    };
    storage.update_issue(&args.id, &updates, &args.actor).map(|i| issue_json(&i))
}

pub fn show(storage: &dyn Storage, id: &str) -> Result<Value, StoreError> {
    let full = storage.resolve_id(id)?;
    storage.get_issue(&full).map(|i| issue_json(&i))
}

pub fn list(storage: &dyn Storage, filter: beads_core::IssueFilter) -> Result<Vec<Value>, StoreError> {
    Ok(storage.search_issues(&filter)?.iter().map(issue_json).collect())
}

pub fn search(storage: &dyn Storage, query: &str, filter: beads_core::IssueFilter) -> Result<Vec<Value>, StoreError> {
    let query = query.to_lowercase();
    let issues = storage.search_issues(&filter)?;
    Ok(issues
        .into_iter()
        .filter(|i| query.is_empty() || i.title.to_lowercase().contains(&query) || i.description.to_lowercase().contains(&query))
        .map(|i| issue_json(&i))
        .collect())
}

pub fn close(storage: &dyn Storage, id: &str, actor: &str) -> Result<Value, StoreError> {
    let full = storage.resolve_id(id)?;
    storage.close_issue(&full, actor).map(|i| issue_json(&i))
}

pub fn tombstone(storage: &dyn Storage, id: &str, actor: &str, reason: Option<&str>) -> Result<Value, StoreError> {
    let full = storage.resolve_id(id)?;
    storage.tombstone_issue(&full, actor, reason).map(|i| issue_json(&i))
}

pub fn add_dependency(
    storage: &dyn Storage,
    issue_id: &str,
    depends_on_id: &str,
    dep_type: Option<&str>,
    actor: &str,
) -> Result<(), StoreError> {
    let dep = Dependency::new(issue_id, depends_on_id).with_type(dep_type.map(DependencyType::from).unwrap_or_default());
    storage.add_dependency(&dep, actor)
}

pub fn remove_dependency(storage: &dyn Storage, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<(), StoreError> {
    storage.remove_dependency(issue_id, depends_on_id, actor)
}

pub fn add_label(storage: &dyn Storage, issue_id: &str, label: &str, actor: &str) -> Result<(), StoreError> {
    storage.add_label(issue_id, label, actor)
}

pub fn remove_label(storage: &dyn Storage, issue_id: &str, label: &str, actor: &str) -> Result<(), StoreError> {
    storage.remove_label(issue_id, label, actor)
}

pub fn export(
    storage: &dyn Storage,
    export_path: &std::path::Path,
    sync_mode: beads_sync::SyncMode,
) -> ExportResult {
    match beads_sync::pipeline::do_export_sync(storage, export_path, sync_mode) {
        Ok(_) => ExportResult { success: true, error: None },
        Err(e) => ExportResult { success: false, error: Some(e.to_string()) },
    }
}

pub fn decision_get(storage: &dyn Storage, id: &str) -> Result<DecisionInfo, StoreError> {
    let full_id = storage.resolve_id(id)?;
    let events = storage.get_all_events_since(0)?.into_iter().filter(|e| e.issue_id == full_id).collect();
    Ok(DecisionInfo { issue_id: full_id, events })
}

pub fn set_state(storage: &dyn Storage, args: SetStateArgs) -> Result<SetStateResult, StoreError> {
    let full_id = storage.resolve_id(&args.id)?;
    let update = storage.set_state(&full_id, &args.dimension, &args.new_value, args.reason.as_deref(), &args.actor)?;
    Ok(SetStateResult { old: update.old, new: update.new, event_id: update.event_id, changed: update.changed })
}

pub fn get_ready_work(storage: &dyn Storage, filter: beads_core::WorkFilter) -> Result<Vec<Value>, StoreError> {
    Ok(storage.get_ready_work(&filter)?.iter().map(issue_json).collect())
}

/// A `bus_emit` hook with no agent attached to receive it: there's no
/// event bus without a daemon, so every hook call is a silent no-op
/// success rather than an error.
pub fn bus_emit(_args: BusEmitArgs) -> BusEmitResult {
    BusEmitResult::default()
}
