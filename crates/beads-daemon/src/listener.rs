// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Unix-socket RPC surface: the accept loop and per-connection
//! request dispatch. Framing and typed request decoding live in
//! [`crate::protocol`]; this module is the part that actually calls into
//! [`beads_storage::Storage`] and [`crate::event_bus::EventBus`].

use std::sync::atomic::Ordering;
use std::sync::Arc;

use beads_core::{Dependency, DependencyType, Issue, IssueKind, Status, StoreErrorKind};
use beads_storage::{IssueUpdates, StoreError};
use chrono::Utc;
use tokio::net::{UnixListener, UnixStream};

use crate::event_bus::{BusEvent, Subject};
use crate::lifecycle::DaemonState;
use crate::pods::AgentPodRegistry;
use crate::protocol::{
    issue_json, read_request, write_response, AgentPodInfo, CreateArgs, DecisionInfo, DecodeOutcome, ExportResult,
    Request, RequestEnvelope, ResponseEnvelope, SetStateArgs, StatusInfo, UpdateArgs, PROTOCOL_VERSION,
};

/// Runs the accept loop until the listener is dropped (daemon shutdown
/// closes the bound socket, which unblocks `accept` with an error and
/// ends the loop).
pub async fn serve(listener: UnixListener, state: Arc<DaemonState>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        tracing::debug!(error = %e, "connection ended");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed, stopping listener");
                return;
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, state: Arc<DaemonState>) -> Result<(), crate::error::ProtocolError> {
    loop {
        let env = match read_request(&mut stream).await {
            Ok(env) => env,
            Err(crate::error::ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        let response = dispatch_envelope(&state, &env).await;
        write_response(&mut stream, &response).await?;

        if matches!(env.op.as_str(), "shutdown") && response.success {
            return Ok(());
        }
    }
}

pub(crate) async fn dispatch_envelope(state: &Arc<DaemonState>, env: &RequestEnvelope) -> ResponseEnvelope {
    if !matches!(env.op.as_str(), "ping" | "hello") {
        if let Some(expected) = &state.token {
            if env.token.as_deref() != Some(expected.as_str()) {
                return ResponseEnvelope::err(StoreErrorKind::PermissionDenied, "missing or invalid token");
            }
        }
    }

    if state.shutting_down.load(Ordering::SeqCst) && !matches!(env.op.as_str(), "ping" | "status") {
        return ResponseEnvelope::err(StoreErrorKind::Aborted, "daemon is shutting down");
    }

    match Request::decode(env) {
        DecodeOutcome::Ok(req) => dispatch(state, req).await,
        DecodeOutcome::UnknownOp => ResponseEnvelope::err(StoreErrorKind::InvalidArgument, format!("unknown operation {:?}", env.op)),
        DecodeOutcome::BadArgs => ResponseEnvelope::err(StoreErrorKind::InvalidArgument, format!("malformed args for operation {:?}", env.op)),
    }
}

/// Builds a bus notification for a just-applied mutation. The id here is
/// not the store's own event-log id (callers don't have it without an
/// extra round trip) — subscribers key on subject and issue id, not on
/// this event's own identity.
fn notify(state: &DaemonState, subject: Subject, issue_id: &str, title: &str, actor: &str) {
    let event = beads_core::MutationEvent::new(subject_event_type(subject), issue_id, title, actor, Utc::now());
    state.event_bus.publish(subject, event);
}

fn subject_event_type(subject: Subject) -> beads_core::EventType {
    use beads_core::EventType;
    match subject {
        Subject::Create => EventType::Create,
        Subject::Update => EventType::Update,
        Subject::Delete => EventType::Tombstone,
        Subject::Status => EventType::StatusChange,
        Subject::Comment => EventType::Comment,
        Subject::State => EventType::StateChange,
    }
}

async fn dispatch(state: &Arc<DaemonState>, req: Request) -> ResponseEnvelope {
    match req {
        Request::Ping => ResponseEnvelope::ok_empty(),
        Request::Hello { client_version } => ResponseEnvelope::ok(serde_json::json!({
            "server_version": PROTOCOL_VERSION,
            "compatible": client_version == PROTOCOL_VERSION,
        })),
        Request::Create(args) => handle_create(state, args),
        Request::Update(args) => handle_update(state, args),
        Request::Show { id } => handle_show(state, &id),
        Request::List(filter) => match state.storage.search_issues(&filter.into()) {
            Ok(issues) => ResponseEnvelope::ok(issues.iter().map(issue_json).collect::<Vec<_>>()),
            Err(e) => ResponseEnvelope::from_store_error(&e),
        },
        Request::Search { query, filter } => handle_search(state, &query, filter),
        Request::Close { id, actor, reason: _ } => handle_close(state, &id, &actor),
        Request::Tombstone { id, actor, reason } => handle_tombstone(state, &id, &actor, reason.as_deref()),
        Request::AddDependency { issue_id, depends_on_id, dep_type, actor } => {
            handle_add_dependency(state, &issue_id, &depends_on_id, dep_type.as_deref(), &actor)
        }
        Request::RemoveDependency { issue_id, depends_on_id, actor } => {
            match state.storage.remove_dependency(&issue_id, &depends_on_id, &actor) {
                Ok(()) => ResponseEnvelope::ok_empty(),
                Err(e) => ResponseEnvelope::from_store_error(&e),
            }
        }
        Request::AddLabel { issue_id, label, actor } => match state.storage.add_label(&issue_id, &label, &actor) {
            Ok(()) => {
                let title = state.storage.get_issue(&issue_id).map(|i| i.title).unwrap_or_default();
                notify(state, Subject::Update, &issue_id, &title, &actor);
                ResponseEnvelope::ok_empty()
            }
            Err(e) => ResponseEnvelope::from_store_error(&e),
        },
        Request::RemoveLabel { issue_id, label, actor } => {
            match state.storage.remove_label(&issue_id, &label, &actor) {
                Ok(()) => ResponseEnvelope::ok_empty(),
                Err(e) => ResponseEnvelope::from_store_error(&e),
            }
        }
        Request::Export { path } => handle_export(state, path),
        Request::ResolveId { partial } => match state.storage.resolve_id(&partial) {
            Ok(id) => ResponseEnvelope::ok(serde_json::json!({ "id": id })),
            Err(e) => ResponseEnvelope::from_store_error(&e),
        },
        Request::Status => ResponseEnvelope::ok(StatusInfo {
            version: PROTOCOL_VERSION.to_string(),
            socket: state.paths.socket_path.display().to_string(),
            http_addr: state.http_addr.clone(),
            uptime_secs: state.uptime().as_secs(),
            mode: sync_mode_str(state.sync_mode).to_string(),
        }),
        Request::DecisionGet { id } => handle_decision_get(state, &id),
        Request::SetState(args) => handle_set_state(state, args),
        Request::GetReadyWork(filter) => match state.storage.get_ready_work(&filter.into()) {
            Ok(issues) => ResponseEnvelope::ok(issues.iter().map(issue_json).collect::<Vec<_>>()),
            Err(e) => ResponseEnvelope::from_store_error(&e),
        },
        Request::AgentPodRegister(info) => {
            state.pods.register(info);
            ResponseEnvelope::ok_empty()
        }
        Request::AgentPodStatus { pod_id } => handle_pod_status(&state.pods, &pod_id),
        Request::AgentPodDeregister { pod_id } => {
            state.pods.deregister(&pod_id);
            ResponseEnvelope::ok_empty()
        }
        Request::AgentPodList { rig } => ResponseEnvelope::ok(state.pods.list(rig.as_deref())),
        Request::BusEmit(_args) => {
            // Hook dispatch (matching a configured bus spec against
            // stdin and deciding inject/warn/block) has no handler
            // registry wired up; every call is a clean pass-through.
            ResponseEnvelope::ok(crate::protocol::BusEmitResult::default())
        }
        Request::Shutdown { kill: _ } => {
            state.shutting_down.store(true, Ordering::SeqCst);
            ResponseEnvelope::ok_empty()
        }
    }
}

fn handle_create(state: &DaemonState, args: CreateArgs) -> ResponseEnvelope {
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

    match state.storage.create_issue(&issue, &args.actor) {
        Ok(created) => {
            notify(state, Subject::Create, &created.id, &created.title, &args.actor);
            ResponseEnvelope::ok(issue_json(&created))
        }
        Err(e) => ResponseEnvelope::from_store_error(&e),
    }
}

fn handle_update(state: &DaemonState, args: UpdateArgs) -> ResponseEnvelope {
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
    let subject = if updates.status.is_some() { Subject::Status } else { Subject::Update };
    match state.storage.update_issue(&args.id, &updates, &args.actor) {
        Ok(issue) => {
            notify(state, subject, &issue.id, &issue.title, &args.actor);
            ResponseEnvelope::ok(issue_json(&issue))
        }
        Err(e) => ResponseEnvelope::from_store_error(&e),
    }
}

fn handle_show(state: &DaemonState, id: &str) -> ResponseEnvelope {
    match resolve(state, id).and_then(|full| state.storage.get_issue(&full)) {
        Ok(issue) => ResponseEnvelope::ok(issue_json(&issue)),
        Err(e) => ResponseEnvelope::from_store_error(&e),
    }
}

fn resolve(state: &DaemonState, partial: &str) -> Result<String, StoreError> {
    state.storage.resolve_id(partial)
}

fn handle_search(state: &DaemonState, query: &str, filter: crate::protocol::FilterArgs) -> ResponseEnvelope {
    match state.storage.search_issues(&filter.into()) {
        Ok(issues) => {
            let query = query.to_lowercase();
            let matches: Vec<_> = issues
                .into_iter()
                .filter(|i| {
                    query.is_empty()
                        || i.title.to_lowercase().contains(&query)
                        || i.description.to_lowercase().contains(&query)
                })
                .collect();
            ResponseEnvelope::ok(matches.iter().map(issue_json).collect::<Vec<_>>())
        }
        Err(e) => ResponseEnvelope::from_store_error(&e),
    }
}

fn handle_close(state: &DaemonState, id: &str, actor: &str) -> ResponseEnvelope {
    match resolve(state, id).and_then(|full| state.storage.close_issue(&full, actor)) {
        Ok(issue) => {
            notify(state, Subject::Status, &issue.id, &issue.title, actor);
            ResponseEnvelope::ok(issue_json(&issue))
        }
        Err(e) => ResponseEnvelope::from_store_error(&e),
    }
}

fn handle_tombstone(state: &DaemonState, id: &str, actor: &str, reason: Option<&str>) -> ResponseEnvelope {
    match resolve(state, id).and_then(|full| state.storage.tombstone_issue(&full, actor, reason)) {
        Ok(issue) => {
            notify(state, Subject::Delete, &issue.id, &issue.title, actor);
            ResponseEnvelope::ok(issue_json(&issue))
        }
        Err(e) => ResponseEnvelope::from_store_error(&e),
    }
}

fn handle_add_dependency(
    state: &DaemonState,
    issue_id: &str,
    depends_on_id: &str,
    dep_type: Option<&str>,
    actor: &str,
) -> ResponseEnvelope {
    let dep = Dependency::new(issue_id, depends_on_id).with_type(dep_type.map(DependencyType::from).unwrap_or_default());
    match state.storage.add_dependency(&dep, actor) {
        Ok(()) => {
            let title = state.storage.get_issue(issue_id).map(|i| i.title).unwrap_or_default();
            notify(state, Subject::Update, issue_id, &title, actor);
            ResponseEnvelope::ok_empty()
        }
        Err(e) => ResponseEnvelope::from_store_error(&e),
    }
}

fn handle_export(state: &DaemonState, path: Option<String>) -> ResponseEnvelope {
    let export_path = path.map(std::path::PathBuf::from).unwrap_or_else(|| state.paths.export_path.clone());
    match beads_sync::pipeline::do_export_sync(state.storage.as_ref(), &export_path, state.sync_mode) {
        Ok(_) => ResponseEnvelope::ok(ExportResult { success: true, error: None }),
        Err(e) => ResponseEnvelope::ok(ExportResult { success: false, error: Some(e.to_string()) }),
    }
}

fn handle_decision_get(state: &DaemonState, id: &str) -> ResponseEnvelope {
    let full_id = match resolve(state, id) {
        Ok(id) => id,
        Err(e) => return ResponseEnvelope::from_store_error(&e),
    };
    match state.storage.get_all_events_since(0) {
        Ok(events) => {
            let events: Vec<_> = events.into_iter().filter(|e| e.issue_id == full_id).collect();
            ResponseEnvelope::ok(DecisionInfo { issue_id: full_id, events })
        }
        Err(e) => ResponseEnvelope::from_store_error(&e),
    }
}

fn handle_set_state(state: &DaemonState, args: SetStateArgs) -> ResponseEnvelope {
    let full_id = match resolve(state, &args.id) {
        Ok(id) => id,
        Err(e) => return ResponseEnvelope::from_store_error(&e),
    };
    match state.storage.set_state(&full_id, &args.dimension, &args.new_value, args.reason.as_deref(), &args.actor) {
        Ok(update) => {
            if update.changed {
                let title = state.storage.get_issue(&full_id).map(|i| i.title).unwrap_or_default();
                notify(state, Subject::State, &full_id, &title, &args.actor);
            }
            ResponseEnvelope::ok(crate::protocol::SetStateResult {
                old: update.old,
                new: update.new,
                event_id: update.event_id,
                changed: update.changed,
            })
        }
        Err(e) => ResponseEnvelope::from_store_error(&e),
    }
}

fn handle_pod_status(registry: &AgentPodRegistry, pod_id: &str) -> ResponseEnvelope {
    match registry.status(pod_id) {
        Some(info) => ResponseEnvelope::ok(info),
        None => ResponseEnvelope::err(StoreErrorKind::NotFound, format!("no pod registered as {pod_id}")),
    }
}

fn sync_mode_str(mode: beads_sync::SyncMode) -> &'static str {
    use beads_sync::SyncMode;
    match mode {
        SyncMode::GitPortable => "git-portable",
        SyncMode::Realtime => "realtime",
        SyncMode::DoltNative => "dolt-native",
        SyncMode::BeltAndSuspenders => "belt-and-suspenders",
    }
}

#[allow(dead_code)]
fn unused_bus_event_marker(_e: BusEvent) {}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_storage::PlainStore;
    use std::sync::Arc;

    fn test_state() -> (Arc<DaemonState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn beads_storage::Storage> = Arc::new(PlainStore::open(&dir.path().join("beads.db")).unwrap());
        let paths = beads_sync::WorkspacePaths::for_beads_dir(dir.path().join(".beads"), &beads_sync::Metadata::default());
        let (event_bus, _reader) = crate::event_bus::EventBus::new();
        let flush = beads_sync::FlushManager::spawn(Arc::clone(&storage), paths.export_path.clone(), true);
        let state = Arc::new(DaemonState {
            storage,
            wisp: Arc::new(beads_storage::InMemoryWispStore::new()),
            flush,
            event_bus,
            pods: AgentPodRegistry::new(),
            paths,
            sync_mode: beads_sync::SyncMode::GitPortable,
            conflict_strategy: None,
            http_addr: None,
            token: None,
            started_at: std::time::Instant::now(),
            sync_interval: std::time::Duration::from_secs(60),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
            shutdown_notify: tokio::sync::Notify::new(),
        });
        (state, dir)
    }

    #[tokio::test]
    async fn create_then_show_round_trips() {
        let (state, _dir) = test_state();
        let create = dispatch(
            &state,
            Request::Create(CreateArgs { id: None, title: "Fix login".into(), actor: "alice".into(), ..Default::default() }),
        )
        .await;
        assert!(create.success);
        let id = create.data.unwrap()["id"].as_str().unwrap().to_string();

        let show = dispatch(&state, Request::Show { id: id.clone() }).await;
        assert!(show.success);
        assert_eq!(show.data.unwrap()["title"], "Fix login");
    }

    #[tokio::test]
    async fn unknown_op_is_a_structured_error_not_a_dropped_connection() {
        let (state, _dir) = test_state();
        let env = RequestEnvelope { op: "not_a_real_op".into(), args: serde_json::Value::Null, token: None };
        let response = dispatch_envelope(&state, &env).await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().kind, StoreErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn token_mismatch_is_rejected() {
        let (state, _dir) = test_state();
        let mut guard = state.clone();
        let state_with_token = Arc::new(DaemonState {
            storage: Arc::clone(&guard.storage),
            wisp: Arc::clone(&guard.wisp),
            flush: guard.flush.clone(),
            event_bus: guard.event_bus.clone(),
            pods: AgentPodRegistry::new(),
            paths: guard.paths.clone(),
            sync_mode: guard.sync_mode,
            conflict_strategy: guard.conflict_strategy,
            http_addr: guard.http_addr.clone(),
            token: Some("secret".to_string()),
            started_at: guard.started_at,
            sync_interval: std::time::Duration::from_secs(60),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
            shutdown_notify: tokio::sync::Notify::new(),
        });
        guard = state_with_token;

        let env = RequestEnvelope { op: "status".into(), args: serde_json::Value::Null, token: None };
        let response = dispatch_envelope(&guard, &env).await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().kind, StoreErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn set_state_round_trips_through_labels() {
        let (state, _dir) = test_state();
        let create = dispatch(
            &state,
            Request::Create(CreateArgs { id: None, title: "Fix login".into(), actor: "alice".into(), ..Default::default() }),
        )
        .await;
        let id = create.data.unwrap()["id"].as_str().unwrap().to_string();

        let set = dispatch(
            &state,
            Request::SetState(SetStateArgs {
                id: id.clone(),
                dimension: "review".to_string(),
                new_value: "approved".to_string(),
                reason: None,
                actor: "bob".to_string(),
            }),
        )
        .await;
        assert!(set.success);

        let labels = state.storage.get_labels(&id).unwrap();
        assert!(labels.contains(&"review:approved".to_string()));
    }
}
