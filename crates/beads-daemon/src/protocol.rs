// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! RPC wire protocol: length-prefixed JSON frames over the Unix
//! socket and, when configured, the HTTP listener. A 4-byte big-endian
//! length prefix plus UTF-8 JSON payload.
//!
//! The wire envelope (`{op, args, token?}` in, `{success, data, error}`
//! out) is the literal external interface, deliberately kept as a thin
//! envelope around a typed [`Request`]/[`Response`] pair rather than
//! serde's internally-tagged enum — the envelope shape is part of this
//! system's wire compatibility contract, not an implementation detail.

use std::time::Duration;

use beads_core::{Issue, MutationEvent, StoreErrorKind};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::ProtocolError;

pub const PROTOCOL_VERSION: &str = "1";
pub const MAX_MESSAGE_SIZE: u32 = 200 * 1024 * 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Wire shape of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub op: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Wire shape of a response. Unknown fields are ignored by clients on
/// deserialization, giving version-skew tolerance for free (serde's
/// default behavior on structs without `deny_unknown_fields`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl ResponseEnvelope {
    pub fn ok(data: impl Serialize) -> Self {
        Self { success: true, data: serde_json::to_value(data).ok(), error: None }
    }

    pub fn ok_empty() -> Self {
        Self { success: true, data: None, error: None }
    }

    pub fn err(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(ErrorPayload { kind, message: message.into() }) }
    }

    pub fn from_store_error(e: &beads_storage::StoreError) -> Self {
        Self::err(e.kind(), e.to_string())
    }
}

/// Reads one length-prefixed frame: a 4-byte big-endian length followed
/// by that many bytes of payload.
pub async fn read_message<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(ProtocolError::ConnectionClosed),
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::ConnectionClosed
        } else {
            ProtocolError::Io(e)
        }
    })?;
    Ok(payload)
}

pub async fn write_message<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::MessageTooLarge {
        size: u32::MAX,
        max: MAX_MESSAGE_SIZE,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_request<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<RequestEnvelope, ProtocolError> {
    let bytes = tokio::time::timeout(DEFAULT_TIMEOUT, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn write_response<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    response: &ResponseEnvelope,
) -> Result<(), ProtocolError> {
    let bytes = serde_json::to_vec(response)?;
    tokio::time::timeout(DEFAULT_TIMEOUT, write_message(writer, &bytes)).await.map_err(|_| ProtocolError::Timeout)??;
    Ok(())
}

// --- Typed request/response shapes, keyed off `op` ---------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateArgs {
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub actor: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateArgs {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub design: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub assignee: Option<Option<String>>,
    #[serde(default)]
    pub pinned: Option<bool>,
    pub actor: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterArgs {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub include_tombstones: bool,
    #[serde(default)]
    pub include_deferred: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl From<FilterArgs> for beads_core::IssueFilter {
    fn from(a: FilterArgs) -> Self {
        beads_core::IssueFilter {
            status: a.status.map(beads_core::Status::from),
            assignee: a.assignee,
            priority: a.priority,
            labels: a.labels,
            include_tombstones: a.include_tombstones,
            include_deferred: a.include_deferred,
            is_template: None,
            limit: a.limit,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkFilterArgs {
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub unassigned: bool,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub include_deferred: bool,
}

impl From<WorkFilterArgs> for beads_core::WorkFilter {
    fn from(a: WorkFilterArgs) -> Self {
        beads_core::WorkFilter {
            assignee: a.assignee,
            unassigned: a.unassigned,
            priority: a.priority,
            labels: a.labels,
            include_deferred: a.include_deferred,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub version: String,
    pub socket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_addr: Option<String>,
    pub uptime_secs: u64,
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionInfo {
    pub issue_id: String,
    pub events: Vec<MutationEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStateArgs {
    pub id: String,
    pub dimension: String,
    pub new_value: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub actor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStateResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<String>,
    pub new: String,
    pub event_id: i64,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPodInfo {
    pub pod_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rig: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEmitArgs {
    pub hook: String,
    #[serde(default)]
    pub stdin_json: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusEmitResult {
    #[serde(default)]
    pub inject: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub block: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The decoded, typed form of a request. `Request::decode` maps an
/// unrecognized `op` to `None` rather than erroring the whole connection.
#[derive(Debug, Clone)]
pub enum Request {
    Ping,
    Hello { client_version: String },
    Create(CreateArgs),
    Update(UpdateArgs),
    Show { id: String },
    List(FilterArgs),
    Search { query: String, filter: FilterArgs },
    Close { id: String, actor: String, reason: Option<String> },
    Tombstone { id: String, actor: String, reason: Option<String> },
    AddDependency { issue_id: String, depends_on_id: String, dep_type: Option<String>, actor: String },
    RemoveDependency { issue_id: String, depends_on_id: String, actor: String },
    AddLabel { issue_id: String, label: String, actor: String },
    RemoveLabel { issue_id: String, label: String, actor: String },
    Export { path: Option<String> },
    ResolveId { partial: String },
    Status,
    DecisionGet { id: String },
    SetState(SetStateArgs),
    GetReadyWork(WorkFilterArgs),
    AgentPodRegister(AgentPodInfo),
    AgentPodStatus { pod_id: String },
    AgentPodDeregister { pod_id: String },
    AgentPodList { rig: Option<String> },
    BusEmit(BusEmitArgs),
    Shutdown { kill: bool },
}

/// Outcome of decoding a wire request. Keeps "no such operation" distinct from
/// "this operation's `args` don't parse", which is an `InvalidArgument`
/// on a perfectly well-known operation.
pub enum DecodeOutcome {
    Ok(Request),
    UnknownOp,
    BadArgs,
}

const KNOWN_OPS: &[&str] = &[
    "ping",
    "hello",
    "create",
    "update",
    "show",
    "list",
    "search",
    "close",
    "tombstone",
    "add_dependency",
    "remove_dependency",
    "add_label",
    "remove_label",
    "export",
    "resolve_id",
    "status",
    "decision_get",
    "set_state",
    "get_ready_work",
    "agent_pod_register",
    "agent_pod_status",
    "agent_pod_deregister",
    "agent_pod_list",
    "bus_emit",
    "shutdown",
];

impl Request {
    pub fn decode(env: &RequestEnvelope) -> DecodeOutcome {
        if !KNOWN_OPS.contains(&env.op.as_str()) {
            return DecodeOutcome::UnknownOp;
        }
        match Self::decode_known(env) {
            Some(req) => DecodeOutcome::Ok(req),
            None => DecodeOutcome::BadArgs,
        }
    }

    fn decode_known(env: &RequestEnvelope) -> Option<Self> {
        let args = env.args.clone();
        fn parse<T: serde::de::DeserializeOwned + Default>(v: serde_json::Value) -> T {
            serde_json::from_value(v).unwrap_or_default()
        }
        Some(match env.op.as_str() {
            "ping" => Request::Ping,
            "hello" => Request::Hello {
                client_version: args.get("client_version").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            },
            "create" => Request::Create(parse(args)),
            "update" => Request::Update(serde_json::from_value(args).ok()?),
            "show" => Request::Show { id: args.get("id")?.as_str()?.to_string() },
            "list" => Request::List(parse(args)),
            "search" => Request::Search {
                query: args.get("query").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                filter: serde_json::from_value(args.get("filter").cloned().unwrap_or_default()).unwrap_or_default(),
            },
            "close" => Request::Close {
                id: args.get("id")?.as_str()?.to_string(),
                actor: args.get("actor").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
                reason: args.get("reason").and_then(|v| v.as_str()).map(str::to_string),
            },
            "tombstone" => Request::Tombstone {
                id: args.get("id")?.as_str()?.to_string(),
                actor: args.get("actor").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
                reason: args.get("reason").and_then(|v| v.as_str()).map(str::to_string),
            },
            "add_dependency" => Request::AddDependency {
                issue_id: args.get("issue_id")?.as_str()?.to_string(),
                depends_on_id: args.get("depends_on_id")?.as_str()?.to_string(),
                dep_type: args.get("dep_type").and_then(|v| v.as_str()).map(str::to_string),
                actor: args.get("actor").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
            },
            "remove_dependency" => Request::RemoveDependency {
                issue_id: args.get("issue_id")?.as_str()?.to_string(),
                depends_on_id: args.get("depends_on_id")?.as_str()?.to_string(),
                actor: args.get("actor").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
            },
            "add_label" => Request::AddLabel {
                issue_id: args.get("issue_id")?.as_str()?.to_string(),
                label: args.get("label")?.as_str()?.to_string(),
                actor: args.get("actor").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
            },
            "remove_label" => Request::RemoveLabel {
                issue_id: args.get("issue_id")?.as_str()?.to_string(),
                label: args.get("label")?.as_str()?.to_string(),
                actor: args.get("actor").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
            },
            "export" => Request::Export { path: args.get("path").and_then(|v| v.as_str()).map(str::to_string) },
            "resolve_id" => Request::ResolveId { partial: args.get("partial")?.as_str()?.to_string() },
            "status" => Request::Status,
            "decision_get" => Request::DecisionGet { id: args.get("id")?.as_str()?.to_string() },
            "set_state" => Request::SetState(serde_json::from_value(args).ok()?),
            "get_ready_work" => Request::GetReadyWork(parse(args)),
            "agent_pod_register" => Request::AgentPodRegister(serde_json::from_value(args).ok()?),
            "agent_pod_status" => Request::AgentPodStatus { pod_id: args.get("pod_id")?.as_str()?.to_string() },
            "agent_pod_deregister" => {
                Request::AgentPodDeregister { pod_id: args.get("pod_id")?.as_str()?.to_string() }
            }
            "agent_pod_list" => {
                Request::AgentPodList { rig: args.get("rig").and_then(|v| v.as_str()).map(str::to_string) }
            }
            "bus_emit" => Request::BusEmit(serde_json::from_value(args).ok()?),
            "shutdown" => {
                Request::Shutdown { kill: args.get("kill").and_then(|v| v.as_bool()).unwrap_or(false) }
            }
            _ => return None,
        })
    }
}

/// One exported issue's external shape, used for `Show`/`List`/`Search`
/// responses. A thin `Serialize`-only view over [`Issue`] rather than a
/// reuse of `Issue` directly keeps the wire contract decoupled from the
/// storage layer's internal field set.
pub fn issue_json(issue: &Issue) -> serde_json::Value {
    serde_json::to_value(issue).unwrap_or(serde_json::Value::Null)
}
