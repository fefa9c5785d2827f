// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! The daemon client: connect-or-start, version handshake, and the
//! thin typed wrappers `bd`'s commands call into. Same connect/probe/
//! start/poll/retry shape throughout, talking the `{op, args, token?}` in,
//! `{success, data, error}` out wire envelope.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use beads_core::StoreErrorKind;
use beads_daemon::protocol::{self, RequestEnvelope, ResponseEnvelope, PROTOCOL_VERSION};
use serde::Serialize;
use thiserror::Error;
use tokio::net::UnixStream;

use crate::daemon_process::{
    cleanup_stale_socket, probe_socket, read_startup_error, start_daemon_background, stop_daemon_sync, wait_for_exit,
};
use crate::env;
use crate::workspace::CliWorkspace;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running for this workspace")]
    DaemonNotRunning,

    #[error("failed to start daemon: {0}")]
    DaemonStartFailed(String),

    #[error("timed out waiting for daemon to start")]
    DaemonStartTimeout,

    #[error("daemon rejected request ({kind:?}): {message}")]
    Rejected { kind: StoreErrorKind, message: String },

    #[error("unexpected response shape from daemon")]
    UnexpectedResponse,

    #[error("protocol error: {0}")]
    Protocol(#[from] beads_daemon::ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct DaemonClient {
    socket_path: PathBuf,
    token: Option<String>,
}

impl DaemonClient {
    /// Connects to an already-running daemon; no auto-start.
    pub fn connect(ws: &CliWorkspace) -> Result<Self, ClientError> {
        if !ws.paths.socket_path.exists() {
            return Err(ClientError::DaemonNotRunning);
        }
        Ok(Self { socket_path: ws.paths.socket_path.clone(), token: ws.token.clone() })
    }

    /// Connects, auto-starting the daemon if it isn't running. Used by
    /// action commands (create, update, close, ...). Query commands use
    /// [`Self::connect`] directly since restarting a wrong-but-reachable
    /// daemon wouldn't help a read.
    pub async fn connect_or_start(ws: &CliWorkspace) -> Result<Self, ClientError> {
        static STARTED_ONCE: AtomicBool = AtomicBool::new(false);
        static VERSION_RESTARTED: AtomicBool = AtomicBool::new(false);

        if !VERSION_RESTARTED.load(Ordering::SeqCst) {
            if let Ok(daemon_version) = std::fs::read_to_string(&ws.paths.version_path) {
                if daemon_version.trim() != PROTOCOL_VERSION {
                    VERSION_RESTARTED.store(true, Ordering::SeqCst);
                    eprintln!(
                        "warn: daemon protocol version {} does not match client version {}, restarting daemon",
                        daemon_version.trim(),
                        PROTOCOL_VERSION
                    );
                    stop_daemon_sync(&ws.paths.socket_path, &ws.paths.pid_path);
                }
            }
        }

        match Self::connect(ws) {
            Ok(client) => {
                if probe_socket(&client.socket_path) {
                    client.warn_if_incompatible().await;
                    return Ok(client);
                }
                cleanup_stale_socket(&ws.paths.socket_path, &ws.paths.pid_path);
            }
            Err(ClientError::DaemonNotRunning) => {}
            Err(e) => return Err(e),
        }

        if STARTED_ONCE.swap(true, Ordering::SeqCst) {
            // Already tried to spawn a daemon once this process; a second
            // failure isn't going to resolve itself by spawning a third.
            return Err(ClientError::DaemonStartFailed(
                "daemon already failed to start once this session".to_string(),
            ));
        }

        let child = start_daemon_background(&ws.workspace_dir)?;
        Self::connect_with_retry(ws, child).await
    }

    async fn connect_with_retry(ws: &CliWorkspace, mut child: std::process::Child) -> Result<Self, ClientError> {
        let start = Instant::now();
        let timeout = env::timeout_connect();
        while start.elapsed() < timeout {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if let Some(err) = read_startup_error(&ws.paths.log_path) {
                        return Err(ClientError::DaemonStartFailed(err));
                    }
                    return Err(ClientError::DaemonStartFailed(format!("daemon exited with {status}")));
                }
                Ok(None) => {}
                Err(_) => {}
            }

            if ws.paths.socket_path.exists() && probe_socket(&ws.paths.socket_path) {
                return Ok(Self { socket_path: ws.paths.socket_path.clone(), token: ws.token.clone() });
            }
            tokio::time::sleep(env::poll_interval()).await;
        }

        if let Some(err) = read_startup_error(&ws.paths.log_path) {
            return Err(ClientError::DaemonStartFailed(err));
        }
        Err(ClientError::DaemonStartTimeout)
    }

    /// Waits (up to the configured exit timeout) for a daemon we just
    /// asked to shut down to actually release its socket.
    pub async fn wait_for_shutdown(pid: u32) -> bool {
        wait_for_exit(pid, env::timeout_exit()).await
    }

    async fn send_raw(&self, op: &str, args: impl Serialize) -> Result<ResponseEnvelope, ClientError> {
        let envelope = RequestEnvelope {
            op: op.to_string(),
            args: serde_json::to_value(args)?,
            token: self.token.clone(),
        };
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let payload = serde_json::to_vec(&envelope)?;
        tokio::time::timeout(env::timeout_ipc(), protocol::write_message(&mut writer, &payload))
            .await
            .map_err(|_| beads_daemon::ProtocolError::Timeout)??;

        let response_bytes = tokio::time::timeout(env::timeout_ipc(), protocol::read_message(&mut reader))
            .await
            .map_err(|_| beads_daemon::ProtocolError::Timeout)??;

        Ok(serde_json::from_slice(&response_bytes)?)
    }

    /// Sends a request and decodes the `data` payload as `T`, or
    /// translates a `{success: false}` response into `ClientError::Rejected`.
    pub async fn call<T: serde::de::DeserializeOwned>(&self, op: &str, args: impl Serialize) -> Result<T, ClientError> {
        let resp = self.send_raw(op, args).await?;
        if !resp.success {
            let payload = resp.error;
            return Err(ClientError::Rejected {
                kind: payload.as_ref().map(|p| p.kind).unwrap_or(StoreErrorKind::Internal),
                message: payload.map(|p| p.message).unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        let data = resp.data.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(data).map_err(ClientError::from)
    }

    /// Sends a request whose success carries no payload worth decoding.
    pub async fn call_empty(&self, op: &str, args: impl Serialize) -> Result<(), ClientError> {
        let resp = self.send_raw(op, args).await?;
        if resp.success {
            Ok(())
        } else {
            let payload = resp.error;
            Err(ClientError::Rejected {
                kind: payload.as_ref().map(|p| p.kind).unwrap_or(StoreErrorKind::Internal),
                message: payload.map(|p| p.message).unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }

    pub async fn hello(&self) -> Result<serde_json::Value, ClientError> {
        self.call("hello", serde_json::json!({ "client_version": PROTOCOL_VERSION })).await
    }

    /// Live handshake confirming a reused connection's protocol compatibility,
    /// beyond what the `daemon.version` file on disk may have reflected at the
    /// time `connect_or_start` checked it. Diagnostic only: the file check is
    /// what actually triggers a restart, so a mismatch here is logged, not
    /// acted on, to avoid restarting out from under an in-flight caller.
    async fn warn_if_incompatible(&self) {
        if let Ok(resp) = self.hello().await {
            if resp.get("compatible").and_then(|v| v.as_bool()) == Some(false) {
                let server_version = resp.get("server_version").and_then(|v| v.as_str()).unwrap_or("unknown");
                tracing::warn!(server_version, client_version = PROTOCOL_VERSION, "daemon protocol version mismatch");
            }
        }
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        self.call_empty("ping", serde_json::Value::Null).await
    }

    pub async fn shutdown(&self, kill: bool) -> Result<(), ClientError> {
        self.call_empty("shutdown", serde_json::json!({ "kill": kill })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_display_includes_kind() {
        let err = ClientError::Rejected { kind: StoreErrorKind::NotFound, message: "bd-1 not found".to_string() };
        assert!(err.to_string().contains("bd-1 not found"));
    }
}
