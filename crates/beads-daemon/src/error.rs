// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Error types for the daemon's own concerns: startup/shutdown sequencing
//! (`LifecycleError`) and wire framing (`ProtocolError`). Storage-layer
//! errors keep traveling as `beads_storage::StoreError`; these two types
//! exist for failures that have no `StoreErrorKind` to carry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another daemon is already running for this workspace (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("failed to acquire start lock: {0}")]
    LockFailed(String),

    #[error("store error during startup: {0}")]
    Store(#[from] beads_storage::StoreError),

    #[error("config error: {0}")]
    Config(#[from] beads_core::CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message of {size} bytes exceeds the {max}-byte limit")]
    MessageTooLarge { size: u32, max: u32 },

    #[error("connection closed before a full message was read")]
    ConnectionClosed,

    #[error("request timed out")]
    Timeout,
}
