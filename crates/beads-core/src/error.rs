// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Stable error classification shared by every crate that surfaces store
//! errors to an RPC boundary or a CLI exit code.
//!
//! `StoreErrorKind` is carried *alongside* a human-readable message rather
//! than encoded in it, so the RPC layer and the CLI can match on `kind()`
//! instead of parsing strings.

use thiserror::Error;

/// Stable error kinds, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    NotFound,
    AlreadyExists,
    Ambiguous,
    InvalidArgument,
    PermissionDenied,
    Conflict,
    Busy,
    Unavailable,
    Aborted,
    Internal,
    RemoteUnavailable,
}

/// Errors raised by `beads-core` itself (enum parsing, config loading, ID
/// generation). Storage- and RPC-layer errors define their own error types
/// that embed a [`StoreErrorKind`]; this one is deliberately small.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid priority {0}: must be 0-4")]
    InvalidPriority(u8),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
