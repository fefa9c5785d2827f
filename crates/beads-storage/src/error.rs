// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Storage-layer error type. Carries a [`StoreErrorKind`] alongside the
//! message so callers (RPC layer, CLI) can match on `kind()` rather than
//! parsing `Display` output.

use beads_core::StoreErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    pub fn with_source(
        kind: StoreErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { kind, message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, what)
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::AlreadyExists, what)
    }

    pub fn ambiguous(what: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Ambiguous, what)
    }

    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::InvalidArgument, what)
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Conflict, what)
    }

    pub fn busy(what: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Busy, what)
    }

    pub fn internal(what: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Internal, what)
    }

    pub fn remote_unavailable(what: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::RemoteUnavailable, what)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::with_source(StoreErrorKind::Internal, "io error", e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::with_source(StoreErrorKind::Internal, "serialization error", e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
