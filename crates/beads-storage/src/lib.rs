// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! beads-storage: the issue store and wisp store.
//!
//! [`PlainStore`] is the WAL + snapshot backed implementation used by
//! every sync mode; [`GitStore`] wraps it unchanged and additionally
//! implements [`RemoteStorage`] for the versioned backend.

pub mod checkpoint;
pub mod error;
pub mod git_store;
pub mod plain_store;
pub mod snapshot;
pub mod state;
pub mod traits;
pub mod wal;
pub mod wisp;

pub use error::{Result, StoreError};
pub use git_store::GitStore;
pub use plain_store::PlainStore;
pub use state::MaterializedState;
pub use traits::{IssueUpdates, IssueWithDependency, RemoteStorage, StateUpdate, Storage};
pub use wisp::{InMemoryWispStore, RemoteWispStore, WispStore, DEFAULT_WISP_TTL};
