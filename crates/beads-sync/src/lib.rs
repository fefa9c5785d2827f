// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! beads-sync: sync-mode routing, the debounced flush manager,
//! the pull-first/export/conflict-resolve sync pipeline, and the
//! workspace resolver.

pub mod exporter;
pub mod flush;
pub mod pipeline;
pub mod sync_mode;
pub mod workspace;

pub use exporter::{current_export_hash, read_export, write_export, ExportRecord, ExportSummary};
pub use flush::{FlushManager, FlushOutcome};
pub use pipeline::{
    do_export_sync, do_pull_first_sync, ConflictRecord, ConflictStrategy, ExportOutcome, PullFirstOutcome, SyncLock,
};
pub use sync_mode::{resolve_sync_mode, SyncMode};
pub use workspace::{find_beads_dir, Metadata, WorkspacePaths};
