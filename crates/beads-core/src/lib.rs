// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! beads-core: domain model, ID generation, content hashing, and
//! configuration shared by every other crate in the workspace.

pub mod clock;
pub mod comment;
pub mod config;
pub mod content_hash;
pub mod dependency;
pub mod enums;
pub mod error;
pub mod filter;
pub mod idgen;
pub mod issue;
pub mod namespace;

#[cfg(feature = "test-support")]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use comment::{Comment, MutationEvent};
pub use config::{AutoSyncPolicy, Config};
pub use content_hash::compute_content_hash;
pub use dependency::{Dependency, DependencyTarget};
pub use enums::{DependencyType, EventType, IssueKind, Status};
pub use error::{CoreError, StoreErrorKind};
pub use filter::{IssueFilter, WorkFilter};
pub use idgen::generate_issue_id;
pub use issue::{Issue, IssueBuilder};
pub use namespace::{scoped_name, split_scoped_name};
