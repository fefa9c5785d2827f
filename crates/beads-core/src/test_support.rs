// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Test-only builders and fixtures shared across the workspace, enabled by
//! the `test-support` feature. Downstream crates depend on
//! `beads-core = { path = "...", features = ["test-support"] }` in their
//! `[dev-dependencies]` rather than duplicating this scaffolding.

use chrono::{DateTime, Utc};

use crate::clock::FakeClock;
use crate::enums::{IssueKind, Status};
use crate::issue::{Issue, IssueBuilder};

/// A fixed instant used as the default "now" across fixture issues, so
/// tests that don't care about timing get deterministic output.
pub fn fixed_instant() -> DateTime<Utc> {
    "2026-01-01T00:00:00Z".parse().expect("valid fixed instant")
}

/// A [`FakeClock`] pinned to [`fixed_instant`].
pub fn fixed_clock() -> FakeClock {
    FakeClock::new(fixed_instant())
}

/// Builds a minimal open issue with a deterministic id, for tests that
/// only care about one or two fields.
pub fn sample_issue(id: &str, title: &str) -> Issue {
    let now = fixed_instant();
    let mut issue = IssueBuilder::new(id, title).build();
    issue.created_at = now;
    issue.updated_at = now;
    issue
}

/// Builds a closed issue with `closed_at` set consistently, satisfying
/// the terminal-timestamp invariant.
pub fn closed_issue(id: &str, title: &str) -> Issue {
    let mut issue = sample_issue(id, title);
    issue.status = Status::Closed;
    issue.closed_at = Some(fixed_instant());
    issue.content_hash = crate::content_hash::compute_content_hash(&issue);
    issue
}

/// Builds a bug-kind issue assigned to `assignee`.
pub fn assigned_bug(id: &str, title: &str, assignee: &str) -> Issue {
    let now = fixed_instant();
    let mut issue = IssueBuilder::new(id, title)
        .kind(IssueKind::Bug)
        .assignee(assignee)
        .build();
    issue.created_at = now;
    issue.updated_at = now;
    issue
}

/// A sequence generator for issue IDs usable in tests that need many
/// distinct, stable IDs without invoking the full adaptive-length
/// generator.
pub struct IdSequence {
    prefix: String,
    next: u64,
}

impl IdSequence {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), next: 1 }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}
