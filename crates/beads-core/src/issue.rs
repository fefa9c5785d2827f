// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! The central entity: an issue ("bead").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::comment::Comment;
use crate::enums::{IssueKind, Status};

/// A unit of tracked work.
///
/// Invariants enforced by the store, not by this struct alone (a bare
/// `Issue` value can be constructed in a transiently invalid shape while a
/// caller is building one up; the store validates on write):
/// - (i) `status == Closed` iff `closed_at.is_some()`; `status == Tombstone`
///   iff `deleted_at.is_some()`.
/// - (ii) `id` matches `<prefix>-<token>` and is unique within a workspace.
/// - (iii) `ephemeral == true` issues never reach persistence.
/// - (iv) `priority` is 0-4.
/// - (v) `defer_until` only suppresses ready-work while `now < defer_until`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub design: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub acceptance_criteria: String,
    pub status: Status,
    pub priority: u8,
    pub kind: IssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defer_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_session: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_type: Option<IssueKind>,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Issue {
    /// True when invariant (i) holds for this issue's current status.
    pub fn terminal_timestamp_consistent(&self) -> bool {
        match self.status {
            Status::Closed => self.closed_at.is_some() && self.deleted_at.is_none(),
            Status::Tombstone => self.deleted_at.is_some(),
            _ => self.closed_at.is_none() && self.deleted_at.is_none(),
        }
    }

    /// True when `defer_until` is set and still in the future relative to
    /// `now`.
    pub fn is_deferred(&self, now: DateTime<Utc>) -> bool {
        self.defer_until.is_some_and(|t| now < t)
    }
}

/// Fluent builder for constructing issues, primarily for tests and for
/// `CreateIssue` call sites that only set a handful of fields.
pub struct IssueBuilder {
    issue: Issue,
}

impl IssueBuilder {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            issue: Issue {
                id: id.into(),
                title: title.into(),
                description: String::new(),
                design: String::new(),
                notes: String::new(),
                acceptance_criteria: String::new(),
                status: Status::Open,
                priority: 2,
                kind: IssueKind::Task,
                assignee: None,
                external_ref: None,
                estimate_minutes: None,
                defer_until: None,
                ephemeral: false,
                is_template: false,
                pinned: false,
                source_repo: None,
                pod_id: None,
                pod_status: None,
                screen_session: None,
                created_at: now,
                updated_at: now,
                closed_at: None,
                deleted_at: None,
                deleted_by: None,
                delete_reason: None,
                original_type: None,
                content_hash: String::new(),
                labels: Vec::new(),
                comments: Vec::new(),
            },
        }
    }

    pub fn status(mut self, status: Status) -> Self {
        self.issue.status = status;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.issue.priority = priority;
        self
    }

    pub fn kind(mut self, kind: IssueKind) -> Self {
        self.issue.kind = kind;
        self
    }

    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.issue.assignee = Some(assignee.into());
        self
    }

    pub fn labels(mut self, labels: Vec<String>) -> Self {
        self.issue.labels = labels;
        self
    }

    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.issue.ephemeral = ephemeral;
        self
    }

    pub fn defer_until(mut self, at: DateTime<Utc>) -> Self {
        self.issue.defer_until = Some(at);
        self
    }

    pub fn build(mut self) -> Issue {
        self.issue.content_hash = crate::content_hash::compute_content_hash(&self.issue);
        self.issue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_builder_produces_open_issue() {
        let issue = IssueBuilder::new("bd-1", "Fix login").build();
        assert_eq!(issue.status, Status::Open);
        assert!(issue.terminal_timestamp_consistent());
        assert!(!issue.content_hash.is_empty());
    }

    #[test]
    fn closed_without_timestamp_is_inconsistent() {
        let mut issue = IssueBuilder::new("bd-1", "Fix login").build();
        issue.status = Status::Closed;
        assert!(!issue.terminal_timestamp_consistent());
        issue.closed_at = Some(Utc::now());
        assert!(issue.terminal_timestamp_consistent());
    }

    #[test]
    fn deferred_until_future_suppresses() {
        let future = Utc::now() + chrono::Duration::days(1);
        let issue = IssueBuilder::new("bd-1", "Later").defer_until(future).build();
        assert!(issue.is_deferred(Utc::now()));
        assert!(!issue.is_deferred(future + chrono::Duration::days(1)));
    }
}
