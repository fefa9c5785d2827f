// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Comments and the append-only mutation event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{EventType, Status};

/// A free-text comment attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(author: impl Into<String>, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            created_at,
        }
    }

    /// Identity used for merge dedup: comments append by `(author,
    /// timestamp)` during a pull-first merge.
    pub fn merge_key(&self) -> (&str, i64) {
        (self.author.as_str(), self.created_at.timestamp())
    }
}

/// One entry in the append-only mutation event log. `id` is assigned by
/// the store in accept order and is monotonically increasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationEvent {
    pub id: i64,
    pub event_type: EventType,
    pub issue_id: String,
    pub title: String,
    pub old_status: Option<Status>,
    pub new_status: Option<Status>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub labels: Vec<String>,
    pub payload: Option<String>,
}

impl MutationEvent {
    /// Builds an event with `id` left at 0; the store assigns the real ID
    /// on append (mirrors `Wal::append`'s sequence assignment).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_type: EventType,
        issue_id: impl Into<String>,
        title: impl Into<String>,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            event_type,
            issue_id: issue_id.into(),
            title: title.into(),
            old_status: None,
            new_status: None,
            actor: actor.into(),
            timestamp,
            labels: Vec::new(),
            payload: None,
        }
    }

    pub fn with_status_change(mut self, old: Option<Status>, new: Option<Status>) -> Self {
        self.old_status = old;
        self.new_status = new;
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_key_uses_author_and_timestamp() {
        let a = Comment::new("alice", "lgtm", Utc::now());
        let b = a.clone();
        assert_eq!(a.merge_key(), b.merge_key());
    }

    #[test]
    fn event_builder_sets_status_transition() {
        let event = MutationEvent::new(
            EventType::StatusChange,
            "bd-1",
            "Fix login",
            "alice",
            Utc::now(),
        )
        .with_status_change(Some(Status::Open), Some(Status::Closed));
        assert_eq!(event.old_status, Some(Status::Open));
        assert_eq!(event.new_status, Some(Status::Closed));
    }
}
