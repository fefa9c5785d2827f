// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Filter parameters for `SearchIssues` and `GetReadyWork`.

use crate::enums::Status;

/// Filter for `SearchIssues`.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub status: Option<Status>,
    pub assignee: Option<String>,
    pub priority: Option<u8>,
    pub labels: Vec<String>,
    pub include_tombstones: bool,
    pub include_deferred: bool,
    pub is_template: Option<bool>,
    pub limit: Option<usize>,
}

/// Filter for `GetReadyWork`. Adds `unassigned`, which overrides
/// `assignee` when both are set.
#[derive(Debug, Clone, Default)]
pub struct WorkFilter {
    pub assignee: Option<String>,
    pub unassigned: bool,
    pub priority: Option<u8>,
    pub labels: Vec<String>,
    pub include_deferred: bool,
}

impl WorkFilter {
    /// The effective assignee filter once `unassigned` is resolved:
    /// `unassigned=true` means "assignee must be absent", overriding any
    /// `assignee` value also set.
    pub fn effective_assignee(&self) -> EffectiveAssignee<'_> {
        if self.unassigned {
            EffectiveAssignee::None
        } else if let Some(a) = &self.assignee {
            EffectiveAssignee::Some(a)
        } else {
            EffectiveAssignee::Any
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectiveAssignee<'a> {
    /// No constraint on assignee.
    Any,
    /// Must have no assignee.
    None,
    /// Must match this assignee.
    Some(&'a str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_overrides_assignee() {
        let filter = WorkFilter {
            assignee: Some("alice".into()),
            unassigned: true,
            ..Default::default()
        };
        assert_eq!(filter.effective_assignee(), EffectiveAssignee::None);
    }

    #[test]
    fn assignee_used_when_not_unassigned() {
        let filter = WorkFilter {
            assignee: Some("alice".into()),
            unassigned: false,
            ..Default::default()
        };
        assert_eq!(filter.effective_assignee(), EffectiveAssignee::Some("alice"));
    }

    #[test]
    fn no_constraint_by_default() {
        let filter = WorkFilter::default();
        assert_eq!(filter.effective_assignee(), EffectiveAssignee::Any);
    }
}
