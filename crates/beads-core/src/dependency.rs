// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Directed dependency edges between issues.

use serde::{Deserialize, Serialize};

use crate::enums::DependencyType;

/// The target of a dependency: either another issue in this workspace, or
/// an `external:<project>:<capability>` reference into a different
/// project's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyTarget {
    Local(String),
    External { project: String, capability: String },
}

impl DependencyTarget {
    /// Parses a raw target string. `external:<project>:<capability>`
    /// parses as [`DependencyTarget::External`]; anything else is a local
    /// issue ID.
    pub fn parse(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix("external:") {
            if let Some((project, capability)) = rest.split_once(':') {
                return DependencyTarget::External {
                    project: project.to_string(),
                    capability: capability.to_string(),
                };
            }
        }
        DependencyTarget::Local(raw.to_string())
    }

    /// Renders back to the raw string form stored on disk.
    pub fn render(&self) -> String {
        match self {
            DependencyTarget::Local(id) => id.clone(),
            DependencyTarget::External { project, capability } => {
                format!("external:{project}:{capability}")
            }
        }
    }
}

/// A directed edge `(issue_id -> depends_on_id, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub issue_id: String,
    pub depends_on_id: String,
    pub dep_type: DependencyType,
}

impl Dependency {
    pub fn new(issue_id: impl Into<String>, depends_on_id: impl Into<String>) -> Self {
        Self {
            issue_id: issue_id.into(),
            depends_on_id: depends_on_id.into(),
            dep_type: DependencyType::Blocks,
        }
    }

    pub fn with_type(mut self, dep_type: DependencyType) -> Self {
        self.dep_type = dep_type;
        self
    }

    /// The parsed target, distinguishing local issues from
    /// `external:<project>:<capability>` references.
    pub fn target(&self) -> DependencyTarget {
        DependencyTarget::parse(&self.depends_on_id)
    }
}
