// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Extensible string-backed enums for the issue domain.
//!
//! Each enum serializes as its snake/kebab-case string, deserializes known
//! variants plus a `Custom(String)` catch-all, and exposes `as_str()`. This
//! lets the store round-trip values it doesn't recognize (forward
//! compatibility across versions, and user-defined `kind`/dependency-type
//! extensions) without rejecting them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

macro_rules! define_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident, custom_variant = $custom_variant:ident,
        variants: [
            $( ($variant:ident, $str:expr) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant, )+
            $custom_variant(String),
        }

        impl $name {
            /// Returns the string representation.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $str, )+
                    Self::$custom_variant(s) => s.as_str(),
                }
            }

            /// Returns `true` if this is the default variant.
            pub fn is_default(&self) -> bool {
                *self == Self::$default
            }

            /// Returns `true` if this is a built-in (non-custom) variant.
            pub fn is_builtin(&self) -> bool {
                !matches!(self, Self::$custom_variant(_))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::from(s))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $( $str => Self::$variant, )+
                    other => Self::$custom_variant(other.to_owned()),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                match s.as_str() {
                    $( $str => Self::$variant, )+
                    _ => Self::$custom_variant(s),
                }
            }
        }
    };
}

define_enum! {
    /// Lifecycle status of an issue. `closed` and `tombstone` are the
    /// only statuses with a non-null `closed_at`/`deleted_at`.
    Status, default = Open, custom_variant = Custom,
    variants: [
        (Open, "open"),
        (InProgress, "in_progress"),
        (Blocked, "blocked"),
        (Closed, "closed"),
        (Tombstone, "tombstone"),
    ]
}

impl Status {
    /// Whether this status requires a non-null timestamp companion
    /// (`closed_at` for `Closed`, `deleted_at` for `Tombstone`).
    pub fn requires_terminal_timestamp(&self) -> bool {
        matches!(self, Status::Closed | Status::Tombstone)
    }
}

define_enum! {
    /// The kind of work an issue represents.
    IssueKind, default = Task, custom_variant = CustomKind,
    variants: [
        (Bug, "bug"),
        (Feature, "feature"),
        (Task, "task"),
        (Epic, "epic"),
        (Chore, "chore"),
        (Agent, "agent"),
        (Route, "route"),
    ]
}

define_enum! {
    /// Dependency edge type. Partitions into well-known blocking and
    /// well-known non-blocking categories; anything else is a
    /// `Custom` non-blocking edge.
    DependencyType, default = Blocks, custom_variant = Custom,
    variants: [
        (Blocks, "blocks"),
        (ParentChild, "parent-child"),
        (ConditionalBlocks, "conditional-blocks"),
        (WaitsFor, "waits-for"),
        (Related, "related"),
        (DiscoveredFrom, "discovered-from"),
        (Duplicates, "duplicates"),
        (Supersedes, "supersedes"),
    ]
}

impl DependencyType {
    /// Well-known blocking types. `Custom` edges are always treated as
    /// non-blocking: an unrecognized edge type should never silently gate
    /// ready-work.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            DependencyType::Blocks
                | DependencyType::ParentChild
                | DependencyType::ConditionalBlocks
                | DependencyType::WaitsFor
        )
    }
}

define_enum! {
    /// Mutation event kind, appended to the monotonic event log on every
    /// store write.
    EventType, default = Update, custom_variant = Custom,
    variants: [
        (Create, "create"),
        (Update, "update"),
        (StatusChange, "status"),
        (Close, "close"),
        (Tombstone, "tombstone"),
        (Comment, "comment"),
        (DependencyAdded, "dependency_added"),
        (DependencyRemoved, "dependency_removed"),
        (LabelAdded, "label_added"),
        (LabelRemoved, "label_removed"),
        (StateChange, "state_change"),
    ]
}
