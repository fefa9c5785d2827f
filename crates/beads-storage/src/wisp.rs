// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Wisp store: ephemeral, never-persisted scratch issues. Two
//! variants share one trait so a daemon running remotely can swap in a
//! namespaced cache without touching callers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use beads_core::Issue;
use parking_lot::Mutex;

use crate::error::{Result, StoreError};

/// Default time-to-live for a wisp entry in [`RemoteWispStore`].
pub const DEFAULT_WISP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub trait WispStore: Send + Sync {
    fn put(&self, issue: Issue) -> Result<()>;
    fn get(&self, id: &str) -> Result<Issue>;
    fn list(&self, kind_filter: Option<&str>) -> Result<Vec<Issue>>;
    fn delete(&self, id: &str) -> Result<()>;
    fn list_types(&self) -> Result<Vec<String>>;
}

/// In-process wisp store for the common case: one daemon, one workspace.
#[derive(Default)]
pub struct InMemoryWispStore {
    issues: Mutex<HashMap<String, Issue>>,
}

impl InMemoryWispStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WispStore for InMemoryWispStore {
    fn put(&self, issue: Issue) -> Result<()> {
        debug_assert!(issue.ephemeral, "wisp store received a non-ephemeral issue");
        self.issues.lock().insert(issue.id.clone(), issue);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Issue> {
        self.issues.lock().get(id).cloned().ok_or_else(|| StoreError::not_found(format!("wisp {id} not found")))
    }

    fn list(&self, kind_filter: Option<&str>) -> Result<Vec<Issue>> {
        Ok(self
            .issues
            .lock()
            .values()
            .filter(|i| kind_filter.is_none_or_eq(i.kind.as_str()))
            .cloned()
            .collect())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.issues.lock().remove(id).map(|_| ()).ok_or_else(|| StoreError::not_found(format!("wisp {id} not found")))
    }

    fn list_types(&self) -> Result<Vec<String>> {
        let mut types: Vec<String> =
            self.issues.lock().values().map(|i| i.kind.as_str().to_string()).collect::<std::collections::BTreeSet<_>>().into_iter().collect();
        types.sort();
        Ok(types)
    }
}

trait OptionFilterExt {
    fn is_none_or_eq(&self, value: &str) -> bool;
}

impl OptionFilterExt for Option<&str> {
    fn is_none_or_eq(&self, value: &str) -> bool {
        match self {
            None => true,
            Some(want) => *want == value,
        }
    }
}

struct Entry {
    issue: Issue,
    expires_at: Instant,
}

/// A namespaced, TTL-expiring wisp store, backed by a simple in-process
/// map rather than an external cache crate. The trait boundary is what
/// would let a real remote cache (Redis, etc.) be substituted without
/// touching callers.
pub struct RemoteWispStore {
    namespace: String,
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl RemoteWispStore {
    pub fn new(namespace: impl Into<String>, ttl: Duration) -> Self {
        Self { namespace: namespace.into(), ttl, entries: Mutex::new(HashMap::new()) }
    }

    fn namespaced(&self, id: &str) -> String {
        format!("{}:{}", self.namespace, id)
    }

    fn sweep_expired(&self, entries: &mut HashMap<String, Entry>) {
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
    }
}

impl WispStore for RemoteWispStore {
    fn put(&self, issue: Issue) -> Result<()> {
        debug_assert!(issue.ephemeral, "wisp store received a non-ephemeral issue");
        let key = self.namespaced(&issue.id);
        let mut entries = self.entries.lock();
        self.sweep_expired(&mut entries);
        entries.insert(key, Entry { issue, expires_at: Instant::now() + self.ttl });
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Issue> {
        let key = self.namespaced(id);
        let mut entries = self.entries.lock();
        self.sweep_expired(&mut entries);
        entries.get(&key).map(|e| e.issue.clone()).ok_or_else(|| StoreError::not_found(format!("wisp {id} not found or expired")))
    }

    fn list(&self, kind_filter: Option<&str>) -> Result<Vec<Issue>> {
        let mut entries = self.entries.lock();
        self.sweep_expired(&mut entries);
        Ok(entries.values().map(|e| &e.issue).filter(|i| kind_filter.is_none_or_eq(i.kind.as_str())).cloned().collect())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let key = self.namespaced(id);
        self.entries.lock().remove(&key).map(|_| ()).ok_or_else(|| StoreError::not_found(format!("wisp {id} not found")))
    }

    fn list_types(&self) -> Result<Vec<String>> {
        let mut entries = self.entries.lock();
        self.sweep_expired(&mut entries);
        let mut types: Vec<String> =
            entries.values().map(|e| e.issue.kind.as_str().to_string()).collect::<std::collections::BTreeSet<_>>().into_iter().collect();
        types.sort();
        Ok(types)
    }
}
