// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Agent pod registry backing `AgentPodRegister`/`Status`/`Deregister`/
//! `List`. Pure in-memory bookkeeping of which agent pods
//! are currently known to this daemon; it has no persistence of its own.
//! A restarted daemon starts with an empty registry — the store, not the
//! daemon process, is the durable record.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::protocol::AgentPodInfo;

#[derive(Default)]
pub struct AgentPodRegistry {
    pods: Mutex<HashMap<String, AgentPodInfo>>,
}

impl AgentPodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full overwrite on re-register.
    pub fn register(&self, info: AgentPodInfo) {
        self.pods.lock().insert(info.pod_id.clone(), info);
    }

    pub fn status(&self, pod_id: &str) -> Option<AgentPodInfo> {
        self.pods.lock().get(pod_id).cloned()
    }

    /// Idempotent: deregistering an already-absent pod is not an error.
    pub fn deregister(&self, pod_id: &str) {
        self.pods.lock().remove(pod_id);
    }

    pub fn list(&self, rig: Option<&str>) -> Vec<AgentPodInfo> {
        let mut pods: Vec<AgentPodInfo> = self
            .pods
            .lock()
            .values()
            .filter(|p| rig.is_none() || p.rig.as_deref() == rig)
            .cloned()
            .collect();
        pods.sort_by(|a, b| a.pod_id.cmp(&b.pod_id));
        pods
    }
}
