// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! `GitStore`: the versioned backend. Wraps [`PlainStore`]'s
//! `MaterializedState` machinery unchanged and additionally implements
//! [`RemoteStorage`] by shelling out to a `git` binary against a
//! `.beads/dolt/` working tree that version-controls the exported JSONL
//! files.
//!
//! `git` is the closest available analog to a versioned table store and
//! is reached as a thin `std::process::Command` wrapper, not a vendored
//! binding.

use std::path::{Path, PathBuf};
use std::process::Command;

use beads_core::{Comment, Dependency, Issue, IssueFilter, MutationEvent, WorkFilter};

use crate::error::{Result, StoreError};
use crate::plain_store::PlainStore;
use crate::traits::{IssueUpdates, RemoteStorage, Storage};

fn git(args: &[&str], cwd: &Path) -> Result<String> {
    let output = Command::new("git").args(args).current_dir(cwd).output().map_err(|e| {
        StoreError::with_source(beads_core::StoreErrorKind::RemoteUnavailable, "failed to execute git", e)
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(StoreError::remote_unavailable(format!("git {args:?} failed: {stderr}")));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub struct GitStore {
    plain: PlainStore,
    repo_dir: PathBuf,
}

impl GitStore {
    /// Opens the underlying `PlainStore` at `db_dir` and ensures
    /// `repo_dir` (conventionally `.beads/dolt/`) is an initialized git
    /// working tree.
    pub fn open(db_dir: &Path, repo_dir: &Path) -> Result<Self> {
        let plain = PlainStore::open(db_dir)?;
        std::fs::create_dir_all(repo_dir)?;
        if !repo_dir.join(".git").exists() {
            git(&["init"], repo_dir)?;
        }
        Ok(Self { plain, repo_dir: repo_dir.to_path_buf() })
    }
}

// Every Storage operation is delegated to the wrapped PlainStore
// unchanged; GitStore adds no issue-store semantics of its own, only the
// RemoteStorage capability below.
impl Storage for GitStore {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<Issue> {
        self.plain.create_issue(issue, actor)
    }
    fn get_issue(&self, id: &str) -> Result<Issue> {
        self.plain.get_issue(id)
    }
    fn resolve_id(&self, partial: &str) -> Result<String> {
        self.plain.resolve_id(partial)
    }
    fn search_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.plain.search_issues(filter)
    }
    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<Issue> {
        self.plain.update_issue(id, updates, actor)
    }
    fn close_issue(&self, id: &str, actor: &str) -> Result<Issue> {
        self.plain.close_issue(id, actor)
    }
    fn tombstone_issue(&self, id: &str, actor: &str, reason: Option<&str>) -> Result<Issue> {
        self.plain.tombstone_issue(id, actor, reason)
    }
    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()> {
        self.plain.add_dependency(dep, actor)
    }
    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()> {
        self.plain.remove_dependency(issue_id, depends_on_id, actor)
    }
    fn get_all_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        self.plain.get_all_dependency_records(issue_id)
    }
    fn all_dependencies(&self) -> Result<Vec<Dependency>> {
        self.plain.all_dependencies()
    }
    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.plain.add_label(issue_id, label, actor)
    }
    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.plain.remove_label(issue_id, label, actor)
    }
    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        self.plain.get_labels(issue_id)
    }
    fn set_state(
        &self,
        issue_id: &str,
        dimension: &str,
        new_value: &str,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<crate::traits::StateUpdate> {
        self.plain.set_state(issue_id, dimension, new_value, reason, actor)
    }
    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        self.plain.add_comment(issue_id, author, text)
    }
    fn merge_comments(&self, issue_id: &str, incoming: &[Comment]) -> Result<()> {
        self.plain.merge_comments(issue_id, incoming)
    }
    fn get_ready_work(&self, filter: &WorkFilter) -> Result<Vec<Issue>> {
        self.plain.get_ready_work(filter)
    }
    fn get_next_child_id(&self, parent_id: &str) -> Result<String> {
        self.plain.get_next_child_id(parent_id)
    }
    fn get_config(&self, key: &str) -> Result<Option<String>> {
        self.plain.get_config(key)
    }
    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.plain.set_config(key, value)
    }
    fn get_all_config(&self) -> Result<std::collections::HashMap<String, String>> {
        self.plain.get_all_config()
    }
    fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        self.plain.get_metadata(key)
    }
    fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.plain.set_metadata(key, value)
    }
    fn get_all_events_since(&self, since_id: i64) -> Result<Vec<MutationEvent>> {
        self.plain.get_all_events_since(since_id)
    }
    fn clear_dirty_issues_by_id(&self, ids: &[String]) -> Result<()> {
        self.plain.clear_dirty_issues_by_id(ids)
    }
    fn dirty_issue_ids(&self) -> Result<Vec<String>> {
        self.plain.dirty_issue_ids()
    }
    fn checkpoint(&self) -> Result<()> {
        self.plain.checkpoint()
    }

    fn as_remote(&self) -> Option<&dyn RemoteStorage> {
        Some(self)
    }
}

impl RemoteStorage for GitStore {
    fn commit(&self, message: &str) -> Result<String> {
        git(&["add", "-A"], &self.repo_dir)?;
        let status = git(&["status", "--porcelain"], &self.repo_dir)?;
        if status.is_empty() {
            return self.get_current_commit();
        }
        git(&["commit", "-m", message], &self.repo_dir)?;
        self.get_current_commit()
    }

    fn push(&self) -> Result<()> {
        let remotes = git(&["remote"], &self.repo_dir)?;
        if remotes.trim().is_empty() {
            tracing::warn!("push skipped: no remote configured");
            return Ok(());
        }
        git(&["push"], &self.repo_dir)?;
        Ok(())
    }

    fn pull(&self) -> Result<()> {
        let remotes = git(&["remote"], &self.repo_dir)?;
        if remotes.trim().is_empty() {
            tracing::warn!("pull skipped: no remote configured");
            return Ok(());
        }
        git(&["pull", "--no-rebase"], &self.repo_dir)?;
        Ok(())
    }

    fn branch(&self, name: &str) -> Result<()> {
        git(&["checkout", "-b", name], &self.repo_dir)?;
        Ok(())
    }

    fn current_branch(&self) -> Result<String> {
        git(&["rev-parse", "--abbrev-ref", "HEAD"], &self.repo_dir)
    }

    fn merge(&self, branch: &str) -> Result<()> {
        git(&["merge", "--no-edit", branch], &self.repo_dir)?;
        Ok(())
    }

    fn history(&self, path: &str, limit: usize) -> Result<Vec<String>> {
        let out = git(&["log", &format!("-n{limit}"), "--format=%H", "--", path], &self.repo_dir)?;
        Ok(out.lines().map(str::to_string).collect())
    }

    fn as_of(&self, commit: &str, path: &str) -> Result<Vec<u8>> {
        let out = git(&["show", &format!("{commit}:{path}")], &self.repo_dir)?;
        Ok(out.into_bytes())
    }

    fn diff(&self, from: &str, to: &str, path: &str) -> Result<String> {
        git(&["diff", from, to, "--", path], &self.repo_dir)
    }

    fn get_current_commit(&self) -> Result<String> {
        git(&["rev-parse", "HEAD"], &self.repo_dir)
    }

    fn get_conflicts(&self) -> Result<Vec<String>> {
        let out = git(&["diff", "--name-only", "--diff-filter=U"], &self.repo_dir)?;
        Ok(out.lines().map(str::to_string).collect())
    }

    fn resolve_conflicts(&self, path: &str) -> Result<()> {
        git(&["add", path], &self.repo_dir)?;
        Ok(())
    }
}
