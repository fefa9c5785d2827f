// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Flush manager: turns a noisy stream of "a write happened"
//! notifications into at-most-one-in-flight atomic replacements of the
//! plain-text export file, with no lost tail write.
//!
//! The bounded-mpsc-plus-`try_send`-never-blocks shape for `MarkDirty` is
//! a wake-channel pattern; the generation-counter-plus-`Notify` join
//! pattern lets concurrent `FlushNow`/`Shutdown` callers wait on the
//! completion of the flush that is either already running or about to
//! start, rather than a stale one.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beads_storage::Storage;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::exporter;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);
const CONTROL_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct FlushOutcome {
    pub exported: bool,
    pub issue_count: usize,
    pub content_hash: String,
}

#[derive(Default)]
struct Shared {
    requested_gen: AtomicU64,
    completed_gen: AtomicU64,
    last_error: Mutex<Option<String>>,
    last_outcome: Mutex<Option<FlushOutcome>>,
    /// Set once `shutdown()` has driven its final flush to completion. The
    /// worker task exits right after, so any later `mark_dirty`/`flush_now`
    /// must short-circuit here rather than wait on a generation counter no
    /// running worker will ever advance again.
    shut_down: AtomicBool,
}

enum Mark {
    Dirty { full_export: bool },
}

enum Control {
    FlushNow,
    Shutdown,
}

/// Handle to the running flush worker task. Cloning shares the same
/// worker; cheap, `Send + Sync`.
#[derive(Clone)]
pub struct FlushManager {
    shared: Arc<Shared>,
    notify: Arc<Notify>,
    mark_tx: mpsc::Sender<Mark>,
    control_tx: mpsc::Sender<Control>,
    /// Whether this workspace's sync mode writes a plain-text export at
    /// all. When `false` the public
    /// API is a no-op rather than writing a file nobody wants.
    should_export: bool,
}

impl FlushManager {
    /// Spawns the worker task and returns a handle. `export_path` is the
    /// target JSONL file; `should_export` comes from the resolved
    /// `SyncMode::should_export_jsonl()`.
    pub fn spawn(storage: Arc<dyn Storage>, export_path: PathBuf, should_export: bool) -> Self {
        Self::spawn_with_debounce(storage, export_path, should_export, DEFAULT_DEBOUNCE)
    }

    pub fn spawn_with_debounce(
        storage: Arc<dyn Storage>,
        export_path: PathBuf,
        should_export: bool,
        debounce: Duration,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        let notify = Arc::new(Notify::new());
        let (mark_tx, mark_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);

        if should_export {
            tokio::spawn(worker(
                storage,
                export_path,
                debounce,
                Arc::clone(&shared),
                Arc::clone(&notify),
                mark_rx,
                control_rx,
            ));
        }

        Self { shared, notify, mark_tx, control_tx, should_export }
    }

    /// Non-blocking; records that a flush is needed. `full_export=true`
    /// is sticky.
    pub fn mark_dirty(&self, full_export: bool) {
        if !self.should_export || self.shared.shut_down.load(Ordering::SeqCst) {
            return;
        }
        // Dropping on a full buffer is safe: the flag the drop would have
        // set is set again by the next successful send, and a flush is
        // already pending if the buffer is this full.
        let _ = self.mark_tx.try_send(Mark::Dirty { full_export });
    }

    /// Drives at most one flush to completion, joining an in-flight one
    /// if present.
    pub async fn flush_now(&self) -> Result<FlushOutcome, beads_storage::StoreError> {
        if !self.should_export || self.shared.shut_down.load(Ordering::SeqCst) {
            return Ok(FlushOutcome { exported: false, issue_count: 0, content_hash: String::new() });
        }
        // Reserve our own generation number by bumping the counter here
        // (not just reading it): the worker only ever stamps
        // `completed_gen` with the *current* `requested_gen` value when a
        // flush finishes, so a target computed from a stale read can sit
        // one past anything the worker will ever store, hanging this call
        // forever. Bumping it ourselves guarantees some future completion
        // (triggered by this call's own control message, at minimum) will
        // observe `requested_gen >= target_gen`.
        let target_gen = self.shared.requested_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.control_tx.send(Control::FlushNow).await;
        self.join_generation(target_gen).await
    }

    /// Idempotent; runs one final flush if dirty, bounded by a ~30s
    /// deadline. After this returns, `mark_dirty`/`flush_now` are no-ops.
    pub async fn shutdown(&self) {
        if !self.should_export || self.shared.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let target_gen = self.shared.requested_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.control_tx.send(Control::Shutdown).await;
        let _ = tokio::time::timeout(SHUTDOWN_DEADLINE, self.join_generation(target_gen)).await;
    }

    async fn join_generation(&self, target_gen: u64) -> Result<FlushOutcome, beads_storage::StoreError> {
        loop {
            if self.shared.completed_gen.load(Ordering::SeqCst) >= target_gen {
                break;
            }
            self.notify.notified().await;
        }
        if let Some(message) = self.shared.last_error.lock().clone() {
            return Err(beads_storage::StoreError::internal(message));
        }
        Ok(self.shared.last_outcome.lock().clone().unwrap_or(FlushOutcome {
            exported: false,
            issue_count: 0,
            content_hash: String::new(),
        }))
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker(
    storage: Arc<dyn Storage>,
    export_path: PathBuf,
    debounce: Duration,
    shared: Arc<Shared>,
    notify: Arc<Notify>,
    mut mark_rx: mpsc::Receiver<Mark>,
    mut control_rx: mpsc::Receiver<Control>,
) {
    let mut dirty = false;
    let mut full_export = false;
    let mut deadline: Option<Instant> = None;

    loop {
        let sleep = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            Some(control) = control_rx.recv() => {
                match control {
                    Control::FlushNow => {
                        do_flush(&storage, &export_path, &mut dirty, &mut full_export, &shared, &notify).await;
                        deadline = None;
                    }
                    Control::Shutdown => {
                        let _ = tokio::time::timeout(SHUTDOWN_DEADLINE, async {
                            if dirty {
                                do_flush(&storage, &export_path, &mut dirty, &mut full_export, &shared, &notify).await;
                            }
                        }).await;
                        let gen = shared.requested_gen.load(Ordering::SeqCst).max(1);
                        shared.completed_gen.store(gen, Ordering::SeqCst);
                        notify.notify_waiters();
                        return;
                    }
                }
            }

            Some(Mark::Dirty { full_export: fe }) = mark_rx.recv() => {
                dirty = true;
                full_export |= fe;
                shared.requested_gen.fetch_add(1, Ordering::SeqCst);
                deadline = Some(Instant::now() + debounce);
            }

            _ = sleep => {
                do_flush(&storage, &export_path, &mut dirty, &mut full_export, &shared, &notify).await;
                deadline = None;
            }
        }
    }
}

async fn do_flush(
    storage: &Arc<dyn Storage>,
    export_path: &PathBuf,
    dirty: &mut bool,
    full_export: &mut bool,
    shared: &Arc<Shared>,
    notify: &Arc<Notify>,
) {
    if !*dirty {
        let gen = shared.requested_gen.load(Ordering::SeqCst).max(1);
        shared.completed_gen.store(gen, Ordering::SeqCst);
        notify.notify_waiters();
        return;
    }
    *dirty = false;
    *full_export = false;

    let storage = Arc::clone(storage);
    let export_path = export_path.clone();
    let result = tokio::task::spawn_blocking(move || exporter::write_export(&export_path, storage.as_ref())).await;

    match result {
        Ok(Ok(summary)) => {
            *shared.last_error.lock() = None;
            *shared.last_outcome.lock() = Some(FlushOutcome {
                exported: true,
                issue_count: summary.issue_count,
                content_hash: summary.content_hash,
            });
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "flush failed");
            *shared.last_error.lock() = Some(e.to_string());
        }
        Err(e) => {
            tracing::error!(error = %e, "flush task panicked");
            *shared.last_error.lock() = Some(e.to_string());
        }
    }

    let gen = shared.requested_gen.load(Ordering::SeqCst).max(1);
    shared.completed_gen.store(gen, Ordering::SeqCst);
    notify.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::IssueBuilder;
    use beads_storage::PlainStore;
    use std::sync::Arc;

    fn storage(dir: &std::path::Path) -> Arc<dyn Storage> {
        Arc::new(PlainStore::open(&dir.join("beads.db")).unwrap())
    }

    #[tokio::test]
    async fn flush_now_writes_dirty_issues() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        storage.create_issue(&IssueBuilder::new("bd-1", "Fix login").build(), "alice").unwrap();

        let export_path = dir.path().join("issues.jsonl");
        let manager = FlushManager::spawn(Arc::clone(&storage), export_path.clone(), true);
        manager.mark_dirty(false);
        let outcome = manager.flush_now().await.unwrap();
        assert!(outcome.exported);
        assert_eq!(outcome.issue_count, 1);
        assert!(export_path.exists());
    }

    #[tokio::test]
    async fn disabled_export_mode_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        let export_path = dir.path().join("issues.jsonl");
        let manager = FlushManager::spawn(storage, export_path.clone(), false);
        manager.mark_dirty(true);
        let outcome = manager.flush_now().await.unwrap();
        assert!(!outcome.exported);
        assert!(!export_path.exists());
    }

    #[tokio::test]
    async fn concurrent_mark_dirty_never_blocks_and_flush_reflects_all() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        for n in 0..5 {
            storage
                .create_issue(&IssueBuilder::new(format!("bd-{n}"), format!("issue {n}")).build(), "alice")
                .unwrap();
        }
        let export_path = dir.path().join("issues.jsonl");
        let manager = FlushManager::spawn_with_debounce(
            Arc::clone(&storage),
            export_path.clone(),
            true,
            Duration::from_millis(20),
        );

        let mut handles = Vec::new();
        for _ in 0..10 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..20 {
                    manager.mark_dirty(false);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let outcome = manager.flush_now().await.unwrap();
        assert!(outcome.exported);
        assert_eq!(outcome.issue_count, 5);
    }

    #[tokio::test]
    async fn shutdown_runs_final_flush_once_and_disarms() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        storage.create_issue(&IssueBuilder::new("bd-1", "A").build(), "alice").unwrap();
        let export_path = dir.path().join("issues.jsonl");
        let manager = FlushManager::spawn(Arc::clone(&storage), export_path.clone(), true);
        manager.mark_dirty(false);
        manager.shutdown().await;
        assert!(export_path.exists());

        // Further marks/flushes after shutdown are no-ops, not panics.
        manager.mark_dirty(true);
        let outcome = manager.flush_now().await.unwrap();
        assert!(!outcome.exported);
    }
}
