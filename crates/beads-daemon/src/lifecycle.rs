// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Daemon supervisor: startup and shutdown sequencing. Acquire a
//! start lock, write a PID file, load/replay durable state, bind the
//! listener last, then reverse the whole sequence on shutdown.

use std::fs::File;
use std::io::Write as _;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use beads_core::Config;
use beads_storage::{GitStore, PlainStore, Storage};
use beads_sync::{pipeline, resolve_sync_mode, ConflictStrategy, FlushManager, Metadata, SyncMode, WorkspacePaths};
use fs2::FileExt;
use tokio::net::UnixListener;
use tokio::sync::Notify;

use crate::error::LifecycleError;
use crate::event_bus::EventBus;
use crate::pods::AgentPodRegistry;
use crate::protocol::PROTOCOL_VERSION;

/// Fallback sync-ticker interval when `sync.interval_secs` is unset in
/// `config.yaml`.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Everything an RPC handler or the main event loop needs, bundled so it
/// can travel as a single `Arc`.
pub struct DaemonState {
    pub storage: Arc<dyn Storage>,
    pub wisp: Arc<dyn beads_storage::WispStore>,
    pub flush: FlushManager,
    pub event_bus: EventBus,
    pub pods: AgentPodRegistry,
    pub paths: WorkspacePaths,
    pub sync_mode: SyncMode,
    pub conflict_strategy: Option<ConflictStrategy>,
    pub http_addr: Option<String>,
    pub token: Option<String>,
    pub sync_interval: Duration,
    pub started_at: Instant,
    /// Flips true once an orderly shutdown has started; new RPCs seen
    /// after this should be rejected with `Aborted` rather than served.
    pub shutting_down: AtomicBool,
    /// Woken by `Request::Shutdown` so the main event loop's
    /// `tokio::select!` can react to an RPC-triggered shutdown without
    /// polling `shutting_down`.
    pub shutdown_notify: Notify,
}

impl DaemonState {
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

pub struct StartupResult {
    pub state: Arc<DaemonState>,
    pub listener: UnixListener,
    /// Holds the start lock for the process lifetime; dropping releases
    /// it. Kept here rather than inside `DaemonState` so shutdown code
    /// can release it only after every other cleanup step has run.
    pub start_lock: File,
}

/// Starts (or refuses to double-start) the daemon for the workspace
/// rooted at `workspace_dir`.
pub fn startup(workspace_dir: &Path) -> Result<StartupResult, LifecycleError> {
    let paths = match WorkspacePaths::resolve_from(workspace_dir)? {
        Some(paths) => paths,
        None => {
            let beads_dir = workspace_dir.join(".beads");
            let paths = WorkspacePaths::for_beads_dir(beads_dir, &Metadata::default());
            paths.write_metadata(&Metadata::default())?;
            paths
        }
    };
    std::fs::create_dir_all(&paths.beads_dir)?;
    let metadata: Metadata = serde_json::from_str(&std::fs::read_to_string(&paths.metadata_path)?)?;

    let start_lock = acquire_start_lock(&paths)?;

    if socket_is_listening(&paths.socket_path) {
        let pid = std::fs::read_to_string(&paths.pid_path).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(0);
        return Err(LifecycleError::AlreadyRunning { pid });
    }

    write_pid_file(&paths.pid_path)?;
    std::fs::write(&paths.version_path, PROTOCOL_VERSION)?;

    let config = Config::load(&paths.config_path)?;

    let storage: Arc<dyn Storage> = open_storage(&paths, &metadata)?;

    let workspace_sync_mode = config.sync.mode.as_deref();
    let store_sync_mode = storage.get_config("sync.mode")?;
    let sync_mode = resolve_sync_mode(workspace_sync_mode, store_sync_mode.as_deref());

    let conflict_strategy = config.sync.conflict_strategy.as_deref().and_then(parse_conflict_strategy);

    let wisp = open_wisp_store();

    let flush = FlushManager::spawn(Arc::clone(&storage), paths.export_path.clone(), sync_mode.should_export_jsonl());

    let http_addr = std::env::var("BD_DAEMON_HOST").ok().or_else(|| config.daemon.http_addr.clone());
    let token = std::env::var("BD_TOKEN").ok().or_else(|| config.daemon.token.clone());
    let sync_interval = config.sync.interval_secs.map(Duration::from_secs).unwrap_or(DEFAULT_SYNC_INTERVAL);

    remove_stale_socket(&paths.socket_path);
    let listener = UnixListener::bind(&paths.socket_path)?;
    set_owner_only_permissions(&paths.socket_path)?;

    let (event_bus, _reader) = EventBus::new();

    let state = Arc::new(DaemonState {
        storage,
        wisp,
        flush,
        event_bus,
        pods: AgentPodRegistry::new(),
        paths,
        sync_mode,
        conflict_strategy,
        http_addr,
        token,
        sync_interval,
        started_at: Instant::now(),
        shutting_down: AtomicBool::new(false),
        shutdown_notify: Notify::new(),
    });

    Ok(StartupResult { state, listener, start_lock })
}

/// Shutdown ordering: quiesce RPCs (caller's
/// responsibility, signaled by `shutting_down`) → final export sync →
/// flush manager shutdown → checkpoint → remove socket/pid/version
/// files. Releasing the start lock is the caller's job (drop the
/// `start_lock` file after this returns).
pub async fn shutdown(state: &DaemonState) {
    state.shutting_down.store(true, Ordering::SeqCst);

    if let Err(e) =
        pipeline::do_export_sync(state.storage.as_ref(), &state.paths.export_path, state.sync_mode)
    {
        tracing::warn!(error = %e, "final export sync failed during shutdown");
    }

    state.flush.shutdown().await;

    if let Err(e) = state.storage.checkpoint() {
        tracing::warn!(error = %e, "checkpoint failed during shutdown");
    }

    let _ = std::fs::remove_file(&state.paths.socket_path);
    let _ = std::fs::remove_file(&state.paths.pid_path);
    let _ = std::fs::remove_file(&state.paths.version_path);
}

fn acquire_start_lock(paths: &WorkspacePaths) -> Result<File, LifecycleError> {
    let file = std::fs::OpenOptions::new().create(true).write(true).open(&paths.start_lock_path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(_) if socket_is_listening(&paths.socket_path) => {
            let pid = std::fs::read_to_string(&paths.pid_path).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(0);
            Err(LifecycleError::AlreadyRunning { pid })
        }
        Err(e) => Err(LifecycleError::LockFailed(e.to_string())),
    }
}

/// A synchronous connect probe: enough to tell "something is listening"
/// from "this path is stale", without pulling the async runtime into a
/// function called before any `Arc<DaemonState>` exists.
fn socket_is_listening(socket_path: &Path) -> bool {
    StdUnixStream::connect(socket_path).is_ok()
}

fn remove_stale_socket(socket_path: &Path) {
    if socket_path.exists() && !socket_is_listening(socket_path) {
        let _ = std::fs::remove_file(socket_path);
    }
}

fn write_pid_file(pid_path: &Path) -> Result<(), LifecycleError> {
    let mut file = std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(pid_path)?;
    write!(file, "{}", std::process::id())?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<(), LifecycleError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

fn open_storage(paths: &WorkspacePaths, metadata: &Metadata) -> Result<Arc<dyn Storage>, LifecycleError> {
    Ok(match metadata.backend.as_str() {
        "dolt" | "git" | "versioned" => Arc::new(GitStore::open(&paths.database_path, &paths.dolt_dir)?),
        _ => Arc::new(PlainStore::open(&paths.database_path)?),
    })
}

fn open_wisp_store() -> Arc<dyn beads_storage::WispStore> {
    match std::env::var("BD_REDIS_URL") {
        Ok(_) => {
            let namespace = std::env::var("BD_REDIS_NAMESPACE").unwrap_or_else(|_| "beads".to_string());
            let ttl = std::env::var("BD_REDIS_WISP_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(beads_storage::DEFAULT_WISP_TTL);
            Arc::new(beads_storage::RemoteWispStore::new(namespace, ttl))
        }
        Err(_) => Arc::new(beads_storage::InMemoryWispStore::new()),
    }
}

fn parse_conflict_strategy(raw: &str) -> Option<ConflictStrategy> {
    Some(match raw {
        "keep-local" => ConflictStrategy::KeepLocal,
        "keep-remote" => ConflictStrategy::KeepRemote,
        "merge-field-level" => ConflictStrategy::MergeFieldLevel,
        "newer-wins" => ConflictStrategy::NewerWins,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_creates_workspace_and_binds_socket() {
        let dir = tempfile::tempdir().unwrap();
        let result = startup(dir.path()).unwrap();
        assert!(dir.path().join(".beads/daemon.pid").exists());
        assert!(dir.path().join(".beads/daemon.version").exists());
        assert!(dir.path().join(".beads/bd.sock").exists());
        drop(result.listener);
        drop(result.start_lock);
    }

    #[tokio::test]
    async fn double_startup_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let first = startup(dir.path()).unwrap();

        let err = startup(dir.path()).unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyRunning { .. }) || matches!(err, LifecycleError::LockFailed(_)));

        shutdown(&first.state).await;
        drop(first.listener);
        drop(first.start_lock);
    }

    #[tokio::test]
    async fn shutdown_removes_runtime_files() {
        let dir = tempfile::tempdir().unwrap();
        let result = startup(dir.path()).unwrap();
        shutdown(&result.state).await;
        assert!(!dir.path().join(".beads/bd.sock").exists());
        assert!(!dir.path().join(".beads/daemon.pid").exists());
        assert!(!dir.path().join(".beads/daemon.version").exists());
        drop(result.listener);
        drop(result.start_lock);
    }
}
