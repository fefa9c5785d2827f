// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! bd-daemon: the per-workspace background process wiring
//! [`beads_daemon::lifecycle`] to a signal-driven event loop: info-flag
//! handling before any lock is taken, log rotation plus a startup marker
//! written before tracing is even initialized, a `tokio::select!` event
//! loop with a background sync ticker, and strict shutdown ordering.
//!
//! Not meant to be run by hand — `bd`'s auto-start forks this binary and
//! waits for the socket to appear.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use beads_daemon::lifecycle::{self, DaemonState, StartupResult};
use beads_daemon::{listener, LifecycleError};
use nix::sys::signal::kill;
use nix::unistd::{getppid, Pid};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

const PARENT_LIVENESS_INTERVAL: Duration = Duration::from_secs(10);
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("bd-daemon {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {}
        }
    }

    let foreground = std::env::args().skip(1).any(|a| a == "--foreground" || a == "-f");
    let workspace_dir = workspace_dir_from_args();
    let log_path = workspace_dir.join(".beads").join("daemon.log");

    rotate_log_if_needed(&log_path);
    write_startup_marker(&log_path)?;
    let _log_guard = setup_logging(&log_path, foreground)?;

    info!(workspace = %workspace_dir.display(), "starting bd-daemon");

    let StartupResult { state, listener: unix_listener, start_lock } = match lifecycle::startup(&workspace_dir) {
        Ok(r) => r,
        Err(LifecycleError::AlreadyRunning { pid }) => {
            eprintln!("bd-daemon is already running for this workspace (pid {pid})");
            std::process::exit(1);
        }
        Err(e) => {
            write_startup_error(&log_path, &e);
            error!(error = %e, "failed to start daemon");
            return Err(e.into());
        }
    };

    tokio::spawn(listener::serve(unix_listener, Arc::clone(&state)));

    if let Some(addr) = state.http_addr.clone() {
        let http_state = Arc::clone(&state);
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(&addr).await {
                Ok(tcp) => {
                    info!(addr = %addr, "http listener bound");
                    if let Err(e) = axum::serve(tcp, beads_daemon::http::router(http_state)).await {
                        error!(error = %e, "http listener exited");
                    }
                }
                Err(e) => error!(error = %e, addr = %addr, "failed to bind http listener"),
            }
        });
    }

    let parent_pid = getppid();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let mut sync_ticker = tokio::time::interval(state.sync_interval);
    sync_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut parent_ticker = tokio::time::interval(PARENT_LIVENESS_INTERVAL);

    info!(socket = %state.paths.socket_path.display(), "bd-daemon ready");
    println!("READY");

    loop {
        tokio::select! {
            _ = sync_ticker.tick() => {
                run_sync_tick(Arc::clone(&state)).await;
            }
            _ = parent_ticker.tick() => {
                if !parent_is_alive(parent_pid) {
                    info!(pid = parent_pid.as_raw(), "parent process is gone, shutting down");
                    break;
                }
            }
            _ = state.shutdown_notify.notified() => {
                info!("shutdown requested via rpc");
                break;
            }
            _ = sigterm.recv() => {
                info!("received sigterm, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received sigint, shutting down");
                break;
            }
            _ = sighup.recv() => {
                warn!("received sighup, ignoring (no live config reload implemented)");
            }
        }
    }

    lifecycle::shutdown(&state).await;
    drop(start_lock);
    info!("bd-daemon stopped");
    Ok(())
}

/// Runs one sync-ticker beat off the async runtime, since the sync
/// pipeline is synchronous I/O end to end.
async fn run_sync_tick(state: Arc<DaemonState>) {
    let result = tokio::task::spawn_blocking(move || {
        beads_sync::pipeline::do_pull_first_sync(
            state.storage.as_ref(),
            &state.paths.export_path,
            &state.paths.sync_lock_path,
            state.sync_mode,
            state.conflict_strategy,
        )
    })
    .await;

    match result {
        Ok(Ok(outcome)) if !outcome.unchanged => {
            info!(
                created = outcome.created,
                merged = outcome.merged,
                tombstoned = outcome.tombstoned,
                conflicts = outcome.conflicts.len(),
                "sync tick applied changes"
            );
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(error = %e, "sync tick failed"),
        Err(e) => warn!(error = %e, "sync tick task panicked"),
    }
}

/// `kill(pid, 0)`-equivalent liveness probe. PIDs `0` and `1` are always
/// treated as alive: a daemon whose parent has already been reaped by
/// init is the ordinary outcome of a detached background process, not
/// evidence the supervising agent session has ended.
fn parent_is_alive(pid: Pid) -> bool {
    let raw = pid.as_raw();
    if raw <= 1 {
        return true;
    }
    kill(pid, None).is_ok()
}

fn workspace_dir_from_args() -> PathBuf {
    std::env::args().skip(1).find(|a| !a.starts_with('-')).map(PathBuf::from).unwrap_or_else(|| {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    })
}

fn print_help() {
    println!("bd-daemon {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("The per-workspace background process behind `bd`. Normally started");
    println!("automatically by `bd`'s auto-start logic; not meant to be run by hand.");
    println!();
    println!("USAGE:");
    println!("    bd-daemon [workspace-dir] [-f|--foreground]");
    println!();
    println!("OPTIONS:");
    println!("    -f, --foreground    Also mirror logs to stderr");
    println!("    -h, --help          Print help information");
    println!("    -V, --version       Print version information");
}

const STARTUP_MARKER_PREFIX: &str = "--- bd-daemon: starting (pid: ";

fn write_startup_marker(log_path: &Path) -> std::io::Result<()> {
    use std::io::Write as _;
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(log_path)?;
    writeln!(file, "{STARTUP_MARKER_PREFIX}{}) ---", std::process::id())
}

fn write_startup_error(log_path: &Path, error: &LifecycleError) {
    use std::io::Write as _;
    let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(log_path) else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start daemon: {error}");
}

/// Rotates `daemon.log` → `daemon.log.1` (single generation) when it
/// exceeds [`MAX_LOG_SIZE`]. Best-effort: rotation failures never block
/// startup.
fn rotate_log_if_needed(log_path: &Path) {
    let Ok(metadata) = std::fs::metadata(log_path) else { return };
    if metadata.len() < MAX_LOG_SIZE {
        return;
    }
    let rotated = format!("{}.1", log_path.display());
    let _ = std::fs::rename(log_path, rotated);
}

fn setup_logging(
    log_path: &Path,
    foreground: bool,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("daemon.log"));
    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = foreground.then(|| fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .with(stderr_layer)
        .init();

    Ok(guard)
}
