// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Daemon process management: find the `bd-daemon` binary, fork-exec it,
//! probe and clean up its socket, and stop it synchronously. Scoped to a
//! per-workspace socket rather than a single user-level daemon.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use crate::client::ClientError;
use crate::env;

/// Starts `bd-daemon <workspace_dir>` detached, returning the child
/// handle so the caller can watch for early exit while polling for the
/// socket.
pub fn start_daemon_background(workspace_dir: &Path) -> Result<std::process::Child, ClientError> {
    let bin = find_daemon_binary()?;
    Command::new(&bin)
        .arg(workspace_dir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))
}

fn find_daemon_binary() -> Result<PathBuf, ClientError> {
    if let Some(path) = env::bd_daemon_binary() {
        return Ok(PathBuf::from(path));
    }

    let current_exe = std::env::current_exe().ok();
    let is_debug_build =
        current_exe.as_ref().and_then(|p| p.to_str()).map(|s| s.contains("target/debug")).unwrap_or(false);

    if is_debug_build {
        if let Some(manifest_dir) = env::cargo_manifest_dir() {
            let dev_path =
                PathBuf::from(manifest_dir).parent().and_then(|p| p.parent()).map(|p| p.join("target/debug/bd-daemon"));
            if let Some(path) = dev_path {
                if path.exists() {
                    return Ok(path);
                }
            }
        }
    }

    if let Some(ref exe) = current_exe {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("bd-daemon");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }

    Ok(PathBuf::from("bd-daemon"))
}

/// Probes whether a Unix socket is accepting connections, synchronously
/// (called before any tokio runtime may exist).
pub fn probe_socket(socket_path: &Path) -> bool {
    std::os::unix::net::UnixStream::connect(socket_path).is_ok()
}

/// Removes a stale socket/PID pair left behind by a crashed daemon.
/// Called only once the caller has established the socket does *not*
/// accept connections.
pub fn cleanup_stale_socket(socket_path: &Path, pid_path: &Path) {
    if pid_path.exists() {
        match read_pid(pid_path) {
            Some(pid) if process_exists(pid) => return,
            _ => {}
        }
    }
    let _ = std::fs::remove_file(socket_path);
    let _ = std::fs::remove_file(pid_path);
}

pub fn read_pid(pid_path: &Path) -> Option<u32> {
    std::fs::read_to_string(pid_path).ok().and_then(|s| s.trim().parse().ok())
}

fn kill_signal(signal: &str, pid: u32) -> bool {
    Command::new("kill")
        .args([signal, &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn process_exists(pid: u32) -> bool {
    kill_signal("-0", pid)
}

pub fn force_kill(pid: u32) -> bool {
    kill_signal("-9", pid)
}

pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(env::poll_interval()).await;
    }
    false
}

/// Stops the daemon owning `pid_path`/`socket_path` synchronously:
/// SIGTERM, poll for exit, SIGKILL if it didn't, always clean up the
/// PID/socket files at the end. Used when a version mismatch forces a
/// restart inside a sync call stack that cannot `.await`.
pub fn stop_daemon_sync(socket_path: &Path, pid_path: &Path) {
    if let Some(pid) = read_pid(pid_path) {
        kill_signal("-15", pid);
        let start = Instant::now();
        let timeout = env::timeout_exit();
        while start.elapsed() < timeout {
            if !process_exists(pid) {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        if process_exists(pid) {
            force_kill(pid);
        }
    }
    let _ = std::fs::remove_file(socket_path);
    let _ = std::fs::remove_file(pid_path);
}

/// `bd-daemon` writes a startup marker line before anything else; an
/// early exit's cause is read back from whatever it logged after that
/// marker.
const STARTUP_MARKER_PREFIX: &str = "--- bd-daemon: starting (pid: ";

pub fn read_startup_error(log_path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(log_path).ok()?;
    parse_startup_error(&content)
}

fn parse_startup_error(content: &str) -> Option<String> {
    let start_pos = content.rfind(STARTUP_MARKER_PREFIX)?;
    let startup_log = &content[start_pos..];
    let errors: Vec<&str> = startup_log.lines().filter(|l| l.contains("ERROR")).collect();
    if errors.is_empty() {
        return None;
    }
    Some(errors.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_startup_error_finds_error_after_marker() {
        let log = format!("{STARTUP_MARKER_PREFIX}42) ---\nERROR failed to start daemon: already running\n");
        assert!(parse_startup_error(&log).unwrap().contains("already running"));
    }

    #[test]
    fn parse_startup_error_none_without_marker() {
        assert!(parse_startup_error("nothing interesting here").is_none());
    }

    #[test]
    fn probe_socket_false_for_missing_path() {
        assert!(!probe_socket(Path::new("/nonexistent/bd.sock")));
    }

    #[test]
    fn cleanup_stale_socket_removes_when_pid_dead() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("bd.sock");
        let pid_path = dir.path().join("daemon.pid");
        std::fs::write(&socket_path, b"").unwrap();
        std::fs::write(&pid_path, "999999999").unwrap();
        cleanup_stale_socket(&socket_path, &pid_path);
        assert!(!socket_path.exists());
        assert!(!pid_path.exists());
    }
}
