// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Centralized environment variable access for the `bd` CLI: one function
//! per variable, no variable read ad hoc elsewhere.

use std::path::PathBuf;
use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

/// `BEADS_DB`: overrides the resolved database path outright.
pub fn database_override() -> Option<PathBuf> {
    std::env::var("BEADS_DB").ok().map(PathBuf::from)
}

/// `BD_SOCKET`: overrides the resolved daemon socket path.
pub fn socket_override() -> Option<PathBuf> {
    std::env::var("BD_SOCKET").ok().map(PathBuf::from)
}

/// `BD_DAEMON_HOST`: optional HTTP listener address, also read directly
/// by the daemon at startup (`beads_daemon::lifecycle::startup`).
pub fn daemon_host() -> Option<String> {
    std::env::var("BD_DAEMON_HOST").ok()
}

/// `BEADS_SYNC_BRANCH`: overrides the configured sync branch.
pub fn sync_branch() -> Option<String> {
    std::env::var("BEADS_SYNC_BRANCH").ok()
}

/// `BEADS_AUTO_START_DAEMON`: explicit override for the C8 auto-start
/// carve-out.
pub fn auto_start_daemon_forced() -> Option<bool> {
    std::env::var("BEADS_AUTO_START_DAEMON").ok().map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
}

/// `BEADS_TEST_GUARD_DISABLE`: gates destructive integration tests.
pub fn test_guard_disabled() -> bool {
    std::env::var("BEADS_TEST_GUARD_DISABLE").is_ok_and(|v| v == "1")
}

pub fn bd_daemon_binary() -> Option<String> {
    std::env::var("BD_DAEMON_BINARY").ok()
}

pub fn cargo_manifest_dir() -> Option<String> {
    std::env::var("CARGO_MANIFEST_DIR").ok()
}

pub fn timeout_ipc() -> Duration {
    parse_duration_ms("BD_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

pub fn timeout_connect() -> Duration {
    parse_duration_ms("BD_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(2))
}

pub fn timeout_exit() -> Duration {
    parse_duration_ms("BD_TIMEOUT_EXIT_MS").unwrap_or(Duration::from_secs(2))
}

pub fn poll_interval() -> Duration {
    parse_duration_ms("BD_CONNECT_POLL_MS").unwrap_or(Duration::from_millis(50))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn auto_start_forced_parses_truthy_values() {
        std::env::set_var("BEADS_AUTO_START_DAEMON", "true");
        assert_eq!(auto_start_daemon_forced(), Some(true));
        std::env::remove_var("BEADS_AUTO_START_DAEMON");
        assert_eq!(auto_start_daemon_forced(), None);
    }

    #[test]
    #[serial]
    fn timeouts_fall_back_to_defaults() {
        std::env::remove_var("BD_TIMEOUT_IPC_MS");
        assert_eq!(timeout_ipc(), Duration::from_secs(5));
    }
}
