//! Test helpers for behavioral specifications.
//!
//! Provides a high-level DSL for testing `bd` CLI behavior.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

// Aggressive timeouts for fast tests.
//
// IMPORTANT:
//   Do NOT change these.
//   File a performance bug instead.
const BD_TIMEOUT_CONNECT_MS: &str = "2000";
const BD_TIMEOUT_EXIT_MS: &str = "500";
const BD_TIMEOUT_IPC_MS: &str = "500";
const BD_CONNECT_POLL_MS: &str = "5";

pub const SPEC_POLL_INTERVAL_MS: u64 = 10;
pub const SPEC_WAIT_MAX_MS: u64 = 2000;

/// Returns the path to a binary, checking the llvm-cov target directory
/// first so coverage runs find the same binaries as plain test runs.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    // Fallback: resolve relative to the test binary itself. It lives at
    // target/debug/deps/specs-<hash>, so its grandparent is target/debug/.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

fn bd_binary() -> PathBuf {
    binary_path("bd")
}

pub fn bd_daemon_binary() -> PathBuf {
    binary_path("bd-daemon")
}

/// Returns a Command configured to run the `bd` binary.
pub fn bd_cmd() -> Command {
    Command::new(bd_binary())
}

/// Create a CLI builder for `bd` commands.
pub fn cli() -> CliBuilder {
    CliBuilder::new()
}

/// High-level CLI builder for fluent test assertions.
pub struct CliBuilder {
    args: Vec<String>,
    dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CliBuilder {
    fn new() -> Self {
        Self {
            args: Vec::new(),
            dir: None,
            envs: vec![
                ("BD_DAEMON_BINARY".into(), bd_daemon_binary().to_string_lossy().into()),
                ("BD_TIMEOUT_CONNECT_MS".into(), BD_TIMEOUT_CONNECT_MS.into()),
                ("BD_TIMEOUT_EXIT_MS".into(), BD_TIMEOUT_EXIT_MS.into()),
                ("BD_TIMEOUT_IPC_MS".into(), BD_TIMEOUT_IPC_MS.into()),
                ("BD_CONNECT_POLL_MS".into(), BD_CONNECT_POLL_MS.into()),
            ],
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn pwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.dir = Some(path.into());
        self
    }

    pub fn env(mut self, key: &str, value: impl AsRef<Path>) -> Self {
        self.envs.push((key.to_string(), value.as_ref().to_string_lossy().to_string()));
        self
    }

    pub fn command(self) -> Command {
        let mut cmd = bd_cmd();
        cmd.args(&self.args);

        if let Some(dir) = self.dir {
            cmd.current_dir(dir);
        }

        for (key, value) in self.envs {
            cmd.env(key, value);
        }

        cmd
    }

    /// Run and expect success (exit code 0).
    pub fn passes(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("command should run");
        assert!(
            output.status.success(),
            "expected command to pass, got exit code {:?}\nstdout: {}\nstderr: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }

    /// Run and expect failure (non-zero exit code).
    pub fn fails(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("command should run");
        assert!(
            !output.status.success(),
            "expected command to fail, but it passed\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }

    /// Run without asserting the exit code, for scenarios that check the
    /// exit code itself (e.g. a blocked hook exits 2).
    pub fn run(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("command should run");
        RunAssert { output }
    }
}

/// Result of a CLI run for chaining assertions.
pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn code(&self) -> Option<i32> {
        self.output.status.code()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(stdout.contains(expected), "stdout does not contain '{}'\nstdout: {}", expected, stdout);
        self
    }

    pub fn stdout_lacks(self, unexpected: &str) -> Self {
        let stdout = self.stdout();
        assert!(!stdout.contains(unexpected), "stdout should not contain '{}'\nstdout: {}", unexpected, stdout);
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(stderr.contains(expected), "stderr does not contain '{}'\nstderr: {}", expected, stderr);
        self
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout()).unwrap_or_else(|e| panic!("stdout is not JSON: {e}\nstdout: {}", self.stdout()))
    }
}

/// Poll a condition until it returns true or the timeout is reached.
pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);
    let poll_interval = std::time::Duration::from_millis(SPEC_POLL_INTERVAL_MS);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(poll_interval);
    }
    false
}

/// A temporary `.beads` workspace with helper methods.
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    /// Create an empty directory, no `.beads` yet.
    pub fn empty() -> Self {
        Self { dir: tempfile::tempdir().unwrap() }
    }

    /// Create a directory and run `bd init` in it with the plain backend.
    pub fn init() -> Self {
        let ws = Self::empty();
        ws.bd().args(&["init"]).passes();
        ws
    }

    /// Create a directory and run `bd init --backend dolt` in it.
    pub fn init_dolt() -> Self {
        let ws = Self::empty();
        ws.bd().args(&["init", "--backend", "dolt"]).passes();
        ws
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn beads_dir(&self) -> PathBuf {
        self.path().join(".beads")
    }

    /// Run a `bd` command in this workspace's context.
    pub fn bd(&self) -> CliBuilder {
        cli().pwd(self.path())
    }

    pub fn read_export(&self) -> String {
        std::fs::read_to_string(self.beads_dir().join("issues.jsonl")).unwrap_or_default()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Always try to stop the daemon (no-op if one never started).
        let mut cmd = self.bd().args(&["daemon", "stop", "--kill"]).command();
        cmd.stdout(std::process::Stdio::null()).stderr(std::process::Stdio::null());
        let _ = cmd.status();
    }
}
