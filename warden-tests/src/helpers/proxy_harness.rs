//! Fake proxy executables wired to a real supervisor

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use warden_daemon::store::ConfigStore;
use warden_daemon::supervisor::{Supervisor, SupervisorConfig};

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

/// Behaviour of the generated proxy script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScript {
    /// Runs until signalled
    LongRunning,
    /// Writes to stderr and exits with the given code
    ExitsImmediately(i32),
    /// Ignores SIGTERM, only SIGKILL stops it
    IgnoresSigterm,
}

impl ProxyScript {
    fn body(self) -> String {
        // The shell must stay in the foreground (no `exec`) so the process
        // keeps the script's name for host scans.
        match self {
            ProxyScript::LongRunning => {
                "echo proxy started\nwhile :; do sleep 1; done".to_string()
            }
            ProxyScript::ExitsImmediately(code) => {
                format!("echo failed to load config >&2\nexit {}", code)
            }
            ProxyScript::IgnoresSigterm => {
                "trap '' TERM\necho proxy started\nwhile :; do sleep 1; done".to_string()
            }
        }
    }
}

/// Executable name unique per process and call, short enough to survive the
/// kernel's 15-character command name limit.
fn unique_executable_name() -> String {
    let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("wt{:05}x{:03}", std::process::id() % 100_000, n % 1000)
}

/// A deployment root holding one fake proxy executable
pub struct ProxyHarness {
    dir: TempDir,
    executable: String,
}

impl ProxyHarness {
    pub fn new(script: ProxyScript) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let harness = Self {
            dir,
            executable: unique_executable_name(),
        };
        harness.write_script(script);
        harness
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn executable_name(&self) -> &str {
        &self.executable
    }

    pub fn executable_path(&self) -> PathBuf {
        self.dir.path().join(&self.executable)
    }

    /// (Re)write the executable with the given behaviour
    pub fn write_script(&self, script: ProxyScript) {
        let path = self.executable_path();
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script.body()))
            .expect("failed to write proxy script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("failed to chmod proxy script");
    }

    pub fn remove_executable(&self) {
        std::fs::remove_file(self.executable_path()).expect("failed to remove executable");
    }

    /// Supervisor settings with short timings for tests
    pub fn supervisor_config(&self) -> SupervisorConfig {
        let mut config = SupervisorConfig::new(self.dir.path(), &self.executable);
        config.stop_timeout = Duration::from_millis(1500);
        config.launch_grace = Duration::from_millis(300);
        config.restart_settle = Duration::from_millis(100);
        config
    }

    /// Supervisor using the real host process scanner
    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(self.supervisor_config())
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("ZBProxy.json")
    }

    /// Write a config document and return a store for it
    pub fn store_with(&self, document: &Value) -> ConfigStore {
        let store = ConfigStore::new(self.config_path());
        store.save(document).expect("failed to write config");
        store
    }

    /// Launch the executable directly, outside any supervisor
    pub fn spawn_external(&self) -> ExternalProcess {
        let child = Command::new(self.executable_path())
            .current_dir(self.dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn external proxy");
        ExternalProcess { child }
    }

    pub fn read_log(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("out.log")).unwrap_or_default()
    }
}

/// A proxy started by the test itself. Killed and reaped on drop.
pub struct ExternalProcess {
    child: Child,
}

impl ExternalProcess {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Reap the process if it has exited; returns whether it has
    pub fn try_reap(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}

impl Drop for ExternalProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
