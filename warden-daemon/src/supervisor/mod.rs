//! Lifecycle management for the single managed proxy process
//!
//! This module provides:
//! - `Supervisor` - start/stop/restart/status for one executable
//! - `ProcessScanner` - discovery of instances started outside the supervisor
//! - `terminate` - SIGTERM-then-SIGKILL escalation for foreign PIDs
//! - `fix_permissions` / `ensure_executable` - execute-bit repair
//!
//! Every lifecycle operation holds the supervisor lock from beginning to end,
//! including the host scan and the post-launch grace period, so concurrent
//! callers always see a consistent "is anything running" answer. `restart`
//! releases the lock between its stop and start phases.

mod permissions;
mod scan;
mod signal;

pub use permissions::{PermissionFix, ensure_executable, fix_permissions};
pub use scan::{HostProcess, ProcessScanner, SysinfoScanner, matches_executable, uptime_secs};
pub use signal::{process_alive, terminate};

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use warden_protocol::protocol::{ProcessState, StatusInfo};

use crate::errors::{RestartFailed, SupervisorError, SupervisorResult};

/// Settings for a [`Supervisor`]
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Deployment root, used as the child's working directory
    pub root_dir: PathBuf,
    /// Executable path, relative paths are resolved against `root_dir`
    pub executable: PathBuf,
    /// File receiving the child's combined stdout and stderr
    pub log_file: PathBuf,
    /// Time allowed between SIGTERM and SIGKILL
    pub stop_timeout: Duration,
    /// Delay after spawning before the one-shot liveness check
    pub launch_grace: Duration,
    /// Pause between the stop and start halves of a restart
    pub restart_settle: Duration,
}

impl SupervisorConfig {
    pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_LAUNCH_GRACE: Duration = Duration::from_secs(1);
    pub const DEFAULT_RESTART_SETTLE: Duration = Duration::from_secs(2);

    pub fn new(root_dir: impl Into<PathBuf>, executable: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        Self {
            log_file: root_dir.join("out.log"),
            root_dir,
            executable: executable.into(),
            stop_timeout: Self::DEFAULT_STOP_TIMEOUT,
            launch_grace: Self::DEFAULT_LAUNCH_GRACE,
            restart_settle: Self::DEFAULT_RESTART_SETTLE,
        }
    }

    /// Absolute path of the executable
    pub fn executable_path(&self) -> PathBuf {
        let joined = self.root_dir.join(&self.executable);
        std::path::absolute(&joined).unwrap_or(joined)
    }

    /// File name used to recognise external instances
    pub fn executable_name(&self) -> String {
        self.executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The child process spawned by this supervisor
struct ManagedProcess {
    child: Child,
    pid: u32,
    started_at: DateTime<Utc>,
    /// Held open for the child's lifetime, closed when tracking is dropped
    _log: File,
}

impl ManagedProcess {
    /// Reap-aware liveness check; logs the exit status when the child is gone.
    fn is_running(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!("Proxy {} exited with {}", self.pid, status);
                false
            }
            Err(e) => {
                warn!("Failed to poll proxy {}: {}", self.pid, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("pid", &self.pid)
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// Result of a successful restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restarted {
    pub pid: u32,
    pub stopped: Vec<u32>,
}

pub struct Supervisor {
    config: SupervisorConfig,
    scanner: Arc<dyn ProcessScanner>,
    tracked: Mutex<Option<ManagedProcess>>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_scanner(config, Arc::new(SysinfoScanner))
    }

    pub fn with_scanner(config: SupervisorConfig, scanner: Arc<dyn ProcessScanner>) -> Self {
        Self {
            config,
            scanner,
            tracked: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// PID of the tracked child, without reconciling
    pub async fn tracked_pid(&self) -> Option<u32> {
        self.tracked.lock().await.as_ref().map(|m| m.pid)
    }

    fn find_external(&self) -> Vec<HostProcess> {
        self.scanner
            .find_by_executable(&self.config.executable_name())
    }

    /// Launch the executable unless an instance is already running.
    pub async fn start(&self) -> SupervisorResult<u32> {
        let mut tracked = self.tracked.lock().await;

        if let Some(managed) = tracked.as_mut() {
            if managed.is_running() {
                return Err(SupervisorError::AlreadyRunning { pid: managed.pid });
            }
            *tracked = None;
        }

        if let Some(external) = self.find_external().first() {
            info!("Found externally started proxy (PID {})", external.pid);
            return Err(SupervisorError::AlreadyRunning { pid: external.pid });
        }

        let executable = self.config.executable_path();
        if !executable.is_file() {
            return Err(SupervisorError::ExecutableNotFound(executable));
        }

        if let Err(e) = ensure_executable(&executable) {
            warn!(
                "Could not add execute permission to {}: {}",
                executable.display(),
                e
            );
        }

        let mut managed = self.spawn(&executable)?;
        let pid = managed.pid;

        tokio::time::sleep(self.config.launch_grace).await;

        match managed.child.try_wait() {
            Ok(None) => {
                info!("Proxy started with PID {}", pid);
                *tracked = Some(managed);
                Ok(pid)
            }
            Ok(Some(status)) => {
                warn!("Proxy {} exited during launch with {}", pid, status);
                Err(SupervisorError::LaunchFailed {
                    exit_code: status.code(),
                    log: self.config.log_file.clone(),
                })
            }
            Err(e) => Err(SupervisorError::Process(format!(
                "failed to poll launched process {}: {}",
                pid, e
            ))),
        }
    }

    fn spawn(&self, executable: &Path) -> SupervisorResult<ManagedProcess> {
        let log_path = &self.config.log_file;
        let log_error = |source| SupervisorError::LogFile {
            path: log_path.clone(),
            source,
        };

        // O_APPEND: writes land at the current end even after a clear truncates the file
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(log_error)?;
        log.set_len(0).map_err(log_error)?;
        let stdout = log.try_clone().map_err(log_error)?;
        let stderr = log.try_clone().map_err(log_error)?;

        debug!(
            "Spawning {} in {} (log {})",
            executable.display(),
            self.config.root_dir.display(),
            log_path.display()
        );

        let child = Command::new(executable)
            .current_dir(&self.config.root_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| SupervisorError::from_spawn(executable, e))?;

        let pid = child.id().ok_or_else(|| {
            SupervisorError::Process("spawned process has no PID".into())
        })?;

        Ok(ManagedProcess {
            child,
            pid,
            started_at: Utc::now(),
            _log: log,
        })
    }

    /// Stop the tracked child and every external instance. Never fails;
    /// returns the PIDs that were stopped.
    pub async fn stop(&self) -> Vec<u32> {
        let mut tracked = self.tracked.lock().await;
        let mut stopped = Vec::new();

        if let Some(managed) = tracked.take() {
            let pid = managed.pid;
            match self.stop_managed(managed).await {
                Ok(true) => stopped.push(pid),
                Ok(false) => debug!("Tracked proxy {} had already exited", pid),
                Err(e) => warn!("Failed to stop proxy {}: {}", pid, e),
            }
        }

        for external in self.find_external() {
            match terminate(external.pid, self.config.stop_timeout).await {
                Ok(true) => {
                    info!("Stopped external proxy {}", external.pid);
                    stopped.push(external.pid);
                }
                Ok(false) => debug!("External proxy {} vanished before stop", external.pid),
                Err(e) => warn!("Failed to stop external proxy {}: {}", external.pid, e),
            }
        }

        if stopped.is_empty() {
            info!("Stop requested but proxy was not running");
        }
        stopped
    }

    async fn stop_managed(&self, mut managed: ManagedProcess) -> SupervisorResult<bool> {
        if !managed.is_running() {
            return Ok(false);
        }
        let pid = managed.pid;

        kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            .map_err(|e| SupervisorError::from_signal(pid, e))?;

        match tokio::time::timeout(self.config.stop_timeout, managed.child.wait()).await {
            Ok(Ok(status)) => {
                info!("Proxy {} stopped with {}", pid, status);
                Ok(true)
            }
            Ok(Err(e)) => Err(SupervisorError::Process(format!(
                "failed to wait for proxy {}: {}",
                pid, e
            ))),
            Err(_) => {
                warn!("Proxy {} did not stop gracefully, force killing", pid);
                managed.child.kill().await.map_err(|e| {
                    SupervisorError::Process(format!("failed to kill proxy {}: {}", pid, e))
                })?;
                Ok(true)
            }
        }
    }

    /// Stop everything, wait for the settle delay, then start again.
    ///
    /// The lock is not held across the settle delay, so another caller may
    /// start the proxy in between; the start half then fails with
    /// `AlreadyRunning`.
    pub async fn restart(&self) -> Result<Restarted, RestartFailed> {
        let stopped = self.stop().await;
        tokio::time::sleep(self.config.restart_settle).await;

        match self.start().await {
            Ok(pid) => Ok(Restarted { pid, stopped }),
            Err(error) => Err(RestartFailed { stopped, error }),
        }
    }

    /// Reconcile tracking with the host process table and report.
    pub async fn status(&self) -> StatusInfo {
        let mut tracked = self.tracked.lock().await;

        if let Some(managed) = tracked.as_mut() {
            if managed.is_running() {
                let memory_bytes = self.scanner.inspect(managed.pid).map(|p| p.memory_bytes);
                return StatusInfo {
                    state: ProcessState::RunningOwned,
                    pid: Some(managed.pid),
                    uptime_secs: Some(uptime_secs(managed.started_at)),
                    memory_bytes,
                };
            }
            *tracked = None;
        }

        match self.find_external().into_iter().next() {
            Some(external) => StatusInfo {
                state: ProcessState::RunningExternal,
                pid: Some(external.pid),
                uptime_secs: external.started_at.map(uptime_secs),
                memory_bytes: Some(external.memory_bytes),
            },
            None => StatusInfo::stopped(),
        }
    }
}

#[cfg(test)]
mod tests;
