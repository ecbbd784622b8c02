//! Signal delivery and liveness probes for processes we do not own

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::scan::{ProcessScanner, SysinfoScanner};
use crate::errors::{SupervisorError, SupervisorResult};

/// Interval between liveness checks while waiting for exit
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for SIGKILL to take effect
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Whether `pid` is a live (non-zombie) process.
///
/// `EPERM` from the probe means the process exists but belongs to someone
/// else, which still counts as alive.
pub fn process_alive(pid: u32) -> bool {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) | Err(Errno::EPERM) => SysinfoScanner.inspect(pid).is_some(),
        Err(_) => false,
    }
}

/// Poll until `pid` is gone or `timeout` elapses. Returns whether it exited.
async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !process_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Send SIGTERM, wait up to `timeout`, then SIGKILL.
///
/// Returns `Ok(true)` when the process was stopped by us and `Ok(false)` when
/// it had already vanished before the first signal.
pub async fn terminate(pid: u32, timeout: Duration) -> SupervisorResult<bool> {
    let target = Pid::from_raw(pid as i32);

    match kill(target, Signal::SIGTERM) {
        Ok(()) => debug!("Sent SIGTERM to {}", pid),
        Err(Errno::ESRCH) => return Ok(false),
        Err(e) => return Err(SupervisorError::from_signal(pid, e)),
    }

    if wait_for_exit(pid, timeout).await {
        info!("Process {} terminated gracefully", pid);
        return Ok(true);
    }

    warn!("Process {} did not exit within {:?}, sending SIGKILL", pid, timeout);
    match kill(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => return Err(SupervisorError::from_signal(pid, e)),
    }

    if wait_for_exit(pid, KILL_GRACE).await {
        info!("Process {} killed", pid);
        Ok(true)
    } else {
        Err(SupervisorError::Process(format!(
            "process {} survived SIGKILL",
            pid
        )))
    }
}
