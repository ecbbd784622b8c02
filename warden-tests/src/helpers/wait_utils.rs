//! Async utilities to wait for process and socket state

use std::path::Path;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use warden_daemon::supervisor::process_alive;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Wait until `pid` no longer refers to a live process
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    wait_until(timeout, || !process_alive(pid)).await
}

/// Wait for a socket file to appear
pub async fn wait_for_socket(path: &Path, timeout: Duration) -> bool {
    wait_until(timeout, || path.exists()).await
}
