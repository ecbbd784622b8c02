use super::*;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

/// Scanner returning a fixed process table
struct FixedScanner(Vec<HostProcess>);

impl ProcessScanner for FixedScanner {
    fn find_by_executable(&self, executable: &str) -> Vec<HostProcess> {
        self.0
            .iter()
            .filter(|p| matches_executable(&p.name, executable))
            .cloned()
            .collect()
    }

    fn inspect(&self, pid: u32) -> Option<HostProcess> {
        self.0.iter().find(|p| p.pid == pid).cloned()
    }
}

fn host_process(pid: u32, name: &str) -> HostProcess {
    HostProcess {
        pid,
        name: name.to_string(),
        started_at: Some(Utc::now() - chrono::Duration::seconds(30)),
        memory_bytes: 4096,
    }
}

fn write_script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
    path
}

fn fast_config(dir: &Path, executable: &str) -> SupervisorConfig {
    let mut config = SupervisorConfig::new(dir, executable);
    config.launch_grace = Duration::from_millis(300);
    config.stop_timeout = Duration::from_secs(2);
    config.restart_settle = Duration::from_millis(50);
    config
}

// ============================================================================
// Name matching
// ============================================================================

#[test]
fn matches_exact_name_case_insensitively() {
    assert!(matches_executable("ZBProxy", "zbproxy"));
    assert!(matches_executable("zbproxy", "ZBProxy"));
}

#[test]
fn matches_name_containing_executable() {
    assert!(matches_executable("zbproxy-old", "zbproxy"));
}

#[test]
fn matches_kernel_truncated_name() {
    assert!(matches_executable("ZBProxy-linux-a", "ZBProxy-linux-amd64-v1"));
}

#[test]
fn rejects_short_prefix_that_is_not_truncation() {
    assert!(!matches_executable("ZBProxy", "ZBProxy-linux-amd64-v1"));
}

#[test]
fn rejects_unrelated_and_empty_names() {
    assert!(!matches_executable("nginx", "zbproxy"));
    assert!(!matches_executable("", "zbproxy"));
    assert!(!matches_executable("zbproxy", ""));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn config_resolves_relative_executable_against_root() {
    let config = SupervisorConfig::new("/srv/proxy", "ZBProxy-linux-amd64-v1");
    assert_eq!(
        config.executable_path(),
        PathBuf::from("/srv/proxy/ZBProxy-linux-amd64-v1")
    );
    assert_eq!(config.executable_name(), "ZBProxy-linux-amd64-v1");
    assert_eq!(config.log_file, PathBuf::from("/srv/proxy/out.log"));
}

#[test]
fn config_keeps_absolute_executable() {
    let config = SupervisorConfig::new("/srv/proxy", "/opt/bin/zbproxy");
    assert_eq!(config.executable_path(), PathBuf::from("/opt/bin/zbproxy"));
    assert_eq!(config.executable_name(), "zbproxy");
}

// ============================================================================
// Permissions
// ============================================================================

#[test]
fn ensure_executable_adds_bits_when_missing() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "noexec", "exit 0", 0o644);

    assert!(ensure_executable(&path).unwrap());
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn ensure_executable_leaves_existing_bits_alone() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "userexec", "exit 0", 0o700);

    assert!(!ensure_executable(&path).unwrap());
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
}

#[test]
fn fix_permissions_reports_modes() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "proxy", "exit 0", 0o600);

    let fix = fix_permissions(&path).unwrap();
    assert_eq!(fix.old_mode, 0o600);
    assert_eq!(fix.new_mode, 0o755);
    assert!(fix.path.is_absolute());
}

#[test]
fn fix_permissions_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = fix_permissions(&dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, SupervisorError::ExecutableNotFound(_)));
}

// ============================================================================
// Lifecycle against a fixed process table
// ============================================================================

#[tokio::test]
async fn status_with_nothing_running_is_stopped() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::with_scanner(
        fast_config(dir.path(), "zbproxy"),
        Arc::new(FixedScanner(vec![])),
    );

    let status = supervisor.status().await;
    assert_eq!(status, StatusInfo::stopped());
}

#[tokio::test]
async fn status_reports_external_process() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::with_scanner(
        fast_config(dir.path(), "zbproxy"),
        Arc::new(FixedScanner(vec![host_process(4242, "zbproxy")])),
    );

    let status = supervisor.status().await;
    assert_eq!(status.state, ProcessState::RunningExternal);
    assert_eq!(status.pid, Some(4242));
    assert!(status.uptime_secs.unwrap() >= 29);
    assert_eq!(status.memory_bytes, Some(4096));
}

#[tokio::test]
async fn start_refuses_when_external_instance_exists() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "zbproxy", "exec sleep 30", 0o755);
    let supervisor = Supervisor::with_scanner(
        fast_config(dir.path(), "zbproxy"),
        Arc::new(FixedScanner(vec![host_process(4242, "zbproxy")])),
    );

    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning { pid: 4242 }));
    assert_eq!(supervisor.tracked_pid().await, None);
    assert!(!dir.path().join("out.log").exists());
}

#[tokio::test]
async fn start_missing_executable_is_not_found() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::with_scanner(
        fast_config(dir.path(), "zbproxy"),
        Arc::new(FixedScanner(vec![])),
    );

    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::ExecutableNotFound(_)));
    assert_eq!(err.kind(), warden_protocol::protocol::ErrorKind::NotFound);
}

#[tokio::test]
async fn stop_with_nothing_running_returns_empty_list() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::with_scanner(
        fast_config(dir.path(), "zbproxy"),
        Arc::new(FixedScanner(vec![])),
    );

    assert!(supervisor.stop().await.is_empty());
    assert!(supervisor.stop().await.is_empty());
}

#[tokio::test]
async fn start_then_stop_owned_child() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "zbproxy", "echo ready\nexec sleep 30", 0o755);
    let supervisor = Supervisor::with_scanner(
        fast_config(dir.path(), "zbproxy"),
        Arc::new(FixedScanner(vec![])),
    );

    let pid = supervisor.start().await.unwrap();
    let status = supervisor.status().await;
    assert_eq!(status.state, ProcessState::RunningOwned);
    assert_eq!(status.pid, Some(pid));

    let stopped = supervisor.stop().await;
    assert_eq!(stopped, vec![pid]);
    assert_eq!(supervisor.tracked_pid().await, None);
    assert_eq!(supervisor.status().await, StatusInfo::stopped());

    let log = std::fs::read_to_string(dir.path().join("out.log")).unwrap();
    assert!(log.contains("ready"));
}

#[tokio::test]
async fn start_repairs_missing_execute_bit() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "zbproxy", "exec sleep 30", 0o644);
    let supervisor = Supervisor::with_scanner(
        fast_config(dir.path(), "zbproxy"),
        Arc::new(FixedScanner(vec![])),
    );

    let pid = supervisor.start().await.unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_ne!(mode & 0o111, 0);

    assert_eq!(supervisor.stop().await, vec![pid]);
}

#[tokio::test]
async fn start_detects_immediate_exit() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "zbproxy", "echo bad config >&2\nexit 3", 0o755);
    let supervisor = Supervisor::with_scanner(
        fast_config(dir.path(), "zbproxy"),
        Arc::new(FixedScanner(vec![])),
    );

    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::LaunchFailed { exit_code: Some(3), .. }));
    assert_eq!(supervisor.tracked_pid().await, None);

    let log = std::fs::read_to_string(dir.path().join("out.log")).unwrap();
    assert!(log.contains("bad config"));
}

#[tokio::test]
async fn start_truncates_previous_log() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("out.log"), "stale line\n").unwrap();
    write_script(dir.path(), "zbproxy", "exec sleep 30", 0o755);
    let supervisor = Supervisor::with_scanner(
        fast_config(dir.path(), "zbproxy"),
        Arc::new(FixedScanner(vec![])),
    );

    let pid = supervisor.start().await.unwrap();
    let log = std::fs::read_to_string(dir.path().join("out.log")).unwrap();
    assert!(!log.contains("stale line"));
    assert_eq!(supervisor.stop().await, vec![pid]);
}

#[tokio::test]
async fn log_cleared_while_running_has_no_gap() {
    let dir = TempDir::new().unwrap();
    write_script(
        dir.path(),
        "zbproxy",
        "while :; do echo tick; sleep 0.05; done",
        0o755,
    );
    let supervisor = Supervisor::with_scanner(
        fast_config(dir.path(), "zbproxy"),
        Arc::new(FixedScanner(vec![])),
    );
    let log_path = dir.path().join("out.log");

    supervisor.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(std::fs::metadata(&log_path).unwrap().len() > 0);

    let report = crate::logs::LogFiles::new(dir.path()).clear();
    assert_eq!(report.cleared, vec!["out.log".to_string()]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let content = std::fs::read(&log_path).unwrap();
    supervisor.stop().await;

    assert!(!content.is_empty());
    assert!(!content.contains(&0u8));
    assert!(content.starts_with(b"tick\n"));
}

#[tokio::test]
async fn status_clears_tracking_after_child_exits() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "zbproxy", "sleep 1", 0o755);
    let mut config = fast_config(dir.path(), "zbproxy");
    config.launch_grace = Duration::from_millis(100);
    let supervisor = Supervisor::with_scanner(config, Arc::new(FixedScanner(vec![])));

    supervisor.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(supervisor.status().await, StatusInfo::stopped());
    assert_eq!(supervisor.tracked_pid().await, None);
}
