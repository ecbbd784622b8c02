//! Host process discovery
//!
//! External instances of the proxy are found by walking the OS process
//! table and matching on the executable name. Linux truncates the kernel
//! process name (`comm`) to 15 bytes, so a truncated name that is a prefix
//! of the executable also counts as a match.

use std::ffi::OsStr;
use std::path::Path;

use chrono::{DateTime, Utc};
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use tracing::trace;

/// Length of the kernel's truncated process name
const COMM_LEN: usize = 15;

/// A process observed in the host process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProcess {
    pub pid: u32,
    pub name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub memory_bytes: u64,
}

/// Source of host process information.
///
/// The default implementation reads the live process table; tests may
/// substitute a fixed table.
pub trait ProcessScanner: Send + Sync {
    /// Every live process whose name or executable matches `executable`,
    /// excluding the calling process.
    fn find_by_executable(&self, executable: &str) -> Vec<HostProcess>;

    /// Details for one PID, if it is alive.
    fn inspect(&self, pid: u32) -> Option<HostProcess>;
}

/// [`ProcessScanner`] backed by sysinfo
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoScanner;

impl SysinfoScanner {
    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing()
            .with_memory()
            .with_exe(UpdateKind::OnlyIfNotSet)
    }
}

impl ProcessScanner for SysinfoScanner {
    fn find_by_executable(&self, executable: &str) -> Vec<HostProcess> {
        let mut sys = System::new();
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());

        let own_pid = std::process::id();
        let mut found: Vec<HostProcess> = sys
            .processes()
            .values()
            .filter(|p| p.pid().as_u32() != own_pid)
            .filter(|p| p.thread_kind().is_none())
            .filter(|p| p.status() != ProcessStatus::Zombie)
            .filter(|p| process_matches(p, executable))
            .map(to_host_process)
            .collect();
        found.sort_by_key(|p| p.pid);

        trace!("Scan for {} found {} process(es)", executable, found.len());
        found
    }

    fn inspect(&self, pid: u32) -> Option<HostProcess> {
        let mut sys = System::new();
        let sysinfo_pid = Pid::from_u32(pid);
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sysinfo_pid]),
            true,
            Self::refresh_kind(),
        );
        sys.process(sysinfo_pid)
            .filter(|p| p.status() != ProcessStatus::Zombie)
            .map(to_host_process)
    }
}

fn process_matches(process: &Process, executable: &str) -> bool {
    if matches_executable(&process.name().to_string_lossy(), executable) {
        return true;
    }
    process
        .exe()
        .and_then(Path::file_name)
        .map(OsStr::to_string_lossy)
        .is_some_and(|exe| exe.eq_ignore_ascii_case(executable))
}

fn to_host_process(process: &Process) -> HostProcess {
    HostProcess {
        pid: process.pid().as_u32(),
        name: process.name().to_string_lossy().into_owned(),
        started_at: DateTime::from_timestamp(process.start_time() as i64, 0),
        memory_bytes: process.memory(),
    }
}

/// Case-insensitive match of a process name against the executable name.
///
/// Accepts names containing the executable, and kernel-truncated names that
/// are a prefix of it.
pub fn matches_executable(process_name: &str, executable: &str) -> bool {
    if process_name.is_empty() || executable.is_empty() {
        return false;
    }
    let name = process_name.to_lowercase();
    let exe = executable.to_lowercase();
    name.contains(&exe) || (name.len() == COMM_LEN && exe.starts_with(&name))
}

/// Whole seconds elapsed since `started_at`, clamped at zero
pub fn uptime_secs(started_at: DateTime<Utc>) -> u64 {
    (Utc::now() - started_at).num_seconds().max(0) as u64
}
