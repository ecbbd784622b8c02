use std::path::PathBuf;

use thiserror::Error;
use warden_protocol::protocol::ErrorKind;

use crate::path::PathError;

/// Format a JSON syntax error with its position for display
fn format_json_error(e: &serde_json::Error) -> String {
    if e.line() == 0 {
        e.to_string()
    } else {
        format!("Line {}, Column {}: {}", e.line(), e.column(), e)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Permission denied accessing config file: {0}")]
    PermissionDenied(PathBuf),

    #[error("Failed to parse config file '{path}':\n  {}", format_json_error(.source))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("{kind} '{name}' already exists")]
    DuplicateEntry { kind: &'static str, name: String },

    #[error("{kind} '{name}' not found")]
    EntryNotFound { kind: &'static str, name: String },

    #[error("No {0} section in config")]
    SectionMissing(&'static str),
}

impl StoreError {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: &std::path::Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                StoreError::PermissionDenied(path.to_path_buf())
            }
            _ => StoreError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) | StoreError::SectionMissing(_) => ErrorKind::NotFound,
            StoreError::EntryNotFound { .. } => ErrorKind::NotFound,
            StoreError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StoreError::Parse { .. } => ErrorKind::ParseError,
            StoreError::Serialize(_) | StoreError::Io { .. } => ErrorKind::IoError,
            StoreError::Path(e) => path_error_kind(e),
            StoreError::DuplicateEntry { .. } => ErrorKind::DuplicateEntry,
        }
    }
}

pub fn path_error_kind(e: &PathError) -> ErrorKind {
    match e {
        PathError::PathNotFound { .. } => ErrorKind::PathNotFound,
        PathError::InvalidIndex { .. } => ErrorKind::InvalidIndex,
        PathError::InvalidTarget { .. } => ErrorKind::InvalidTarget,
    }
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Proxy is already running (PID {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("Executable not found: {0}")]
    ExecutableNotFound(PathBuf),

    #[error("Permission denied while trying to {action} {target}; retry with elevated privileges")]
    PermissionDenied { action: &'static str, target: String },

    #[error("Proxy exited immediately after launch (exit code {exit_code:?}); check {log}")]
    LaunchFailed {
        exit_code: Option<i32>,
        log: PathBuf,
    },

    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: nix::Error,
    },

    #[error("Process error: {0}")]
    Process(String),
}

impl SupervisorError {
    /// Classify a spawn failure by its OS error kind.
    pub fn from_spawn(path: &std::path::Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => SupervisorError::ExecutableNotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => SupervisorError::PermissionDenied {
                action: "execute",
                target: path.display().to_string(),
            },
            _ => SupervisorError::Spawn {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Classify a failed `kill(2)` call.
    pub fn from_signal(pid: u32, source: nix::Error) -> Self {
        if source == nix::Error::EPERM {
            SupervisorError::PermissionDenied {
                action: "signal",
                target: format!("PID {}", pid),
            }
        } else {
            SupervisorError::Signal { pid, source }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            SupervisorError::ExecutableNotFound(_) => ErrorKind::NotFound,
            SupervisorError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            SupervisorError::LaunchFailed { .. } => ErrorKind::LaunchFailed,
            SupervisorError::LogFile { source, .. } | SupervisorError::Spawn { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                ErrorKind::PermissionDenied
            }
            SupervisorError::LogFile { .. }
            | SupervisorError::Spawn { .. }
            | SupervisorError::Signal { .. }
            | SupervisorError::Process(_) => ErrorKind::ProcessError,
        }
    }
}

/// A restart whose start half failed after the stop half ran
#[derive(Error, Debug)]
#[error("Restart failed after stopping {stopped:?}: {error}")]
pub struct RestartFailed {
    pub stopped: Vec<u32>,
    #[source]
    pub error: SupervisorError,
}

impl RestartFailed {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Log file '{name}' is not readable here; allowed: {}", .allowed.join(", "))]
    NotAllowed { name: String, allowed: Vec<String> },

    #[error("Log file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read log file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LogError::NotAllowed { .. } => ErrorKind::NotAllowed,
            LogError::NotFound(_) => ErrorKind::NotFound,
            LogError::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            LogError::Io { .. } => ErrorKind::IoError,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;
pub type LogResult<T> = std::result::Result<T, LogError>;
