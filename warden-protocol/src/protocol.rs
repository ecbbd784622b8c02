use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;

/// Maximum message size (10MB), local Unix socket only
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Default number of lines per file in a log overview
pub const DEFAULT_OVERVIEW_LINES: usize = 200;

/// Default number of lines returned by a tail request
pub const DEFAULT_TAIL_LINES: usize = 50;

/// Maximum lines returned per file by log queries
pub const MAX_LOG_LINES: usize = 10_000;

/// Request sent from CLI to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Liveness check
    Ping,
    /// Stop the managed proxy and exit the daemon
    Shutdown,

    /// Return the whole config document
    GetConfig,
    /// Read the value at a dotted path
    GetValue { path: String },
    /// Replace the value at a dotted path
    SetValue { path: String, value: Value },
    /// Overwrite the whole config document
    ReplaceConfig { document: Value },
    /// Append an entry to `Services`
    AddService { name: String, listen: u16 },
    /// Remove a `Services` entry by name
    RemoveService { name: String },
    /// Append an entry to `Outbounds`, filling stock defaults
    AddOutbound {
        name: String,
        target_address: String,
        target_port: u16,
    },
    /// Remove an `Outbounds` entry by name
    RemoveOutbound { name: String },

    /// Force the executable to mode 0755
    FixPermissions,
    Start,
    Stop,
    Restart,
    Status,

    /// Last `lines` lines of every known log file
    Logs { lines: Option<usize> },
    /// Last `lines` lines of one log file
    TailLog { file: String, lines: Option<usize> },
    /// Truncate every known log file
    ClearLogs,
}

impl Request {
    /// Return the variant name as a static string (for lightweight error reporting)
    pub fn variant_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::Shutdown => "Shutdown",
            Request::GetConfig => "GetConfig",
            Request::GetValue { .. } => "GetValue",
            Request::SetValue { .. } => "SetValue",
            Request::ReplaceConfig { .. } => "ReplaceConfig",
            Request::AddService { .. } => "AddService",
            Request::RemoveService { .. } => "RemoveService",
            Request::AddOutbound { .. } => "AddOutbound",
            Request::RemoveOutbound { .. } => "RemoveOutbound",
            Request::FixPermissions => "FixPermissions",
            Request::Start => "Start",
            Request::Stop => "Stop",
            Request::Restart => "Restart",
            Request::Status => "Status",
            Request::Logs { .. } => "Logs",
            Request::TailLog { .. } => "TailLog",
            Request::ClearLogs => "ClearLogs",
        }
    }
}

/// Flat classification of every failure the daemon can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    PathNotFound,
    InvalidIndex,
    InvalidTarget,
    NotFound,
    PermissionDenied,
    ParseError,
    IoError,
    DuplicateEntry,
    AlreadyRunning,
    LaunchFailed,
    ProcessError,
    NotAllowed,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PathNotFound => "path not found",
            Self::InvalidIndex => "invalid index",
            Self::InvalidTarget => "invalid target",
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::ParseError => "parse error",
            Self::IoError => "I/O error",
            Self::DuplicateEntry => "duplicate entry",
            Self::AlreadyRunning => "already running",
            Self::LaunchFailed => "launch failed",
            Self::ProcessError => "process error",
            Self::NotAllowed => "not allowed",
            Self::InvalidRequest => "invalid request",
            Self::Internal => "internal error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response sent from daemon to CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Successful response
    Ok {
        /// Optional message
        message: Option<String>,
        /// Optional data payload
        data: Option<ResponseData>,
    },
    /// Error response
    Error {
        kind: ErrorKind,
        message: String,
        /// Partial results, e.g. PIDs stopped by a failed restart
        data: Option<ResponseData>,
    },
}

impl Response {
    /// Create a success response with a message
    pub fn ok_with_message(msg: impl Into<String>) -> Self {
        Response::Ok {
            message: Some(msg.into()),
            data: None,
        }
    }

    /// Create a success response with data
    pub fn ok_with_data(data: ResponseData) -> Self {
        Response::Ok {
            message: None,
            data: Some(data),
        }
    }

    /// Create a success response with both a message and data
    pub fn ok(msg: impl Into<String>, data: ResponseData) -> Self {
        Response::Ok {
            message: Some(msg.into()),
            data: Some(data),
        }
    }

    /// Create an error response
    pub fn error(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: msg.into(),
            data: None,
        }
    }

    /// Attach partial results to an error response; no-op on success
    pub fn with_error_data(self, data: ResponseData) -> Self {
        match self {
            Response::Error { kind, message, .. } => Response::Error {
                kind,
                message,
                data: Some(data),
            },
            ok => ok,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}

/// Data payload in response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseData {
    /// The whole config document
    Document(Value),
    /// A single value read by path
    Value(Value),
    Started { pid: u32 },
    Stopped { pids: Vec<u32> },
    Restarted { pid: u32, stopped: Vec<u32> },
    Status(StatusInfo),
    /// One summary per known log file
    Logs(Vec<LogFileSummary>),
    Tail(LogTail),
    Cleared(ClearReport),
    Permissions(PermissionReport),
}

/// Where the managed process is running, if anywhere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Stopped,
    /// Spawned and tracked by this daemon
    RunningOwned,
    /// Found on the host but started elsewhere
    RunningExternal,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::RunningOwned => "running",
            Self::RunningExternal => "running (external)",
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
    /// Resident memory in bytes
    pub memory_bytes: Option<u64>,
}

impl StatusInfo {
    pub fn stopped() -> Self {
        Self {
            state: ProcessState::Stopped,
            pid: None,
            uptime_secs: None,
            memory_bytes: None,
        }
    }
}

/// Tail and size of one log file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFileSummary {
    pub name: String,
    /// False when the file does not exist; other fields are then empty
    pub present: bool,
    pub lines: Vec<String>,
    pub total_lines: usize,
    pub size_bytes: u64,
    /// Set when the file exists but could not be read
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogTail {
    pub name: String,
    pub lines: Vec<String>,
    pub total_lines: usize,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClearReport {
    pub cleared: Vec<String>,
    pub failed: Vec<ClearFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearFailure {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionReport {
    pub path: String,
    pub old_mode: u32,
    pub new_mode: u32,
}

/// Client-to-server message with request ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    pub request: Request,
}

/// Server-to-client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    Response { id: u64, response: Response },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Serialize `msg` and prepend its 4-byte big-endian length
fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(msg).map_err(ProtocolError::Encode)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(payload.len()));
    }
    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Encode a request envelope to length-prefixed JSON bytes
pub fn encode_envelope(envelope: &RequestEnvelope) -> Result<Vec<u8>> {
    encode_frame(envelope)
}

/// Decode a request envelope from a raw JSON payload (framing already stripped)
pub fn decode_envelope(bytes: &[u8]) -> Result<RequestEnvelope> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}

/// Encode a server message to length-prefixed JSON bytes
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>> {
    encode_frame(msg)
}

/// Decode a server message from a raw JSON payload (framing already stripped)
pub fn decode_server_message(bytes: &[u8]) -> Result<ServerMessage> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}
