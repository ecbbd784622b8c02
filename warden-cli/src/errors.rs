use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Daemon is not running (no socket at {0}). Start it with: warden-daemon")]
    DaemonNotRunning(PathBuf),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON: {source}")]
    InvalidDocument {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,

    #[error("Protocol error: {0}")]
    Protocol(#[from] warden_protocol::errors::ClientError),
}

pub type Result<T> = std::result::Result<T, CliError>;
