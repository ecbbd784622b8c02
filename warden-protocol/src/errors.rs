use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("message of {0} bytes exceeds the maximum size")]
    MessageTooLarge(usize),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to daemon socket {socket_path}: {source}")]
    Connect {
        socket_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to send request {request}: {source}")]
    Send {
        request: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to receive response to {request}: {source}")]
    Receive {
        request: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("daemon closed the connection")]
    Disconnected,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("stale socket found at {socket_path} cannot be deleted: {source}")]
    StaleSocket {
        socket_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to use symlink as socket path: {socket_path}")]
    SocketSymlink { socket_path: PathBuf },

    #[error("cannot bind unix socket at {socket_path}: {source}")]
    Bind {
        socket_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set socket permissions at {socket_path}: {source}")]
    SocketPermissions {
        socket_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to receive request: {0}")]
    Receive(#[source] std::io::Error),

    #[error("request of {0} bytes exceeds the maximum size")]
    MessageTooLarge(usize),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
