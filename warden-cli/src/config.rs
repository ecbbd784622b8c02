use crate::errors::{CliError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub struct Config {}

impl Config {
    /// Socket from `--socket` / `WARDEN_SOCKET`, else the daemon's default
    pub fn resolve_socket_path(socket: Option<PathBuf>) -> PathBuf {
        socket.unwrap_or_else(warden_daemon::default_socket_path)
    }

    /// Read a whole replacement config document from disk
    pub fn read_document(path: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CliError::InvalidDocument {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Interpret a `config set` argument: JSON when it parses, else a plain string
    pub fn parse_value(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }
}
