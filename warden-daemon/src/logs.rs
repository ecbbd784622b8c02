//! Read-only access to the proxy's log files
//!
//! Only a fixed set of file names under the deployment root can be read or
//! cleared; everything else is rejected with `LogError::NotAllowed`.

mod reverse;

pub use reverse::{ReverseLineReader, tail_lines};

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use warden_protocol::protocol::{ClearFailure, ClearReport, LogFileSummary, LogTail, MAX_LOG_LINES};

use crate::errors::{LogError, LogResult};

/// Log files the proxy and supervisor write under the deployment root
pub const LOG_FILES: [&str; 4] = ["out.log", "zbproxy.log", "error.log", "access.log"];

/// Count lines the way a forward line reader would (a final unterminated
/// line counts, a trailing newline does not add one).
pub fn count_lines(file: &mut File) -> std::io::Result<usize> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut count = 0;
    let mut last = None;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        count += memchr::memchr_iter(b'\n', &buf[..n]).count();
        last = Some(buf[n - 1]);
    }
    Ok(count + usize::from(last.is_some_and(|b| b != b'\n')))
}

#[derive(Debug, Clone)]
pub struct LogFiles {
    root: PathBuf,
}

impl LogFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an allowed log file name to its path
    pub fn path_of(&self, name: &str) -> LogResult<PathBuf> {
        if LOG_FILES.contains(&name) {
            Ok(self.root.join(name))
        } else {
            Err(LogError::NotAllowed {
                name: name.to_string(),
                allowed: LOG_FILES.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    /// Last `lines` lines of every known log file, with totals.
    pub fn overview(&self, lines: usize) -> Vec<LogFileSummary> {
        let lines = lines.min(MAX_LOG_LINES);
        LOG_FILES
            .iter()
            .map(|name| match self.read_tail(name, lines) {
                Ok(tail) => LogFileSummary {
                    name: tail.name,
                    present: true,
                    lines: tail.lines,
                    total_lines: tail.total_lines,
                    size_bytes: tail.size_bytes,
                    error: None,
                },
                Err(LogError::NotFound(_)) => LogFileSummary {
                    name: name.to_string(),
                    present: false,
                    lines: Vec::new(),
                    total_lines: 0,
                    size_bytes: 0,
                    error: None,
                },
                Err(e) => {
                    warn!("Failed to read log file {}: {}", name, e);
                    LogFileSummary {
                        name: name.to_string(),
                        present: true,
                        lines: Vec::new(),
                        total_lines: 0,
                        size_bytes: 0,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect()
    }

    /// Last `lines` lines of one allowed log file.
    pub fn tail(&self, name: &str, lines: usize) -> LogResult<LogTail> {
        self.read_tail(name, lines.min(MAX_LOG_LINES))
    }

    fn read_tail(&self, name: &str, lines: usize) -> LogResult<LogTail> {
        let path = self.path_of(name)?;
        let io_error = |source: std::io::Error| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LogError::NotFound(path.clone())
            } else {
                LogError::Io {
                    path: path.clone(),
                    source,
                }
            }
        };

        let mut file = File::open(&path).map_err(io_error)?;
        let size_bytes = file.metadata().map_err(io_error)?.len();
        let total_lines = count_lines(&mut file).map_err(io_error)?;
        let lines = tail_lines(file, lines).map_err(io_error)?;

        Ok(LogTail {
            name: name.to_string(),
            lines,
            total_lines,
            size_bytes,
        })
    }

    /// Truncate every existing log file. Missing files are skipped.
    pub fn clear(&self) -> ClearReport {
        let mut report = ClearReport::default();
        for name in LOG_FILES {
            let path = self.root.join(name);
            if !path.exists() {
                continue;
            }
            match std::fs::OpenOptions::new().write(true).truncate(true).open(&path) {
                Ok(_) => report.cleared.push(name.to_string()),
                Err(e) => {
                    warn!("Failed to clear {}: {}", path.display(), e);
                    report.failed.push(ClearFailure {
                        name: name.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        if !report.cleared.is_empty() {
            info!("Cleared log files: {}", report.cleared.join(", "));
        }
        report
    }
}

#[cfg(test)]
mod tests;
