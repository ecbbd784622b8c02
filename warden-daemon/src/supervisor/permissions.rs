//! Execute-bit checks and repair for the managed executable

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::{SupervisorError, SupervisorResult};

/// Mode applied by an explicit permission fix
const EXECUTABLE_MODE: u32 = 0o755;

/// Any of the user/group/other execute bits
const ANY_EXECUTE: u32 = 0o111;

/// Outcome of [`fix_permissions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionFix {
    pub path: PathBuf,
    pub old_mode: u32,
    pub new_mode: u32,
}

fn permission_error(path: &Path, e: std::io::Error) -> SupervisorError {
    match e.kind() {
        std::io::ErrorKind::NotFound => SupervisorError::ExecutableNotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => SupervisorError::PermissionDenied {
            action: "change permissions of",
            target: path.display().to_string(),
        },
        _ => SupervisorError::Process(format!(
            "failed to update permissions of {}: {}",
            path.display(),
            e
        )),
    }
}

/// Add execute bits when none are set. Returns whether the mode changed.
pub fn ensure_executable(path: &Path) -> std::io::Result<bool> {
    let mode = std::fs::metadata(path)?.permissions().mode();
    if mode & ANY_EXECUTE != 0 {
        return Ok(false);
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode | EXECUTABLE_MODE))?;
    info!("Added execute permission to {}", path.display());
    Ok(true)
}

/// Force the executable to mode 0755 and report the change.
pub fn fix_permissions(path: &Path) -> SupervisorResult<PermissionFix> {
    let old_mode = std::fs::metadata(path)
        .map_err(|e| permission_error(path, e))?
        .permissions()
        .mode()
        & 0o777;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(EXECUTABLE_MODE))
        .map_err(|e| permission_error(path, e))?;

    let new_mode = std::fs::metadata(path)
        .map_err(|e| permission_error(path, e))?
        .permissions()
        .mode()
        & 0o777;

    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    info!(
        "Fixed permissions of {}: {:o} -> {:o}",
        path.display(),
        old_mode,
        new_mode
    );
    Ok(PermissionFix {
        path,
        old_mode,
        new_mode,
    })
}
