//! Daemon settings from command-line arguments and environment

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::supervisor::SupervisorConfig;

const GLOBAL_STATE_DIR: &str = ".warden";
const SOCKET_FILE: &str = "warden.sock";

pub const DEFAULT_CONFIG_FILE: &str = "ZBProxy.json";
pub const DEFAULT_EXECUTABLE: &str = "ZBProxy-linux-amd64-v1";

/// Per-user state directory (`~/.warden`), falling back to the working
/// directory when no home directory is known.
pub fn global_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(GLOBAL_STATE_DIR)
}

pub fn default_socket_path() -> PathBuf {
    global_state_dir().join(SOCKET_FILE)
}

/// Warden daemon - supervises a proxy executable and edits its config
#[derive(Parser, Debug, Clone)]
#[command(name = "warden-daemon", version, about)]
pub struct DaemonArgs {
    /// Deployment root holding the config, executable and log files
    #[arg(long, env = "WARDEN_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Config file name, relative to the root unless absolute
    #[arg(long, env = "WARDEN_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Proxy executable, relative to the root unless absolute
    #[arg(long, env = "WARDEN_EXECUTABLE", default_value = DEFAULT_EXECUTABLE)]
    pub executable: PathBuf,

    /// Control socket path [default: ~/.warden/warden.sock]
    #[arg(long, env = "WARDEN_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Seconds between SIGTERM and SIGKILL when stopping
    #[arg(long, default_value_t = SupervisorConfig::DEFAULT_STOP_TIMEOUT.as_secs())]
    pub stop_timeout: u64,

    /// Milliseconds to wait after launch before checking the process is alive
    #[arg(long, default_value_t = SupervisorConfig::DEFAULT_LAUNCH_GRACE.as_millis() as u64)]
    pub launch_grace_ms: u64,

    /// Milliseconds to wait between the stop and start halves of a restart
    #[arg(long, default_value_t = SupervisorConfig::DEFAULT_RESTART_SETTLE.as_millis() as u64)]
    pub restart_settle_ms: u64,
}

/// Resolved daemon settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub socket_path: PathBuf,
    pub supervisor: SupervisorConfig,
}

impl Settings {
    pub fn from_args(args: DaemonArgs) -> Self {
        let root = std::path::absolute(&args.root).unwrap_or(args.root);
        let config_file = resolve_in(&root, &args.config);

        let mut supervisor = SupervisorConfig::new(&root, args.executable);
        supervisor.stop_timeout = Duration::from_secs(args.stop_timeout);
        supervisor.launch_grace = Duration::from_millis(args.launch_grace_ms);
        supervisor.restart_settle = Duration::from_millis(args.restart_settle_ms);

        Self {
            socket_path: args.socket.unwrap_or_else(default_socket_path),
            root,
            config_file,
            supervisor,
        }
    }
}

fn resolve_in(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
