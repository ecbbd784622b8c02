use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read or edit the proxy config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Add or remove entries in `Services`
    Service {
        #[command(subcommand)]
        command: ServiceCommands,
    },

    /// Add or remove entries in `Outbounds`
    Outbound {
        #[command(subcommand)]
        command: OutboundCommands,
    },

    /// Start the proxy
    Start,
    /// Stop the proxy, including instances started outside the daemon
    Stop,
    /// Stop, wait briefly, then start the proxy
    Restart,
    /// Show whether the proxy is running
    Status,

    /// Show the tail of every log file
    Logs {
        /// Number of lines per file
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },
    /// Show the last lines of one log file
    Tail {
        /// Log file name (out.log, zbproxy.log, error.log, access.log)
        file: String,

        /// Number of lines to show
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },
    /// Truncate every log file
    ClearLogs,

    /// Set the proxy executable's mode to 0755
    FixPermissions,

    /// Check that the daemon is reachable
    Ping,
    /// Stop the proxy and the daemon
    Shutdown,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the whole config document
    Show,

    /// Print the value at a dotted path, e.g. `Services.0.Listen`
    Get { path: String },

    /// Replace the value at a dotted path
    Set {
        path: String,
        /// JSON value; anything that does not parse as JSON is stored as a string
        value: String,
    },

    /// Overwrite the config with the contents of a JSON file
    Replace { file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum ServiceCommands {
    /// Add a service listening on a port
    Add {
        name: String,
        #[arg(long)]
        listen: u16,
    },
    /// Remove a service by name
    Remove { name: String },
}

#[derive(Subcommand, Debug)]
pub enum OutboundCommands {
    /// Add an outbound with the stock Minecraft options
    Add {
        name: String,
        /// Upstream host name or address
        #[arg(long)]
        target: String,
        /// Upstream port
        #[arg(long)]
        port: u16,
    },
    /// Remove an outbound by name
    Remove { name: String },
}
