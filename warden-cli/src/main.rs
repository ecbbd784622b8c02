mod commands;
mod config;
mod errors;

use std::path::PathBuf;

use crate::{
    commands::{Commands, ConfigCommands, OutboundCommands, ServiceCommands},
    config::Config,
    errors::{CliError, Result},
};
use clap::Parser;
use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing_subscriber::EnvFilter;
use warden_protocol::{
    client::Client,
    errors::ClientError,
    protocol::{
        LogFileSummary, ProcessState, Request, Response, ResponseData, StatusInfo,
    },
};

/// Warden - control the supervised proxy and its config
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Daemon control socket [default: ~/.warden/warden.sock]
    #[arg(short, long, global = true, env = "WARDEN_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Returns whether the daemon reported success
async fn run() -> Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let socket = Config::resolve_socket_path(cli.socket);
    let request = build_request(cli.command)?;

    let mut client = match Client::connect(&socket).await {
        Ok(c) => c,
        Err(ClientError::Connect { .. }) => return Err(CliError::DaemonNotRunning(socket)),
        Err(e) => return Err(e.into()),
    };

    let response = client.send(request).await?;
    Ok(handle_response(response))
}

fn build_request(command: Commands) -> Result<Request> {
    let request = match command {
        Commands::Config { command } => match command {
            ConfigCommands::Show => Request::GetConfig,
            ConfigCommands::Get { path } => Request::GetValue { path },
            ConfigCommands::Set { path, value } => Request::SetValue {
                path,
                value: Config::parse_value(&value),
            },
            ConfigCommands::Replace { file } => Request::ReplaceConfig {
                document: Config::read_document(&file)?,
            },
        },
        Commands::Service { command } => match command {
            ServiceCommands::Add { name, listen } => Request::AddService { name, listen },
            ServiceCommands::Remove { name } => Request::RemoveService { name },
        },
        Commands::Outbound { command } => match command {
            OutboundCommands::Add { name, target, port } => Request::AddOutbound {
                name,
                target_address: target,
                target_port: port,
            },
            OutboundCommands::Remove { name } => Request::RemoveOutbound { name },
        },
        Commands::Start => Request::Start,
        Commands::Stop => Request::Stop,
        Commands::Restart => Request::Restart,
        Commands::Status => Request::Status,
        Commands::Logs { lines } => Request::Logs { lines },
        Commands::Tail { file, lines } => Request::TailLog { file, lines },
        Commands::ClearLogs => Request::ClearLogs,
        Commands::FixPermissions => Request::FixPermissions,
        Commands::Ping => Request::Ping,
        Commands::Shutdown => Request::Shutdown,
    };
    Ok(request)
}

/// Print a response; returns false for error responses
fn handle_response(response: Response) -> bool {
    match response {
        Response::Ok { message, data } => {
            if let Some(msg) = message {
                println!("{}", msg);
            }
            if let Some(out) = data.as_ref().and_then(render_data) {
                println!("{}", out);
            }
            true
        }
        Response::Error { .. } => {
            eprintln!("{}", render_error(&response));
            false
        }
    }
}

/// Render the data payloads that carry more than their message already says
fn render_data(data: &ResponseData) -> Option<String> {
    match data {
        ResponseData::Document(value) | ResponseData::Value(value) => {
            Some(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
        }
        ResponseData::Status(status) => Some(render_status(status)),
        ResponseData::Logs(summaries) => Some(render_logs(summaries)),
        ResponseData::Tail(tail) => Some(tail.lines.join("\n")),
        ResponseData::Cleared(report) if !report.failed.is_empty() => Some(
            report
                .failed
                .iter()
                .map(|f| format!("{} {}: {}", "failed".red(), f.name, f.error))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        ResponseData::Cleared(_)
        | ResponseData::Started { .. }
        | ResponseData::Stopped { .. }
        | ResponseData::Restarted { .. }
        | ResponseData::Permissions(_) => None,
    }
}

fn render_error(response: &Response) -> String {
    let Response::Error {
        kind,
        message,
        data,
    } = response
    else {
        return String::new();
    };

    let mut out = format!("{} {}", format!("Error ({}):", kind).red().bold(), message);
    if let Some(ResponseData::Stopped { pids }) = data
        && !pids.is_empty()
    {
        out.push_str(&format!(
            "\nStopped before the failure: PIDs {}",
            pids.iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    out
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PID")]
    pid: String,
    #[tabled(rename = "UPTIME")]
    uptime: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
}

fn colored_state(state: ProcessState) -> String {
    match state {
        ProcessState::RunningOwned => state.as_str().green().to_string(),
        ProcessState::RunningExternal => state.as_str().yellow().to_string(),
        ProcessState::Stopped => state.as_str().red().to_string(),
    }
}

fn render_status(status: &StatusInfo) -> String {
    let row = StatusRow {
        status: colored_state(status.state),
        pid: status.pid.map_or_else(|| "-".to_string(), |p| p.to_string()),
        uptime: status.uptime_secs.map_or_else(|| "-".to_string(), format_uptime),
        memory: status.memory_bytes.map_or_else(|| "-".to_string(), format_bytes),
    };
    Table::new([row]).with(Style::blank()).to_string()
}

fn render_logs(summaries: &[LogFileSummary]) -> String {
    let mut out = Vec::new();
    for summary in summaries {
        let header = if !summary.present {
            format!("==> {} (not present) <==", summary.name)
        } else if let Some(err) = &summary.error {
            format!("==> {} (unreadable: {}) <==", summary.name, err)
        } else {
            format!(
                "==> {} ({} lines, {}) <==",
                summary.name,
                summary.total_lines,
                format_bytes(summary.size_bytes)
            )
        };
        out.push(header.cyan().bold().to_string());
        out.extend(summary.lines.iter().cloned());
    }
    out.join("\n")
}

fn format_uptime(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
