//! Dispatch of control-socket requests onto the store, supervisor and logs

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};
use warden_protocol::protocol::{
    DEFAULT_OVERVIEW_LINES, DEFAULT_TAIL_LINES, ErrorKind, PermissionReport, Request, Response,
    ResponseData,
};

use crate::logs::LogFiles;
use crate::path::ConfigPath;
use crate::settings::Settings;
use crate::store::{ConfigStore, OutboundEntry, ServiceEntry};
use crate::supervisor::{Supervisor, fix_permissions};

/// Everything a request may touch
pub struct Context {
    pub store: ConfigStore,
    pub supervisor: Supervisor,
    pub logs: LogFiles,
}

impl Context {
    pub fn new(store: ConfigStore, supervisor: Supervisor, logs: LogFiles) -> Self {
        Self {
            store,
            supervisor,
            logs,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            ConfigStore::new(&settings.config_file),
            Supervisor::new(settings.supervisor.clone()),
            LogFiles::new(&settings.root),
        )
    }
}

fn pids_list(pids: &[u32]) -> String {
    pids.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn stop_message(stopped: &[u32]) -> String {
    if stopped.is_empty() {
        "Proxy was not running".to_string()
    } else {
        format!("Stopped proxy (PIDs {})", pids_list(stopped))
    }
}

/// Handle one request. Never panics and never fails: every error becomes a
/// `Response::Error` carrying its `ErrorKind`.
pub async fn handle_request(
    request: Request,
    ctx: &Context,
    shutdown_tx: mpsc::Sender<()>,
) -> Response {
    debug!("Handling {}", request.variant_name());

    match request {
        Request::Ping => Response::ok_with_message("pong"),

        Request::Shutdown => {
            let stopped = ctx.supervisor.stop().await;
            info!("Shutdown requested");
            let _ = shutdown_tx.send(()).await;
            Response::ok(
                format!("Daemon shutting down. {}", stop_message(&stopped)),
                ResponseData::Stopped { pids: stopped },
            )
        }

        Request::GetConfig => match ctx.store.load() {
            Ok(document) => Response::ok_with_data(ResponseData::Document(document)),
            Err(e) => Response::error(e.kind(), e.to_string()),
        },

        Request::GetValue { path } => {
            match ctx.store.get_value(&ConfigPath::parse(&path)) {
                Ok(value) => Response::ok_with_data(ResponseData::Value(value)),
                Err(e) => Response::error(e.kind(), e.to_string()),
            }
        }

        Request::SetValue { path, value } => {
            match ctx.store.set_value(&ConfigPath::parse(&path), value) {
                Ok(()) => Response::ok_with_message(format!("Updated {}", path)),
                Err(e) => Response::error(e.kind(), e.to_string()),
            }
        }

        Request::ReplaceConfig { document } => {
            if !matches!(document, Value::Object(_)) {
                return Response::error(
                    ErrorKind::InvalidRequest,
                    "Config document must be a JSON object",
                );
            }
            match ctx.store.replace(&document) {
                Ok(()) => Response::ok_with_message("Config replaced"),
                Err(e) => Response::error(e.kind(), e.to_string()),
            }
        }

        Request::AddService { name, listen } => {
            match ctx.store.add_service(ServiceEntry::new(name.clone(), listen)) {
                Ok(()) => Response::ok_with_message(format!("Added service '{}'", name)),
                Err(e) => Response::error(e.kind(), e.to_string()),
            }
        }

        Request::RemoveService { name } => match ctx.store.remove_service(&name) {
            Ok(()) => Response::ok_with_message(format!("Removed service '{}'", name)),
            Err(e) => Response::error(e.kind(), e.to_string()),
        },

        Request::AddOutbound {
            name,
            target_address,
            target_port,
        } => {
            let entry = OutboundEntry::new(name.clone(), target_address, target_port);
            match ctx.store.add_outbound(entry) {
                Ok(()) => Response::ok_with_message(format!("Added outbound '{}'", name)),
                Err(e) => Response::error(e.kind(), e.to_string()),
            }
        }

        Request::RemoveOutbound { name } => match ctx.store.remove_outbound(&name) {
            Ok(()) => Response::ok_with_message(format!("Removed outbound '{}'", name)),
            Err(e) => Response::error(e.kind(), e.to_string()),
        },

        Request::FixPermissions => {
            let executable = ctx.supervisor.config().executable_path();
            match fix_permissions(&executable) {
                Ok(fix) => Response::ok(
                    format!(
                        "Permissions of {} set to {:o}",
                        fix.path.display(),
                        fix.new_mode
                    ),
                    ResponseData::Permissions(PermissionReport {
                        path: fix.path.display().to_string(),
                        old_mode: fix.old_mode,
                        new_mode: fix.new_mode,
                    }),
                ),
                Err(e) => Response::error(e.kind(), e.to_string()),
            }
        }

        Request::Start => match ctx.supervisor.start().await {
            Ok(pid) => Response::ok(
                format!("Proxy started (PID {})", pid),
                ResponseData::Started { pid },
            ),
            Err(e) => Response::error(e.kind(), e.to_string()),
        },

        Request::Stop => {
            let stopped = ctx.supervisor.stop().await;
            Response::ok(stop_message(&stopped), ResponseData::Stopped { pids: stopped })
        }

        Request::Restart => match ctx.supervisor.restart().await {
            Ok(restarted) => Response::ok(
                format!("Proxy restarted (PID {})", restarted.pid),
                ResponseData::Restarted {
                    pid: restarted.pid,
                    stopped: restarted.stopped,
                },
            ),
            Err(failed) => Response::error(failed.kind(), failed.to_string())
                .with_error_data(ResponseData::Stopped {
                    pids: failed.stopped,
                }),
        },

        Request::Status => Response::ok_with_data(ResponseData::Status(
            ctx.supervisor.status().await,
        )),

        Request::Logs { lines } => Response::ok_with_data(ResponseData::Logs(
            ctx.logs.overview(lines.unwrap_or(DEFAULT_OVERVIEW_LINES)),
        )),

        Request::TailLog { file, lines } => {
            match ctx.logs.tail(&file, lines.unwrap_or(DEFAULT_TAIL_LINES)) {
                Ok(tail) => Response::ok_with_data(ResponseData::Tail(tail)),
                Err(e) => Response::error(e.kind(), e.to_string()),
            }
        }

        Request::ClearLogs => {
            let report = ctx.logs.clear();
            let message = if report.cleared.is_empty() {
                "No log files to clear".to_string()
            } else {
                format!("Cleared {}", report.cleared.join(", "))
            };
            Response::ok(message, ResponseData::Cleared(report))
        }
    }
}

#[cfg(test)]
mod tests;
