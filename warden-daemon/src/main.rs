use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use warden_daemon::handler::{Context, handle_request};
use warden_daemon::settings::{DaemonArgs, Settings};
use warden_protocol::server::Server;

/// Create the socket's parent directory with owner-only permissions
fn ensure_socket_dir(socket_path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    let Some(dir) = socket_path.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return Ok(());
    };
    if dir.exists() {
        return Ok(());
    }
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .with_context(|| format!("failed to create state directory {}", dir.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = DaemonArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let settings = Settings::from_args(args);
    info!(
        "Starting warden daemon (root {}, config {}, executable {})",
        settings.root.display(),
        settings.config_file.display(),
        settings.supervisor.executable_path().display()
    );

    if !settings.config_file.exists() {
        warn!(
            "Config file {} does not exist yet; config requests will fail until it is created",
            settings.config_file.display()
        );
    }

    ensure_socket_dir(&settings.socket_path)?;

    let ctx = Arc::new(Context::from_settings(&settings));
    let handler_ctx = Arc::clone(&ctx);
    let server = Server::new(settings.socket_path.clone(), move |request, shutdown_tx| {
        let ctx = Arc::clone(&handler_ctx);
        async move { handle_request(request, &ctx, shutdown_tx).await }
    });

    let shutdown = server.shutdown_handle();
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
        let _ = shutdown.send(()).await;
    });

    server.run().await?;

    // A proxy still running here is found again by the next daemon's scan
    if let Some(pid) = ctx.supervisor.tracked_pid().await {
        info!("Leaving proxy {} running", pid);
    }
    info!("Warden daemon stopped");
    Ok(())
}
