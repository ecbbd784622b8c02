#[cfg(not(unix))]
compile_error!("warden-protocol server requires a unix target");

use std::{future::Future, os::unix::fs::PermissionsExt, path::PathBuf, sync::Arc};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::mpsc,
};
use tracing::{debug, error, info, warn};

use crate::{
    errors::ServerError,
    protocol::{
        ErrorKind, MAX_MESSAGE_SIZE, Request, Response, ServerMessage, decode_envelope,
        encode_server_message,
    },
};

pub type Result<T> = std::result::Result<T, ServerError>;
pub type ShutdownTx = mpsc::Sender<()>;

/// Socket file mode: owner only
const SOCKET_MODE: u32 = 0o600;

/// Bounded channel capacity for the per-connection writer task.
const WRITER_CHANNEL_CAPACITY: usize = 64;

pub struct Server<F, Fut>
where
    F: Fn(Request, ShutdownTx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send,
{
    socket_path: PathBuf,
    handler: Arc<F>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<F, Fut> Server<F, Fut>
where
    F: Fn(Request, ShutdownTx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    pub fn new(socket_path: PathBuf, handler: F) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Self {
            socket_path,
            handler: Arc::new(handler),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Sender that stops the accept loop, for signal handlers outside the server
    pub fn shutdown_handle(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    fn bind(&self) -> Result<UnixListener> {
        // Reject symlinked socket path before any operations
        if let Ok(meta) = std::fs::symlink_metadata(&self.socket_path)
            && meta.file_type().is_symlink()
        {
            return Err(ServerError::SocketSymlink {
                socket_path: self.socket_path.clone(),
            });
        }

        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => debug!("Removed stale socket {}", self.socket_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ServerError::StaleSocket {
                    socket_path: self.socket_path.clone(),
                    source: e,
                });
            }
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| ServerError::Bind {
            socket_path: self.socket_path.clone(),
            source: e,
        })?;

        std::fs::set_permissions(
            &self.socket_path,
            std::fs::Permissions::from_mode(SOCKET_MODE),
        )
        .map_err(|e| ServerError::SocketPermissions {
            socket_path: self.socket_path.clone(),
            source: e,
        })?;

        Ok(listener)
    }

    pub async fn run(mut self) -> Result<()> {
        let listener = self.bind()?;
        info!("Listening on {}", self.socket_path.display());

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let shutdown_tx = self.shutdown_tx.clone();
                            let handler = Arc::clone(&self.handler);

                            tokio::spawn(async move {
                                if let Err(e) = handle_client(handler, stream, shutdown_tx).await {
                                    debug!("Client handler error: {}", e);
                                }
                            });
                        },
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        },
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Server shutdown");
                    break;
                }
            }
        }

        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            debug!("Failed to remove socket on shutdown: {}", e);
        }
        Ok(())
    }
}

async fn handle_client<F, Fut>(
    handler: Arc<F>,
    stream: UnixStream,
    shutdown_tx: mpsc::Sender<()>,
) -> Result<()>
where
    F: Fn(Request, ShutdownTx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    debug!("Client connected");

    let (read_half, mut write_half) = stream.into_split();
    let (write_tx, mut write_rx) = mpsc::channel::<Vec<u8>>(WRITER_CHANNEL_CAPACITY);

    let writer_task = tokio::spawn(async move {
        while let Some(bytes) = write_rx.recv().await {
            if let Err(e) = write_half.write_all(&bytes).await {
                warn!("Failed to write to client: {}", e);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut reader = read_half;

    loop {
        let mut len_buf = [0u8; 4];
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            drop(write_tx);
            let _ = writer_task.await;
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                debug!("Client disconnected (EOF)");
                return Ok(());
            }
            return Err(ServerError::Receive(e));
        }
        let msg_len = u32::from_be_bytes(len_buf) as usize;

        if msg_len > MAX_MESSAGE_SIZE {
            debug!("Request exceeds maximum message size: {} bytes", msg_len);
            let response = Response::error(
                ErrorKind::InvalidRequest,
                format!(
                    "Request exceeds maximum message size of {} bytes",
                    MAX_MESSAGE_SIZE
                ),
            );
            send_response(&write_tx, 0, response).await;
            drop(write_tx);
            let _ = writer_task.await;
            return Err(ServerError::MessageTooLarge(msg_len));
        }

        let mut payload = vec![0u8; msg_len];
        if let Err(e) = reader.read_exact(&mut payload).await {
            drop(write_tx);
            let _ = writer_task.await;
            return Err(ServerError::Receive(e));
        }

        let envelope = match decode_envelope(&payload) {
            Ok(env) => env,
            Err(e) => {
                warn!("Failed to parse request envelope: {}", e);
                // The ID is unknown, reply with 0
                let response = Response::error(
                    ErrorKind::InvalidRequest,
                    format!("Invalid request format: {}", e),
                );
                send_response(&write_tx, 0, response).await;
                continue;
            }
        };

        let request_id = envelope.id;
        let request = envelope.request;
        debug!("Received request id={}: {}", request_id, request.variant_name());

        let handler = Arc::clone(&handler);
        let shutdown_tx = shutdown_tx.clone();
        let write_tx = write_tx.clone();
        tokio::spawn(async move {
            let response = handler(request, shutdown_tx).await;
            send_response(&write_tx, request_id, response).await;
        });
    }
}

async fn send_response(write_tx: &mpsc::Sender<Vec<u8>>, id: u64, response: Response) {
    let msg = ServerMessage::Response { id, response };
    match encode_server_message(&msg) {
        Ok(bytes) => {
            if let Err(e) = write_tx.send(bytes).await {
                debug!("Failed to send response for request {}: {}", id, e);
            }
        }
        Err(e) => {
            error!("Failed to encode response for request {}: {}", id, e);
            let fallback = ServerMessage::Response {
                id,
                response: Response::error(ErrorKind::Internal, e.to_string()),
            };
            if let Ok(bytes) = encode_server_message(&fallback) {
                let _ = write_tx.send(bytes).await;
            }
        }
    }
}
