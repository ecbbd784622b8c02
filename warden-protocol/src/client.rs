use std::path::Path;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
};
use tracing::debug;

use crate::{
    errors::{ClientError, ProtocolError},
    protocol::{
        MAX_MESSAGE_SIZE, Request, RequestEnvelope, Response, ServerMessage,
        decode_server_message, encode_envelope,
    },
};

pub type Result<T> = std::result::Result<T, ClientError>;

/// Connection to the daemon. Requests are sent one at a time; each call waits
/// for the response carrying its own request ID.
pub struct Client {
    stream: UnixStream,
    next_id: u64,
}

impl Client {
    /// Connect to the daemon at the given socket path
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|source| ClientError::Connect {
                socket_path: socket_path.to_path_buf(),
                source,
            })?;
        Ok(Self { stream, next_id: 1 })
    }

    /// Check if daemon is running by attempting to connect and ping
    pub async fn is_daemon_running(socket_path: &Path) -> bool {
        if !socket_path.exists() {
            return false;
        }
        match Self::connect(socket_path).await {
            Ok(mut client) => matches!(client.send(Request::Ping).await, Ok(Response::Ok { .. })),
            Err(_) => false,
        }
    }

    /// Send a request and wait for its response
    pub async fn send(&mut self, request: Request) -> Result<Response> {
        let id = self.next_id;
        self.next_id += 1;
        let name = request.variant_name();

        let bytes = encode_envelope(&RequestEnvelope { id, request })?;
        self.stream
            .write_all(&bytes)
            .await
            .map_err(|source| ClientError::Send {
                request: name,
                source,
            })?;

        loop {
            let payload = self.read_frame(name).await?;
            let ServerMessage::Response {
                id: response_id,
                response,
            } = decode_server_message(&payload)?;

            // ID 0 is used by the server when it could not read the request ID
            if response_id == id || response_id == 0 {
                return Ok(response);
            }
            debug!("Discarding response for unknown request id={}", response_id);
        }
    }

    async fn read_frame(&mut self, request: &'static str) -> Result<Vec<u8>> {
        let receive_error = |source: std::io::Error| {
            if source.kind() == std::io::ErrorKind::UnexpectedEof {
                ClientError::Disconnected
            } else {
                ClientError::Receive { request, source }
            }
        };

        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .map_err(receive_error)?;
        let msg_len = u32::from_be_bytes(len_buf) as usize;

        if msg_len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(msg_len).into());
        }

        let mut payload = vec![0u8; msg_len];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(receive_error)?;
        Ok(payload)
    }
}
