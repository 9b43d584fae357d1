//! TCP IPC server — accept loop and per-connection handler.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::ipc::codec::{decode, encode, read_frame, write_frame, MSG_ERROR, MSG_REQUEST, MSG_RESPONSE};
use crate::ipc::router::route_request;
use crate::types::IpcConfig;

/// IPC server in front of a node's dispatcher.
#[derive(Debug)]
pub struct IpcServer {
    dispatcher: Arc<Dispatcher>,
    addr: SocketAddr,
    cancel: CancellationToken,
    ipc_config: IpcConfig,
}

impl IpcServer {
    pub fn new(dispatcher: Arc<Dispatcher>, addr: SocketAddr, ipc_config: IpcConfig) -> Self {
        Self {
            dispatcher,
            addr,
            cancel: CancellationToken::new(),
            ipc_config,
        }
    }

    /// Token that stops the server when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener until cancelled or a fatal error
    /// occurs.
    pub async fn serve_on(&self, listener: TcpListener) -> std::io::Result<()> {
        let conn_semaphore = Arc::new(Semaphore::new(self.ipc_config.max_connections));
        tracing::info!(
            addr = %listener.local_addr()?,
            node = %self.dispatcher.node().name(),
            max_connections = self.ipc_config.max_connections,
            "IPC server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("IPC server shutting down");
                    break;
                }
                accept = listener.accept() => {
                    let (stream, peer) = accept?;

                    // Acquire connection permit (backpressure when at capacity).
                    let permit = match conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                %peer,
                                max_connections = self.ipc_config.max_connections,
                                "connection rejected: at capacity"
                            );
                            drop(stream);
                            continue;
                        }
                    };

                    tracing::debug!(
                        %peer,
                        active = self.ipc_config.max_connections - conn_semaphore.available_permits(),
                        "IPC connection accepted"
                    );
                    let dispatcher = self.dispatcher.clone();
                    let cancel = self.cancel.clone();
                    let ipc_config = self.ipc_config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, dispatcher, cancel, ipc_config, permit).await {
                            tracing::warn!(%peer, error = %e, "connection error");
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

fn error_frame(id: &str, code: &str, message: impl Into<String>) -> Value {
    json!({
        "id": id,
        "ok": false,
        "error": {
            "code": code,
            "message": message.into(),
        }
    })
}

/// Handle a single TCP connection: read frames → route → write responses.
async fn handle_connection(
    stream: tokio::net::TcpStream,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
    ipc_config: IpcConfig,
    _permit: OwnedSemaphorePermit, // held for connection lifetime
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let read_timeout = Duration::from_secs(ipc_config.read_timeout_secs);
    let write_timeout = Duration::from_secs(ipc_config.write_timeout_secs);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame_result = tokio::time::timeout(read_timeout, read_frame(&mut reader, ipc_config.max_frame_bytes)) => {
                let frame = match frame_result {
                    Err(_elapsed) => {
                        tracing::debug!(timeout = ?read_timeout, "read timeout, dropping connection");
                        break;
                    }
                    Ok(result) => match result? {
                        Some(f) => f,
                        None => break, // clean EOF
                    },
                };

                let (msg_type, payload_bytes) = frame;

                if msg_type != MSG_REQUEST {
                    let err = error_frame(
                        "",
                        "INVALID_ARGUMENT",
                        format!("Unexpected message type: 0x{:02X}", msg_type),
                    );
                    timed_write(&mut writer, MSG_ERROR, &encode(&err)?, write_timeout).await?;
                    continue;
                }

                let request: Value = match decode(&payload_bytes) {
                    Ok(v) => v,
                    Err(e) => {
                        let err = error_frame("", "INVALID_ARGUMENT", format!("Invalid msgpack: {}", e));
                        timed_write(&mut writer, MSG_ERROR, &encode(&err)?, write_timeout).await?;
                        continue;
                    }
                };

                let request_id = request.get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let service = request.get("service")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let method = request.get("method")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let body = request.get("body")
                    .cloned()
                    .unwrap_or(Value::Object(serde_json::Map::new()));

                match route_request(&dispatcher, service, method, body).await {
                    Ok(response_body) => {
                        let response = json!({
                            "id": request_id,
                            "ok": true,
                            "body": response_body,
                        });
                        timed_write(&mut writer, MSG_RESPONSE, &encode(&response)?, write_timeout).await?;
                    }
                    Err(e) => {
                        tracing::debug!(service, method, error = %e, "request failed");
                        let response = error_frame(&request_id, e.to_ipc_error_code(), e.to_string());
                        timed_write(&mut writer, MSG_ERROR, &encode(&response)?, write_timeout).await?;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Write a frame with a timeout. Returns an error if the write takes too long
/// (prevents slow consumers from holding connections indefinitely).
async fn timed_write<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
    timeout: Duration,
) -> std::io::Result<()> {
    tokio::time::timeout(timeout, write_frame(writer, msg_type, payload))
        .await
        .map_err(|_| {
            tracing::warn!(?timeout, "write timeout, dropping connection");
            std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")
        })?
}
