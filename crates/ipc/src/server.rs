//! IPC server
//!
//! Binds a Unix socket, accepts connections, and dispatches JSON-RPC
//! requests to an [`IpcHandler`] implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::protocol::{self, RpcRequest, RpcResponse};

/// Trait the daemon implements to handle IPC requests.
#[async_trait]
pub trait IpcHandler: Send + Sync + 'static {
    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, String>;
}

/// Accepts connections and dispatches newline-delimited JSON-RPC requests.
pub struct IpcServer {
    socket_path: String,
}

impl IpcServer {
    pub fn new(socket_path: &str) -> Self {
        Self {
            socket_path: socket_path.to_string(),
        }
    }

    /// Run the accept loop. Never returns except on bind failure.
    #[cfg(unix)]
    pub async fn run(&self, handler: Arc<dyn IpcHandler>) -> std::io::Result<()> {
        use tokio::net::UnixListener;

        // Remove stale socket from a previous run.
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let handler = handler.clone();
                    tokio::spawn(Self::handle_connection(stream, handler));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    #[cfg(unix)]
    async fn handle_connection(stream: tokio::net::UnixStream, handler: Arc<dyn IpcHandler>) {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("IPC client disconnected");
                    break;
                }
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<RpcRequest>(line) {
                        Ok(req) => match handler.handle(&req.method, req.params).await {
                            Ok(result) => RpcResponse::reply(req.id, result),
                            Err(msg) if msg.starts_with("Unknown method") => {
                                RpcResponse::fail(req.id, protocol::UNKNOWN_METHOD, msg)
                            }
                            Err(msg) => RpcResponse::fail(req.id, protocol::HANDLER_ERROR, msg),
                        },
                        Err(e) => {
                            warn!("Invalid JSON-RPC request: {}", e);
                            RpcResponse::fail(0, protocol::PARSE_ERROR, format!("Parse error: {e}"))
                        }
                    };

                    let json = serde_json::to_string(&response).unwrap_or_default();
                    if writer
                        .write_all(format!("{}\n", json).as_bytes())
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!("IPC read error: {}", e);
                    break;
                }
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        #[cfg(unix)]
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl IpcHandler for EchoHandler {
        async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, String> {
            match method {
                "echo" => Ok(params.unwrap_or(Value::Null)),
                other => Err(format!("Unknown method: {other}")),
            }
        }
    }

    #[test]
    fn test_server_creation() {
        let server = IpcServer::new("/tmp/pincraft-test.sock");
        assert_eq!(server.socket_path, "/tmp/pincraft-test.sock");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_request_round_trip_over_socket() {
        let path = std::env::temp_dir()
            .join(format!("pincraft-ipc-test-{}.sock", std::process::id()))
            .to_string_lossy()
            .to_string();
        let server = IpcServer::new(&path);
        tokio::spawn(async move {
            let _ = server.run(Arc::new(EchoHandler)).await;
        });

        // Wait for the socket to come up.
        for _ in 0..50 {
            if std::path::Path::new(&path).exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let client = crate::DaemonClient::new(&path);
        let result = client
            .call_raw("echo", Some(serde_json::json!({ "k": 1 })))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({ "k": 1 }));

        let err = client.call_raw("nope", None).await.unwrap_err();
        match err {
            crate::ClientError::Daemon(e) => assert_eq!(e.code, protocol::UNKNOWN_METHOD),
            other => panic!("expected daemon error, got {other:?}"),
        }

        let _ = std::fs::remove_file(&path);
    }
}
