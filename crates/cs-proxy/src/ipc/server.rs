//! IPC server implementation
//!
//! Listens on localhost TCP for requests from the CLI. Each line is one
//! JSON request and gets one JSON response line back.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use cs_core::ipc::{IpcRequest, IpcResponse};

use crate::state::ProxyState;

/// IPC server for CLI communication
///
/// Listens on localhost (127.0.0.1) only - not accessible from network.
pub struct IpcServer {
    /// Address to bind (127.0.0.1:port)
    pub address: String,
    state: Arc<ProxyState>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(address: String, state: Arc<ProxyState>) -> Self {
        Self { address, state }
    }

    /// Serve on an already bound listener until the state's shutdown token
    /// is cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let shutdown = self.state.shutdown_token().clone();
        tracing::info!(configured = %self.address, "IPC server listening on {}", listener.local_addr()?);

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    // Only accept connections from localhost
                    if !peer_addr.ip().is_loopback() {
                        tracing::warn!("Rejected non-localhost connection from {}", peer_addr);
                        continue;
                    }

                    let state = Arc::clone(&self.state);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, state, shutdown).await {
                            tracing::warn!("IPC client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept IPC connection: {}", e);
                }
            }
        }

        tracing::info!("IPC server stopped");
        Ok(())
    }
}

async fn handle_client(
    stream: TcpStream,
    state: Arc<ProxyState>,
    shutdown: CancellationToken,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<IpcRequest>(trimmed) {
            Ok(request) => handle_request(request, &state).await,
            Err(e) => IpcResponse::error(format!("Invalid request: {}", e)),
        };

        writer.write_all(response.to_line()?.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

async fn handle_request(request: IpcRequest, state: &ProxyState) -> IpcResponse {
    tracing::debug!(?request, "IPC request");

    match request {
        IpcRequest::Ping => IpcResponse::Pong,

        IpcRequest::Status => IpcResponse::Status(state.status().await),

        IpcRequest::ListProxies => IpcResponse::Proxies {
            proxies: state.registry.list().await,
        },

        IpcRequest::StartProxy {
            instance,
            kind,
            port,
        } => match state.start_proxy(&instance, kind, port).await {
            Ok(started) => IpcResponse::Started {
                key: started.key,
                port: started.port,
            },
            Err(e) => IpcResponse::error(e.to_string()),
        },

        IpcRequest::StopProxy { instance, kind } => IpcResponse::Stopped {
            keys: state.stop_proxy(&instance, kind).await,
        },

        IpcRequest::Shutdown => {
            tracing::info!("Shutdown requested over IPC");
            state.shutdown_token().cancel();
            IpcResponse::Ok
        }
    }
}
