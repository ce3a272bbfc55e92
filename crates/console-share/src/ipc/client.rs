//! IPC client for communicating with the daemon
//!
//! Uses TCP on localhost. Each request is answered by exactly one response
//! line, so the client keeps one connection open for a whole command.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use cs_core::config::DEFAULT_IPC_PORT;
use cs_core::ipc::{DaemonStatus, IpcRequest, IpcResponse, ProxyInfo};
use cs_core::{ProxyKey, SessionKind};

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Client for communicating with the console-share daemon
pub struct DaemonClient {
    address: String,
    conn: Option<Connection>,
}

impl DaemonClient {
    /// Create a new client for the daemon at `address`
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            conn: None,
        }
    }

    /// Get the address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect to the daemon
    pub async fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        tracing::debug!("Connecting to daemon at {}", self.address);

        let stream = TcpStream::connect(&self.address).await.with_context(|| {
            format!(
                "Failed to connect to daemon at {}. Is it running?",
                self.address
            )
        })?;

        let (reader, writer) = stream.into_split();
        self.conn = Some(Connection {
            reader: BufReader::new(reader),
            writer,
        });
        Ok(())
    }

    /// Check if the daemon is running
    pub async fn ping(&mut self) -> Result<bool> {
        self.connect().await?;

        match self.send_request(IpcRequest::Ping).await {
            Ok(IpcResponse::Pong) => Ok(true),
            _ => Ok(false),
        }
    }

    /// Get daemon status
    pub async fn status(&mut self) -> Result<DaemonStatus> {
        match self.request(IpcRequest::Status).await? {
            IpcResponse::Status(status) => Ok(status),
            other => anyhow::bail!("Unexpected response: {:?}", other),
        }
    }

    /// List supervised bridges
    pub async fn list_proxies(&mut self) -> Result<Vec<ProxyInfo>> {
        match self.request(IpcRequest::ListProxies).await? {
            IpcResponse::Proxies { proxies } => Ok(proxies),
            other => anyhow::bail!("Unexpected response: {:?}", other),
        }
    }

    /// Ask the daemon to start (or keep) a bridge
    pub async fn start_proxy(
        &mut self,
        instance: &str,
        kind: Option<SessionKind>,
        port: Option<u16>,
    ) -> Result<(ProxyKey, u16)> {
        let request = IpcRequest::StartProxy {
            instance: instance.to_string(),
            kind,
            port,
        };

        match self.request(request).await? {
            IpcResponse::Started { key, port } => Ok((key, port)),
            other => anyhow::bail!("Unexpected response: {:?}", other),
        }
    }

    /// Stop bridges for an instance; every kind when `kind` is None
    pub async fn stop_proxy(
        &mut self,
        instance: &str,
        kind: Option<SessionKind>,
    ) -> Result<Vec<ProxyKey>> {
        let request = IpcRequest::StopProxy {
            instance: instance.to_string(),
            kind,
        };

        match self.request(request).await? {
            IpcResponse::Stopped { keys } => Ok(keys),
            other => anyhow::bail!("Unexpected response: {:?}", other),
        }
    }

    /// Shutdown the daemon
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.request(IpcRequest::Shutdown).await? {
            IpcResponse::Ok => Ok(()),
            other => anyhow::bail!("Unexpected response: {:?}", other),
        }
    }

    /// Connect, send, and turn an `Error` response into an error
    async fn request(&mut self, request: IpcRequest) -> Result<IpcResponse> {
        self.connect().await?;

        match self.send_request(request).await? {
            IpcResponse::Error { message } => anyhow::bail!("{}", message),
            response => Ok(response),
        }
    }

    /// Send a request and receive its response line
    async fn send_request(&mut self, request: IpcRequest) -> Result<IpcResponse> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Not connected"))?;

        conn.writer.write_all(request.to_line()?.as_bytes()).await?;
        conn.writer.flush().await?;

        let mut response_line = String::new();
        let read = conn.reader.read_line(&mut response_line).await?;
        if read == 0 {
            self.conn = None;
            anyhow::bail!("Daemon closed the connection");
        }

        let response: IpcResponse = serde_json::from_str(&response_line)
            .with_context(|| format!("Invalid response from daemon: {}", response_line.trim()))?;
        Ok(response)
    }
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new(format!("127.0.0.1:{}", DEFAULT_IPC_PORT))
    }
}
