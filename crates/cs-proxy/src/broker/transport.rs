//! Management API transports
//!
//! Networked remotes are reached over HTTPS with `reqwest`; the local socket
//! is spoken to with `hyper` over `hyperlocal`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyperlocal::{UnixClientExt, UnixConnector, Uri as UnixUri};
use serde_json::Value;

use cs_core::config::BridgeConfig;
use cs_core::SessionError;

use crate::endpoint::RemoteEndpoint;

/// Time allowed to reach a networked remote
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for a whole management request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw answer from the management API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Success statuses for synchronous and asynchronous operations
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 202)
    }

    /// Parse the body as JSON, failing on non-success statuses with the
    /// status and raw body attached
    pub fn into_json(self) -> Result<Value, SessionError> {
        if !self.is_success() {
            return Err(SessionError::Status {
                status: self.status,
                body: self.body,
            });
        }
        serde_json::from_str(&self.body)
            .map_err(|e| SessionError::InvalidResponse(format!("{}: {}", e, self.body)))
    }
}

/// Request/response access to the management API.
///
/// `path` is the full request path including the API version and query,
/// e.g. `/1.0/instances/web1?project=default`.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    async fn get(&self, path: &str) -> Result<ApiResponse, SessionError>;

    async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, SessionError>;
}

/// Build the transport matching an endpoint's scheme
pub fn connect(
    endpoint: &RemoteEndpoint,
    bridge: &BridgeConfig,
) -> Result<Box<dyn ManagementApi>, SessionError> {
    match endpoint.socket_path() {
        Some(socket) => Ok(Box::new(UnixTransport::new(socket))),
        None => Ok(Box::new(HttpsTransport::new(
            endpoint,
            bridge.client_identity().map(|(c, k)| (c.as_path(), k.as_path())),
        )?)),
    }
}

/// HTTPS transport for networked remotes
pub struct HttpsTransport {
    client: reqwest::Client,
    base: String,
}

impl HttpsTransport {
    /// Create a client that accepts self-signed server certificates and
    /// presents `identity` (certificate, key) when given
    pub fn new(
        endpoint: &RemoteEndpoint,
        identity: Option<(&Path, &Path)>,
    ) -> Result<Self, SessionError> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT);

        if let Some((cert, key)) = identity {
            let mut pem = std::fs::read(cert)
                .map_err(|e| SessionError::Transport(format!("reading {:?}: {}", cert, e)))?;
            pem.push(b'\n');
            pem.extend(
                std::fs::read(key)
                    .map_err(|e| SessionError::Transport(format!("reading {:?}: {}", key, e)))?,
            );
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| SessionError::Transport(format!("client certificate: {}", e)))?;
            builder = builder.identity(identity);
            tracing::debug!("Using client certificate {:?}", cert);
        }

        let client = builder
            .build()
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base: endpoint.api_base(),
        })
    }

    async fn finish(response: reqwest::Response) -> Result<ApiResponse, SessionError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        Ok(ApiResponse { status, body })
    }
}

#[async_trait]
impl ManagementApi for HttpsTransport {
    async fn get(&self, path: &str) -> Result<ApiResponse, SessionError> {
        let url = format!("{}{}", self.base, path);
        tracing::debug!("API GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        Self::finish(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, SessionError> {
        let url = format!("{}{}", self.base, path);
        tracing::debug!("API POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        Self::finish(response).await
    }
}

/// HTTP over the local Unix socket
pub struct UnixTransport {
    socket: PathBuf,
    client: Client<UnixConnector, Full<Bytes>>,
}

impl UnixTransport {
    pub fn new(socket: &Path) -> Self {
        Self {
            socket: socket.to_path_buf(),
            client: Client::unix(),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, SessionError> {
        tracing::debug!("API {} unix:{:?}{}", method, self.socket, path);
        let uri: Uri = UnixUri::new(&self.socket, path).into();

        let mut builder = Request::builder().method(method).uri(uri);
        let payload = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Full::new(Bytes::from(value.to_string()))
            }
            None => Full::new(Bytes::new()),
        };
        let request = builder
            .body(payload)
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let exchange = async {
            let response = self.client.request(request).await.map_err(|e| {
                SessionError::Transport(format!("{:?}: {}", self.socket, e))
            })?;
            let status = response.status().as_u16();
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| SessionError::Transport(e.to_string()))?
                .to_bytes();
            Ok::<_, SessionError>((status, bytes))
        };
        let (status, bytes) = tokio::time::timeout(REQUEST_TIMEOUT, exchange)
            .await
            .map_err(|_| {
                SessionError::Transport(format!(
                    "{:?}: no answer within {:?}",
                    self.socket, REQUEST_TIMEOUT
                ))
            })??;

        Ok(ApiResponse {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

#[async_trait]
impl ManagementApi for UnixTransport {
    async fn get(&self, path: &str) -> Result<ApiResponse, SessionError> {
        self.send(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, SessionError> {
        self.send(Method::POST, path, Some(body)).await
    }
}
