//! Remote address resolution
//!
//! A remote is either the local Incus socket (`unix:<path>`) or a networked
//! host (`host`, `host:port`, `https://host:port/...`).

use std::fmt;
use std::path::Path;

use cs_core::config::DEFAULT_UNIX_SOCKET;
use cs_core::ConfigError;

/// Default management API port
pub const DEFAULT_API_PORT: u16 = 8443;

/// API version prefix used in every request path
pub const API_VERSION: &str = "1.0";

/// How the management API is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Unix-domain socket on this host
    LocalPipe,
    /// HTTPS / WSS over TCP
    Networked,
}

/// A resolved connection target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    scheme: Scheme,
    /// Socket path for local pipes, host name or address otherwise
    host: String,
    /// Always set for networked endpoints
    port: Option<u16>,
}

impl RemoteEndpoint {
    /// Resolve a remote address.
    ///
    /// Pure and deterministic; fails with [`ConfigError::InvalidRemote`] for
    /// empty or malformed input.
    pub fn resolve(spec: &str) -> Result<Self, ConfigError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(invalid(spec, "remote is empty"));
        }

        if let Some(rest) = spec.strip_prefix("unix:") {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            let path = if path.is_empty() {
                DEFAULT_UNIX_SOCKET
            } else {
                path
            };
            return Ok(Self {
                scheme: Scheme::LocalPipe,
                host: path.to_string(),
                port: None,
            });
        }

        let authority = match spec.split_once("://") {
            Some((scheme, rest)) => {
                if !matches!(scheme.to_ascii_lowercase().as_str(), "https" | "wss") {
                    return Err(invalid(spec, &format!("unsupported scheme '{}'", scheme)));
                }
                rest.split('/').next().unwrap_or_default()
            }
            None => {
                if spec.contains('/') {
                    return Err(invalid(spec, "unexpected path in bare host"));
                }
                spec
            }
        };

        let (host, port) = split_authority(authority).map_err(|reason| invalid(spec, reason))?;
        if host.is_empty() {
            return Err(invalid(spec, "missing host"));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(invalid(spec, "host contains whitespace"));
        }

        Ok(Self {
            scheme: Scheme::Networked,
            host: host.to_string(),
            port: Some(port),
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn is_local(&self) -> bool {
        self.scheme == Scheme::LocalPipe
    }

    /// Socket path, for local-pipe endpoints
    pub fn socket_path(&self) -> Option<&Path> {
        self.is_local().then(|| Path::new(&self.host))
    }

    /// Host component (the socket path for local pipes)
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// `host:port`, with IPv6 hosts bracketed. Local pipes yield `localhost`.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) if self.host.contains(':') => format!("[{}]:{}", self.host, port),
            Some(port) => format!("{}:{}", self.host, port),
            None => "localhost".to_string(),
        }
    }

    /// Base URL for REST requests against a networked endpoint
    pub fn api_base(&self) -> String {
        format!("https://{}", self.authority())
    }

    /// Operation websocket URL carrying a single-use secret.
    ///
    /// Local pipes produce a `ws://localhost/...` URI, to be dialled over the
    /// socket returned by [`socket_path`](Self::socket_path).
    pub fn websocket_url(&self, operation: &str, secret: &str, project: &str) -> String {
        let path = operation_websocket_path(operation, secret, project);
        match self.scheme {
            Scheme::LocalPipe => format!("ws://localhost{}", path),
            Scheme::Networked => format!("wss://{}{}", self.authority(), path),
        }
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::LocalPipe => write!(f, "unix:{}", self.host),
            Scheme::Networked => write!(f, "https://{}", self.authority()),
        }
    }
}

/// `/1.0/operations/{id}/websocket?secret=..&project=..`
pub fn operation_websocket_path(operation: &str, secret: &str, project: &str) -> String {
    format!(
        "/{}/operations/{}/websocket?secret={}&project={}",
        API_VERSION, operation, secret, project
    )
}

fn split_authority(authority: &str) -> Result<(&str, u16), &'static str> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or("unterminated IPv6 address")?;
        return match tail {
            "" => Ok((host, DEFAULT_API_PORT)),
            _ => {
                let port = tail.strip_prefix(':').ok_or("garbage after IPv6 address")?;
                Ok((host, parse_port(port)?))
            }
        };
    }

    match authority.matches(':').count() {
        0 => Ok((authority, DEFAULT_API_PORT)),
        1 => {
            let (host, port) = authority.split_once(':').ok_or("invalid authority")?;
            Ok((host, parse_port(port)?))
        }
        // Unbracketed IPv6 literal
        _ => Ok((authority, DEFAULT_API_PORT)),
    }
}

fn parse_port(port: &str) -> Result<u16, &'static str> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err("invalid port"),
        Ok(port) => Ok(port),
    }
}

fn invalid(remote: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidRemote {
        remote: remote.to_string(),
        reason: reason.to_string(),
    }
}
