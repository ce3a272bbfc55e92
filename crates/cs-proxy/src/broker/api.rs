//! REST API session broker

use async_trait::async_trait;
use serde_json::{json, Value};

use cs_core::config::ShellConfig;
use cs_core::{Instance, InstanceKind, InstanceStatus, SessionError, SessionKind, ShareError};

use super::transport::ManagementApi;
use super::{ConsoleSession, SessionBroker};
use crate::endpoint::API_VERSION;

/// Text console / shell geometry
const TEXT_GEOMETRY: (u32, u32) = (80, 25);

/// VGA console geometry
const VGA_GEOMETRY: (u32, u32) = (1024, 768);

/// Negotiates console and exec operations over the management API
pub struct ApiBroker {
    api: Box<dyn ManagementApi>,
    shell: ShellConfig,
}

impl ApiBroker {
    pub fn new(api: Box<dyn ManagementApi>, shell: ShellConfig) -> Self {
        Self { api, shell }
    }

    /// Create a console or exec operation and pull its secrets out of the
    /// response
    pub async fn open_api_session(
        &self,
        instance: &str,
        project: &str,
        kind: SessionKind,
    ) -> Result<ConsoleSession, SessionError> {
        let (endpoint, body) = match kind {
            SessionKind::Shell => ("exec", exec_body(&self.shell)),
            SessionKind::Console | SessionKind::Vga => ("console", console_body(kind)),
        };
        let path = format!(
            "/{}/instances/{}/{}?project={}",
            API_VERSION, instance, endpoint, project
        );

        let response = self.api.post(&path, &body).await?.into_json()?;
        parse_operation(&response)
    }
}

/// Body for `POST /instances/{name}/console`
pub fn console_body(kind: SessionKind) -> Value {
    let ((width, height), console_type) = if kind.is_graphical() {
        (VGA_GEOMETRY, "vga")
    } else {
        (TEXT_GEOMETRY, "console")
    };
    json!({
        "width": width,
        "height": height,
        "type": console_type,
        "force": true,
    })
}

/// Body for `POST /instances/{name}/exec`
pub fn exec_body(shell: &ShellConfig) -> Value {
    let (width, height) = TEXT_GEOMETRY;
    json!({
        "command": [shell.command],
        "environment": { "TERM": shell.term },
        "interactive": true,
        "wait-for-websocket": true,
        "width": width,
        "height": height,
    })
}

/// Extract operation id and secrets from an operation response
fn parse_operation(response: &Value) -> Result<ConsoleSession, SessionError> {
    let operation = response
        .get("operation")
        .and_then(Value::as_str)
        .and_then(|op| op.trim_end_matches('/').rsplit('/').next())
        .filter(|id| !id.is_empty())
        .or_else(|| response.pointer("/metadata/id").and_then(Value::as_str))
        .ok_or_else(|| SessionError::InvalidResponse("missing operation id".to_string()))?;

    let fds = response.pointer("/metadata/metadata/fds");
    let secret = fds
        .and_then(|f| f.get("0"))
        .and_then(Value::as_str)
        .ok_or(SessionError::MissingSecret("data"))?;
    let control_secret = fds
        .and_then(|f| f.get("control"))
        .and_then(Value::as_str)
        .ok_or(SessionError::MissingSecret("control"))?;

    Ok(ConsoleSession::Api {
        operation: operation.to_string(),
        secret: secret.to_string(),
        control_secret: control_secret.to_string(),
    })
}

fn parse_instance(value: &Value) -> Option<Instance> {
    Some(Instance {
        name: value.get("name")?.as_str()?.to_string(),
        status: InstanceStatus::parse(value.get("status")?.as_str()?),
        kind: value.get("type")?.as_str()?.parse().ok()?,
    })
}

#[async_trait]
impl SessionBroker for ApiBroker {
    async fn classify(&self, instance: &str, project: &str) -> SessionKind {
        let path = format!("/{}/instances/{}?project={}", API_VERSION, instance, project);
        let kind = match self.api.get(&path).await.and_then(|r| r.into_json()) {
            Ok(body) => body
                .pointer("/metadata/type")
                .and_then(Value::as_str)
                .and_then(|t| t.parse::<InstanceKind>().ok()),
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch metadata for {}, falling back to text console: {}",
                    instance,
                    e
                );
                return SessionKind::Console;
            }
        };

        match kind {
            Some(InstanceKind::VirtualMachine) => {
                tracing::info!("{} is a virtual machine, using VGA console", instance);
                SessionKind::Vga
            }
            Some(InstanceKind::Container) => SessionKind::Console,
            None => {
                tracing::warn!(
                    "Metadata for {} has no usable type, falling back to text console",
                    instance
                );
                SessionKind::Console
            }
        }
    }

    async fn open_session(
        &self,
        instance: &str,
        project: &str,
        kind: SessionKind,
    ) -> Result<ConsoleSession, ShareError> {
        Ok(self.open_api_session(instance, project, kind).await?)
    }

    async fn list_instances(&self, project: &str) -> Result<Vec<Instance>, ShareError> {
        let path = format!("/{}/instances?project={}&recursion=1", API_VERSION, project);
        let body = self.api.get(&path).await?.into_json()?;
        let entries = body
            .get("metadata")
            .and_then(Value::as_array)
            .ok_or_else(|| SessionError::InvalidResponse("instance list is not an array".into()))?;

        Ok(entries.iter().filter_map(parse_instance).collect())
    }

    async fn get_instance(&self, name: &str, project: &str) -> Result<Instance, ShareError> {
        let path = format!("/{}/instances/{}?project={}", API_VERSION, name, project);
        let response = self.api.get(&path).await?;
        if response.status == 404 {
            return Err(SessionError::InstanceNotFound(name.to_string()).into());
        }
        let body = response.into_json()?;
        body.get("metadata")
            .and_then(parse_instance)
            .ok_or_else(|| SessionError::InvalidResponse(format!("bad metadata for {}", name)).into())
    }
}
