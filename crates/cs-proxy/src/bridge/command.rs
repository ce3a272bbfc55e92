//! Bridge command lines
//!
//! API sessions are relayed by `websocat`, captured sockets and CLI
//! sessions by `socat`.

use std::path::PathBuf;

use cs_core::config::BridgeConfig;
use cs_core::SessionKind;

use crate::broker::ConsoleSession;
use crate::endpoint::{operation_websocket_path, RemoteEndpoint};

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgePlan {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl BridgePlan {
    /// Command line for logs, with secrets masked
    pub fn redacted(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|a| redact_secret(a)).collect();
        format!("{} {}", self.program.display(), args.join(" "))
    }
}

/// Everything besides the session that shapes a bridge command
pub struct PlanContext<'a> {
    pub kind: SessionKind,
    pub endpoint: &'a RemoteEndpoint,
    pub project: &'a str,
    pub bind_address: &'a str,
    pub port: u16,
    pub bridge: &'a BridgeConfig,
}

/// Build the bridge command for a negotiated session
pub fn build_plan(session: &ConsoleSession, ctx: &PlanContext<'_>) -> BridgePlan {
    match session {
        ConsoleSession::Api {
            operation, secret, ..
        } => websocat_plan(operation, secret, ctx),
        ConsoleSession::LocalSocket(socket) => BridgePlan {
            program: ctx.bridge.socat_path.clone(),
            args: vec![
                tcp_listen(ctx),
                format!("UNIX-CONNECT:{}", socket.path().display()),
            ],
        },
        ConsoleSession::LocalExec { argv } => {
            let pty_options = match ctx.kind {
                SessionKind::Shell => "pty,stderr,setsid,sigint,sane",
                SessionKind::Console | SessionKind::Vga => "pty,raw,echo=0",
            };
            BridgePlan {
                program: ctx.bridge.socat_path.clone(),
                args: vec![
                    tcp_listen(ctx),
                    format!("EXEC:'{}',{}", argv.join(" "), pty_options),
                ],
            }
        }
    }
}

fn websocat_plan(operation: &str, secret: &str, ctx: &PlanContext<'_>) -> BridgePlan {
    let mut args = Vec::new();

    if !ctx.endpoint.is_local() {
        args.push("--insecure".to_string());
    }
    args.push("--exit-on-eof".to_string());
    // VGA carries SPICE, which is binary; consoles and shells are text
    args.push(if ctx.kind.is_graphical() { "--binary" } else { "--text" }.to_string());

    if let Some(bundle) = ctx.bridge.client_bundle().filter(|_| !ctx.endpoint.is_local()) {
        args.push("--client-pkcs12-der".to_string());
        args.push(bundle.display().to_string());
    }

    let listen = format!("tcp-l:{}:{}", ctx.bind_address, ctx.port);
    match ctx.endpoint.socket_path() {
        Some(socket) => {
            args.push(format!(
                "--ws-c-uri=ws://localhost{}",
                operation_websocket_path(operation, secret, ctx.project)
            ));
            args.push(listen);
            args.push(format!("ws-c:unix:{}", socket.display()));
        }
        None => {
            args.push(listen);
            args.push(ctx.endpoint.websocket_url(operation, secret, ctx.project));
        }
    }

    BridgePlan {
        program: ctx.bridge.websocat_path.clone(),
        args,
    }
}

fn tcp_listen(ctx: &PlanContext<'_>) -> String {
    format!(
        "TCP-LISTEN:{},bind={},reuseaddr,fork",
        ctx.port, ctx.bind_address
    )
}

fn redact_secret(arg: &str) -> String {
    match arg.find("secret=") {
        Some(idx) => {
            let start = idx + "secret=".len();
            let end = arg[start..].find('&').map_or(arg.len(), |i| start + i);
            format!("{}***{}", &arg[..start], &arg[end..])
        }
        None => arg.to_string(),
    }
}
