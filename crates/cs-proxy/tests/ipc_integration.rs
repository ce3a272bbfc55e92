//! IPC integration tests
//!
//! Tests the daemon's IPC server against a raw line-delimited client.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use cs_core::ipc::{IpcRequest, IpcResponse};
use cs_core::SessionKind;
use cs_proxy::ipc::IpcServer;
use cs_proxy::ProxyState;

use common::{fake_state, test_config, FakeSpawner, ScriptedBroker};

/// Create test state with two mapped instances
fn create_test_state() -> (Arc<ProxyState>, Arc<FakeSpawner>) {
    let spawner = FakeSpawner::new();
    let state = fake_state(
        test_config(&[
            ("web1", SessionKind::Vga, 8001),
            ("db1", SessionKind::Console, 8002),
        ]),
        ScriptedBroker::new(),
        spawner.clone(),
    );
    (state, spawner)
}

/// Start a server on an ephemeral port, returning its address
async fn start_server(state: Arc<ProxyState>) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let address = listener.local_addr().unwrap().to_string();

    let server = IpcServer::new(address.clone(), state);
    let handle = tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    (address, handle)
}

/// IPC test client wrapper
struct TestClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: BufWriter<tokio::net::tcp::OwnedWriteHalf>,
}

impl TestClient {
    async fn connect(address: &str) -> Self {
        let stream = TcpStream::connect(address)
            .await
            .unwrap_or_else(|e| panic!("Failed to connect to IPC server at {}: {}", address, e));
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        }
    }

    async fn send_raw(&mut self, line: &str) -> IpcResponse {
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("Failed to write request");
        self.writer.flush().await.expect("Failed to flush");

        let mut response_line = String::new();
        timeout(
            Duration::from_secs(5),
            self.reader.read_line(&mut response_line),
        )
        .await
        .expect("Timed out waiting for response")
        .expect("Failed to read response");

        if response_line.is_empty() {
            panic!("Server sent empty response (connection closed?)");
        }

        serde_json::from_str(&response_line).expect("Failed to parse response")
    }

    async fn send_request(&mut self, request: IpcRequest) -> IpcResponse {
        let line = request.to_line().expect("Failed to serialize request");
        self.send_raw(&line).await
    }
}

#[tokio::test]
async fn test_ipc_ping_pong() {
    let (state, _) = create_test_state();
    let (address, server_handle) = start_server(state).await;

    let mut client = TestClient::connect(&address).await;
    let response = client.send_request(IpcRequest::Ping).await;
    assert!(matches!(response, IpcResponse::Pong));

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_status() {
    let (state, _) = create_test_state();
    let (address, server_handle) = start_server(state).await;

    let mut client = TestClient::connect(&address).await;
    match client.send_request(IpcRequest::Status).await {
        IpcResponse::Status(status) => {
            assert_eq!(status.pid, std::process::id());
            assert_eq!(status.project, "default");
            assert_eq!(status.proxy_count, 0);
        }
        other => panic!("Expected Status response, got {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_list_proxies_empty() {
    let (state, _) = create_test_state();
    let (address, server_handle) = start_server(state).await;

    let mut client = TestClient::connect(&address).await;
    match client.send_request(IpcRequest::ListProxies).await {
        IpcResponse::Proxies { proxies } => assert!(proxies.is_empty()),
        other => panic!("Expected Proxies response, got {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_start_list_stop() {
    let (state, spawner) = create_test_state();
    let (address, server_handle) = start_server(Arc::clone(&state)).await;
    let mut client = TestClient::connect(&address).await;

    let response = client
        .send_request(IpcRequest::StartProxy {
            instance: "db1".to_string(),
            kind: None,
            port: None,
        })
        .await;
    match response {
        IpcResponse::Started { key, port } => {
            assert_eq!(key.to_string(), "console_db1");
            assert_eq!(port, 8002);
        }
        other => panic!("Expected Started response, got {:?}", other),
    }

    // Wait for the bridge to be spawned
    timeout(Duration::from_secs(5), async {
        while spawner.spawn_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("bridge was never spawned");

    match client.send_request(IpcRequest::ListProxies).await {
        IpcResponse::Proxies { proxies } => {
            assert_eq!(proxies.len(), 1);
            assert_eq!(proxies[0].key.to_string(), "console_db1");
            assert_eq!(proxies[0].port, 8002);
        }
        other => panic!("Expected Proxies response, got {:?}", other),
    }

    let response = client
        .send_request(IpcRequest::StopProxy {
            instance: "db1".to_string(),
            kind: None,
        })
        .await;
    match response {
        IpcResponse::Stopped { keys } => {
            assert_eq!(keys.len(), 1);
            assert_eq!(keys[0].to_string(), "console_db1");
        }
        other => panic!("Expected Stopped response, got {:?}", other),
    }
    assert!(state.registry.is_empty().await);

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_start_unmapped_instance_is_error() {
    let (state, _) = create_test_state();
    let (address, server_handle) = start_server(state).await;

    let mut client = TestClient::connect(&address).await;
    let response = client
        .send_request(IpcRequest::StartProxy {
            instance: "nonexistent".to_string(),
            kind: Some(SessionKind::Console),
            port: None,
        })
        .await;

    match response {
        IpcResponse::Error { message } => assert!(message.contains("nonexistent")),
        other => panic!("Expected Error response, got {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_stop_unknown_is_empty() {
    let (state, _) = create_test_state();
    let (address, server_handle) = start_server(state).await;

    let mut client = TestClient::connect(&address).await;
    let response = client
        .send_request(IpcRequest::StopProxy {
            instance: "ghost".to_string(),
            kind: Some(SessionKind::Vga),
        })
        .await;
    match response {
        IpcResponse::Stopped { keys } => assert!(keys.is_empty()),
        other => panic!("Expected Stopped response, got {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_invalid_request() {
    let (state, _) = create_test_state();
    let (address, server_handle) = start_server(state).await;

    let mut client = TestClient::connect(&address).await;
    match client.send_raw("{\"type\":\"launch_rockets\"}\n").await {
        IpcResponse::Error { message } => assert!(message.contains("Invalid request")),
        other => panic!("Expected Error response, got {:?}", other),
    }

    // The connection survives a bad line
    let response = client.send_request(IpcRequest::Ping).await;
    assert!(matches!(response, IpcResponse::Pong));

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_shutdown() {
    let (state, _) = create_test_state();
    let (address, server_handle) = start_server(Arc::clone(&state)).await;

    let mut client = TestClient::connect(&address).await;
    let response = client.send_request(IpcRequest::Shutdown).await;
    assert!(matches!(response, IpcResponse::Ok));

    // Verify cancellation token was triggered
    assert!(state.shutdown_token().is_cancelled());

    // The server loop exits on its own
    timeout(Duration::from_secs(5), server_handle)
        .await
        .expect("server did not stop after shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_ipc_multiple_requests() {
    let (state, _) = create_test_state();
    let (address, server_handle) = start_server(state).await;

    let mut client = TestClient::connect(&address).await;

    // Send multiple requests on same connection
    for _ in 0..5 {
        let response = client.send_request(IpcRequest::Ping).await;
        assert!(matches!(response, IpcResponse::Pong));
    }

    let response = client.send_request(IpcRequest::Status).await;
    assert!(matches!(response, IpcResponse::Status(_)));

    let response = client.send_request(IpcRequest::ListProxies).await;
    assert!(matches!(response, IpcResponse::Proxies { .. }));

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_concurrent_clients() {
    let (state, _) = create_test_state();
    let (address, server_handle) = start_server(state).await;

    let mut handles = vec![];
    for _ in 0..5 {
        let addr = address.clone();
        handles.push(tokio::spawn(async move {
            let mut client = TestClient::connect(&addr).await;
            for _ in 0..3 {
                let response = client.send_request(IpcRequest::Ping).await;
                assert!(matches!(response, IpcResponse::Pong));
            }
        }));
    }

    for handle in handles {
        handle.await.expect("Client task panicked");
    }

    server_handle.abort();
}
