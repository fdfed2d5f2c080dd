//! End-to-end over the callback channel against a local backend stub.
//!
//! The stub answers `GET /exec?function=..&callback=..&data=..` with a script
//! invoking the requested handler, the way the hosted back office does.

use reqwest::Url;
use serde_json::{json, Value};
use smartstore_rpc::{CallOptions, ClientConfig, ErrorKind, Params, RpcClient, TransportKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct Backend {
    url: String,
    hits: Arc<AtomicUsize>,
}

async fn spawn_backend() -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/exec", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(handle(socket));
        }
    });

    Backend { url, hits }
}

async fn handle(mut socket: TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 2048];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&buf).into_owned();
    let path = head.split_whitespace().nth(1).unwrap_or("/");
    let url = Url::parse(&format!("http://backend{}", path)).unwrap();
    let query = |key: &str| {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    };

    let function = query("function").unwrap_or_default();
    let callback = query("callback").unwrap_or_default();
    let data: Value = query("data")
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_else(|| json!({}));

    let (status, body) = match function.as_str() {
        "unavailable" => (500, "Internal error".to_string()),
        "garbled" => (200, "<!doctype html><p>Sign in</p>".to_string()),
        _ => (200, format!("{}({});", callback, respond(&function, &data))),
    };

    let response = format!(
        "HTTP/1.1 {} X\r\nContent-Type: application/javascript\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn respond(function: &str, data: &Value) -> Value {
    let authorized = data.get("token") == Some(&json!("tok-1"));
    match function {
        "testConnection" => json!({"success": true, "message": "pong"}),
        "login" if data["username"] == "admin" && data["password"] == "admin" => json!({
            "success": true,
            "token": "tok-1",
            "user": {"username": "admin", "role": "Manager"}
        }),
        "login" => json!({"success": false, "message": "Invalid password"}),
        _ if !authorized => json!({"success": false, "message": "Invalid token"}),
        "getInventoryData" => json!({
            "success": true,
            "data": [{"name": "Rice 5kg", "quantity": 12}]
        }),
        "getRecentSales" => json!({"success": true, "data": [], "limit": data["limit"]}),
        _ => json!({"success": false, "message": format!("Unknown function {}", function)}),
    }
}

fn client(backend: &Backend) -> RpcClient {
    let mut config = ClientConfig::default();
    config.endpoint = backend.url.clone();
    config.transport = TransportKind::Callback;
    config.timeouts.default = Duration::from_secs(5);
    config.retry.base_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(50);
    config.session.public_operations.push("unavailable".into());
    config.session.public_operations.push("garbled".into());
    RpcClient::from_config(config).unwrap()
}

#[tokio::test]
async fn probe_login_and_private_call() {
    let backend = spawn_backend().await;
    let client = client(&backend);

    let pong = client.test_connection().await.unwrap();
    assert_eq!(pong.message.as_deref(), Some("pong"));

    let login = client.login("admin", "admin").await.unwrap();
    assert_eq!(login.get_str("token"), Some("tok-1"));
    assert!(client.session_state().has_token);

    let inventory = client.get_inventory_data().await.unwrap();
    assert_eq!(inventory.get("data"), Some(&json!([{"name": "Rice 5kg", "quantity": 12}])));

    let sales = client.get_recent_sales(5).await.unwrap();
    assert_eq!(sales.get("limit"), Some(&json!(5)));

    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn wrong_password_is_application_error() {
    let backend = spawn_backend().await;
    let client = client(&backend);

    let err = client.login("admin", "nope").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Application);
    assert_eq!(err.to_string(), "Invalid password");
    assert_eq!(backend.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_error_is_retried_then_surfaced() {
    let backend = spawn_backend().await;
    let client = client(&backend);

    let err = client
        .call("unavailable", &Params::new(), CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(backend.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn non_script_body_is_protocol_error() {
    let backend = spawn_backend().await;
    let client = client(&backend);

    let err = client
        .call("garbled", &Params::new(), CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(backend.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn backend_invalidated_token_fires_expiry_hook() {
    let backend = spawn_backend().await;
    let store = Arc::new(smartstore_rpc::MemoryTokenStore::with_token("stale"));
    let mut config = ClientConfig::default();
    config.endpoint = backend.url.clone();
    config.transport = TransportKind::Callback;
    let transport = Arc::new(smartstore_rpc::CallbackTransport::from_config(&config).unwrap());
    let client = RpcClient::builder(transport.clone())
        .config(config)
        .token_store(store)
        .build()
        .unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = Arc::clone(&fired);
        client.on_session_expired(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }

    let err = client.get_inventory_data().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Application);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!client.session_state().has_token);
    assert_eq!(transport.namespace().live_handlers(), 0);
}
