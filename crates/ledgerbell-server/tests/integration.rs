//! End-to-end tests against a real server with WebSocket clients.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use ledgerbell_core::{ClientMessage, ConnectionId, Role, UserId};
use ledgerbell_server::{NotifyServer, ServerConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{Value, json};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    server: Arc<NotifyServer>,
    ws_url: String,
    http_url: String,
}

/// Boot a server on an ephemeral port with the bridge running.
async fn boot_server() -> TestServer {
    boot_server_with(ServerConfig::default()).await
}

async fn boot_server_with(config: ServerConfig) -> TestServer {
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let server = Arc::new(NotifyServer::new(config, handle));
    let _bridge = server.spawn_bridge();
    let (addr, _serve) = server.listen().await.unwrap();
    TestServer {
        server,
        ws_url: format!("ws://{addr}/ws"),
        http_url: format!("http://{addr}"),
    }
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(url)).await.unwrap().unwrap();
    ws
}

async fn send_register(ws: &mut WsStream, role: Role, user_id: Option<UserId>) {
    let json = ClientMessage::register(role, user_id).to_json().unwrap();
    ws.send(Message::text(json)).await.unwrap();
}

/// Poll until `check` holds or the timeout expires.
async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn current_id(server: &NotifyServer, role: Role, user_id: Option<UserId>) -> Option<ConnectionId> {
    server
        .registry()
        .lookup(role, user_id)
        .first()
        .map(|c| c.id.clone())
}

/// Connect and register, waiting until the registry reflects it.
async fn connect_registered(ts: &TestServer, role: Role, user_id: Option<UserId>) -> WsStream {
    let before = current_id(&ts.server, role, user_id);
    let mut ws = connect(&ts.ws_url).await;
    send_register(&mut ws, role, user_id).await;
    wait_until(|| {
        let now = current_id(&ts.server, role, user_id);
        now.is_some() && now != before
    })
    .await;
    ws
}

/// Next event frame, skipping control frames.
async fn recv_event(ws: &mut WsStream) -> Value {
    timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(_)) => {}
                other => panic!("socket ended: {other:?}"),
            }
        }
    })
    .await
    .expect("no event received")
}

/// Assert no event frame arrives within a short window.
async fn assert_silent(ws: &mut WsStream) {
    let got = timeout(QUIET, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(_)) => {}
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = got {
        panic!("unexpected event: {text}");
    }
}

#[tokio::test]
async fn events_reach_only_their_targets() {
    let ts = boot_server().await;
    let mut admin = connect_registered(&ts, Role::Admin, Some(UserId(1))).await;
    let mut u42 = connect_registered(&ts, Role::User, Some(UserId(42))).await;
    let mut u7 = connect_registered(&ts, Role::User, Some(UserId(7))).await;

    ts.server.notifier().proof_submitted(17, UserId(42));
    let ev = recv_event(&mut u42).await;
    assert_eq!(ev["type"], "PROOF_SUBMITTED");
    assert_eq!(ev["transactionId"], 17);
    assert_silent(&mut u7).await;
    assert_silent(&mut admin).await;

    ts.server.notifier().transaction_created(18, UserId(7), false);
    let ev = recv_event(&mut admin).await;
    assert_eq!(ev["type"], "NEW_TRANSACTION");
    assert_eq!(ev["userId"], 7);
    assert_silent(&mut u42).await;
    assert_silent(&mut u7).await;
}

#[tokio::test]
async fn status_change_reaches_admins_and_owner() {
    let ts = boot_server().await;
    let mut admin_a = connect_registered(&ts, Role::Admin, Some(UserId(1))).await;
    let mut admin_b = connect_registered(&ts, Role::Admin, Some(UserId(2))).await;
    let mut owner = connect_registered(&ts, Role::User, Some(UserId(42))).await;

    ts.server.notifier().transaction_status_changed(
        5,
        UserId(42),
        ledgerbell_server::TransactionStatus::Validated,
    );
    for ws in [&mut admin_a, &mut admin_b, &mut owner] {
        assert_eq!(recv_event(ws).await["type"], "TRANSACTION_VALIDATED");
    }
}

#[tokio::test]
async fn second_registration_supersedes_first() {
    let ts = boot_server().await;
    let mut first = connect_registered(&ts, Role::User, Some(UserId(42))).await;
    let first_id = current_id(&ts.server, Role::User, Some(UserId(42)));
    let mut second = connect_registered(&ts, Role::User, Some(UserId(42))).await;
    let second_id = current_id(&ts.server, Role::User, Some(UserId(42)));
    assert_ne!(first_id, second_id);
    assert_eq!(ts.server.registry().len(), 1);

    ts.server.notifier().proof_submitted(1, UserId(42));
    assert_eq!(recv_event(&mut second).await["type"], "PROOF_SUBMITTED");
    assert_silent(&mut first).await;

    // the superseded socket closing must not evict its successor
    first.close(None).await.unwrap();
    drop(first);
    sleep(QUIET).await;
    assert_eq!(current_id(&ts.server, Role::User, Some(UserId(42))), second_id);
}

#[tokio::test]
async fn malformed_frames_are_ignored_and_connection_stays_open() {
    let ts = boot_server().await;
    let mut ws = connect(&ts.ws_url).await;
    ws.send(Message::text("{not json")).await.unwrap();
    ws.send(Message::text(r#"{"type":"register","role":"user"}"#))
        .await
        .unwrap();
    ws.send(Message::text(r#"{"type":"register","userId":3,"role":"root"}"#))
        .await
        .unwrap();
    send_register(&mut ws, Role::User, Some(UserId(3))).await;
    wait_until(|| ts.server.registry().len() == 1).await;

    ts.server.notifier().proof_submitted(9, UserId(3));
    assert_eq!(recv_event(&mut ws).await["transactionId"], 9);
}

#[tokio::test]
async fn unregistered_socket_receives_nothing() {
    let ts = boot_server().await;
    let mut idle = connect(&ts.ws_url).await;
    let _admin = connect_registered(&ts, Role::Admin, None).await;
    ts.server.notifier().force_refresh(ledgerbell_core::Target::admins());
    assert_silent(&mut idle).await;
}

#[tokio::test]
async fn closing_removes_registration() {
    let ts = boot_server().await;
    let mut ws = connect_registered(&ts, Role::Admin, Some(UserId(1))).await;
    ws.close(None).await.unwrap();
    wait_until(|| ts.server.registry().is_empty()).await;
    wait_until(|| ts.server.connection_count() == 0).await;
}

#[tokio::test]
async fn health_reports_sessions_per_role() {
    let ts = boot_server().await;
    let _admin = connect_registered(&ts, Role::Admin, Some(UserId(1))).await;
    let _user = connect_registered(&ts, Role::User, Some(UserId(2))).await;

    let body: Value = reqwest::get(format!("{}/health", ts.http_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"]["admin"], 1);
    assert_eq!(body["sessions"]["user"], 1);
    assert_eq!(body["connections"], 2);
}

#[tokio::test]
async fn post_events_reaches_sockets() {
    let ts = boot_server().await;
    let mut admin = connect_registered(&ts, Role::Admin, None).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/events", ts.http_url))
        .json(&json!({"change": "balanceUpdated", "details": {"balance": 1200}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

    let ev = recv_event(&mut admin).await;
    assert_eq!(ev["type"], "BALANCE_UPDATED");
    assert_eq!(ev["balance"], 1200);
}

#[tokio::test]
async fn shutdown_closes_sockets() {
    let ts = boot_server().await;
    let mut ws = connect_registered(&ts, Role::Admin, None).await;
    ts.server.shutdown().shutdown();

    let ended = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());
    wait_until(|| ts.server.registry().is_empty()).await;
}

#[tokio::test]
async fn idle_client_answering_pings_survives_heartbeat() {
    let ts = boot_server_with(ServerConfig {
        heartbeat_interval_secs: 1,
        heartbeat_timeout_secs: 1,
        ..ServerConfig::default()
    })
    .await;
    let mut ws = connect_registered(&ts, Role::Admin, Some(UserId(1))).await;

    // keep polling so tungstenite answers pings with pongs
    let reader = tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
    sleep(Duration::from_millis(3500)).await;

    assert!(!reader.is_finished());
    assert_eq!(ts.server.registry().lookup(Role::Admin, None).len(), 1);
    reader.abort();
}
