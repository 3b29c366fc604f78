//! End-to-end client tests against a scripted gateway
//!
//! Each test runs a real WebSocket server that plays one side of the
//! handshake script, plus a minimal REST endpoint serving the gateway URL.

use async_trait::async_trait;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tern::{
    ApiRequest, Client, ClientConfig, ClientError, ConnectionState, Event, EventListener,
    EventType, GatewayConfig, GatewayError, ListenerError, Method, RestConfig, Route,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type Ws = WebSocketStream<TcpStream>;

async fn accept(listener: &TcpListener) -> Ws {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next text frame from the client, skipping everything else
async fn recv_json(ws: &mut Ws) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client socket ended")
            .expect("client socket errored");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Close(_) => panic!("client closed unexpectedly"),
            _ => {}
        }
    }
}

/// Drain frames until the client's socket goes away
async fn drain_until_gone(ws: &mut Ws) {
    while let Some(Ok(frame)) = ws.next().await {
        if matches!(frame, Message::Close(_)) {
            break;
        }
    }
}

/// Minimal REST surface: GET /gateway pointing at the test socket
async fn spawn_rest(ws_addr: SocketAddr) -> String {
    let ws_url = format!("ws://{ws_addr}");
    let app = Router::new().route(
        "/gateway",
        get(move || {
            let url = ws_url.clone();
            async move { Json(json!({ "url": url })) }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::serve(listener, app).into_future());
    format!("http://{addr}")
}

fn config(rest_base: &str) -> ClientConfig {
    ClientConfig::new("test-token")
        .with_gateway(
            GatewayConfig::default()
                .with_heartbeat_jitter(false)
                .with_heartbeat_timeout(Duration::from_secs(10)),
        )
        .with_rest(RestConfig::default().with_base_url(rest_base))
}

struct Recorder {
    log: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl EventListener for Recorder {
    async fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
        self.log.lock().push(event.sequence);
        Ok(())
    }
}

fn recorder(log: &Arc<Mutex<Vec<u64>>>) -> Arc<dyn EventListener> {
    Arc::new(Recorder {
        log: Arc::clone(log),
    })
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

fn hello(interval_ms: u64) -> Value {
    json!({ "op": 10, "d": { "heartbeat_interval": interval_ms } })
}

fn ready(session_id: &str, resume_url: &str, seq: u64) -> Value {
    json!({
        "op": 0,
        "t": "READY",
        "s": seq,
        "d": { "session_id": session_id, "resume_gateway_url": resume_url }
    })
}

fn message(seq: u64) -> Value {
    json!({ "op": 0, "t": "MESSAGE_CREATE", "s": seq, "d": { "id": format!("m{seq}") } })
}

#[tokio::test]
async fn test_identify_ready_and_dispatch() {
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut ws = accept(&ws_listener).await;
        send_json(&mut ws, hello(45_000)).await;

        let identify = recv_json(&mut ws).await;
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "test-token");
        assert!(identify["d"]["properties"]["os"].is_string());

        send_json(&mut ws, ready("sess-1", "wss://unused.invalid", 1)).await;
        send_json(&mut ws, message(2)).await;
        drain_until_gone(&mut ws).await;
    });

    let rest_base = spawn_rest(ws_addr).await;
    let client = Client::new(config(&rest_base)).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    client.on(EventType::MessageCreate, recorder(&log));

    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    wait_until("the dispatched event", || log.lock().contains(&2)).await;
    assert_eq!(client.sequence(), Some(2));

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_missed_acks_force_a_resume() {
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();
    let resume_url = format!("ws://{ws_addr}");

    let server = tokio::spawn(async move {
        // first connection: fast heartbeat cadence, acks withheld
        let mut ws = accept(&ws_listener).await;
        send_json(&mut ws, hello(100)).await;
        let identify = recv_json(&mut ws).await;
        assert_eq!(identify["op"], 2);
        send_json(&mut ws, ready("sess-2", &resume_url, 1)).await;
        drain_until_gone(&mut ws).await;

        // the client comes back on the advertised resume URL
        let mut ws = accept(&ws_listener).await;
        send_json(&mut ws, hello(45_000)).await;
        let resume = recv_json(&mut ws).await;
        assert_eq!(resume["op"], 4);
        assert_eq!(resume["d"]["session_id"], "sess-2");
        assert_eq!(resume["d"]["seq"], 1);
        send_json(&mut ws, json!({ "op": 0, "t": "RESUMED", "s": 2, "d": null })).await;
        drain_until_gone(&mut ws).await;
    });

    let rest_base = spawn_rest(ws_addr).await;
    let client = Client::new(config(&rest_base)).unwrap();
    let mut states = client.state_changes();

    client.connect().await.unwrap();

    // two unacknowledged beats drop the connection
    states
        .wait_for(|state| *state == ConnectionState::Reconnecting)
        .await
        .unwrap();
    states
        .wait_for(|state| *state == ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(client.sequence(), Some(2));

    client.disconnect().await;
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_resumable_close_replays_without_gap_or_duplicate() {
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();
    let resume_url = format!("ws://{ws_addr}");

    let server = tokio::spawn(async move {
        let mut ws = accept(&ws_listener).await;
        send_json(&mut ws, hello(45_000)).await;
        recv_json(&mut ws).await; // identify
        send_json(&mut ws, ready("sess-3", &resume_url, 1)).await;
        send_json(&mut ws, message(2)).await;
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Library(4009),
                reason: "session timeout".into(),
            }))
            .await;
        drain_until_gone(&mut ws).await;

        let mut ws = accept(&ws_listener).await;
        send_json(&mut ws, hello(45_000)).await;
        let resume = recv_json(&mut ws).await;
        assert_eq!(resume["op"], 4);
        assert_eq!(resume["d"]["seq"], 2);
        // replay starts at the acknowledged sequence; 2 must not be
        // delivered twice
        send_json(&mut ws, message(2)).await;
        send_json(&mut ws, message(3)).await;
        send_json(&mut ws, json!({ "op": 0, "t": "RESUMED", "s": 4, "d": null })).await;
        drain_until_gone(&mut ws).await;
    });

    let rest_base = spawn_rest(ws_addr).await;
    let client = Client::new(config(&rest_base)).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    client.on(EventType::MessageCreate, recorder(&log));
    let mut states = client.state_changes();

    client.connect().await.unwrap();
    states
        .wait_for(|state| *state == ConnectionState::Reconnecting)
        .await
        .unwrap();
    states
        .wait_for(|state| *state == ConnectionState::Connected)
        .await
        .unwrap();

    wait_until("the replayed events", || log.lock().len() >= 2).await;
    assert_eq!(*log.lock(), vec![2, 3]);
    assert_eq!(client.sequence(), Some(4));

    client.disconnect().await;
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_invalid_session_forces_a_fresh_identify() {
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();
    let resume_url = format!("ws://{ws_addr}");

    let server = tokio::spawn(async move {
        let mut ws = accept(&ws_listener).await;
        send_json(&mut ws, hello(45_000)).await;
        recv_json(&mut ws).await; // identify
        send_json(&mut ws, ready("sess-4", &resume_url, 1)).await;
        // the session is gone; the client must not try to resume it
        send_json(&mut ws, json!({ "op": 7, "d": false })).await;
        drain_until_gone(&mut ws).await;

        let mut ws = accept(&ws_listener).await;
        send_json(&mut ws, hello(45_000)).await;
        let frame = recv_json(&mut ws).await;
        assert_eq!(frame["op"], 2, "expected a fresh identify, got {frame}");
        send_json(&mut ws, ready("sess-5", &resume_url, 1)).await;
        drain_until_gone(&mut ws).await;
    });

    let rest_base = spawn_rest(ws_addr).await;
    let client = Client::new(config(&rest_base)).unwrap();
    let mut states = client.state_changes();

    client.connect().await.unwrap();
    states
        .wait_for(|state| *state == ConnectionState::Reconnecting)
        .await
        .unwrap();
    states
        .wait_for(|state| *state == ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(client.sequence(), Some(1));

    client.disconnect().await;
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_fatal_close_stops_the_client() {
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut ws = accept(&ws_listener).await;
        send_json(&mut ws, hello(45_000)).await;
        recv_json(&mut ws).await; // identify
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Library(4004),
                reason: "authentication failed".into(),
            }))
            .await;
        drain_until_gone(&mut ws).await;
    });

    let rest_base = spawn_rest(ws_addr).await;
    let client = Client::new(config(&rest_base)).unwrap();

    let err = client.connect().await.unwrap_err();
    assert!(
        matches!(
            err,
            ClientError::Gateway(GatewayError::AuthenticationFailed(_))
        ),
        "unexpected error: {err}"
    );
    assert_eq!(client.state(), ConnectionState::FatalError);
    assert!(err.is_fatal());

    // REST calls fail fast without touching the network
    let denied = client
        .send(&ApiRequest::new(Route::new(Method::GET, "/gateway")))
        .await
        .unwrap_err();
    assert!(matches!(
        denied,
        ClientError::Gateway(GatewayError::NotConnected(_))
    ));

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}
