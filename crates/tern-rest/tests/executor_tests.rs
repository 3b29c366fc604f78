//! Executor tests against a local mock API

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tern_common::{RestConfig, RestError};
use tern_rest::{Acquire, ApiRequest, Method, RequestExecutor, Route};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct MockState {
    hits: Arc<AtomicU32>,
}

async fn get_gateway() -> impl IntoResponse {
    Json(json!({ "url": "wss://gateway.example.com" }))
}

async fn get_me() -> impl IntoResponse {
    (
        [
            ("X-RateLimit-Remaining", "0"),
            ("X-RateLimit-Limit", "3"),
            ("X-RateLimit-Reset-After", "60"),
        ],
        Json(json!({ "id": "42", "username": "tern" })),
    )
}

async fn post_message(State(state): State<MockState>) -> impl IntoResponse {
    // first hit is rate limited, second succeeds
    if state.hits.fetch_add(1, Ordering::SeqCst) == 0 {
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "retry_after": 0.05, "global": false })),
        )
    } else {
        (StatusCode::OK, Json(json!({ "id": "1" })))
    }
}

async fn get_forbidden() -> impl IntoResponse {
    (StatusCode::FORBIDDEN, Json(json!({ "message": "missing access" })))
}

async fn get_slow() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(30)).await;
    Json(json!({}))
}

async fn spawn_mock_api() -> (String, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/gateway", get(get_gateway))
        .route("/users/me", get(get_me))
        .route("/channels/:channel_id/messages", post(post_message))
        .route("/forbidden", get(get_forbidden))
        .route("/slow", get(get_slow))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::serve(listener, app).into_future());

    (format!("http://{addr}"), state)
}

fn executor(base_url: &str, cancel: CancellationToken) -> RequestExecutor {
    let config = RestConfig::default()
        .with_base_url(base_url)
        .with_request_timeout(Duration::from_secs(5))
        .with_max_retries(3);
    RequestExecutor::new(config, "Bot test-token", cancel).unwrap()
}

#[tokio::test]
async fn fetches_gateway_endpoint() {
    let (base_url, _) = spawn_mock_api().await;
    let executor = executor(&base_url, CancellationToken::new());

    let url = executor.get_gateway().await.unwrap();
    assert_eq!(url, "wss://gateway.example.com");
}

#[tokio::test]
async fn applies_rate_limit_headers_from_response() {
    let (base_url, _) = spawn_mock_api().await;
    let executor = executor(&base_url, CancellationToken::new());
    let route = Route::new(Method::GET, "/users/me");
    let key = route.bucket_key();

    let response = executor.execute(&ApiRequest::new(route)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.body()["username"], "tern");

    // the server reported an exhausted bucket; the limiter must now hold us
    match executor.limiter().acquire(&key) {
        Acquire::Wait(wait) => assert!(wait > Duration::from_secs(50)),
        Acquire::Permit => panic!("server-reported exhaustion was ignored"),
    }
}

#[tokio::test]
async fn absorbs_backoff_signal_and_retries() {
    let (base_url, state) = spawn_mock_api().await;
    let executor = executor(&base_url, CancellationToken::new());
    let route = Route::new(Method::POST, "/channels/{channel_id}/messages").param("channel_id", 7_u64);

    let started = std::time::Instant::now();
    let response = executor.execute(&ApiRequest::new(route).with_body(json!({ "content": "hi" })))
        .await
        .unwrap();

    // the 429 was absorbed, the retry waited out the signal and succeeded
    assert_eq!(response.status(), 200);
    assert_eq!(state.hits.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn surfaces_forbidden_as_typed_error() {
    let (base_url, _) = spawn_mock_api().await;
    let executor = executor(&base_url, CancellationToken::new());

    let err = executor
        .execute(&ApiRequest::new(Route::new(Method::GET, "/forbidden")))
        .await
        .unwrap_err();
    match err {
        RestError::Forbidden(message) => assert_eq!(message, "missing access"),
        other => panic!("expected Forbidden, got {other:?}"),
    }
}

#[tokio::test]
async fn not_found_is_terminal() {
    let (base_url, _) = spawn_mock_api().await;
    let executor = executor(&base_url, CancellationToken::new());

    let err = executor
        .execute(&ApiRequest::new(Route::new(Method::GET, "/does-not-exist")))
        .await
        .unwrap_err();
    assert!(matches!(err, RestError::NotFound(_)));
}

#[tokio::test]
async fn shutdown_cancels_inflight_request() {
    let (base_url, _) = spawn_mock_api().await;
    let cancel = CancellationToken::new();
    let executor = executor(&base_url, cancel.clone());

    let handle = tokio::spawn(async move {
        executor
            .execute(&ApiRequest::new(Route::new(Method::GET, "/slow")))
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(RestError::Cancelled)));
}
