//! SafeTrek token exchange against a fake token endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use safebot::config::Config;
use safebot::safetrek::{OAuthError, SafeTrekClient, TokenStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake server");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

fn client_for(token_url: String, timeout_secs: u64) -> SafeTrekClient {
    let mut config = Config::default();
    config.safetrek.client_id = Some("client-1".to_string());
    config.safetrek.client_secret = Some("secret-1".to_string());
    config.safetrek.token_url = token_url;
    config.gateway.outbound_timeout_secs = timeout_secs;
    let http = safebot::gateway::build_http_client(&config).expect("http client");
    SafeTrekClient::from_config(http, &config)
}

/// First request to arrive is answered last, so completion order is the reverse of arrival.
async fn numbered_token(State(counter): State<Arc<AtomicUsize>>, Json(_body): Json<Value>) -> Json<Value> {
    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
    if n == 1 {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    Json(json!({
        "access_token": format!("access-{}", n),
        "refresh_token": format!("refresh-{}", n),
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "openid phone offline_access"
    }))
}

#[tokio::test]
async fn concurrent_exchanges_are_last_write_wins() {
    let counter = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/oauth/token", post(numbered_token))
        .with_state(counter.clone());
    let base = spawn_app(app).await;
    let client = client_for(format!("{}/oauth/token", base), 10);
    let store = TokenStore::new();

    let (first, second) = tokio::join!(
        client.exchange("same-code", &store),
        client.exchange("same-code", &store)
    );
    let first = first.expect("first exchange");
    let second = second.expect("second exchange");
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    let slow = if first.access_token == "access-1" { first } else { second };
    assert_eq!(slow.access_token, "access-1");
    let current = store.current().await.expect("token stored");
    assert_eq!(current, slow);
    assert_eq!(current.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn api_error_leaves_store_unchanged() {
    let app = Router::new().route(
        "/oauth/token",
        post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_grant"}))) }),
    );
    let base = spawn_app(app).await;
    let client = client_for(format!("{}/oauth/token", base), 10);
    let store = TokenStore::new();

    let err = client.exchange("bad-code", &store).await.unwrap_err();
    assert!(matches!(err, OAuthError::Api(_)), "unexpected error: {}", err);
    assert_eq!(store.current().await, None);
}

#[tokio::test]
async fn garbage_response_leaves_store_unchanged() {
    let app = Router::new().route("/oauth/token", post(|| async { "<html>oops</html>" }));
    let base = spawn_app(app).await;
    let client = client_for(format!("{}/oauth/token", base), 10);
    let store = TokenStore::new();

    let err = client.exchange("code", &store).await.unwrap_err();
    assert!(matches!(err, OAuthError::InvalidResponse(_)), "unexpected error: {}", err);
    assert_eq!(store.current().await, None);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    drop(listener);
    let client = client_for(format!("http://127.0.0.1:{}/oauth/token", port), 2);
    let store = TokenStore::new();

    let err = client.exchange("code", &store).await.unwrap_err();
    assert!(matches!(err, OAuthError::Request(_)), "unexpected error: {}", err);
    assert_eq!(store.current().await, None);
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let app = Router::new().route(
        "/oauth/token",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"access_token": "late"}))
        }),
    );
    let base = spawn_app(app).await;
    let client = client_for(format!("{}/oauth/token", base), 1);
    let store = TokenStore::new();

    let err = client.exchange("code", &store).await.unwrap_err();
    match err {
        OAuthError::Request(e) => assert!(e.is_timeout(), "expected timeout, got {}", e),
        other => panic!("expected timeout, got {}", other),
    }
    assert_eq!(store.current().await, None);
}
