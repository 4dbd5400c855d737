#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use live_api::auth::tokens::{AccessClaims, JwtAuthenticator};
use live_api::config::Config;
use live_api::membership::MemoryMembership;
use live_api::AppState;
use live_common::ServerMessage;

pub const TEST_SECRET: &str = "live-api-test-secret";
pub const TEST_ISSUER: &str = "https://identity.test";

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn test_config() -> Config {
    Config {
        jwt_secret: TEST_SECRET.to_string(),
        jwt_issuer: Some(TEST_ISSUER.to_string()),
        jwt_audience: None,
        membership_url: None,
        port: 0,
        outbound_buffer: 64,
        keepalive_interval: Duration::from_secs(15),
        client_timeout: Duration::from_secs(30),
    }
}

/// Build a test AppState with in-memory membership.
pub fn test_state_with(config: Config) -> (AppState, Arc<MemoryMembership>) {
    let authenticator = Arc::new(JwtAuthenticator::from_config(&config));
    let membership = Arc::new(MemoryMembership::new());
    let state = AppState::new(config, authenticator, Arc::clone(&membership) as _);
    (state, membership)
}

pub fn test_state() -> (AppState, Arc<MemoryMembership>) {
    test_state_with(test_config())
}

pub fn test_app() -> (Router, AppState, Arc<MemoryMembership>) {
    let (state, membership) = test_state();
    let app = live_api::routes::router().with_state(state.clone());
    (app, state, membership)
}

fn mint(user_id: i64, issuer: &str, secret: &str, ttl: chrono::Duration) -> String {
    let claims = AccessClaims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp(),
        iss: Some(issuer.to_string()),
        aud: None,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("mint test token")
}

/// Mint a valid access token for `user_id`.
pub fn mint_token(user_id: i64) -> String {
    mint(user_id, TEST_ISSUER, TEST_SECRET, chrono::Duration::seconds(300))
}

pub fn mint_expired_token(user_id: i64) -> String {
    mint(user_id, TEST_ISSUER, TEST_SECRET, chrono::Duration::seconds(-300))
}

pub fn mint_token_with_secret(user_id: i64, secret: &str) -> String {
    mint(user_id, TEST_ISSUER, secret, chrono::Duration::seconds(300))
}

/// Start an actual TCP server for WebSocket testing.
pub async fn start_ws_server_with(config: Config) -> (SocketAddr, AppState, Arc<MemoryMembership>) {
    let (state, membership) = test_state_with(config);
    let app = live_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state, membership)
}

pub async fn start_ws_server() -> (SocketAddr, AppState, Arc<MemoryMembership>) {
    start_ws_server_with(test_config()).await
}

/// Open `/live` with an optional raw `projectId` and an optional bearer
/// header.
pub async fn connect(addr: SocketAddr, project_id: Option<&str>, token: Option<&str>) -> WsStream {
    let url = match project_id {
        Some(project_id) => format!("ws://{addr}/live?projectId={project_id}"),
        None => format!("ws://{addr}/live"),
    };
    connect_url(&url, token).await
}

pub async fn connect_url(url: &str, token: Option<&str>) -> WsStream {
    let mut request = url.into_client_request().expect("request");
    if let Some(token) = token {
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {token}").parse().expect("header value"),
        );
    }
    let (ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("ws connect");
    ws
}

/// Connect a project member and consume `ConnectionSuccess`.
pub async fn connect_member(addr: SocketAddr, project_id: i64, user_id: i64) -> WsStream {
    let token = mint_token(user_id);
    let mut ws = connect(addr, Some(&project_id.to_string()), Some(&token)).await;
    assert_eq!(next_message(&mut ws).await, ServerMessage::ConnectionSuccess);
    ws
}

/// Next non-control frame, decoded.
pub async fn next_message(ws: &mut WsStream) -> ServerMessage {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("parse server frame")
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

/// Assert nothing but control frames arrive within `wait`.
pub async fn expect_silence(ws: &mut WsStream, wait: Duration) {
    let deadline = time::Instant::now() + wait;
    loop {
        match time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected no frames, got {other:?}"),
        }
    }
}

/// Read until the server closes; returns the close code if one was sent.
pub async fn close_code(ws: &mut WsStream) -> Option<u16> {
    loop {
        let next = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close");
        match next {
            Some(Ok(Message::Close(frame))) => return frame.map(|f| u16::from(f.code)),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

/// Poll until `check` holds or five seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(time::Instant::now() < deadline, "condition not reached in time");
        time::sleep(Duration::from_millis(10)).await;
    }
}
