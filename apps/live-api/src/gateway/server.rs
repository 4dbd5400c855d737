//! WebSocket upgrade handler and per-connection event loop.

use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use live_common::envelope::{CLOSE_KEEPALIVE_TIMEOUT, CLOSE_REJECTED};
use live_common::ServerMessage;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time;
use utoipa::IntoParams;

use crate::auth::credentials::bearer_token;
use crate::AppState;

use super::channels::Outbound;
use super::connection::{Connection, ConnectionState};
use super::handshake::{self, ConnectRequest};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Out-of-band connection parameters.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConnectParams {
    /// Project to join; must be a positive integer.
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    /// Bearer credential, used only when no `Authorization` header is sent.
    pub access_token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/live", get(ws_upgrade))
}

/// Open a live-update connection.
///
/// The handshake result is reported over the socket itself: a
/// `ConnectionSuccess` frame, or a `ConnectionError` frame followed by close
/// code 4004.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Live",
    params(ConnectParams),
    responses((status = 101, description = "Switching to the live-update WebSocket protocol")),
    security(("bearer" = []))
)]
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    query: Result<Query<ConnectParams>, QueryRejection>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // An unreadable query is reported over the socket like a missing project id.
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            tracing::debug!(%rejection, "unreadable connection query");
            ConnectParams::default()
        }
    };
    let request = ConnectRequest {
        project_id: params.project_id,
        token: bearer_token(&headers, params.access_token.as_deref()),
    };
    ws.on_upgrade(move |socket| handle_connection(socket, state, request))
}

async fn handle_connection(socket: WebSocket, state: AppState, request: ConnectRequest) {
    let (mut ws_tx, ws_rx) = socket.split();
    let mut conn = Connection::new();

    let admitted = handshake::admit(
        &mut conn,
        &request,
        state.authenticator.as_ref(),
        state.membership.as_ref(),
    )
    .await;

    if let Err(reason) = admitted {
        let error = ServerMessage::ConnectionError(reason.to_string());
        let _ = ws_tx.send(Message::Text(error.to_json().into())).await;
        let _ = send_close(&mut ws_tx, CLOSE_REJECTED, reason.message()).await;
        close(&mut conn);
        return;
    }

    // Join before announcing success; anything published in between waits in
    // the queue and is written after the success frame.
    let (out_tx, out_rx) = mpsc::channel(state.config.outbound_buffer);
    let membership = state.channels.join(&conn.id, &conn.scopes(), out_tx);

    let success = ServerMessage::ConnectionSuccess.to_json();
    if ws_tx.send(Message::Text(success.into())).await.is_ok() {
        tracing::info!(
            connection_id = %conn.id,
            user_id = ?conn.user_id,
            project_id = ?conn.project_id,
            "live connection established"
        );
        run_connection(&conn, &state, ws_tx, ws_rx, out_rx).await;
    }

    drop(membership);
    close(&mut conn);

    tracing::info!(
        connection_id = %conn.id,
        user_id = ?conn.user_id,
        "live connection ended"
    );
}

/// Main event loop: forward queued frames, watch the client side, enforce
/// keep-alive.
async fn run_connection(
    conn: &Connection,
    state: &AppState,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut out_rx: mpsc::Receiver<Outbound>,
) {
    let client_timeout = state.config.client_timeout;
    let mut keepalive = time::interval(state.config.keepalive_interval);
    keepalive.tick().await; // First tick fires immediately; skip it.
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        tracing::debug!(
                            connection_id = %conn.id,
                            len = text.len(),
                            "ignoring client text frame"
                        );
                    }
                    Some(Ok(_)) => last_seen = Instant::now(),
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %conn.id, "ws read error");
                        break;
                    }
                }
            }

            out = out_rx.recv() => {
                match out {
                    Some(Outbound::Frame(text)) => {
                        if let Err(e) = ws_tx.send(Message::Text(text.as_ref().into())).await {
                            tracing::debug!(?e, connection_id = %conn.id, "ws write failed");
                            break;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        let _ = send_close(&mut ws_tx, code, reason).await;
                        break;
                    }
                    None => break,
                }
            }

            _ = keepalive.tick() => {
                if last_seen.elapsed() > client_timeout {
                    tracing::debug!(connection_id = %conn.id, "keep-alive timeout, closing connection");
                    let _ = send_close(&mut ws_tx, CLOSE_KEEPALIVE_TIMEOUT, "Keep-alive timeout").await;
                    break;
                }
                if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn close(conn: &mut Connection) {
    if conn.state() == ConnectionState::Closed {
        return;
    }
    if let Err(err) = conn.advance(ConnectionState::Closed) {
        tracing::error!(%err, connection_id = %conn.id, "close out of order");
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }));
    ws_tx.send(close_msg).await
}
