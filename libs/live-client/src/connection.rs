//! Client driver for the live-update socket.
//!
//! Opens the connection with the project id and bearer credential, routes
//! entity messages into a [`HandlerRegistry`], and reconnects after transport
//! drops on a fixed back-off schedule. A handshake rejection or a close with
//! code 4004/4010 ends the driver without retrying.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use live_common::envelope::{CLOSE_NORMAL, CLOSE_PROJECT_REMOVED, CLOSE_REJECTED};
use live_common::{ProjectId, ServerMessage};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::registry::HandlerRegistry;

/// Delay before each consecutive reconnect attempt.
pub const DEFAULT_RECONNECT_DELAYS: [Duration; 4] = [
    Duration::ZERO,
    Duration::from_secs(2),
    Duration::from_secs(10),
    Duration::from_secs(30),
];

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint URL, e.g. `ws://localhost:4003/live`.
    pub url: String,
    pub project_id: ProjectId,
    pub token: String,
    pub reconnect_delays: Vec<Duration>,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, project_id: ProjectId, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            project_id,
            token: token.into(),
            reconnect_delays: DEFAULT_RECONNECT_DELAYS.to_vec(),
        }
    }

    pub fn with_reconnect_delays(mut self, delays: Vec<Duration>) -> Self {
        self.reconnect_delays = delays;
        self
    }

    fn request(&self) -> Result<Request, ClientError> {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        let url = format!("{}{}projectId={}", self.url, separator, self.project_id);
        let mut request = url
            .into_client_request()
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| ClientError::InvalidToken)?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
        Ok(request)
    }
}

/// What the UI shows in its connection banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
    /// Refused by the server; carries the server's reason.
    Rejected(String),
    Closed,
}

#[derive(Debug)]
pub enum ClientError {
    InvalidUrl(String),
    /// The token cannot be carried in an HTTP header.
    InvalidToken,
    Transport(tungstenite::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::InvalidUrl(reason) => write!(f, "invalid live endpoint URL: {reason}"),
            ClientError::InvalidToken => f.write_str("token is not a valid header value"),
            ClientError::Transport(err) => write!(f, "live connection transport error: {err}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        ClientError::Transport(err)
    }
}

/// A running connection driver.
///
/// Dropping it stops the driver as well; `stop` additionally waits for the
/// socket to be closed.
pub struct LiveConnection {
    status: watch::Receiver<ConnectionStatus>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LiveConnection {
    /// Spawn the driver. Must be called within a Tokio runtime.
    pub fn start(config: ClientConfig, registry: Arc<HandlerRegistry>) -> Result<Self, ClientError> {
        config.request()?;

        let (status_tx, status) = watch::channel(ConnectionStatus::Connecting);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(drive(config, registry, status_tx, shutdown_rx));

        Ok(Self {
            status,
            shutdown,
            task,
        })
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub async fn stop(self) {
        let Self { shutdown, task, .. } = self;
        let _ = shutdown.send(true);
        if let Err(err) = task.await {
            tracing::debug!(?err, "live connection driver ended abnormally");
        }
    }
}

enum Outcome {
    Rejected(String),
    Dropped { was_connected: bool },
    Stopped,
}

async fn drive(
    config: ClientConfig,
    registry: Arc<HandlerRegistry>,
    status: watch::Sender<ConnectionStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failures = 0usize;
    loop {
        match session(&config, &registry, &status, &mut shutdown).await {
            Outcome::Rejected(reason) => {
                tracing::warn!(project_id = config.project_id, %reason, "live connection rejected");
                status.send_replace(ConnectionStatus::Rejected(reason));
                return;
            }
            Outcome::Stopped => break,
            Outcome::Dropped { was_connected } => {
                if was_connected {
                    failures = 0;
                }
            }
        }

        let Some(delay) = config.reconnect_delays.get(failures).copied() else {
            tracing::warn!(project_id = config.project_id, "giving up on live connection");
            break;
        };
        failures += 1;
        status.send_replace(ConnectionStatus::Reconnecting);
        tracing::info!(project_id = config.project_id, ?delay, attempt = failures, "reconnecting");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    status.send_replace(ConnectionStatus::Closed);
}

async fn session(
    config: &ClientConfig,
    registry: &HandlerRegistry,
    status: &watch::Sender<ConnectionStatus>,
    shutdown: &mut watch::Receiver<bool>,
) -> Outcome {
    let request = match config.request() {
        Ok(request) => request,
        Err(err) => return Outcome::Rejected(err.to_string()),
    };

    let connected = tokio::select! {
        result = tokio_tungstenite::connect_async(request) => result.map_err(ClientError::from),
        _ = shutdown.changed() => return Outcome::Stopped,
    };
    let mut ws = match connected {
        Ok((ws, _)) => ws,
        Err(err) => {
            tracing::debug!(%err, project_id = config.project_id, "live connection attempt failed");
            return Outcome::Dropped { was_connected: false };
        }
    };

    let mut was_connected = false;
    loop {
        tokio::select! {
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(ServerMessage::ConnectionSuccess) => {
                            was_connected = true;
                            status.send_replace(ConnectionStatus::Connected);
                            tracing::info!(project_id = config.project_id, "live connection established");
                        }
                        Ok(ServerMessage::ConnectionError(reason)) => return Outcome::Rejected(reason),
                        Ok(message) => {
                            if let Some(envelope) = message.into_envelope() {
                                registry.dispatch(&envelope);
                            }
                        }
                        Err(err) => tracing::warn!(?err, "ignoring unreadable live frame"),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                        .unwrap_or_default();
                    if code == CLOSE_REJECTED || code == CLOSE_PROJECT_REMOVED {
                        return Outcome::Rejected(reason);
                    }
                    tracing::debug!(code, %reason, "live connection closed by server");
                    return Outcome::Dropped { was_connected };
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(%err, "live connection read failed");
                    return Outcome::Dropped { was_connected };
                }
                None => return Outcome::Dropped { was_connected },
            },
            _ = shutdown.changed() => {
                let goodbye = CloseFrame {
                    code: CloseCode::from(CLOSE_NORMAL),
                    reason: "Client closed".into(),
                };
                let _ = ws.close(Some(goodbye)).await;
                return Outcome::Stopped;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EventKind;
    use futures_util::SinkExt;
    use live_common::entity::Story;
    use live_common::EntityKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    enum Step {
        Send(Message),
        Drop,
    }

    fn frame(message: &ServerMessage) -> Step {
        Step::Send(Message::text(message.to_json()))
    }

    fn close(code: u16, reason: &str) -> Step {
        Step::Send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        })))
    }

    /// Serve one scripted session per accepted connection. A script that
    /// does not end in `Drop` keeps the socket open until the client leaves.
    async fn serve(scripts: Vec<Vec<Step>>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/live", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&accepted);

        tokio::spawn(async move {
            let mut scripts = scripts.into_iter();
            while let Ok((stream, _)) = listener.accept().await {
                count.fetch_add(1, Ordering::SeqCst);
                let script = scripts.next().unwrap_or_else(|| vec![Step::Drop]);
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    for step in script {
                        match step {
                            Step::Send(msg) => {
                                if ws.send(msg).await.is_err() {
                                    return;
                                }
                            }
                            Step::Drop => return,
                        }
                    }
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        (url, accepted)
    }

    fn fast(url: &str) -> ClientConfig {
        ClientConfig::new(url, 1, "token").with_reconnect_delays(vec![
            Duration::ZERO,
            Duration::from_millis(20),
        ])
    }

    async fn wait_for_status(conn: &LiveConnection, expected: ConnectionStatus) {
        let mut rx = conn.status();
        timeout(Duration::from_secs(5), rx.wait_for(|s| *s == expected))
            .await
            .expect("status not reached in time")
            .unwrap();
    }

    #[test]
    fn request_carries_project_and_bearer() {
        let request = ClientConfig::new("ws://localhost:4003/live", 12, "abc")
            .request()
            .unwrap();
        assert_eq!(request.uri().query(), Some("projectId=12"));
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer abc");
    }

    #[test]
    fn bad_token_is_rejected_up_front() {
        let config = ClientConfig::new("ws://localhost/live", 1, "line\nbreak");
        assert!(matches!(config.request(), Err(ClientError::InvalidToken)));
    }

    #[tokio::test]
    async fn entity_messages_reach_the_registry() {
        let (url, _) = serve(vec![vec![
            frame(&ServerMessage::ConnectionSuccess),
            frame(&ServerMessage::EntityHasChanged(EntityKind::Story, 4)),
        ]])
        .await;
        let registry = Arc::new(HandlerRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _h = registry.on_event::<Story, _>(4, EventKind::EntityChanged, move |_| {
            let _ = tx.send(());
        });

        let conn = LiveConnection::start(fast(&url), Arc::clone(&registry)).unwrap();
        wait_for_status(&conn, ConnectionStatus::Connected).await;
        timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        conn.stop().await;
    }

    #[tokio::test]
    async fn rejection_is_terminal() {
        let (url, accepted) = serve(vec![vec![
            frame(&ServerMessage::ConnectionError("Authentication failed".to_string())),
            close(CLOSE_REJECTED, "Authentication failed"),
        ]])
        .await;

        let conn = LiveConnection::start(fast(&url), Arc::new(HandlerRegistry::new())).unwrap();
        wait_for_status(&conn, ConnectionStatus::Rejected("Authentication failed".to_string())).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn project_removal_is_terminal() {
        let (url, accepted) = serve(vec![vec![
            frame(&ServerMessage::ConnectionSuccess),
            close(CLOSE_PROJECT_REMOVED, "Project removed"),
        ]])
        .await;

        let conn = LiveConnection::start(fast(&url), Arc::new(HandlerRegistry::new())).unwrap();
        wait_for_status(&conn, ConnectionStatus::Rejected("Project removed".to_string())).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_drop_reconnects() {
        let (url, accepted) = serve(vec![
            vec![frame(&ServerMessage::ConnectionSuccess), Step::Drop],
            vec![
                frame(&ServerMessage::ConnectionSuccess),
                frame(&ServerMessage::EntityHasChanged(EntityKind::Story, 4)),
            ],
        ])
        .await;
        let registry = Arc::new(HandlerRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _h = registry.on_event::<Story, _>(4, EventKind::EntityChanged, move |_| {
            let _ = tx.send(());
        });

        let conn = LiveConnection::start(fast(&url), Arc::clone(&registry)).unwrap();
        timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        assert_eq!(conn.current_status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn exhausted_schedule_closes() {
        let (url, accepted) = serve(Vec::new()).await;

        let conn = LiveConnection::start(fast(&url), Arc::new(HandlerRegistry::new())).unwrap();
        wait_for_status(&conn, ConnectionStatus::Closed).await;
        // The first attempt plus one per scheduled delay.
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stop_closes_the_driver() {
        let (url, _) = serve(vec![vec![frame(&ServerMessage::ConnectionSuccess)]]).await;

        let conn = LiveConnection::start(fast(&url), Arc::new(HandlerRegistry::new())).unwrap();
        wait_for_status(&conn, ConnectionStatus::Connected).await;
        let status = conn.status();
        conn.stop().await;
        assert_eq!(*status.borrow(), ConnectionStatus::Closed);
    }
}
