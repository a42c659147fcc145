// tests/integration/test_helpers.rs

//! Test helpers and utilities for end-to-end tests against a live relay.

use futures::{SinkExt, StreamExt};
use roomcast::config::Config;
use roomcast::core::auth::Authenticator;
use roomcast::core::state::ServerState;
use roomcast::server::http::{LoginRequest, LoginResponse};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, reload};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Users known to every test relay, with their plain-text passwords.
pub const USERS: &[(&str, &str)] = &[("alice", "wonderland"), ("bob", "builder"), ("carol", "singer")];

/// Plain-text credential check so tests do not pay for password hashing.
pub struct StaticAuthenticator {
    users: HashMap<String, String>,
}

impl StaticAuthenticator {
    pub fn new(users: &[(&str, &str)]) -> Self {
        Self {
            users: users
                .iter()
                .map(|(u, p)| (u.to_string(), p.to_string()))
                .collect(),
        }
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, username: &str, password: &str) -> bool {
        self.users.get(username).is_some_and(|p| p == password)
    }
}

/// TestContext runs a complete relay on an ephemeral port.
pub struct TestContext {
    pub state: Arc<ServerState>,
    pub addr: SocketAddr,
    pub http: reqwest::Client,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestContext {
    /// Creates a new test context with default configuration
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    /// Creates a new test context with custom configuration
    pub async fn with_config(config: Config) -> Self {
        let env_filter = EnvFilter::new("warn");
        let (filter, reload_handle) = reload::Layer::new(env_filter);

        // Initialize tracing (ignore error if already initialized)
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();

        let state = ServerState::with_authenticator(
            config,
            Arc::new(StaticAuthenticator::new(USERS)),
            Arc::new(reload_handle),
        )
        .expect("Failed to initialize relay state");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(roomcast::server::serve(listener, state.clone(), async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            state,
            addr,
            http: reqwest::Client::new(),
            shutdown_tx: Some(shutdown_tx),
            server: Some(server),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, otp: &str) -> String {
        format!("ws://{}/ws?otp={}", self.addr, otp)
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.http
            .post(self.url("/login"))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .unwrap()
    }

    /// Logs in as one of the known users and returns the issued token.
    pub async fn otp_for(&self, username: &str) -> String {
        let (_, password) = USERS
            .iter()
            .find(|(u, _)| *u == username)
            .expect("unknown test user");
        let response = self.login(username, password).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        response.json::<LoginResponse>().await.unwrap().otp
    }

    /// Logs in, opens a WebSocket session and waits until the relay has
    /// registered it.
    pub async fn connect(&self, username: &str) -> WsStream {
        let otp = self.otp_for(username).await;
        let opened = self.state.stats.get_total_sessions();
        let (ws, _) = connect_async(self.ws_url(&otp)).await.unwrap();
        self.wait_until(|state| state.stats.get_total_sessions() > opened)
            .await;
        ws
    }

    /// Sends `change_room` and waits until the relay has applied it.
    pub async fn join_room(&self, ws: &mut WsStream, room: &str, expected_members: usize) {
        send_event(
            ws,
            serde_json::json!({"type": "change_room", "payload": {"name": room}}),
        )
        .await;
        self.wait_until(|state| state.registry.members_of(room).len() == expected_members)
            .await;
    }

    /// Polls the relay state until `condition` holds.
    pub async fn wait_until<F>(&self, condition: F)
    where
        F: Fn(&ServerState) -> bool,
    {
        tokio::time::timeout(TIMEOUT, async {
            while !condition(&self.state) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// Stops the relay and waits for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            tokio::time::timeout(Duration::from_secs(15), server)
                .await
                .expect("server did not shut down")
                .unwrap()
                .unwrap();
        }
    }
}

/// Performs a WebSocket handshake and returns the HTTP status of the answer:
/// 101 on success.
pub async fn upgrade_status<R>(request: R) -> u16
where
    R: IntoClientRequest + Unpin,
{
    match connect_async(request).await {
        Ok((_, response)) => response.status().as_u16(),
        Err(tungstenite::Error::Http(response)) => response.status().as_u16(),
        Err(e) => panic!("unexpected handshake error: {e}"),
    }
}

pub async fn send_event(ws: &mut WsStream, event: Value) {
    ws.send(Message::Text(event.to_string().into())).await.unwrap();
}

/// Next data frame from the relay, decoded as JSON. Keepalive frames are skipped.
pub async fn next_event(ws: &mut WsStream) -> Value {
    loop {
        let frame = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Reads until the relay closes the connection. Returns true if a close frame
/// was seen before the stream ended.
pub async fn wait_for_close(ws: &mut WsStream) -> bool {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return false,
            }
        }
    })
    .await
    .expect("connection was not closed")
}
