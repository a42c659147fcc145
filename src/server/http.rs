// src/server/http.rs

//! The relay's HTTP surface: `/login` issues one-time tokens, `/ws` exchanges a
//! token for a WebSocket session and `/debug` reports the number of live sessions.

use crate::connection::ConnectionHandler;
use crate::core::state::ServerState;
use crate::core::{RelayError, metrics};
use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Failed logins are answered only after this delay to slow down guessing.
const FAILED_LOGIN_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone)]
struct HttpState {
    server: Arc<ServerState>,
    /// Every running session holds a clone. The receiver sees `None` once all
    /// sessions have finished.
    drain: mpsc::Sender<()>,
}

/// The body of a `POST /login` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// The body of a successful `POST /login` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub otp: String,
}

#[derive(Debug, Deserialize)]
struct WsParams {
    #[serde(default)]
    otp: Option<String>,
}

/// Builds the relay's router. Must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: Arc<ServerState>, drain: mpsc::Sender<()>) -> Router {
    Router::new()
        .route("/login", post(login_handler))
        .route("/ws", get(ws_handler))
        .route("/debug", get(debug_handler))
        .with_state(HttpState {
            server: state,
            drain,
        })
}

async fn login_handler(State(http): State<HttpState>, body: Bytes) -> Response {
    let request: LoginRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Rejected malformed login request: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                format!("malformed login request: {e}"),
            )
                .into_response();
        }
    };

    let username = request.username.clone();
    let authenticator = http.server.authenticator.clone();
    // Password hashing is CPU bound.
    let accepted = tokio::task::spawn_blocking(move || {
        authenticator.authenticate(&request.username, &request.password)
    })
    .await
    .unwrap_or(false);

    if !accepted {
        tokio::time::sleep(FAILED_LOGIN_DELAY).await;
        warn!("Failed login attempt for user '{}'.", username);
        return (
            StatusCode::UNAUTHORIZED,
            RelayError::InvalidCredentials.to_string(),
        )
            .into_response();
    }

    let token = http.server.tokens.issue();
    info!("Issued a one-time token to user '{}'.", username);
    (StatusCode::OK, Json(LoginResponse { otp: token.key })).into_response()
}

async fn ws_handler(
    State(http): State<HttpState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let state = &http.server;

    if !origin_allowed(&state.config.allowed_origins, &headers) {
        metrics::UPGRADES_REJECTED_TOTAL
            .with_label_values(&["origin"])
            .inc();
        warn!("Rejected upgrade from {}: origin not allowed.", addr);
        return StatusCode::FORBIDDEN.into_response();
    }

    let otp = params.otp.unwrap_or_default();
    if otp.is_empty() {
        return reject_token(addr);
    }

    // The token is only spent on a request that can actually be upgraded.
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            debug!("Request to /ws from {} is not a WebSocket upgrade.", addr);
            return rejection.into_response();
        }
    };

    // Capacity is checked before the token is spent, so a 503 leaves the token
    // usable. The slot is only turned into a session once the upgrade completes;
    // dropping it on any earlier exit releases it.
    let slot = match state.registry.reserve() {
        Ok(slot) => slot,
        Err(e) => {
            metrics::UPGRADES_REJECTED_TOTAL
                .with_label_values(&["capacity"])
                .inc();
            warn!("Rejected upgrade from {}: {}", addr, e);
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    if !state.tokens.verify(&otp) {
        return reject_token(addr);
    }

    let server = state.clone();
    let drain = http.drain.clone();
    let limit = state.config.session.max_message_size;
    upgrade
        .max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            let _drain = drain;
            let handler = ConnectionHandler::attach(server, slot, Some(addr));
            info!("Session {} opened for {}.", handler.session_id(), addr);
            let (sink, stream) = socket.split();
            handler.run(sink, stream).await;
        })
}

async fn debug_handler(State(http): State<HttpState>) -> String {
    http.server.registry.len().to_string()
}

fn reject_token(addr: SocketAddr) -> Response {
    metrics::UPGRADES_REJECTED_TOTAL
        .with_label_values(&["token"])
        .inc();
    warn!("Rejected upgrade from {}: missing or invalid token.", addr);
    (StatusCode::UNAUTHORIZED, RelayError::InvalidToken.to_string()).into_response()
}

/// An empty allow-list accepts every origin, including requests without one.
fn origin_allowed(allowed: &[String], headers: &HeaderMap) -> bool {
    if allowed.is_empty() {
        return true;
    }
    headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|origin| allowed.iter().any(|a| a == origin))
}
