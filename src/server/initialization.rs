// src/server/initialization.rs

//! Builds the relay state and binds the listener before the main loop starts.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::{LogReloadHandle, ServerState};
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all server components before starting the main loop.
pub async fn setup(
    config: Config,
    config_path: String,
    log_reload_handle: LogReloadHandle,
) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = ServerState::initialize(config, log_reload_handle)?;
    info!("Relay state initialized.");

    let (host, port) = (state.config.host.clone(), state.config.port);
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    info!("Roomcast listening on {}:{}", host, port);

    Ok(ServerContext {
        state,
        listener,
        config_path,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Sessions: max {} clients, {} byte frame limit, pong wait {:?}, outbound queue of {}.",
        config.max_clients,
        config.session.max_message_size,
        config.session.pong_wait,
        config.session.outbound_capacity
    );
    info!(
        "One-time tokens expire after {:?} and are swept every {:?}.",
        config.otp.retention, config.otp.sweep_interval
    );
    for warning in config.warnings() {
        warn!("{}", warning);
    }
    if config.allowed_origins.is_empty() {
        warn!("WARNING: 'allowed_origins' is empty. WebSocket upgrades are accepted from any origin.");
    } else {
        info!("Accepting WebSocket upgrades from: {:?}", config.allowed_origins);
    }
}
