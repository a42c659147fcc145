// src/server/connection_loop.rs

//! Contains the main server loop: serving HTTP, watching background tasks and
//! handling graceful shutdown.

use super::context::ServerContext;
use super::http;
use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::{Result, anyhow};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

/// How long shutdown waits for sessions and background tasks to finish.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// The main server loop. Runs until SIGINT, SIGTERM or a background task failure.
/// SIGHUP reloads the log level from the config file.
pub async fn run(mut ctx: ServerContext) -> Result<()> {
    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;
    let mut sighup =
        signal(SignalKind::hangup()).map_err(|e| anyhow!("Failed to register SIGHUP handler: {}", e))?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = serve(ctx.listener, ctx.state.clone(), async move {
        let _ = stop_rx.await;
    });
    tokio::pin!(server);

    let mut server_result = None;
    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }
            _ = sighup.recv() => reload_log_level(&ctx.state, &ctx.config_path),

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = &mut server => {
                server_result = Some(res);
                break;
            }
        }
    }

    info!("Shutting down. Closing sessions and stopping background tasks.");
    let _ = stop_tx.send(());
    let result = match server_result {
        Some(res) => res,
        None => server.await,
    };

    if ctx.shutdown_tx.send(()).is_err() {
        warn!("No background task was listening for the shutdown signal.");
    }

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Server shutdown complete.");
    result
}

/// Re-reads the config file and applies its `log_level`. Every other setting
/// needs a restart.
fn reload_log_level(state: &ServerState, config_path: &str) {
    match Config::from_file(config_path) {
        Ok(config) => match state.set_log_level(&config.log_level) {
            Ok(()) => info!("SIGHUP received, log level set to '{}'.", config.log_level),
            Err(e) => warn!("SIGHUP received, but the log level was not changed: {}", e),
        },
        Err(e) => warn!("SIGHUP received, but '{}' could not be reloaded: {:#}", config_path, e),
    }
}

/// Serves the relay on `listener` until `shutdown` resolves, then closes every
/// live session and waits for the sessions to finish.
pub async fn serve<F>(listener: TcpListener, state: Arc<ServerState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (drain_tx, mut drain_rx) = mpsc::channel::<()>(1);
    let app = http::router(state.clone(), drain_tx);

    let signal_state = state.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        let closed = signal_state.registry.close_all();
        info!("Stopping HTTP server; closed {} live session(s).", closed);
    })
    .await
    .map_err(|e| anyhow!("HTTP server failed: {}", e))?;

    // Catches sessions opened while the server was winding down.
    state.registry.close_all();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain_rx.recv())
        .await
        .is_err()
    {
        warn!("Timed out waiting for sessions to close.");
    } else {
        info!("All sessions closed.");
    }
    Ok(())
}
