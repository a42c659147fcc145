// src/core/otp/sweeper.rs

//! A background task to periodically evict one-time tokens that were never used.

use super::TokenStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// How often the store is scanned for expired tokens.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(400);

/// The background task struct for the token sweeper.
pub struct TokenSweeperTask {
    store: Arc<TokenStore>,
    interval: Duration,
}

impl TokenSweeperTask {
    pub fn new(store: Arc<TokenStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// The main run loop for the sweeper task.
    /// It periodically calls `sweep` on the `TokenStore` until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "One-time token sweeper started (interval {:?}, retention {:?}).",
            self.interval,
            self.store.retention()
        );
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.store.sweep(self.store.retention());
                }
                _ = shutdown_rx.recv() => {
                    info!("One-time token sweeper shutting down.");
                    return;
                }
            }
        }
    }
}
