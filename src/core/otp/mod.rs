// src/core/otp/mod.rs

//! The one-time token store that gates new WebSocket connections.
//!
//! A token is handed out by `/login` and must be presented on `/ws` within the
//! retention window. Every token is consumed by the first successful
//! verification; tokens that are never used are evicted by the
//! [`sweeper::TokenSweeperTask`].

use crate::core::metrics;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

pub mod sweeper;

/// How long an unconsumed token stays valid.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(5);

/// A freshly issued one-time token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub key: String,
    pub issued_at: Instant,
}

/// A concurrent map from token key to issuance time.
///
/// `issue`, `verify` and `sweep` all go through `DashMap` shard locks, so a
/// verification racing the sweep on the same key has exactly one winner: the
/// loser finds the entry already gone.
#[derive(Debug)]
pub struct TokenStore {
    tokens: DashMap<String, Instant>,
    retention: Duration,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl TokenStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            tokens: DashMap::new(),
            retention,
        }
    }

    /// The window during which an issued token may be verified.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Generates a new random token and records its issuance time.
    pub fn issue(&self) -> Token {
        let token = Token {
            key: Uuid::new_v4().to_string(),
            issued_at: Instant::now(),
        };
        self.tokens.insert(token.key.clone(), token.issued_at);
        metrics::TOKENS_ISSUED_TOTAL.inc();
        token
    }

    /// Consumes `key`. Returns true only for a token that was still present and
    /// younger than the retention window; any later call with the same key
    /// returns false.
    pub fn verify(&self, key: &str) -> bool {
        // Removal happens unconditionally so an expired entry that the sweeper has
        // not reached yet is also gone after this call.
        match self.tokens.remove(key) {
            Some((_, issued_at)) if issued_at + self.retention > Instant::now() => {
                metrics::TOKENS_CONSUMED_TOTAL.inc();
                true
            }
            Some(_) => {
                metrics::TOKENS_EXPIRED_TOTAL.inc();
                debug!("Rejected an expired one-time token.");
                false
            }
            None => false,
        }
    }

    /// Removes every token whose retention window has elapsed.
    /// Returns the number of evicted tokens.
    pub fn sweep(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.tokens.retain(|_key, issued_at| {
            if *issued_at + retention <= now {
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            metrics::TOKENS_EXPIRED_TOTAL.inc_by(evicted as f64);
            debug!("Evicted {} expired one-time tokens.", evicted);
        }
        evicted
    }

    /// Number of tokens that are issued but neither consumed nor evicted.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
