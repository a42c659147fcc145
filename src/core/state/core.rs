// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared relay-wide state.

use super::stats::StatsState;
use crate::config::Config;
use crate::core::RelayError;
use crate::core::auth::{Authenticator, CredentialStore};
use crate::core::handler::Router;
use crate::core::otp::TokenStore;
use crate::core::registry::Registry;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

/// A handle to the logging filter, allowing for dynamic log level changes.
pub type LogReloadHandle = Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>;

/// The central struct holding all shared, relay-wide state.
///
/// It is created once at startup, wrapped in an `Arc` and handed to every HTTP
/// handler and session. The registry and the token store are the only parts
/// mutated concurrently; both synchronize internally.
pub struct ServerState {
    /// The relay configuration. Fixed for the lifetime of the process.
    pub config: Config,
    /// All live sessions.
    pub registry: Arc<Registry>,
    /// One-time tokens issued by `/login` and consumed by `/ws`.
    pub tokens: Arc<TokenStore>,
    /// Event type -> handler, shared read-only by all sessions.
    pub router: Router,
    /// The credential check used by `/login`.
    pub authenticator: Arc<dyn Authenticator>,
    /// Relay-wide counters.
    pub stats: StatsState,
    /// A handle to the logging filter.
    pub log_reload_handle: LogReloadHandle,
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("tokens", &self.tokens)
            .field("router", &self.router)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// Initializes the relay state from the given configuration, using the
    /// configured users for authentication.
    pub fn initialize(
        config: Config,
        log_reload_handle: LogReloadHandle,
    ) -> Result<Arc<Self>, RelayError> {
        let credentials = CredentialStore::from_users(&config.auth.users);
        info!("Loaded {} login user(s).", credentials.len());
        Self::with_authenticator(config, Arc::new(credentials), log_reload_handle)
    }

    /// Initializes the relay state with a caller-provided credential check.
    pub fn with_authenticator(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        log_reload_handle: LogReloadHandle,
    ) -> Result<Arc<Self>, RelayError> {
        let registry = Registry::new(config.max_clients, config.session.outbound_capacity);
        let tokens = TokenStore::new(config.otp.retention);

        Ok(Arc::new(Self {
            config,
            registry: Arc::new(registry),
            tokens: Arc::new(tokens),
            router: Router::with_builtin_handlers(),
            authenticator,
            stats: StatsState::new(),
            log_reload_handle,
        }))
    }

    /// Changes the active log filter, e.g. `"debug"` or `"info,roomcast::connection=trace"`.
    pub fn set_log_level(&self, level: &str) -> Result<(), RelayError> {
        let filter = EnvFilter::try_new(level)
            .map_err(|e| RelayError::Internal(format!("invalid log filter '{level}': {e}")))?;
        self.log_reload_handle
            .reload(filter)
            .map_err(|e| RelayError::Internal(format!("failed to reload log filter: {e}")))
    }
}
