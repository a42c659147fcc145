// src/config.rs

//! Manages relay configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

/// Per-session limits and the keepalive window.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionConfig {
    /// Inbound frames larger than this many bytes close the session.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// How long a session may go without a pong before it is considered dead.
    #[serde(with = "humantime_serde", default = "default_pong_wait")]
    pub pong_wait: Duration,
    /// Capacity of each session's outbound queue. When full, the oldest queued
    /// events are dropped.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

impl SessionConfig {
    /// Pings go out at 9/10 of the pong window so a probe is always in flight
    /// before the deadline can lapse.
    pub fn ping_interval(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            pong_wait: default_pong_wait(),
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

fn default_max_message_size() -> usize {
    512
}
fn default_pong_wait() -> Duration {
    Duration::from_secs(10)
}
fn default_outbound_capacity() -> usize {
    64
}

/// Settings for the one-time token store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OtpConfig {
    /// How long an issued token stays valid if unused.
    #[serde(with = "humantime_serde", default = "default_otp_retention")]
    pub retention: Duration,
    /// How often expired tokens are swept.
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            retention: default_otp_retention(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_otp_retention() -> Duration {
    crate::core::otp::DEFAULT_RETENTION
}
fn default_sweep_interval() -> Duration {
    crate::core::otp::sweeper::DEFAULT_SWEEP_INTERVAL
}

/// A user allowed to log in.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserEntry {
    pub username: String,
    /// The Argon2 password hash.
    pub password_hash: String,
}

/// Credentials accepted by `/login`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    8878
}

/// The resolved relay configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Accepted values of the `Origin` header on `/ws`. Empty accepts any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            allowed_origins: Vec::new(),
            session: SessionConfig::default(),
            otp: OtpConfig::default(),
            auth: AuthConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config in '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Settings that are valid but probably not what the operator wants. They
    /// are logged at startup, once logging is up.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.otp.sweep_interval > self.otp.retention {
            warnings.push(format!(
                "otp.sweep_interval ({:?}) is longer than otp.retention ({:?}); expired tokens will linger between sweeps.",
                self.otp.sweep_interval, self.otp.retention
            ));
        }
        if self.auth.users.is_empty() {
            warnings.push("No users configured in [auth]; every login will be rejected.".to_string());
        }
        warnings
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }

        if self.session.max_message_size == 0 {
            return Err(anyhow!("session.max_message_size cannot be 0"));
        }
        if self.session.outbound_capacity == 0 {
            return Err(anyhow!("session.outbound_capacity cannot be 0"));
        }
        if self.session.ping_interval().is_zero() {
            return Err(anyhow!("session.pong_wait is too small to derive a ping interval"));
        }

        if self.otp.retention.is_zero() {
            return Err(anyhow!("otp.retention cannot be 0"));
        }
        if self.otp.sweep_interval.is_zero() {
            return Err(anyhow!("otp.sweep_interval cannot be 0"));
        }
        let mut seen = HashSet::new();
        for user in &self.auth.users {
            if user.username.trim().is_empty() {
                return Err(anyhow!("auth.users: username cannot be empty"));
            }
            if !seen.insert(user.username.as_str()) {
                return Err(anyhow!(
                    "auth.users: duplicate username '{}'",
                    user.username
                ));
            }
        }
        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }
}
