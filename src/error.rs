//! Unified error taxonomy for the bouncer.
//!
//! Each component gets its own `thiserror`-derived enum rather than one
//! grab-bag error type, matching the spec's per-domain error catalog (§7).

use thiserror::Error;

/// Configuration errors. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("unsupported sql driver {0:?}, only \"sqlite\" is supported")]
    UnsupportedSqlDriver(String),

    #[error("unparseable listen URI {0:?}: {1}")]
    BadListenUri(String, String),

    #[error("missing TLS material for listener {0}: {1}")]
    MissingTlsMaterial(String, String),

    #[error("invalid CIDR {0:?} in accept-proxy-ip: {1}")]
    BadCidr(String, String),

    #[error("{0}")]
    Invalid(String),
}

/// Store (C2) errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("stored schema version {stored} is newer than this build's {supported} migrations")]
    SchemaTooNew { stored: i64, supported: i64 },

    #[error("migration {0} failed: {1}")]
    MigrationFailed(u32, String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("{0}")]
    Conflict(String),

    #[error("store operation timed out")]
    Timeout,
}

/// Upstream session (C4) errors.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("SASL authentication failed: {0}")]
    AuthFailed(String),

    #[error("upstream disconnected: {0}")]
    Disconnected(#[source] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("ping timeout ({0:?} without a byte from the server)")]
    PingTimeout(std::time::Duration),

    #[error("registration timed out before numeric 001")]
    RegistrationTimeout,
}

/// Downstream session (C5) errors.
#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("authentication failed")]
    AuthFailed,

    #[error("unknown user {0:?}")]
    UnknownUser(String),

    #[error("unknown network {0:?} for user {1:?}")]
    UnknownNetwork(String, String),

    #[error("client send queue overflowed")]
    SlowClient,

    #[error("client quit: {0:?}")]
    Quit(Option<String>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec-level rejection. Never fatal to the process; the offending line is
/// dropped and, past a threshold, the session is closed.
#[derive(Debug, Error)]
#[error("malformed IRC message: {0}")]
pub struct MalformedMessage(pub String);

/// Tracks malformed-message rejections in a sliding window so a session can
/// be closed after too many in a short time (§7: 16 in 60s).
#[derive(Debug)]
pub struct MalformedBudget {
    max: u32,
    window: std::time::Duration,
    hits: std::collections::VecDeque<std::time::Instant>,
}

impl MalformedBudget {
    pub fn new(max: u32, window: std::time::Duration) -> Self {
        Self {
            max,
            window,
            hits: std::collections::VecDeque::new(),
        }
    }

    /// Record a rejection and return true if the session should now be closed.
    pub fn record(&mut self, now: std::time::Instant) -> bool {
        self.hits.push_back(now);
        while let Some(&front) = self.hits.front() {
            if now.duration_since(front) > self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
        self.hits.len() as u32 > self.max
    }
}

impl Default for MalformedBudget {
    fn default() -> Self {
        Self::new(16, std::time::Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn malformed_budget_trips_after_threshold() {
        let mut budget = MalformedBudget::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(!budget.record(t0));
        assert!(!budget.record(t0));
        assert!(budget.record(t0));
    }

    #[test]
    fn malformed_budget_forgets_old_hits() {
        let mut budget = MalformedBudget::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(!budget.record(t0));
        let t1 = t0 + Duration::from_secs(61);
        assert!(!budget.record(t1));
    }
}
