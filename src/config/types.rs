//! Configuration type definitions.
//!
//! All the sub-config structs used by the main Config (§6).

use serde::Deserialize;

use super::listen::ListenUri;

fn default_title() -> String {
    "soju-rs".to_string()
}

fn default_max_user_networks() -> i64 {
    -1
}

fn default_sql_driver() -> String {
    "sqlite".to_string()
}

fn default_quit_message() -> String {
    "Bouncer shutting down".to_string()
}

// =============================================================================
// Top-level config
// =============================================================================

/// The whole config file, deserialized as-is (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Server hostname advertised to clients and used in the server prefix.
    pub hostname: String,
    /// Human-readable network title shown in CTCP VERSION / server banner.
    #[serde(default = "default_title")]
    pub title: String,
    /// Listen URIs (`ircs://`, `irc+insecure://`, `unix://`, `wss://`,
    /// `ws+insecure://`, `ident://`, or a bare `host[:port]`).
    #[serde(default)]
    pub listen: Vec<String>,
    /// Shared TLS keypair used by every TLS-capable listener.
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub sql: SqlConfig,
    pub log_path: Option<String>,
    /// Allowed `Origin` header glob patterns for WebSocket listeners.
    #[serde(default)]
    pub http_origins: Vec<String>,
    /// CIDRs allowed to send a PROXY protocol header ahead of the IRC stream.
    #[serde(default)]
    pub accept_proxy_ip: Vec<String>,
    /// Per-user network cap; `-1` means unlimited.
    #[serde(default = "default_max_user_networks")]
    pub max_user_networks: i64,
    /// Enables `<user>/<network>` attach and channel-name prefixing (§4.5).
    #[serde(default)]
    pub multi_upstream: bool,
    pub motd_path: Option<String>,
    /// One-shot admin bootstrap (§2.2): consumed on first start when the
    /// store has zero users.
    pub bootstrap: Option<BootstrapConfig>,
    #[serde(default = "default_quit_message")]
    pub quit_message: String,
}

impl Config {
    /// Parse every `listen` entry, failing on the first bad URI.
    pub fn listen_uris(&self) -> Result<Vec<ListenUri>, crate::error::ConfigError> {
        self.listen.iter().map(|s| ListenUri::parse(s)).collect()
    }
}

// =============================================================================
// TLS
// =============================================================================

/// Shared TLS keypair configuration (§4.3).
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    #[serde(rename = "cert-path")]
    pub cert_path: String,
    #[serde(rename = "key-path")]
    pub key_path: String,
}

// =============================================================================
// Persistence
// =============================================================================

/// Database driver selection. Only `sqlite` is supported (§9 open question 3).
#[derive(Debug, Clone, Deserialize)]
pub struct SqlConfig {
    #[serde(default = "default_sql_driver")]
    pub driver: String,
    /// File path, or `:memory:`.
    pub source: Option<String>,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            driver: default_sql_driver(),
            source: None,
        }
    }
}

// =============================================================================
// Bootstrap (ADDED, §2.2)
// =============================================================================

/// Admin account to create on first start, if the store has no users yet.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    pub username: String,
    pub password: String,
}
