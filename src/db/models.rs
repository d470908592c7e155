//! Persistent record types for users, networks, and channels (§3).

use std::time::Duration;

/// Identity record. `id == 0` means "not yet stored".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Argon2 hash, or `None` when password login is disabled for this user.
    pub password_hash: Option<String>,
    pub admin: bool,
}

/// SASL credential stored on a Network. Storing one variant clears the other's
/// fields (§3 invariant).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaslCredential {
    #[default]
    None,
    Plain {
        username: String,
        password: String,
    },
    External {
        /// DER-encoded X.509 certificate.
        cert_der: Vec<u8>,
        /// DER-encoded PKCS#8 private key.
        key_der: Vec<u8>,
    },
}

/// One upstream binding owned by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub id: i64,
    pub user_id: i64,
    pub name: Option<String>,
    /// `host:port`; TLS is implied by an `ircs://`-style address prefix.
    pub addr: String,
    pub nick: String,
    pub username: String,
    pub realname: String,
    pub pass: Option<String>,
    pub connect_commands: Vec<String>,
    pub sasl: SaslCredential,
}

impl Network {
    /// `true` if `addr` requests a TLS connection.
    pub fn wants_tls(&self) -> bool {
        !self.addr.starts_with("plain+")
    }

    /// The bare `host:port` with any scheme prefix stripped.
    pub fn host_port(&self) -> &str {
        self.addr
            .strip_prefix("plain+")
            .unwrap_or(self.addr.as_str())
    }
}

/// A predicate over inbound messages (§4.6, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFilter {
    #[default]
    Default,
    None,
    Highlight,
    Message,
}

impl MessageFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageFilter::Default => "default",
            MessageFilter::None => "none",
            MessageFilter::Highlight => "highlight",
            MessageFilter::Message => "message",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "none" => MessageFilter::None,
            "highlight" => MessageFilter::Highlight,
            "message" => MessageFilter::Message,
            _ => MessageFilter::Default,
        }
    }
}

/// Persistent per-network channel config (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: i64,
    pub network_id: i64,
    pub name: String,
    pub key: Option<String>,
    pub detached: bool,
    pub relay_detached: MessageFilter,
    pub reattach_on: MessageFilter,
    /// Zero means "detachment disabled regardless of filter setting" (§8).
    pub detach_after: Duration,
    pub detach_on: MessageFilter,
}

impl Channel {
    pub fn new(network_id: i64, name: String) -> Self {
        Self {
            id: 0,
            network_id,
            name,
            key: None,
            detached: false,
            relay_detached: MessageFilter::Default,
            reattach_on: MessageFilter::Default,
            detach_after: Duration::ZERO,
            detach_on: MessageFilter::Default,
        }
    }
}
