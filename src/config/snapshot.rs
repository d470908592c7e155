//! Immutable config snapshot published via `arc-swap` (C3, §4.3).

use super::Config;
use crate::error::ConfigError;
use arc_swap::{ArcSwap, Guard};
use ipnet::IpNet;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a running session reads from config, frozen at publish time.
/// Readers clone the `Arc` out of the swap and never hold it across an
/// `.await`.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub hostname: String,
    pub title: String,
    pub motd: Option<Vec<String>>,
    pub log_path: Option<PathBuf>,
    pub http_origins: Vec<String>,
    pub trusted_proxies: Vec<IpNet>,
    pub max_user_networks: i64,
    pub multi_upstream: bool,
    pub quit_message: String,
    pub debug: bool,
}

impl ConfigSnapshot {
    pub fn from_config(config: &Config, debug: bool) -> Result<Self, ConfigError> {
        let motd = config
            .motd_path
            .as_ref()
            .map(|path| {
                std::fs::read_to_string(path)
                    .map(|s| s.lines().map(str::to_string).collect::<Vec<_>>())
                    .map_err(|source| ConfigError::Read {
                        path: path.clone(),
                        source,
                    })
            })
            .transpose()?;

        let trusted_proxies = config
            .accept_proxy_ip
            .iter()
            .map(|cidr| {
                cidr.parse()
                    .map_err(|_| ConfigError::BadCidr(cidr.clone(), "expected a CIDR".to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            hostname: config.hostname.clone(),
            title: config.title.clone(),
            motd,
            log_path: config.log_path.clone().map(PathBuf::from),
            http_origins: config.http_origins.clone(),
            trusted_proxies,
            max_user_networks: config.max_user_networks,
            multi_upstream: config.multi_upstream,
            quit_message: config.quit_message.clone(),
            debug,
        })
    }

    /// Whether `ip` is allowed to prefix its connection with a PROXY header.
    pub fn trusts_proxy(&self, ip: std::net::IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(&ip))
    }
}

/// Pointer-swap handle shared by every component that needs the live config.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ArcSwap<ConfigSnapshot>>);

impl ConfigHandle {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(snapshot)))
    }

    /// Load the current snapshot. Clone fields out immediately; do not hold
    /// the guard across an `.await`.
    pub fn load(&self) -> Guard<Arc<ConfigSnapshot>> {
        self.0.load()
    }

    /// Publish a replacement snapshot (SIGHUP reload).
    pub fn store(&self, snapshot: ConfigSnapshot) {
        self.0.store(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        toml::from_str(
            r#"
hostname = "bouncer.example.org"
listen = ["irc+insecure://127.0.0.1:6667"]
accept-proxy-ip = ["10.0.0.0/8"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn trusts_proxy_within_configured_cidr() {
        let snapshot = ConfigSnapshot::from_config(&base_config(), false).unwrap();
        assert!(snapshot.trusts_proxy("10.1.2.3".parse().unwrap()));
        assert!(!snapshot.trusts_proxy("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn handle_reload_publishes_new_snapshot() {
        let snapshot = ConfigSnapshot::from_config(&base_config(), false).unwrap();
        let handle = ConfigHandle::new(snapshot);
        assert_eq!(handle.load().hostname, "bouncer.example.org");

        let mut updated = base_config();
        updated.hostname = "new.example.org".to_string();
        let updated_snapshot = ConfigSnapshot::from_config(&updated, false).unwrap();
        handle.store(updated_snapshot);
        assert_eq!(handle.load().hostname, "new.example.org");
    }
}
