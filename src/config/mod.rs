//! Configuration loading and management (C3, §4.3).
//!
//! This module is split into logical submodules:
//! - [`types`]: the as-deserialized [`Config`] and its nested tables
//! - [`listen`]: listen URI parsing
//! - [`validation`]: startup validation
//! - [`snapshot`]: the immutable, `ArcSwap`-published [`ConfigSnapshot`]

mod listen;
mod snapshot;
mod types;
mod validation;

pub use listen::ListenUri;
pub use snapshot::{ConfigHandle, ConfigSnapshot};
pub use types::{BootstrapConfig, Config, SqlConfig, TlsConfig};
pub use validation::validate;

use crate::error::ConfigError;
use std::path::Path;

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_is_read_error() {
        let err = Config::load("/nonexistent/soju.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_malformed_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soju.toml");
        std::fs::write(&path, "not valid [[[ toml").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_parses_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soju.toml");
        std::fs::write(
            &path,
            r#"
hostname = "bouncer.example.org"
listen = ["irc+insecure://127.0.0.1:6667"]
"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.hostname, "bouncer.example.org");
        assert_eq!(config.quit_message, "Bouncer shutting down");
        assert_eq!(config.max_user_networks, -1);
    }
}
