//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use crate::error::ConfigError;
use std::path::Path;

/// Validate a configuration, returning every error found (not just the first).
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.hostname.is_empty() {
        errors.push(ConfigError::Invalid("hostname is required".to_string()));
    }

    if config.sql.driver != "sqlite" {
        errors.push(ConfigError::UnsupportedSqlDriver(config.sql.driver.clone()));
    }

    for raw in &config.listen {
        if let Err(e) = super::listen::ListenUri::parse(raw) {
            errors.push(e);
        }
    }

    if let Some(ref tls) = config.tls {
        if !Path::new(&tls.cert_path).exists() {
            errors.push(ConfigError::MissingTlsMaterial(
                "cert-path".to_string(),
                tls.cert_path.clone(),
            ));
        }
        if !Path::new(&tls.key_path).exists() {
            errors.push(ConfigError::MissingTlsMaterial(
                "key-path".to_string(),
                tls.key_path.clone(),
            ));
        }
    } else if config.listen_uris().map(|u| u.iter().any(|l| l.is_tls())).unwrap_or(false) {
        errors.push(ConfigError::Invalid(
            "a TLS listener is configured but no [tls] keypair was given".to_string(),
        ));
    }

    for cidr in &config.accept_proxy_ip {
        if cidr.parse::<ipnet::IpNet>().is_err() {
            errors.push(ConfigError::BadCidr(
                cidr.clone(),
                "expected an IPv4 or IPv6 CIDR".to_string(),
            ));
        }
    }

    if config.max_user_networks < -1 {
        errors.push(ConfigError::Invalid(
            "max-user-networks must be -1 (unlimited) or >= 0".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> String {
        r#"
hostname = "bouncer.example.org"
listen = ["irc+insecure://127.0.0.1:6667"]
"#
        .to_string()
    }

    #[test]
    fn minimal_config_passes() {
        let config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn empty_hostname_fails() {
        let toml = r#"
hostname = ""
listen = ["irc+insecure://127.0.0.1:6667"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ConfigError::Invalid(_))));
    }

    #[test]
    fn unsupported_sql_driver_fails() {
        let toml = r#"
hostname = "bouncer.example.org"
listen = ["irc+insecure://127.0.0.1:6667"]

[sql]
driver = "postgres"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnsupportedSqlDriver(_))));
    }

    #[test]
    fn tls_listener_without_keypair_fails() {
        let toml = r#"
hostname = "bouncer.example.org"
listen = ["ircs://0.0.0.0:6697"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_tls_cert_fails() {
        let toml = r#"
hostname = "bouncer.example.org"
listen = ["ircs://0.0.0.0:6697"]

[tls]
cert-path = "/nonexistent/cert.pem"
key-path = "/nonexistent/key.pem"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::MissingTlsMaterial(..))));
    }

    #[test]
    fn bad_cidr_fails() {
        let toml = r#"
hostname = "bouncer.example.org"
listen = ["irc+insecure://127.0.0.1:6667"]
accept-proxy-ip = ["not-a-cidr"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ConfigError::BadCidr(..))));
    }
}
