//! Listen URI parsing (§6).

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;

/// One parsed entry from `listen` (§6). A bare `host[:port]` is treated as
/// `ircs://`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenUri {
    /// TLS over TCP, ALPN `irc`. Default port 6697.
    Ircs(SocketAddr),
    /// Plain TCP. Default port 6667.
    IrcInsecure(SocketAddr),
    /// Unix domain stream socket.
    Unix(PathBuf),
    /// IRC over TLS WebSocket. Default port 443.
    Wss(SocketAddr),
    /// IRC over plain WebSocket. Default port 80.
    WsInsecure(SocketAddr),
    /// Ident responder. Default port 113.
    Ident(SocketAddr),
}

impl ListenUri {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let bad = |msg: &str| ConfigError::BadListenUri(raw.to_string(), msg.to_string());

        if let Some(path) = raw.strip_prefix("unix://") {
            if !path.starts_with('/') {
                return Err(bad("unix:// path must be absolute"));
            }
            return Ok(ListenUri::Unix(PathBuf::from(path)));
        }

        let (scheme, rest, default_port): (_, _, u16) = if let Some(r) = raw.strip_prefix("ircs://")
        {
            ("ircs", r, 6697)
        } else if let Some(r) = raw.strip_prefix("irc+insecure://") {
            ("irc+insecure", r, 6667)
        } else if let Some(r) = raw.strip_prefix("wss://") {
            ("wss", r, 443)
        } else if let Some(r) = raw.strip_prefix("ws+insecure://") {
            ("ws+insecure", r, 80)
        } else if let Some(r) = raw.strip_prefix("ident://") {
            ("ident", r, 113)
        } else {
            ("ircs", raw, 6697)
        };

        let addr = parse_host_port(rest, default_port).map_err(|_| bad("unparseable address"))?;

        Ok(match scheme {
            "ircs" => ListenUri::Ircs(addr),
            "irc+insecure" => ListenUri::IrcInsecure(addr),
            "wss" => ListenUri::Wss(addr),
            "ws+insecure" => ListenUri::WsInsecure(addr),
            "ident" => ListenUri::Ident(addr),
            _ => unreachable!(),
        })
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, ListenUri::Ircs(_) | ListenUri::Wss(_))
    }
}

fn parse_host_port(rest: &str, default_port: u16) -> Result<SocketAddr, std::net::AddrParseError> {
    if rest.contains(':') && rest.parse::<SocketAddr>().is_ok() {
        return rest.parse();
    }
    // Bare host with no port: append the scheme's default.
    format!("{rest}:{default_port}").parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_defaults_to_ircs() {
        let uri = ListenUri::parse("0.0.0.0:6697").unwrap();
        assert_eq!(uri, ListenUri::Ircs("0.0.0.0:6697".parse().unwrap()));
    }

    #[test]
    fn irc_insecure_uses_default_port() {
        let uri = ListenUri::parse("irc+insecure://0.0.0.0").unwrap();
        assert_eq!(uri, ListenUri::IrcInsecure("0.0.0.0:6667".parse().unwrap()));
    }

    #[test]
    fn unix_socket_requires_absolute_path() {
        assert!(ListenUri::parse("unix:///run/soju.sock").is_ok());
        assert!(ListenUri::parse("unix://relative/path").is_err());
    }

    #[test]
    fn wss_default_port_is_443() {
        let uri = ListenUri::parse("wss://0.0.0.0").unwrap();
        assert_eq!(uri, ListenUri::Wss("0.0.0.0:443".parse().unwrap()));
    }

    #[test]
    fn ident_scheme_parses() {
        let uri = ListenUri::parse("ident://0.0.0.0").unwrap();
        assert_eq!(uri, ListenUri::Ident("0.0.0.0:113".parse().unwrap()));
    }

    #[test]
    fn is_tls_true_only_for_ircs_and_wss() {
        assert!(ListenUri::parse("ircs://host").unwrap().is_tls());
        assert!(ListenUri::parse("wss://host").unwrap().is_tls());
        assert!(!ListenUri::parse("irc+insecure://host").unwrap().is_tls());
    }
}
