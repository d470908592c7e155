//! Downstream registration-time accumulated state (§4.5) and the
//! `<user>`/`<user>/<network>` identity grammar.

use std::collections::HashSet;

/// Capabilities this bouncer advertises to downstream clients. Mirrors
/// `upstream::registration::IMPLEMENTER_CAPS` (that module is private, so
/// this list is duplicated rather than imported) — whatever IRCv3 machinery
/// the bouncer understands from an upstream it can also speak downstream.
pub const SUPPORTED_CAPS: &[&str] = &[
    "sasl",
    "message-tags",
    "server-time",
    "batch",
    "labeled-response",
    "cap-notify",
    "multi-prefix",
    "away-notify",
    "account-notify",
    "extended-join",
    "chghost",
    "setname",
    "echo-message",
];

/// One client's registration progress. Dropped once attached to a hub.
#[derive(Debug, Default)]
pub struct DownstreamState {
    pub nick: Option<String>,
    pub user: Option<String>,
    pub realname: Option<String>,
    pub pass: Option<String>,
    pub cap_negotiating: bool,
    pub acked_caps: HashSet<String>,
    /// Set once SASL PLAIN has verified a `(username, network)` pair,
    /// bypassing the PASS check entirely.
    pub sasl_authenticated: Option<(String, Option<String>)>,
    pub sasl_mechanism: Option<String>,
    pub sasl_buffer: String,
}

impl DownstreamState {
    pub fn has_cap(&self, name: &str) -> bool {
        self.acked_caps.contains(name)
    }

    /// Registration may complete once NICK and USER have both arrived and
    /// capability negotiation (if started) has been closed with `CAP END`.
    pub fn ready_to_register(&self) -> bool {
        self.nick.is_some() && self.user.is_some() && !self.cap_negotiating
    }
}

/// Splits a presented identity into `(username, network)`. `<user>/<network>`
/// names a per-network attach; a bare `<user>` attaches according to
/// whichever scope the caller resolves against `multi_upstream` (§4.5).
pub fn parse_identity(raw: &str) -> (String, Option<String>) {
    match raw.split_once('/') {
        Some((user, network)) if !network.is_empty() => {
            (user.to_string(), Some(network.to_string()))
        }
        _ => (raw.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_username() {
        assert_eq!(parse_identity("alice"), ("alice".to_string(), None));
    }

    #[test]
    fn parses_network_scoped_username() {
        assert_eq!(
            parse_identity("alice/libera"),
            ("alice".to_string(), Some("libera".to_string()))
        );
    }

    #[test]
    fn trailing_slash_with_no_network_is_treated_as_bare() {
        assert_eq!(parse_identity("alice/"), ("alice".to_string(), None));
    }

    #[test]
    fn ready_to_register_requires_nick_user_and_closed_cap_negotiation() {
        let mut state = DownstreamState::default();
        assert!(!state.ready_to_register());
        state.nick = Some("alice".to_string());
        state.user = Some("alice".to_string());
        assert!(state.ready_to_register());
        state.cap_negotiating = true;
        assert!(!state.ready_to_register());
    }
}
