//! Pure helpers for the registration sequence (§4.4): the fixed capability
//! set, channel auto-join batching, and the `Reload` diff rules. Kept free of
//! I/O so they can be unit tested without a socket.

use crate::db::models::Network;
use std::collections::HashSet;

/// Capabilities this bouncer requests when the server advertises them
/// (§4.4 step 2).
pub const IMPLEMENTER_CAPS: &[&str] = &[
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

/// The intersection of `IMPLEMENTER_CAPS` with what the server advertised,
/// in `IMPLEMENTER_CAPS` order.
pub fn negotiate_caps(advertised: &HashSet<String>) -> Vec<String> {
    IMPLEMENTER_CAPS
        .iter()
        .filter(|cap| advertised.contains(**cap))
        .map(|cap| cap.to_string())
        .collect()
}

/// Group channel names into `JOIN` parameter strings that each stay under
/// `max_line_len` bytes (the server's advertised line-length limit).
pub fn batch_joins(channels: &[String], max_line_len: usize) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();

    for name in channels {
        let extra = if current.is_empty() { name.len() } else { name.len() + 1 };
        if !current.is_empty() && current.len() + extra > max_line_len {
            batches.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(',');
        }
        current.push_str(name);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Diff the persisted non-detached channel set against the upstream's
/// current membership, for both startup auto-join and `Reload` (§4.4 step 7,
/// final paragraph).
pub fn diff_channels(desired: &HashSet<String>, live: &HashSet<String>) -> (Vec<String>, Vec<String>) {
    let join = desired.difference(live).cloned().collect();
    let part = live.difference(desired).cloned().collect();
    (join, part)
}

/// Whether a `Reload` of `old` into `new` must force a full reconnect
/// (§4.4 final paragraph: addr/nick/user/realname/pass/SASL changes do;
/// ConnectCommands changes apply on next reconnect; channel changes are
/// diffed live instead).
pub fn network_needs_reconnect(old: &Network, new: &Network) -> bool {
    old.addr != new.addr
        || old.nick != new.nick
        || old.username != new.username
        || old.realname != new.realname
        || old.pass != new.pass
        || old.sasl != new.sasl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SaslCredential;

    #[test]
    fn negotiate_caps_keeps_only_advertised_in_fixed_order() {
        let advertised: HashSet<String> = ["sasl", "batch", "some-vendor-ext"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let negotiated = negotiate_caps(&advertised);
        assert_eq!(negotiated, vec!["sasl".to_string(), "batch".to_string()]);
    }

    #[test]
    fn batch_joins_respects_line_length() {
        let channels = vec!["#a".to_string(), "#b".to_string(), "#c".to_string()];
        let batches = batch_joins(&channels, 6);
        assert_eq!(batches, vec!["#a,#b".to_string(), "#c".to_string()]);
    }

    #[test]
    fn batch_joins_single_batch_when_it_fits() {
        let channels = vec!["#a".to_string(), "#b".to_string()];
        let batches = batch_joins(&channels, 512);
        assert_eq!(batches, vec!["#a,#b".to_string()]);
    }

    #[test]
    fn diff_channels_computes_join_and_part_sets() {
        let desired: HashSet<String> = ["#a", "#b"].iter().map(|s| s.to_string()).collect();
        let live: HashSet<String> = ["#b", "#c"].iter().map(|s| s.to_string()).collect();
        let (mut join, mut part) = diff_channels(&desired, &live);
        join.sort();
        part.sort();
        assert_eq!(join, vec!["#a".to_string()]);
        assert_eq!(part, vec!["#c".to_string()]);
    }

    fn base_network() -> Network {
        Network {
            id: 1,
            user_id: 1,
            name: None,
            addr: "irc.example.org:6697".to_string(),
            nick: "nick".to_string(),
            username: "user".to_string(),
            realname: "Real Name".to_string(),
            pass: None,
            connect_commands: vec![],
            sasl: SaslCredential::None,
        }
    }

    #[test]
    fn nick_change_forces_reconnect() {
        let old = base_network();
        let mut new = base_network();
        new.nick = "other".to_string();
        assert!(network_needs_reconnect(&old, &new));
    }

    #[test]
    fn connect_commands_change_alone_does_not_force_reconnect() {
        let old = base_network();
        let mut new = base_network();
        new.connect_commands = vec!["PRIVMSG NickServ :identify hunter2".to_string()];
        assert!(!network_needs_reconnect(&old, &new));
    }

    #[test]
    fn sasl_change_forces_reconnect() {
        let old = base_network();
        let mut new = base_network();
        new.sasl = SaslCredential::Plain {
            username: "u".to_string(),
            password: "p".to_string(),
        };
        assert!(network_needs_reconnect(&old, &new));
    }
}
