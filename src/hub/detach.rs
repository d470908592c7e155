//! Detachment filter resolution (§4.6): `default` resolves differently
//! depending on which of the three policies it's standing in for, and
//! `highlight` needs word-boundary, casemap-aware nick matching.

use crate::db::models::MessageFilter;
use crate::upstream::CaseMap;
use slirc_proto::{Command, Message};

/// Which policy a `MessageFilter::Default` is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    DetachOn,
    ReattachOn,
    RelayDetached,
}

/// §4.6: "`default` resolves to `message` for `DetachOn`/`ReattachOn` and to
/// `highlight` for `RelayDetached`."
pub fn resolve(filter: MessageFilter, kind: FilterKind) -> MessageFilter {
    match filter {
        MessageFilter::Default => match kind {
            FilterKind::DetachOn | FilterKind::ReattachOn => MessageFilter::Message,
            FilterKind::RelayDetached => MessageFilter::Highlight,
        },
        other => other,
    }
}

/// Whether `msg` matches `filter` (already resolved — never pass `Default`).
pub fn matches(filter: MessageFilter, msg: &Message, own_nick: &str, casemap: CaseMap) -> bool {
    match filter {
        MessageFilter::Default => false,
        MessageFilter::None => false,
        MessageFilter::Message => is_privmsg_or_notice(msg),
        MessageFilter::Highlight => is_privmsg_or_notice(msg) && mentions_nick(msg, own_nick, casemap),
    }
}

fn is_privmsg_or_notice(msg: &Message) -> bool {
    matches!(msg.command, Command::PRIVMSG(_, _) | Command::NOTICE(_, _))
}

/// True if `text` mentions `nick` as a whole word, per `casemap`'s folding.
fn mentions_nick(msg: &Message, nick: &str, casemap: CaseMap) -> bool {
    let text = match &msg.command {
        Command::PRIVMSG(_, text) | Command::NOTICE(_, text) => text,
        _ => return false,
    };
    let folded_nick = casemap.to_lower(nick);
    text.split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
        .any(|word| !word.is_empty() && casemap.to_lower(word) == folded_nick)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn privmsg(target: &str, text: &str) -> Message {
        Message::from(Command::PRIVMSG(target.to_string(), text.to_string()))
    }

    #[test]
    fn default_resolves_to_message_for_detach_and_reattach() {
        assert_eq!(
            resolve(MessageFilter::Default, FilterKind::DetachOn),
            MessageFilter::Message
        );
        assert_eq!(
            resolve(MessageFilter::Default, FilterKind::ReattachOn),
            MessageFilter::Message
        );
    }

    #[test]
    fn default_resolves_to_highlight_for_relay_detached() {
        assert_eq!(
            resolve(MessageFilter::Default, FilterKind::RelayDetached),
            MessageFilter::Highlight
        );
    }

    #[test]
    fn message_filter_matches_any_privmsg() {
        let msg = privmsg("#rust", "just chatting");
        assert!(matches(MessageFilter::Message, &msg, "me", CaseMap::Rfc1459));
    }

    #[test]
    fn highlight_filter_requires_whole_word_nick_with_casefold() {
        let mentioned = privmsg("#rust", "hey ME[away], you there?");
        let not_mentioned = privmsg("#rust", "meeting at 5");
        assert!(matches(MessageFilter::Highlight, &mentioned, "me{away}", CaseMap::Rfc1459));
        assert!(!matches(MessageFilter::Highlight, &not_mentioned, "me", CaseMap::Rfc1459));
    }

    #[test]
    fn none_filter_never_matches() {
        let msg = privmsg("#rust", "me");
        assert!(!matches(MessageFilter::None, &msg, "me", CaseMap::Rfc1459));
    }
}
