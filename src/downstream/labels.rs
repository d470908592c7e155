//! Labeled-response batching (§4.5). Grounded on the teacher's
//! `network/connection/event_loop.rs::send_labeled_response` (ack-or-single-
//! or-batch trichotomy, `label`/`batch` tag names) but built directly on
//! `slirc-proto` primitives rather than importing it — that module lives
//! under `handlers`/`network::connection`, both slated for removal in the
//! final trim.

use slirc_proto::{generate_batch_ref, BatchSubCommand, Command, Message, Prefix};

/// Wraps `replies` for a client that sent `label` and negotiated
/// `labeled-response`; returns `replies` unchanged otherwise.
///
/// Zero replies become a bare ACK carrying the label — this is also what a
/// forwarded-to-hub command (PRIVMSG, JOIN, ...) gets, since the hub's
/// asynchronous fan-out has no way to correlate a later event back to the
/// label that requested it.
pub fn wrap(
    server_name: &str,
    label: Option<&str>,
    has_cap: bool,
    mut replies: Vec<Message>,
) -> Vec<Message> {
    let Some(label) = label.filter(|_| has_cap) else {
        return replies;
    };

    match replies.len() {
        0 => vec![Message::from(Command::ACK)
            .with_tag("label", Some(label))
            .with_prefix(Prefix::ServerName(server_name.to_string()))],
        1 => {
            let msg = replies.remove(0);
            vec![msg.with_tag("label", Some(label))]
        }
        _ => {
            let reference = generate_batch_ref();
            let mut out = Vec::with_capacity(replies.len() + 2);
            out.push(
                Message::from(Command::BATCH(
                    format!("+{reference}"),
                    Some(BatchSubCommand::CUSTOM("labeled-response".to_string())),
                    None,
                ))
                .with_tag("label", Some(label))
                .with_prefix(Prefix::ServerName(server_name.to_string())),
            );
            for msg in replies {
                out.push(msg.with_tag("batch", Some(reference.clone())));
            }
            out.push(
                Message::from(Command::BATCH(format!("-{reference}"), None, None))
                    .with_prefix(Prefix::ServerName(server_name.to_string())),
            );
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_label_passes_replies_through_unchanged() {
        let replies = vec![Message::notice("nick", "hi")];
        let wrapped = wrap("bouncer", None, true, replies.clone());
        assert_eq!(wrapped, replies);
    }

    #[test]
    fn cap_not_negotiated_ignores_the_label() {
        let replies = vec![Message::notice("nick", "hi")];
        let wrapped = wrap("bouncer", Some("l1"), false, replies.clone());
        assert_eq!(wrapped, replies);
    }

    #[test]
    fn empty_replies_produce_a_labeled_ack() {
        let wrapped = wrap("bouncer", Some("l1"), true, vec![]);
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].label(), Some("l1"));
        assert!(matches!(wrapped[0].command, Command::ACK));
    }

    #[test]
    fn single_reply_gets_the_label_tag_directly() {
        let wrapped = wrap("bouncer", Some("l1"), true, vec![Message::notice("nick", "hi")]);
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].label(), Some("l1"));
    }

    #[test]
    fn multiple_replies_are_wrapped_in_a_batch() {
        let replies = vec![Message::notice("nick", "one"), Message::notice("nick", "two")];
        let wrapped = wrap("bouncer", Some("l1"), true, replies);
        assert_eq!(wrapped.len(), 4);
        assert!(matches!(wrapped[0].command, Command::BATCH(_, _, _)));
        assert_eq!(wrapped[0].label(), Some("l1"));
        assert!(matches!(wrapped[3].command, Command::BATCH(_, _, _)));
    }
}
