//! Hub-side canonical live view of one network (§4.6): membership, topic, and
//! own nick, maintained independently of C4's own bookkeeping so the hub can
//! synthesize state to a freshly attached or reattached downstream without
//! round-tripping through the upstream task.

use crate::upstream::{CaseMap, ChannelState};
use slirc_proto::{Command, Message, Response};
use std::collections::HashMap;
use std::time::Instant;

/// Per-network live view owned by one hub.
#[derive(Debug, Default)]
pub struct NetworkView {
    pub nick: String,
    pub casemap: CaseMap,
    /// Keyed by the casemapped channel name.
    pub channels: HashMap<String, ChannelState>,
}

impl NetworkView {
    /// Fold one upstream-originated message into the view. Mirrors
    /// `upstream::session::handle_inbound`'s bookkeeping (PING is not
    /// handled here — C4 already answers and suppresses it before this
    /// message ever reaches the hub).
    pub fn apply(&mut self, msg: &Message) {
        match &msg.command {
            Command::JOIN(channel, _, _) => {
                let nick = msg.source_nickname().unwrap_or_default().to_string();
                let key = self.casemap.to_lower(channel);
                let entry = self.channels.entry(key).or_default();
                if self.casemap.eq(&nick, &self.nick) {
                    entry.last_activity = Some(Instant::now());
                }
                entry.members.entry(nick).or_default();
            }
            Command::PART(channel, _) => {
                let nick = msg.source_nickname().unwrap_or_default().to_string();
                let key = self.casemap.to_lower(channel);
                if self.casemap.eq(&nick, &self.nick) {
                    self.channels.remove(&key);
                } else if let Some(entry) = self.channels.get_mut(&key) {
                    entry.members.remove(&nick);
                }
            }
            Command::KICK(channel, target, _) => {
                let key = self.casemap.to_lower(channel);
                if self.casemap.eq(target, &self.nick) {
                    self.channels.remove(&key);
                } else if let Some(entry) = self.channels.get_mut(&key) {
                    entry.members.remove(target);
                }
            }
            Command::QUIT(_) => {
                let nick = msg.source_nickname().unwrap_or_default().to_string();
                for entry in self.channels.values_mut() {
                    entry.members.remove(&nick);
                }
            }
            Command::NICK(new_nick) => {
                let old_nick = msg.source_nickname().unwrap_or_default().to_string();
                if self.casemap.eq(&old_nick, &self.nick) {
                    self.nick = new_nick.clone();
                }
                for entry in self.channels.values_mut() {
                    if let Some(modes) = entry.members.remove(&old_nick) {
                        entry.members.insert(new_nick.clone(), modes);
                    }
                }
            }
            Command::TOPIC(channel, topic) => {
                let key = self.casemap.to_lower(channel);
                self.channels.entry(key).or_default().topic = topic.clone();
            }
            Command::Response(Response::RPL_TOPIC, params) => {
                if let [_, channel, topic] = params.as_slice() {
                    let key = self.casemap.to_lower(channel);
                    self.channels.entry(key).or_default().topic = Some(topic.clone());
                }
            }
            _ => {}
        }
    }

    /// Whether `target`, as casemapped by this network, names a channel the
    /// hub currently considers joined.
    pub fn is_joined(&self, target: &str) -> bool {
        self.channels.contains_key(&self.casemap.to_lower(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slirc_proto::Prefix;

    fn join(nick: &str, channel: &str) -> Message {
        Message {
            tags: None,
            prefix: Some(Prefix::new(nick, nick, "host")),
            command: Command::JOIN(channel.to_string(), None, None),
        }
    }

    #[test]
    fn join_then_part_tracks_membership() {
        let mut view = NetworkView {
            nick: "me".to_string(),
            ..Default::default()
        };
        view.apply(&join("other", "#rust"));
        assert!(view.is_joined("#rust"));
        assert!(view.channels.get("#rust").unwrap().members.contains_key("other"));

        view.apply(&Message {
            tags: None,
            prefix: Some(Prefix::new("other", "other", "host")),
            command: Command::PART("#rust".to_string(), None),
        });
        assert!(!view.channels.get("#rust").unwrap().members.contains_key("other"));
    }

    #[test]
    fn own_part_removes_the_whole_channel() {
        let mut view = NetworkView {
            nick: "me".to_string(),
            ..Default::default()
        };
        view.apply(&join("me", "#rust"));
        view.apply(&Message {
            tags: None,
            prefix: Some(Prefix::new("me", "me", "host")),
            command: Command::PART("#rust".to_string(), None),
        });
        assert!(!view.is_joined("#rust"));
    }

    #[test]
    fn nick_change_renames_membership_key() {
        let mut view = NetworkView {
            nick: "me".to_string(),
            ..Default::default()
        };
        view.apply(&join("other", "#rust"));
        view.apply(&Message {
            tags: None,
            prefix: Some(Prefix::new("other", "other", "host")),
            command: Command::NICK("other2".to_string()),
        });
        let members = &view.channels.get("#rust").unwrap().members;
        assert!(!members.contains_key("other"));
        assert!(members.contains_key("other2"));
    }
}
