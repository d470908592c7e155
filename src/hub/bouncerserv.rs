//! BouncerServ virtual-user command grammar (§4.5, §2.2).
//!
//! Lines are whitespace-tokenized after the leading verb. Parsing is pure
//! and IO-free; execution against the store happens in `actor.rs`.

use crate::db::models::MessageFilter;

/// One parsed BouncerServ command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help(Option<String>),
    Status,
    NetworkAdd {
        name: String,
        addr: String,
    },
    NetworkEdit {
        name: String,
        field: String,
        value: String,
    },
    NetworkDelete {
        name: String,
    },
    NetworkList,
    ChannelUpdate {
        network: String,
        channel: String,
        field: String,
        value: String,
    },
    UserAdd {
        username: String,
        password: String,
    },
    UserDelete {
        username: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnknownVerb(String),
    MissingArgument { verb: &'static str, what: &'static str },
    Empty,
}

/// Parse one BouncerServ input line.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next().ok_or(ParseError::Empty)?;

    match verb.to_ascii_lowercase().as_str() {
        "help" => Ok(Command::Help(tokens.next().map(str::to_string))),
        "status" => Ok(Command::Status),
        "network" => parse_network(tokens),
        "channel" => parse_channel(tokens),
        "user" => parse_user(tokens),
        other => Err(ParseError::UnknownVerb(other.to_string())),
    }
}

fn parse_network<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<Command, ParseError> {
    match tokens.next() {
        Some("add") => {
            let name = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "network add", what: "name" })?
                .to_string();
            let addr = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "network add", what: "addr" })?
                .to_string();
            Ok(Command::NetworkAdd { name, addr })
        }
        Some("edit") => {
            let name = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "network edit", what: "name" })?
                .to_string();
            let field = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "network edit", what: "field" })?
                .to_string();
            let value = tokens.collect::<Vec<_>>().join(" ");
            if value.is_empty() {
                return Err(ParseError::MissingArgument { verb: "network edit", what: "value" });
            }
            Ok(Command::NetworkEdit { name, field, value })
        }
        Some("delete") => {
            let name = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "network delete", what: "name" })?
                .to_string();
            Ok(Command::NetworkDelete { name })
        }
        Some("list") | None => Ok(Command::NetworkList),
        Some(other) => Err(ParseError::UnknownVerb(format!("network {other}"))),
    }
}

fn parse_channel<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<Command, ParseError> {
    match tokens.next() {
        Some("update") => {
            let network = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "channel update", what: "network" })?
                .to_string();
            let channel = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "channel update", what: "channel" })?
                .to_string();
            let field = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "channel update", what: "field" })?
                .to_string();
            let value = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "channel update", what: "value" })?
                .to_string();
            Ok(Command::ChannelUpdate { network, channel, field, value })
        }
        Some(other) => Err(ParseError::UnknownVerb(format!("channel {other}"))),
        None => Err(ParseError::MissingArgument { verb: "channel", what: "subcommand" }),
    }
}

fn parse_user<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<Command, ParseError> {
    match tokens.next() {
        Some("add") => {
            let username = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "user add", what: "username" })?
                .to_string();
            let password = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "user add", what: "password" })?
                .to_string();
            Ok(Command::UserAdd { username, password })
        }
        Some("delete") => {
            let username = tokens
                .next()
                .ok_or(ParseError::MissingArgument { verb: "user delete", what: "username" })?
                .to_string();
            Ok(Command::UserDelete { username })
        }
        Some(other) => Err(ParseError::UnknownVerb(format!("user {other}"))),
        None => Err(ParseError::MissingArgument { verb: "user", what: "subcommand" }),
    }
}

/// Parse a channel-update `value` into a `MessageFilter`, for the three
/// filter-valued fields (`detach-on`, `reattach-on`, `relay-detached`).
pub fn parse_filter_value(value: &str) -> MessageFilter {
    MessageFilter::parse(value)
}

pub fn help_text(verb: Option<&str>) -> String {
    match verb {
        None => "commands: help, status, network add/edit/delete/list, channel update, user add/delete (admin only)".to_string(),
        Some("network") => "network add <name> <addr> | edit <name> <field> <value> | delete <name> | list".to_string(),
        Some("channel") => "channel update <network> <channel> <field> <value>".to_string(),
        Some("user") => "user add <username> <password> | delete <username> (admin only)".to_string(),
        Some("status") => "status — per-network connection state and channel count".to_string(),
        Some(other) => format!("no help for '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_network_add() {
        assert_eq!(
            parse("network add libera irc.libera.chat:6697").unwrap(),
            Command::NetworkAdd {
                name: "libera".to_string(),
                addr: "irc.libera.chat:6697".to_string(),
            }
        );
    }

    #[test]
    fn parses_bare_network_as_list() {
        assert_eq!(parse("network").unwrap(), Command::NetworkList);
        assert_eq!(parse("network list").unwrap(), Command::NetworkList);
    }

    #[test]
    fn parses_channel_update_with_multi_word_value_taking_only_first_token() {
        let parsed = parse("channel update libera #rust detach-on message").unwrap();
        assert_eq!(
            parsed,
            Command::ChannelUpdate {
                network: "libera".to_string(),
                channel: "#rust".to_string(),
                field: "detach-on".to_string(),
                value: "message".to_string(),
            }
        );
    }

    #[test]
    fn missing_argument_is_reported() {
        assert_eq!(
            parse("network add libera"),
            Err(ParseError::MissingArgument { verb: "network add", what: "addr" })
        );
    }

    #[test]
    fn unknown_verb_is_reported() {
        assert_eq!(parse("frobnicate"), Err(ParseError::UnknownVerb("frobnicate".to_string())));
    }

    #[test]
    fn help_with_no_argument_lists_verbs() {
        assert!(help_text(None).contains("network"));
    }
}
