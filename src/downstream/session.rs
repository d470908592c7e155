//! Per-connection downstream task (§4.5): CAP negotiation as the responding
//! party, PASS/NICK/USER (+ optional SASL PLAIN) registration, the welcome
//! burst, then steady-state relay against an attached hub.
//!
//! Structurally mirrors `upstream::session` (`send`/`io_error`/
//! `steady_state` split, `tokio::select!`-raced read loop) with client and
//! server swapped: here *we* answer CAP and hand out numerics instead of
//! requesting them.

use super::labels;
use super::state::{parse_identity, DownstreamState, SUPPORTED_CAPS};
use super::{HubProvider, ResolvedAttach};
use crate::error::{DownstreamError, MalformedBudget};
use crate::hub::{AttachRequest, DownstreamCaps, HubHandle};
use slirc_proto::sasl::decode_base64;
use slirc_proto::{CapSubCommand, Command, IsupportBuilder, Message, Prefix, Response, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const PING_INTERVAL: Duration = Duration::from_secs(120);
const SASL_MAX_BUFFER: usize = 1 << 16;

pub async fn run(
    mut transport: Transport,
    peer: SocketAddr,
    server_name: String,
    provider: Arc<dyn HubProvider>,
) {
    let mut budget = MalformedBudget::default();
    let mut state = DownstreamState::default();

    let resolved = match register(&mut transport, &mut budget, &mut state, &server_name, &provider).await {
        Ok(resolved) => resolved,
        Err(e) => {
            info!(%peer, error = %e, "downstream registration failed");
            return;
        }
    };

    let nick = state.nick.clone().unwrap_or_default();
    let caps = DownstreamCaps { negotiated: state.acked_caps.clone() };
    let Some(attach_result) = resolved
        .hub
        .attach(AttachRequest { scope: resolved.scope, caps })
        .await
    else {
        let _ = send(&mut transport, error_notice(&server_name, "bouncer is shutting down")).await;
        return;
    };

    let attached = match attach_result {
        Ok(attached) => attached,
        Err(e) => {
            warn!(%peer, %nick, error = ?e, "attach rejected");
            let _ = send(&mut transport, error_notice(&server_name, &format!("{e:?}"))).await;
            return;
        }
    };

    if send_all(&mut transport, welcome_burst(&server_name, &nick)).await.is_err() {
        return;
    }

    info!(%peer, %nick, "downstream registered");
    steady_state(&mut transport, attached.id, attached.from_hub, &resolved.hub, &server_name, &state).await;
    resolved.hub.detach(attached.id).await;
    info!(%peer, %nick, "downstream disconnected");
}

/// Drives CAP/PASS/NICK/USER/AUTHENTICATE until registration completes or
/// the connection is rejected/closed.
async fn register(
    transport: &mut Transport,
    budget: &mut MalformedBudget,
    state: &mut DownstreamState,
    server_name: &str,
    provider: &Arc<dyn HubProvider>,
) -> Result<ResolvedAttach, DownstreamError> {
    loop {
        let msg = match transport.read_message().await {
            Ok(Some(msg)) => msg,
            Ok(None) => return Err(DownstreamError::Quit(None)),
            Err(slirc_proto::transport::TransportReadError::Protocol(e)) => {
                warn!(%e, "malformed line during registration");
                if budget.record(Instant::now()) {
                    return Err(DownstreamError::SlowClient);
                }
                continue;
            }
            Err(slirc_proto::transport::TransportReadError::Io(e)) => return Err(DownstreamError::Io(e)),
        };

        if let Some(replies) = handle_registration_message(state, server_name, &msg) {
            if send_all(transport, replies).await.is_err() {
                return Err(DownstreamError::Quit(None));
            }
        }

        if let Command::QUIT(reason) = &msg.command {
            return Err(DownstreamError::Quit(reason.clone()));
        }

        if !state.ready_to_register() {
            continue;
        }

        let (username, network) = match &state.sasl_authenticated {
            Some((user, net)) => (user.clone(), net.clone()),
            None => parse_identity(state.user.as_deref().unwrap_or_default()),
        };

        // SASL PLAIN already verified the password; don't check PASS again.
        let password = if state.sasl_authenticated.is_some() { None } else { state.pass.clone() };

        return match provider.authenticate(&username, network.as_deref(), password.as_deref()).await {
            Ok(resolved) => Ok(resolved),
            Err(e) => {
                let nick = state.nick.clone().unwrap_or_else(|| "*".to_string());
                let _ = send(
                    transport,
                    Response::err_passwdmismatch(&nick).with_prefix(Prefix::ServerName(server_name.to_string())),
                )
                .await;
                Err(e)
            }
        };
    }
}

/// Handles one message during registration, returning any replies to send
/// (already wrapped for labeled-response if the client asked for one).
/// `None` means the message produced no reply at all (e.g. bare `NICK`).
fn handle_registration_message(
    state: &mut DownstreamState,
    server_name: &str,
    msg: &Message,
) -> Option<Vec<Message>> {
    let label = msg.label().map(str::to_string);
    let has_label_cap = state.has_cap("labeled-response");
    let replies = match &msg.command {
        Command::CAP(_, sub, _, arg) => handle_cap(state, server_name, *sub, arg.as_deref()),
        Command::PASS(pass) => {
            state.pass = Some(pass.clone());
            vec![]
        }
        Command::NICK(nick) => {
            state.nick = Some(nick.clone());
            vec![]
        }
        Command::USER(user, _, realname) => {
            state.user = Some(user.clone());
            state.realname = Some(realname.clone());
            vec![]
        }
        Command::AUTHENTICATE(data) => handle_authenticate(state, server_name, data),
        Command::PING(token, _) => vec![Message::pong_with_token(server_name, token.clone())],
        _ => vec![],
    };

    if replies.is_empty() && label.is_none() {
        return None;
    }
    Some(labels::wrap(server_name, label.as_deref(), has_label_cap, replies))
}

fn handle_cap(state: &mut DownstreamState, server_name: &str, sub: CapSubCommand, arg: Option<&str>) -> Vec<Message> {
    match sub {
        CapSubCommand::LS => {
            state.cap_negotiating = true;
            vec![cap_message(server_name, CapSubCommand::LS, SUPPORTED_CAPS.join(" "))]
        }
        CapSubCommand::LIST => {
            let acked = state.acked_caps.iter().cloned().collect::<Vec<_>>().join(" ");
            vec![cap_message(server_name, CapSubCommand::LIST, acked)]
        }
        CapSubCommand::REQ => {
            state.cap_negotiating = true;
            let requested = arg.unwrap_or_default();
            let all_supported = requested
                .split_whitespace()
                .all(|c| SUPPORTED_CAPS.contains(&c));
            if all_supported {
                for cap in requested.split_whitespace() {
                    state.acked_caps.insert(cap.to_string());
                }
                vec![cap_message(server_name, CapSubCommand::ACK, requested.to_string())]
            } else {
                vec![cap_message(server_name, CapSubCommand::NAK, requested.to_string())]
            }
        }
        CapSubCommand::END => {
            state.cap_negotiating = false;
            vec![]
        }
        _ => vec![],
    }
}

fn cap_message(server_name: &str, sub: CapSubCommand, payload: String) -> Message {
    Message::from(Command::CAP(Some("*".to_string()), sub, None, Some(payload)))
        .with_prefix(Prefix::ServerName(server_name.to_string()))
}

/// SASL PLAIN only (§4.5 doesn't require EXTERNAL/SCRAM downstream — there's
/// no client certificate to check credentials against at this layer).
fn handle_authenticate(state: &mut DownstreamState, server_name: &str, data: &str) -> Vec<Message> {
    if state.sasl_mechanism.is_none() {
        if !data.eq_ignore_ascii_case("PLAIN") {
            return vec![sasl_fail(server_name, "only PLAIN is supported")];
        }
        state.sasl_mechanism = Some("PLAIN".to_string());
        return vec![Message::from(Command::AUTHENTICATE("+".to_string()))];
    }

    if data == "*" {
        state.sasl_mechanism = None;
        state.sasl_buffer.clear();
        return vec![Message::from(Command::Response(
            Response::ERR_SASLABORT,
            vec!["*".to_string(), "SASL authentication aborted".to_string()],
        ))
        .with_prefix(Prefix::ServerName(server_name.to_string()))];
    }

    if data != "+" {
        state.sasl_buffer.push_str(data);
    }
    if state.sasl_buffer.len() > SASL_MAX_BUFFER {
        state.sasl_mechanism = None;
        state.sasl_buffer.clear();
        return vec![sasl_fail(server_name, "SASL response too large")];
    }
    if data.len() == 400 {
        // More chunks to come (§4.4's SASL_CHUNK_SIZE convention, mirrored
        // downstream).
        return vec![];
    }

    let buffer = std::mem::take(&mut state.sasl_buffer);
    state.sasl_mechanism = None;
    let decoded = match decode_base64(&buffer) {
        Ok(bytes) => bytes,
        Err(_) => return vec![sasl_fail(server_name, "invalid base64")],
    };
    let mut parts = decoded.split(|&b| b == 0);
    let _authzid = parts.next();
    let Some(authcid) = parts.next() else {
        return vec![sasl_fail(server_name, "malformed SASL PLAIN response")];
    };
    let Some(password) = parts.next() else {
        return vec![sasl_fail(server_name, "malformed SASL PLAIN response")];
    };
    let (Ok(authcid), Ok(password)) = (std::str::from_utf8(authcid), std::str::from_utf8(password)) else {
        return vec![sasl_fail(server_name, "SASL PLAIN response is not UTF-8")];
    };

    let (username, network) = parse_identity(authcid);
    state.sasl_authenticated = Some((username, network));
    state.pass = Some(password.to_string());
    vec![Message::from(Command::Response(
        Response::RPL_SASLSUCCESS,
        vec!["*".to_string(), "SASL authentication successful".to_string()],
    ))
    .with_prefix(Prefix::ServerName(server_name.to_string()))]
}

fn sasl_fail(server_name: &str, reason: &str) -> Message {
    Message::from(Command::Response(
        Response::ERR_SASLFAIL,
        vec!["*".to_string(), reason.to_string()],
    ))
    .with_prefix(Prefix::ServerName(server_name.to_string()))
}

fn error_notice(server_name: &str, reason: &str) -> Message {
    Message::notice("*", reason).with_prefix(Prefix::ServerName(server_name.to_string()))
}

/// RPL_WELCOME through RPL_ISUPPORT; MOTD is intentionally skipped (ERR_NOMOTD)
/// since bouncer-level MOTD has no counterpart in the spec.
fn welcome_burst(server_name: &str, nick: &str) -> Vec<Message> {
    let prefix = || Prefix::ServerName(server_name.to_string());
    let isupport_lines = IsupportBuilder::new()
        .network("soju-rs")
        .chantypes("#")
        .prefix("@%+", "ohv")
        .casemapping("rfc1459")
        .max_channels(120)
        .build_lines(12);

    let mut out = vec![
        Message::from(Command::Response(
            Response::RPL_WELCOME,
            vec![nick.to_string(), format!("Welcome to soju-rs, {nick}")],
        ))
        .with_prefix(prefix()),
        Message::from(Command::Response(
            Response::RPL_YOURHOST,
            vec![nick.to_string(), format!("Your host is {server_name}, running soju-rs")],
        ))
        .with_prefix(prefix()),
        Message::from(Command::Response(
            Response::RPL_CREATED,
            vec![nick.to_string(), "This bouncer has always been running".to_string()],
        ))
        .with_prefix(prefix()),
        Message::from(Command::Response(
            Response::RPL_MYINFO,
            vec![nick.to_string(), server_name.to_string(), "soju-rs".to_string()],
        ))
        .with_prefix(prefix()),
    ];

    for line in isupport_lines {
        let mut params: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        params.insert(0, nick.to_string());
        params.push("are supported by this server".to_string());
        out.push(Message::from(Command::Response(Response::RPL_ISUPPORT, params)).with_prefix(prefix()));
    }

    out.push(Response::err_nomotd(nick).with_prefix(prefix()));
    out
}

/// Relays traffic once attached: client-to-hub via `HubHandle::from_downstream`,
/// hub-to-client by writing straight to the socket, with a PING watchdog in
/// between (§5 — idle-tolerant reads, ping-timeout enforced).
async fn steady_state(
    transport: &mut Transport,
    id: u64,
    mut from_hub: tokio::sync::mpsc::Receiver<Message>,
    hub: &HubHandle,
    server_name: &str,
    state: &DownstreamState,
) {
    let mut awaiting_pong = false;
    loop {
        tokio::select! {
            read = tokio::time::timeout(PING_INTERVAL, transport.read_message()) => {
                match read {
                    Err(_) if awaiting_pong => {
                        info!("downstream ping timeout");
                        return;
                    }
                    Err(_) => {
                        awaiting_pong = true;
                        if send(transport, Message::ping(server_name)).await.is_err() {
                            return;
                        }
                    }
                    Ok(Ok(None)) => return,
                    Ok(Err(_)) => return,
                    Ok(Ok(Some(msg))) => {
                        awaiting_pong = false;
                        if !handle_from_client(transport, hub, id, server_name, state, msg).await {
                            return;
                        }
                    }
                }
            }

            event = from_hub.recv() => {
                match event {
                    None => return,
                    Some(msg) => {
                        if send(transport, msg).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Returns `false` when the connection should close (client QUIT or a write
/// failure while answering locally).
async fn handle_from_client(
    transport: &mut Transport,
    hub: &HubHandle,
    id: u64,
    server_name: &str,
    state: &DownstreamState,
    msg: Message,
) -> bool {
    match &msg.command {
        Command::QUIT(_) => false,
        Command::PING(token, _) => send(transport, Message::pong_with_token(server_name, token.clone())).await.is_ok(),
        Command::PONG(..) => true,
        Command::CAP(..) => true,
        Command::AUTHENTICATE(..) | Command::PASS(..) => true,
        _ => {
            let label = msg.label().map(str::to_string);
            let has_label_cap = state.has_cap("labeled-response");
            let forwardable = strip_label(msg);
            hub.from_downstream(id, forwardable).await;
            if let Some(label) = label {
                let ack = labels::wrap(server_name, Some(&label), has_label_cap, vec![]);
                return send_all(transport, ack).await.is_ok();
            }
            true
        }
    }
}

fn strip_label(mut msg: Message) -> Message {
    if let Some(tags) = &mut msg.tags {
        tags.retain(|t| t.0.as_ref() != "label");
        if tags.is_empty() {
            msg.tags = None;
        }
    }
    msg
}

async fn send(transport: &mut Transport, msg: Message) -> Result<(), DownstreamError> {
    transport
        .write_message(&msg)
        .await
        .map_err(|e| DownstreamError::Io(std::io::Error::other(e.to_string())))
}

async fn send_all(transport: &mut Transport, msgs: Vec<Message>) -> Result<(), DownstreamError> {
    for msg in msgs {
        send(transport, msg).await?;
    }
    Ok(())
}
