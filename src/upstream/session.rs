//! Upstream session task (C4, §4.4): dial, register, relay, and reconnect
//! for one (user, network) pair.

use super::backoff::Backoff;
use super::registration::{batch_joins, diff_channels, negotiate_caps};
use super::state::{LiveUpstreamState, UpstreamPhase};
use super::{UpstreamCommand, UpstreamEvent};
use crate::db::models::{Channel, Network, SaslCredential};
use crate::error::UpstreamError;
use slirc_proto::sasl::{chunk_response, encode_external, encode_plain};
use slirc_proto::{Command, Isupport, Message, Response, Transport};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Used for JOIN batching before ISUPPORT has told us anything better; real
/// servers rarely advertise a max line length beyond the 512-byte wire limit.
const JOIN_BATCH_LEN: usize = 400;
const FALLBACK_PING_TIMEOUT: Duration = Duration::from_secs(300);

/// Drives the full dial → register → relay → reconnect lifecycle until
/// `Stop` is received or the cancellation token fires.
pub async fn run(
    user_id: i64,
    mut network: Network,
    mut persisted_channels: Vec<Channel>,
    mut commands: mpsc::Receiver<UpstreamCommand>,
    events: mpsc::Sender<UpstreamEvent>,
    cancel: CancellationToken,
) {
    let _ = user_id;
    let mut backoff = Backoff::new();

    'reconnect: loop {
        if cancel.is_cancelled() {
            break;
        }

        emit(&events, UpstreamPhase::Dialing, None).await;
        let transport = tokio::select! {
            _ = cancel.cancelled() => break,
            result = dial(&network) => result,
        };

        let mut transport = match transport {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "upstream dial failed");
                emit(&events, UpstreamPhase::Disconnected, Some(e.to_string())).await;
                if !wait_for_retry(&mut backoff, &mut commands, &cancel).await {
                    break;
                }
                continue;
            }
        };

        emit(&events, UpstreamPhase::Registering, None).await;
        let mut state = LiveUpstreamState {
            nick: network.nick.clone(),
            ..Default::default()
        };

        let ping_timeout = match register(&mut transport, &network, &mut state).await {
            Ok(timeout) => timeout,
            Err(e) => {
                warn!(error = %e, "upstream registration failed");
                emit(&events, UpstreamPhase::Disconnected, Some(e.to_string())).await;
                if !wait_for_retry(&mut backoff, &mut commands, &cancel).await {
                    break;
                }
                continue;
            }
        };

        for cmd in &network.connect_commands {
            if let Ok(msg) = cmd.parse::<Message>() {
                let _ = transport.write_message(&msg).await;
            }
        }

        let desired: HashSet<String> = persisted_channels
            .iter()
            .filter(|c| !c.detached)
            .map(|c| c.name.clone())
            .collect();
        for batch in batch_joins(&desired.into_iter().collect::<Vec<_>>(), JOIN_BATCH_LEN) {
            let _ = transport
                .write_message(&Message::from(Command::JOIN(batch, None, None)))
                .await;
        }

        backoff.mark_connected(Instant::now());
        emit(&events, UpstreamPhase::Connected, None).await;
        info!("upstream connected");

        let outcome = steady_state(
            &mut transport,
            &mut state,
            &mut network,
            &mut persisted_channels,
            &mut commands,
            &events,
            &cancel,
            ping_timeout,
        )
        .await;

        backoff.mark_disconnected(Instant::now());

        match outcome {
            SteadyStateExit::Stopped => {
                let _ = transport
                    .write_message(&Message::from(Command::QUIT(Some(
                        "Bouncer shutting down".to_string(),
                    ))))
                    .await;
                emit(&events, UpstreamPhase::Closing, None).await;
                break 'reconnect;
            }
            SteadyStateExit::Reload => continue 'reconnect,
            SteadyStateExit::Error(e) => {
                warn!(error = %e, "upstream disconnected");
                emit(&events, UpstreamPhase::Disconnected, Some(e.to_string())).await;
                if !wait_for_retry(&mut backoff, &mut commands, &cancel).await {
                    break;
                }
            }
        }
    }

    emit(&events, UpstreamPhase::Disconnected, None).await;
}

async fn emit(events: &mpsc::Sender<UpstreamEvent>, phase: UpstreamPhase, error: Option<String>) {
    let _ = events.send(UpstreamEvent::StateChange { phase, error }).await;
}

/// Waits out the backoff delay, but returns early (and signals the command
/// should stop) if `Stop` arrives or the cancellation token fires first.
/// Returns `false` when the caller should stop retrying.
async fn wait_for_retry(
    backoff: &mut Backoff,
    commands: &mut mpsc::Receiver<UpstreamCommand>,
    cancel: &CancellationToken,
) -> bool {
    let delay = backoff.next_delay();
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
        cmd = commands.recv() => !matches!(cmd, Some(UpstreamCommand::Stop) | None),
    }
}

async fn dial(network: &Network) -> Result<Transport, UpstreamError> {
    let host_port = network.host_port();
    let tcp = TcpStream::connect(host_port)
        .await
        .map_err(UpstreamError::Disconnected)?;

    if !network.wants_tls() {
        return Transport::tcp(tcp).map_err(|e| UpstreamError::Tls(e.to_string()));
    }

    let host = host_port.rsplit_once(':').map(|(h, _)| h).unwrap_or(host_port);
    let config = tls_client_config(network)?;
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(host)
        .map_err(|e| UpstreamError::Tls(e.to_string()))?
        .to_owned();
    let tls_stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| UpstreamError::Tls(e.to_string()))?;
    Transport::client_tls(tls_stream).map_err(|e| UpstreamError::Tls(e.to_string()))
}

fn tls_client_config(network: &Network) -> Result<ClientConfig, UpstreamError> {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for cert in loaded.certs {
        if let Err(e) = roots.add(cert) {
            warn!(error = %e, "failed to add a native root certificate");
        }
    }
    for e in &loaded.errors {
        warn!(error = %e, "error loading native certs");
    }

    let builder = ClientConfig::builder().with_root_certificates(roots);

    match &network.sasl {
        SaslCredential::External { cert_der, key_der } => {
            let cert = CertificateDer::from(cert_der.clone());
            let key = PrivateKeyDer::try_from(key_der.clone())
                .map_err(|e| UpstreamError::Tls(e.to_string()))?;
            builder
                .with_client_auth_cert(vec![cert], key)
                .map_err(|e| UpstreamError::Tls(e.to_string()))
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

/// Runs the registration sequence (§4.4 steps 1-5) and returns the
/// ping-timeout to apply once connected.
async fn register(
    transport: &mut Transport,
    network: &Network,
    state: &mut LiveUpstreamState,
) -> Result<Duration, UpstreamError> {
    send(
        transport,
        Command::CAP(None, slirc_proto::CapSubCommand::LS, Some("302".to_string()), None),
    )
    .await?;

    // "CAP * LS * :caps..." (more to come) vs "CAP * LS :caps..." (final
    // line): the cap list lands in whichever of the two trailing fields is
    // populated, and a literal "*" in the other marks a continuation.
    let mut advertised = HashSet::new();
    loop {
        let msg = read_or_timeout(transport).await?;
        match &msg.command {
            Command::CAP(_, slirc_proto::CapSubCommand::LS, param2, param3) => {
                let (more, list) = match param3 {
                    Some(list) => (param2.as_deref() == Some("*"), Some(list)),
                    None => (false, param2.as_ref()),
                };
                if let Some(list) = list {
                    advertised.extend(list.split_whitespace().map(|c| {
                        c.split_once('=').map(|(name, _)| name).unwrap_or(c).to_string()
                    }));
                }
                if !more {
                    break;
                }
            }
            Command::ERROR(reason) => return Err(UpstreamError::Disconnected(io_error(reason))),
            _ => continue,
        }
    }
    let negotiated = negotiate_caps(&advertised);

    if !negotiated.is_empty() {
        send(
            transport,
            Command::CAP(None, slirc_proto::CapSubCommand::REQ, None, Some(negotiated.join(" "))),
        )
        .await?;

        loop {
            let msg = read_or_timeout(transport).await?;
            match &msg.command {
                Command::CAP(_, slirc_proto::CapSubCommand::ACK, _, _) => break,
                Command::CAP(_, slirc_proto::CapSubCommand::NAK, param2, param3) => {
                    let caps = param3.as_ref().or(param2.as_ref());
                    return Err(UpstreamError::AuthFailed(format!(
                        "server rejected capability request: {:?}",
                        caps
                    )));
                }
                _ => continue,
            }
        }
    }

    if negotiated.iter().any(|c| c == "sasl") && !matches!(network.sasl, SaslCredential::None) {
        authenticate(transport, network).await?;
    }

    send(transport, Command::CAP(None, slirc_proto::CapSubCommand::END, None, None)).await?;

    if let Some(pass) = &network.pass {
        send(transport, Command::PASS(pass.clone())).await?;
    }
    send(transport, Command::NICK(network.nick.clone())).await?;
    send(
        transport,
        Command::USER(network.username.clone(), "0".to_string(), network.realname.clone()),
    )
    .await?;

    loop {
        let msg = read_or_timeout(transport).await?;
        match &msg.command {
            Command::Response(Response::RPL_WELCOME, _) => {
                state.nick = network.nick.clone();
                break;
            }
            Command::Response(Response::RPL_ISUPPORT, _) => {
                if let Some(isupport) = Isupport::from_message(&msg) {
                    state.isupport.ingest(&isupport);
                }
            }
            Command::Response(Response::ERR_NICKNAMEINUSE, _) => {
                return Err(UpstreamError::RegistrationTimeout);
            }
            Command::PING(server, _) => {
                let _ = transport
                    .write_message(&Message::from(Command::PONG(server.clone(), None)))
                    .await;
            }
            _ => {}
        }
    }

    // No IRCv3 token standardizes a server-advertised ping interval; the
    // fallback from §4.4 is what every upstream gets until one is observed.
    Ok(FALLBACK_PING_TIMEOUT)
}

async fn authenticate(transport: &mut Transport, network: &Network) -> Result<(), UpstreamError> {
    let mechanism = match &network.sasl {
        SaslCredential::Plain { .. } => "PLAIN",
        SaslCredential::External { .. } => "EXTERNAL",
        SaslCredential::None => return Ok(()),
    };

    send(transport, Command::AUTHENTICATE(mechanism.to_string())).await?;

    let msg = read_or_timeout(transport).await?;
    if !matches!(&msg.command, Command::AUTHENTICATE(s) if s == "+") {
        return Err(UpstreamError::AuthFailed(
            "server did not request SASL credentials".to_string(),
        ));
    }

    let encoded = match &network.sasl {
        SaslCredential::Plain { username, password } => encode_plain(username, password),
        SaslCredential::External { .. } => encode_external(),
        SaslCredential::None => unreachable!(),
    };

    let mut chunks: Vec<&str> = chunk_response(&encoded).collect();
    if chunks.is_empty() {
        chunks.push("+");
    }
    for chunk in &chunks {
        send(transport, Command::AUTHENTICATE(chunk.to_string())).await?;
    }
    if encoded.len() % 400 == 0 {
        send(transport, Command::AUTHENTICATE("+".to_string())).await?;
    }

    loop {
        let msg = read_or_timeout(transport).await?;
        match &msg.command {
            Command::Response(Response::RPL_SASLSUCCESS, _) => return Ok(()),
            Command::Response(Response::ERR_SASLFAIL, _)
            | Command::Response(Response::ERR_SASLTOOLONG, _)
            | Command::Response(Response::ERR_SASLABORT, _) => {
                return Err(UpstreamError::AuthFailed(msg.command.to_string()));
            }
            _ => continue,
        }
    }
}

async fn read_or_timeout(transport: &mut Transport) -> Result<Message, UpstreamError> {
    match tokio::time::timeout(Duration::from_secs(30), transport.read_message()).await {
        Ok(Ok(Some(msg))) => Ok(msg),
        Ok(Ok(None)) => Err(UpstreamError::Disconnected(io_error("connection closed"))),
        Ok(Err(e)) => Err(UpstreamError::Disconnected(io_error(&e.to_string()))),
        Err(_) => Err(UpstreamError::RegistrationTimeout),
    }
}

fn io_error(msg: &str) -> std::io::Error {
    std::io::Error::other(msg.to_string())
}

/// `Transport::write_message` returns an `anyhow::Result`; this narrows that
/// back to `UpstreamError::Disconnected`'s `std::io::Error` source.
async fn send(transport: &mut Transport, command: Command) -> Result<(), UpstreamError> {
    transport
        .write_message(&Message::from(command))
        .await
        .map_err(|e| UpstreamError::Disconnected(io_error(&e.to_string())))
}

enum SteadyStateExit {
    Stopped,
    Reload,
    Error(UpstreamError),
}

/// Relays traffic once registered, until the connection drops, `Stop` is
/// requested, or a `Reload` forces a reconnect (§4.4 final paragraph, §5).
#[allow(clippy::too_many_arguments)]
async fn steady_state(
    transport: &mut Transport,
    state: &mut LiveUpstreamState,
    network: &mut Network,
    persisted_channels: &mut Vec<Channel>,
    commands: &mut mpsc::Receiver<UpstreamCommand>,
    events: &mpsc::Sender<UpstreamEvent>,
    cancel: &CancellationToken,
    ping_timeout: Duration,
) -> SteadyStateExit {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return SteadyStateExit::Stopped,

            read = tokio::time::timeout(ping_timeout, transport.read_message()) => {
                match read {
                    Err(_) => return SteadyStateExit::Error(UpstreamError::PingTimeout(ping_timeout)),
                    Ok(Err(e)) => return SteadyStateExit::Error(UpstreamError::Disconnected(io_error(&e.to_string()))),
                    Ok(Ok(None)) => return SteadyStateExit::Error(UpstreamError::Disconnected(io_error("connection closed"))),
                    Ok(Ok(Some(msg))) => {
                        if handle_inbound(transport, state, &msg).await {
                            continue;
                        }
                        let _ = events.send(UpstreamEvent::Message(msg)).await;
                    }
                }
            }

            cmd = commands.recv() => {
                match cmd {
                    None | Some(UpstreamCommand::Stop) => return SteadyStateExit::Stopped,
                    Some(UpstreamCommand::Send(msg)) => {
                        let _ = transport.write_message(&msg).await;
                    }
                    Some(UpstreamCommand::Reload(new_network)) => {
                        if super::registration::network_needs_reconnect(network, &new_network) {
                            *network = new_network;
                            return SteadyStateExit::Reload;
                        }
                        *network = new_network;
                        let desired: HashSet<String> = persisted_channels
                            .iter()
                            .filter(|c| !c.detached)
                            .map(|c| c.name.clone())
                            .collect();
                        let live: HashSet<String> = state.channels.keys().cloned().collect();
                        let (join, part) = diff_channels(&desired, &live);
                        for batch in batch_joins(&join, JOIN_BATCH_LEN) {
                            let _ = transport.write_message(&Message::from(Command::JOIN(batch, None, None))).await;
                        }
                        for channel in part {
                            let _ = transport.write_message(&Message::from(Command::PART(channel, None))).await;
                        }
                    }
                }
            }
        }
    }
}

/// Updates local membership/topic bookkeeping. Returns `true` if the message
/// was fully consumed locally (PING) and should not be forwarded to the hub.
async fn handle_inbound(transport: &mut Transport, state: &mut LiveUpstreamState, msg: &Message) -> bool {
    match &msg.command {
        Command::PING(server, _) => {
            let _ = transport
                .write_message(&Message::from(Command::PONG(server.clone(), None)))
                .await;
            true
        }
        Command::JOIN(channel, _, _) => {
            let nick = msg.source_nickname().unwrap_or_default().to_string();
            let key = state.isupport.casemapping.to_lower(channel);
            let entry = state.channels.entry(key).or_default();
            if state.isupport.casemapping.eq(&nick, &state.nick) {
                entry.last_activity = Some(Instant::now());
            }
            entry.members.entry(nick).or_default();
            false
        }
        Command::PART(channel, _) => {
            let nick = msg.source_nickname().unwrap_or_default().to_string();
            let key = state.isupport.casemapping.to_lower(channel);
            if state.isupport.casemapping.eq(&nick, &state.nick) {
                state.channels.remove(&key);
            } else if let Some(entry) = state.channels.get_mut(&key) {
                entry.members.remove(&nick);
            }
            false
        }
        Command::QUIT(_) => {
            let nick = msg.source_nickname().unwrap_or_default().to_string();
            for entry in state.channels.values_mut() {
                entry.members.remove(&nick);
            }
            false
        }
        Command::NICK(new_nick) => {
            let old_nick = msg.source_nickname().unwrap_or_default().to_string();
            if state.isupport.casemapping.eq(&old_nick, &state.nick) {
                state.nick = new_nick.clone();
            }
            for entry in state.channels.values_mut() {
                if let Some(modes) = entry.members.remove(&old_nick) {
                    entry.members.insert(new_nick.clone(), modes);
                }
            }
            false
        }
        Command::Response(Response::RPL_TOPIC, params) => {
            if let [_, channel, topic] = params.as_slice() {
                let key = state.isupport.casemapping.to_lower(channel);
                state.channels.entry(key).or_default().topic = Some(topic.clone());
            }
            false
        }
        Command::TOPIC(channel, topic) => {
            let key = state.isupport.casemapping.to_lower(channel);
            state.channels.entry(key).or_default().topic = topic.clone();
            false
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_retry_stops_on_explicit_stop_command() {
        let mut backoff = Backoff::new();
        backoff.next_delay();
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        tx.send(UpstreamCommand::Stop).await.unwrap();
        assert!(!wait_for_retry(&mut backoff, &mut rx, &cancel).await);
    }

    #[tokio::test]
    async fn wait_for_retry_stops_on_cancellation() {
        let mut backoff = Backoff::new();
        let (_tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!wait_for_retry(&mut backoff, &mut rx, &cancel).await);
    }
}
