//! The hub's single-task run loop (§4.6, §5): one `NetworkRuntime` per
//! upstream, one `DownstreamRuntime` per attached client, serialized through
//! one inbox so no two handlers ever race on the live view.

use super::{
    detach::{self, FilterKind},
    state::NetworkView,
    AttachError, AttachRequest, AttachScope, Attached, HubMessage, QUEUE_DEPTH,
};
use crate::db::models::{Channel, MessageFilter, Network, User};
use crate::db::Store;
use crate::upstream::{self, UpstreamEvent, UpstreamHandle, UpstreamPhase};
use slirc_proto::{Command, Message, Prefix, Tag};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

const BOUNCERSERV_NICK: &str = "BouncerServ";

/// Live state for one of the user's networks: the upstream handle, the
/// canonical view C6 keeps (§4.6), and the persisted channel rows that drive
/// the detachment policy.
pub struct NetworkRuntime {
    pub network: Network,
    handle: UpstreamHandle,
    view: NetworkView,
    channels: Vec<Channel>,
    phase: UpstreamPhase,
    last_downstream_activity: Instant,
}

impl NetworkRuntime {
    pub fn start(network: Network, channels: Vec<Channel>, hub_tx: mpsc::Sender<HubMessage>) -> Self {
        let network_id = network.id;
        let (handle, mut events) = upstream::spawn(network.user_id, network.clone(), channels.clone());

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if hub_tx.send(HubMessage::FromUpstream { network_id, event }).await.is_err() {
                    break;
                }
            }
        });

        NetworkRuntime {
            network,
            handle,
            view: NetworkView::default(),
            channels,
            phase: UpstreamPhase::Disconnected,
            last_downstream_activity: Instant::now(),
        }
    }

    fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        let key = self.view.casemap.to_lower(name);
        self.channels.iter_mut().find(|c| self.view.casemap.to_lower(&c.name) == key)
    }
}

/// One attached client. The hub never reads from its socket directly — C5
/// owns that — it only ever writes fully-formed `Message`s into `to_client`.
struct DownstreamRuntime {
    scope: AttachScope,
    to_client: mpsc::Sender<Message>,
}

pub struct HubState {
    user: User,
    store: Store,
    quit_message: String,
    networks: HashMap<i64, NetworkRuntime>,
    downstreams: HashMap<u64, DownstreamRuntime>,
    next_downstream_id: u64,
    /// Clone of the hub's own inbox sender, handed to newly started
    /// `NetworkRuntime`s (e.g. from `network add`) so their upstream-event
    /// forwarder task can feed back into this same loop.
    inbox: mpsc::Sender<HubMessage>,
}

impl HubState {
    pub fn new(
        user: User,
        store: Store,
        quit_message: String,
        networks: HashMap<i64, NetworkRuntime>,
        inbox: mpsc::Sender<HubMessage>,
    ) -> Self {
        HubState {
            user,
            store,
            quit_message,
            networks,
            downstreams: HashMap::new(),
            next_downstream_id: 1,
            inbox,
        }
    }

    fn find_network_id(&self, name: &str) -> Option<i64> {
        self.networks
            .values()
            .find(|rt| rt.network.name.as_deref() == Some(name))
            .map(|rt| rt.network.id)
    }
}

pub async fn run(mut state: HubState, mut inbox: mpsc::Receiver<HubMessage>) {
    while let Some(msg) = inbox.recv().await {
        match msg {
            HubMessage::Attach { req, reply } => {
                let result = handle_attach(&mut state, req).await;
                let _ = reply.send(result);
            }
            HubMessage::Detach { id } => {
                state.downstreams.remove(&id);
            }
            HubMessage::FromDownstream { id, msg } => {
                handle_from_downstream(&mut state, id, msg).await;
            }
            HubMessage::FromUpstream { network_id, event } => {
                handle_upstream_event(&mut state, network_id, event).await;
            }
            HubMessage::Shutdown => {
                let quit = state.quit_message.clone();
                for rt in state.networks.values() {
                    rt.handle.send(Message::from(Command::QUIT(Some(quit.clone())))).await;
                    rt.handle.stop().await;
                }
                break;
            }
        }
    }
    info!(user = %state.user.username, "hub shut down");
}

async fn handle_attach(state: &mut HubState, req: AttachRequest) -> Result<Attached, AttachError> {
    if let AttachScope::Network(name) = &req.scope {
        if state.find_network_id(name).is_none() {
            return Err(AttachError::UnknownNetwork(name.clone()));
        }
    }

    let id = state.next_downstream_id;
    state.next_downstream_id += 1;
    let (to_client, from_hub) = mpsc::channel(QUEUE_DEPTH);

    // Initial state sync (§4.5): synthesize JOIN + TOPIC for every channel
    // the relevant network view(s) currently consider joined and attached.
    // NAMES/353 replay is intentionally not synthesized (documented
    // simplification — see DESIGN.md).
    let targets: Vec<i64> = match &req.scope {
        AttachScope::Network(name) => state.find_network_id(name).into_iter().collect(),
        AttachScope::AllNetworksPrefixed => state.networks.keys().copied().collect(),
    };

    for network_id in &targets {
        let Some(rt) = state.networks.get_mut(network_id) else { continue };
        rt.last_downstream_activity = Instant::now();
        let prefix = match &req.scope {
            AttachScope::AllNetworksPrefixed => {
                rt.network.name.clone().unwrap_or_else(|| rt.network.addr.clone())
            }
            AttachScope::Network(_) => String::new(),
        };
        let channel_keys: Vec<String> = rt.view.channels.keys().cloned().collect();
        for channel_key in &channel_keys {
            if rt
                .channels
                .iter()
                .any(|c| rt.view.casemap.to_lower(&c.name) == *channel_key && c.detached)
            {
                continue;
            }
            for sync_msg in channel_sync_messages(rt, channel_key, &prefix) {
                let _ = to_client.send(sync_msg).await;
            }
        }
    }

    state.downstreams.insert(id, DownstreamRuntime { scope: req.scope, to_client });
    Ok(Attached { id, from_hub })
}

/// Splits a multi-upstream `<network>/<name>` channel reference into
/// `(network_name, bare_name)`, or `None` when there's no `/` (single
/// network already implied, or the target isn't scoped).
fn split_network_prefix(target: &str) -> Option<(&str, &str)> {
    target.split_once('/')
}

fn route_name(prefix: &str, bare: &str) -> String {
    if prefix.is_empty() {
        bare.to_string()
    } else {
        format!("{prefix}/{bare}")
    }
}

async fn handle_from_downstream(state: &mut HubState, id: u64, msg: Message) {
    let Some(downstream) = state.downstreams.get(&id) else { return };

    if is_to_bounceserv(&msg) {
        let line = match &msg.command {
            Command::PRIVMSG(_, text) => text.clone(),
            _ => return,
        };
        let reply_lines = execute_bouncerserv(state, &line).await;
        let Some(downstream) = state.downstreams.get(&id) else { return };
        for line in reply_lines {
            let notice = Message {
                tags: None,
                prefix: Some(Prefix::new(BOUNCERSERV_NICK, BOUNCERSERV_NICK, "soju-rs")),
                command: Command::NOTICE(BOUNCERSERV_NICK.to_string(), line),
            };
            let _ = downstream.to_client.send(notice).await;
        }
        return;
    }

    let scope = downstream.scope.clone();
    match scope {
        AttachScope::Network(name) => {
            if let Some(network_id) = state.find_network_id(&name) {
                if let Command::JOIN(channel, _, _) = &msg.command {
                    if handle_downstream_join(state, id, network_id, channel, "").await {
                        return;
                    }
                }
                if let Some(rt) = state.networks.get_mut(&network_id) {
                    rt.last_downstream_activity = Instant::now();
                    rt.handle.send(msg).await;
                }
            }
        }
        AttachScope::AllNetworksPrefixed => {
            let Some((network_name, bare)) = target_of(&msg).and_then(split_network_prefix) else {
                warn!("multi-upstream message with no network prefix, dropping");
                return;
            };
            let Some(network_id) = state.find_network_id(network_name) else { return };
            if matches!(&msg.command, Command::JOIN(_, _, _))
                && handle_downstream_join(state, id, network_id, bare, network_name).await
            {
                return;
            }
            let rewritten = retarget(&msg, bare);
            if let Some(rt) = state.networks.get_mut(&network_id) {
                rt.last_downstream_activity = Instant::now();
                rt.handle.send(rewritten).await;
            }
        }
    }
}

/// §4.5: a client JOIN of a store-detached channel clears the detach flag
/// (persisting it) rather than forwarding verbatim. Detaching never parts
/// upstream, so if the hub is still joined there the client is re-synced
/// from the live view with no upstream JOIN traffic; otherwise the caller
/// goes on to forward the JOIN upstream as usual. Returns true once this
/// JOIN has been fully handled and should not be forwarded upstream.
async fn handle_downstream_join(
    state: &mut HubState,
    downstream_id: u64,
    network_id: i64,
    channel: &str,
    prefix: &str,
) -> bool {
    let chan_id;
    let chan_clone;
    let already_joined;
    {
        let Some(rt) = state.networks.get_mut(&network_id) else { return false };
        let Some(chan) = rt.channel_mut(channel) else { return false };
        if !chan.detached {
            return false;
        }
        chan.detached = false;
        chan_id = chan.id;
        chan_clone = chan.clone();
        already_joined = rt.view.is_joined(channel);
    }

    match state.store.store_channel(network_id, chan_clone).await {
        Ok(_) => info!(channel_id = chan_id, "channel reattached by client JOIN"),
        Err(err) => warn!(%err, channel_id = chan_id, "failed to persist client reattach"),
    }

    if !already_joined {
        return false;
    }

    let Some(rt) = state.networks.get(&network_id) else { return true };
    let key = rt.view.casemap.to_lower(channel);
    let sync = channel_sync_messages(rt, &key, prefix);
    if let Some(downstream) = state.downstreams.get(&downstream_id) {
        for sync_msg in sync {
            let _ = downstream.to_client.send(sync_msg).await;
        }
    }
    true
}

fn is_to_bounceserv(msg: &Message) -> bool {
    matches!(&msg.command, Command::PRIVMSG(target, _) if target.eq_ignore_ascii_case(BOUNCERSERV_NICK))
}

fn target_of(msg: &Message) -> Option<&str> {
    match &msg.command {
        Command::PRIVMSG(target, _) | Command::NOTICE(target, _) => Some(target),
        Command::JOIN(target, _, _) | Command::PART(target, _) | Command::TOPIC(target, _) => {
            Some(target)
        }
        _ => None,
    }
}

fn retarget(msg: &Message, bare: &str) -> Message {
    let command = match &msg.command {
        Command::PRIVMSG(_, text) => Command::PRIVMSG(bare.to_string(), text.clone()),
        Command::NOTICE(_, text) => Command::NOTICE(bare.to_string(), text.clone()),
        Command::JOIN(_, key, real) => Command::JOIN(bare.to_string(), key.clone(), real.clone()),
        Command::PART(_, reason) => Command::PART(bare.to_string(), reason.clone()),
        Command::TOPIC(_, topic) => Command::TOPIC(bare.to_string(), topic.clone()),
        other => other.clone(),
    };
    Message { tags: msg.tags.clone(), prefix: msg.prefix.clone(), command }
}

async fn handle_upstream_event(state: &mut HubState, network_id: i64, event: UpstreamEvent) {
    let Some(rt) = state.networks.get_mut(&network_id) else { return };

    match event {
        UpstreamEvent::StateChange { phase, error } => {
            rt.phase = phase;
            if let Some(error) = error {
                warn!(network = %rt.network.addr, %error, "upstream state change");
            }
        }
        UpstreamEvent::Message(msg) => {
            rt.view.apply(&msg);
            // A channel is only ever attached or detached when a message
            // arrives, never both in the same tick, so only one of the two
            // transitions is evaluated per message.
            if channel_detached(state, network_id, &msg) {
                evaluate_reattachment(state, network_id, &msg).await;
            } else {
                evaluate_detachment(state, network_id, &msg).await;
            }
            relay_to_downstreams(state, network_id, &msg).await;
        }
    }
}

/// Whether the message's target channel is currently flagged detached.
fn channel_detached(state: &HubState, network_id: i64, msg: &Message) -> bool {
    let Some(target) = target_of(msg) else { return false };
    let Some(rt) = state.networks.get(&network_id) else { return false };
    let key = rt.view.casemap.to_lower(target);
    rt.channels.iter().any(|c| rt.view.casemap.to_lower(&c.name) == key && c.detached)
}

/// §4.6: once a channel is attached and live, qualifying upstream traffic
/// (matching `DetachOn`) arriving after `DetachAfter` has elapsed since the
/// last downstream activity on this network auto-detaches that channel.
/// Detaching never parts upstream — only the attached downstreams are told,
/// via a synthesized PART, so their client-visible JOIN set matches reality.
async fn evaluate_detachment(state: &mut HubState, network_id: i64, msg: &Message) {
    let Some(target) = target_of(msg).map(str::to_string) else { return };
    let Some(rt) = state.networks.get_mut(&network_id) else { return };
    if rt.channels.is_empty() {
        return;
    }
    let casemap = rt.view.casemap;
    let nick = rt.view.nick.clone();
    let idle_since = rt.last_downstream_activity;
    let now = Instant::now();

    let Some(chan) = rt.channel_mut(&target) else { return };
    if chan.detached || chan.detach_after == Duration::ZERO {
        return;
    }
    let filter = detach::resolve(chan.detach_on, FilterKind::DetachOn);
    if !detach::matches(filter, msg, &nick, casemap) {
        return;
    }
    if now.duration_since(idle_since) < chan.detach_after {
        return;
    }

    chan.detached = true;
    let chan_id = chan.id;
    let chan_clone = chan.clone();
    match state.store.store_channel(network_id, chan_clone).await {
        Ok(_) => info!(channel_id = chan_id, "auto-detached channel"),
        Err(err) => warn!(%err, channel_id = chan_id, "failed to persist auto-detach"),
    }

    let part = Message {
        tags: None,
        prefix: Some(Prefix::new(nick.as_str(), nick.as_str(), "soju-rs")),
        command: Command::PART(target.clone(), None),
    };
    dispatch_to_downstreams(state, network_id, &part).await;
}

/// §4.6: while a channel is detached, upstream traffic matching
/// `ReattachOn` transitions it back to attached and replays JOIN + TOPIC
/// state sync to every downstream attached to this network.
async fn evaluate_reattachment(state: &mut HubState, network_id: i64, msg: &Message) {
    let Some(target) = target_of(msg).map(str::to_string) else { return };
    let Some(rt) = state.networks.get_mut(&network_id) else { return };
    let casemap = rt.view.casemap;
    let nick = rt.view.nick.clone();

    let Some(chan) = rt.channel_mut(&target) else { return };
    if !chan.detached {
        return;
    }
    let filter = detach::resolve(chan.reattach_on, FilterKind::ReattachOn);
    if !detach::matches(filter, msg, &nick, casemap) {
        return;
    }

    chan.detached = false;
    let chan_id = chan.id;
    let chan_clone = chan.clone();
    match state.store.store_channel(network_id, chan_clone).await {
        Ok(_) => info!(channel_id = chan_id, "reattached channel"),
        Err(err) => warn!(%err, channel_id = chan_id, "failed to persist reattach"),
    }

    let channel_key = casemap.to_lower(&target);
    send_channel_sync(state, network_id, &channel_key).await;
}

/// Builds the JOIN (+ TOPIC, if known) that synthesizes one channel's live
/// state for a downstream, routed under `prefix` (empty for single-network
/// scope, the network name for `AllNetworksPrefixed`).
fn channel_sync_messages(rt: &NetworkRuntime, channel_key: &str, prefix: &str) -> Vec<Message> {
    let Some(ch_state) = rt.view.channels.get(channel_key) else { return Vec::new() };
    let routed = route_name(prefix, channel_key);
    let mut out = vec![Message {
        tags: None,
        prefix: Some(Prefix::new(rt.view.nick.as_str(), rt.view.nick.as_str(), "soju-rs")),
        command: Command::JOIN(routed.clone(), None, None),
    }];
    if let Some(topic) = &ch_state.topic {
        out.push(Message::from(Command::TOPIC(routed, Some(topic.clone()))));
    }
    out
}

/// Sends `channel_key`'s JOIN + TOPIC sync to every downstream whose scope
/// includes `network_id` (used on reattach, both auto and client-initiated).
async fn send_channel_sync(state: &HubState, network_id: i64, channel_key: &str) {
    let Some(rt) = state.networks.get(&network_id) else { return };
    let network_name = rt.network.name.clone().unwrap_or_else(|| rt.network.addr.clone());
    for downstream in state.downstreams.values() {
        let prefix: &str = match &downstream.scope {
            AttachScope::Network(name) if *name == network_name => "",
            AttachScope::Network(_) => continue,
            AttachScope::AllNetworksPrefixed => network_name.as_str(),
        };
        for sync_msg in channel_sync_messages(rt, channel_key, prefix) {
            let _ = downstream.to_client.send(sync_msg).await;
        }
    }
}

/// Sends one message, as-is, to every downstream whose scope includes
/// `network_id`, retargeting to `<network>/<channel>` for downstreams
/// attached under `AllNetworksPrefixed`.
async fn dispatch_to_downstreams(state: &HubState, network_id: i64, msg: &Message) {
    let Some(rt) = state.networks.get(&network_id) else { return };
    let network_name = rt.network.name.clone().unwrap_or_else(|| rt.network.addr.clone());
    for downstream in state.downstreams.values() {
        let outgoing = match &downstream.scope {
            AttachScope::Network(name) if *name == network_name => msg.clone(),
            AttachScope::Network(_) => continue,
            AttachScope::AllNetworksPrefixed => match target_of(msg) {
                Some(bare) => retarget(msg, &route_name(&network_name, bare)),
                None => msg.clone(),
            },
        };
        let _ = downstream.to_client.send(outgoing).await;
    }
}

async fn relay_to_downstreams(state: &mut HubState, network_id: i64, msg: &Message) {
    let Some(rt) = state.networks.get(&network_id) else { return };
    let network_name = rt.network.name.clone().unwrap_or_else(|| rt.network.addr.clone());
    let detached_chan = target_of(msg).and_then(|t| {
        let key = rt.view.casemap.to_lower(t);
        rt.channels.iter().find(|c| rt.view.casemap.to_lower(&c.name) == key && c.detached)
    });

    // §4.6 bullet 3: while detached, only RelayDetached-matching traffic
    // still reaches downstreams, tagged `batch=soju.im/detached`; the rest
    // is suppressed.
    let outgoing = if let Some(chan) = detached_chan {
        let filter = detach::resolve(chan.relay_detached, FilterKind::RelayDetached);
        if !detach::matches(filter, msg, &rt.view.nick, rt.view.casemap) {
            return;
        }
        let mut tagged = msg.clone();
        let mut tags = tagged.tags.take().unwrap_or_default();
        tags.push(Tag::new("batch", Some("soju.im/detached".to_string())));
        tagged.tags = Some(tags);
        tagged
    } else {
        msg.clone()
    };

    for downstream in state.downstreams.values() {
        let sent = match &downstream.scope {
            AttachScope::Network(name) if *name == network_name => outgoing.clone(),
            AttachScope::Network(_) => continue,
            AttachScope::AllNetworksPrefixed => match target_of(&outgoing) {
                Some(bare) => retarget(&outgoing, &route_name(&network_name, bare)),
                None => outgoing.clone(),
            },
        };
        let _ = downstream.to_client.send(sent).await;
    }
}

/// Executes one BouncerServ line and returns the reply as one NOTICE per
/// line. All mutating subcommands go through the store and re-derive C4
/// state rather than mutating live state directly (§4.5).
async fn execute_bouncerserv(state: &mut HubState, line: &str) -> Vec<String> {
    use super::bouncerserv::{parse, Command as BsCommand, ParseError};

    let command = match parse(line) {
        Ok(c) => c,
        Err(ParseError::Empty) => return vec![],
        Err(ParseError::UnknownVerb(v)) => return vec![format!("unknown command {v:?}")],
        Err(ParseError::MissingArgument { verb, what }) => {
            return vec![format!("{verb}: missing {what}")]
        }
    };

    match command {
        BsCommand::Help(verb) => vec![super::bouncerserv::help_text(verb.as_deref())],
        BsCommand::Status => status_lines(state),
        BsCommand::NetworkList => network_list_lines(state),
        BsCommand::NetworkAdd { name, addr } => add_network(state, name, addr).await,
        BsCommand::NetworkEdit { name, field, value } => edit_network(state, name, field, value).await,
        BsCommand::NetworkDelete { name } => delete_network(state, name).await,
        BsCommand::ChannelUpdate { network, channel, field, value } => {
            update_channel(state, network, channel, field, value).await
        }
        BsCommand::UserAdd { username, password } => add_user(state, username, password).await,
        BsCommand::UserDelete { username } => delete_user(state, username).await,
    }
}

fn status_lines(state: &HubState) -> Vec<String> {
    state
        .networks
        .values()
        .map(|rt| {
            let name = rt.network.name.clone().unwrap_or_else(|| rt.network.addr.clone());
            format!("{name}: {:?}, {} channel(s)", rt.phase, rt.channels.len())
        })
        .collect()
}

fn network_list_lines(state: &HubState) -> Vec<String> {
    if state.networks.is_empty() {
        return vec!["no networks configured".to_string()];
    }
    state
        .networks
        .values()
        .map(|rt| {
            let name = rt.network.name.clone().unwrap_or_else(|| "(unnamed)".to_string());
            format!("{name}: {}", rt.network.addr)
        })
        .collect()
}

async fn add_network(state: &mut HubState, name: String, addr: String) -> Vec<String> {
    let network = Network {
        id: 0,
        user_id: state.user.id,
        name: Some(name.clone()),
        addr,
        nick: state.user.username.clone(),
        username: state.user.username.clone(),
        realname: state.user.username.clone(),
        pass: None,
        connect_commands: vec![],
        sasl: Default::default(),
    };
    match state.store.store_network(state.user.id, network).await {
        Ok(stored) => {
            let network_id = stored.id;
            let runtime = NetworkRuntime::start(stored, vec![], state.inbox.clone());
            state.networks.insert(network_id, runtime);
            vec![format!("network {name} added")]
        }
        Err(err) => vec![format!("failed to add network: {err}")],
    }
}

async fn edit_network(state: &mut HubState, name: String, field: String, value: String) -> Vec<String> {
    let Some(network_id) = state.find_network_id(&name) else {
        return vec![format!("no such network {name:?}")];
    };
    let Some(rt) = state.networks.get_mut(&network_id) else {
        return vec![format!("no such network {name:?}")];
    };
    let mut updated = rt.network.clone();
    match field.as_str() {
        "addr" => updated.addr = value,
        "nick" => updated.nick = value,
        "username" => updated.username = value,
        "realname" => updated.realname = value,
        "pass" => updated.pass = if value.is_empty() { None } else { Some(value) },
        other => return vec![format!("unknown field {other:?}")],
    }
    match state.store.store_network(state.user.id, updated).await {
        Ok(stored) => {
            state.networks.get_mut(&network_id).unwrap().network = stored.clone();
            state.networks.get_mut(&network_id).unwrap().handle.reload(stored).await;
            vec![format!("network {name} updated")]
        }
        Err(err) => vec![format!("failed to update network: {err}")],
    }
}

async fn delete_network(state: &mut HubState, name: String) -> Vec<String> {
    let Some(network_id) = state.find_network_id(&name) else {
        return vec![format!("no such network {name:?}")];
    };
    if let Some(rt) = state.networks.remove(&network_id) {
        rt.handle.stop().await;
    }
    match state.store.delete_network(network_id).await {
        Ok(()) => vec![format!("network {name} deleted")],
        Err(err) => vec![format!("failed to delete network: {err}")],
    }
}

async fn update_channel(
    state: &mut HubState,
    network: String,
    channel: String,
    field: String,
    value: String,
) -> Vec<String> {
    let Some(network_id) = state.find_network_id(&network) else {
        return vec![format!("no such network {network:?}")];
    };
    let Some(rt) = state.networks.get_mut(&network_id) else {
        return vec![format!("no such network {network:?}")];
    };
    let Some(chan) = rt.channel_mut(&channel).cloned() else {
        return vec![format!("no such channel {channel:?}")];
    };
    let mut updated = chan;
    match field.as_str() {
        "key" => updated.key = if value.is_empty() { None } else { Some(value) },
        "detach-on" => updated.detach_on = MessageFilter::parse(&value),
        "reattach-on" => updated.reattach_on = MessageFilter::parse(&value),
        "relay-detached" => updated.relay_detached = MessageFilter::parse(&value),
        "detach-after" => {
            let Ok(secs) = value.parse::<u64>() else {
                return vec!["detach-after must be a whole number of seconds".to_string()];
            };
            updated.detach_after = Duration::from_secs(secs);
        }
        other => return vec![format!("unknown field {other:?}")],
    }
    match state.store.store_channel(network_id, updated.clone()).await {
        Ok(stored) => {
            if let Some(slot) = rt.channels.iter_mut().find(|c| c.id == stored.id) {
                *slot = stored;
            }
            vec![format!("{network}/{channel} updated")]
        }
        Err(err) => vec![format!("failed to update channel: {err}")],
    }
}

async fn add_user(state: &mut HubState, username: String, password: String) -> Vec<String> {
    if !state.user.admin {
        return vec!["permission denied: admin only".to_string()];
    }
    let hash = match crate::security::password::hash_password(password).await {
        Ok(h) => h,
        Err(err) => return vec![format!("failed to hash password: {err}")],
    };
    let user = User { id: 0, username: username.clone(), password_hash: Some(hash), admin: false };
    match state.store.store_user(user).await {
        Ok(_) => vec![format!("user {username} added")],
        Err(err) => vec![format!("failed to add user: {err}")],
    }
}

async fn delete_user(state: &mut HubState, username: String) -> Vec<String> {
    if !state.user.admin {
        return vec!["permission denied: admin only".to_string()];
    }
    match state.store.get_user(&username).await {
        Ok(Some(user)) => match state.store.delete_user(user.id).await {
            Ok(()) => vec![format!("user {username} deleted")],
            Err(err) => vec![format!("failed to delete user: {err}")],
        },
        Ok(None) => vec![format!("no such user {username:?}")],
        Err(err) => vec![format!("failed to look up user: {err}")],
    }
}
