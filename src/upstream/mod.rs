//! Upstream session (C4, §4.4): one task per (user, network) pair, dialing
//! out, registering, relaying traffic to the hub, and reconnecting.

mod backoff;
mod registration;
mod session;
mod state;

pub use state::{CaseMap, ChannelState, IsupportState, LiveUpstreamState, UpstreamPhase};

use crate::db::models::{Channel, Network};
use slirc_proto::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Depth of the bounded command/event queues (§5).
const QUEUE_DEPTH: usize = 256;

/// Commands the hub sends down to a running upstream session.
#[derive(Debug)]
pub enum UpstreamCommand {
    /// Relay a message verbatim to the upstream server.
    Send(Message),
    /// Apply an edited `Network` record: a live diff if possible, otherwise
    /// forces a reconnect (§4.4 final paragraph).
    Reload(Network),
    /// Disconnect cleanly and end the task.
    Stop,
}

/// Events an upstream session reports back up to the hub.
#[derive(Debug)]
pub enum UpstreamEvent {
    /// A message received from (or, for PING/PONG, synthesized by) the
    /// upstream connection, to be fanned out to attached downstreams.
    Message(Message),
    /// A lifecycle transition, surfaced so the hub can update BouncerServ
    /// STATUS output and decide whether to relay a detach notice.
    StateChange {
        phase: UpstreamPhase,
        error: Option<String>,
    },
}

/// A handle to a running upstream session task.
#[derive(Debug, Clone)]
pub struct UpstreamHandle {
    commands: mpsc::Sender<UpstreamCommand>,
    cancel: CancellationToken,
}

impl UpstreamHandle {
    /// Queue a message to be relayed upstream. Drops it silently if the
    /// session's command queue is full or the task has already exited
    /// (matches the bounded-queue backpressure policy in §5 — a stalled
    /// upstream should not block the hub).
    pub async fn send(&self, message: Message) {
        let _ = self.commands.send(UpstreamCommand::Send(message)).await;
    }

    pub async fn reload(&self, network: Network) {
        let _ = self.commands.send(UpstreamCommand::Reload(network)).await;
    }

    /// Request a clean shutdown and cancel the task if it doesn't respond.
    pub async fn stop(&self) {
        let _ = self.commands.send(UpstreamCommand::Stop).await;
        self.cancel.cancel();
    }
}

/// Spawns the session task and returns a handle plus the event stream it
/// will publish to.
pub fn spawn(
    user_id: i64,
    network: Network,
    persisted_channels: Vec<Channel>,
) -> (UpstreamHandle, mpsc::Receiver<UpstreamEvent>) {
    let (command_tx, command_rx) = mpsc::channel(QUEUE_DEPTH);
    let (event_tx, event_rx) = mpsc::channel(QUEUE_DEPTH);
    let cancel = CancellationToken::new();

    let span = tracing::info_span!("upstream", user_id, network = %network.addr);
    tokio::spawn(
        session::run(user_id, network, persisted_channels, command_rx, event_tx, cancel.clone())
            .instrument(span),
    );

    (
        UpstreamHandle {
            commands: command_tx,
            cancel,
        },
        event_rx,
    )
}
