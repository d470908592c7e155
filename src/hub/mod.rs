//! User hub (C6, §4.6): aggregates one user's upstreams and downstreams,
//! applies the detachment policy, and owns BouncerServ.

mod actor;
mod bouncerserv;
mod detach;
mod state;

use crate::db::models::User;
use crate::db::Store;
use slirc_proto::Message;
use std::collections::HashSet;
use tokio::sync::{mpsc, oneshot};

/// Depth of the bounded downstream fan-out and hub inbox queues (§5).
const QUEUE_DEPTH: usize = 256;

/// A downstream's registration-time capability set, passed to the hub so it
/// can decide what to synthesize (tags, batches) on the way out — though the
/// actual tag filtering/echo/labeled-response bookkeeping lives in C5; the
/// hub only needs this to decide initial state-sync shape.
#[derive(Debug, Clone, Default)]
pub struct DownstreamCaps {
    pub negotiated: HashSet<String>,
}

/// What a downstream is attached to: one network (per-network attach, or
/// single-upstream mode) or every network with `<network>/<name>` channel
/// prefixing (multi-upstream, no network suffix).
#[derive(Debug, Clone)]
pub enum AttachScope {
    Network(String),
    AllNetworksPrefixed,
}

pub struct AttachRequest {
    pub scope: AttachScope,
    pub caps: DownstreamCaps,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    UnknownNetwork(String),
}

pub struct Attached {
    pub id: u64,
    /// Fully-formed messages the downstream should write to its socket.
    pub from_hub: mpsc::Receiver<Message>,
}

enum HubMessage {
    Attach {
        req: AttachRequest,
        reply: oneshot::Sender<Result<Attached, AttachError>>,
    },
    Detach {
        id: u64,
    },
    FromDownstream {
        id: u64,
        msg: Message,
    },
    FromUpstream {
        network_id: i64,
        event: crate::upstream::UpstreamEvent,
    },
    Shutdown,
}

/// Handle to a running hub task, cloned into every downstream and upstream
/// forwarder that needs to talk to it.
#[derive(Clone)]
pub struct HubHandle {
    inbox: mpsc::Sender<HubMessage>,
}

impl HubHandle {
    pub async fn attach(&self, req: AttachRequest) -> Option<Result<Attached, AttachError>> {
        let (reply, rx) = oneshot::channel();
        self.inbox.send(HubMessage::Attach { req, reply }).await.ok()?;
        rx.await.ok()
    }

    pub async fn detach(&self, id: u64) {
        let _ = self.inbox.send(HubMessage::Detach { id }).await;
    }

    pub async fn from_downstream(&self, id: u64, msg: Message) {
        let _ = self.inbox.send(HubMessage::FromDownstream { id, msg }).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.inbox.send(HubMessage::Shutdown).await;
    }
}

/// Loads `user`'s networks and channels from `store`, starts one upstream
/// session per network, and spawns the hub task.
pub async fn spawn(
    user: User,
    store: Store,
    quit_message: String,
) -> Result<HubHandle, crate::error::StoreError> {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let handle = HubHandle { inbox: tx.clone() };

    let networks = store.list_networks(user.id).await?;
    let mut runtimes = std::collections::HashMap::new();
    for network in networks {
        let channels = store.list_channels(network.id).await?;
        let runtime = actor::NetworkRuntime::start(network, channels, tx.clone());
        runtimes.insert(runtime.network.id, runtime);
    }

    let state = actor::HubState::new(user, store, quit_message, runtimes, tx);
    tokio::spawn(actor::run(state, rx));

    Ok(handle)
}
