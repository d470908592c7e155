//! Downstream session (C5, §4.5): owns one client connection end to end —
//! CAP negotiation, PASS/NICK/USER (+ optional SASL) registration, resolving
//! which hub and network it attaches to, and the steady-state relay once
//! registered.

mod labels;
mod session;
mod state;

pub use state::parse_identity;

use crate::error::DownstreamError;
use crate::hub::{AttachScope, HubHandle};
use async_trait::async_trait;
use slirc_proto::Transport;
use std::net::SocketAddr;
use std::sync::Arc;

/// What a downstream resolves to once its presented identity and password
/// (or SASL credential) have been validated.
pub struct ResolvedAttach {
    pub hub: HubHandle,
    pub scope: AttachScope,
}

/// Bridges C5 to the server-owned hub registry without C5 depending on its
/// concrete type. C7 implements this over its `user -> HubHandle` map.
#[async_trait]
pub trait HubProvider: Send + Sync {
    async fn authenticate(
        &self,
        username: &str,
        network: Option<&str>,
        password: Option<&str>,
    ) -> Result<ResolvedAttach, DownstreamError>;

    /// Whether `<user>/<network>` attach and `<network>/<name>` channel
    /// prefixing are enabled server-wide (§4.5, §6 `multi-upstream`).
    fn multi_upstream(&self) -> bool;
}

/// Spawns the per-connection task. `server_name` is used as the prefix on
/// every server-origin reply (numerics, CAP, BATCH, the labeled-response
/// ACK).
pub fn spawn(
    transport: Transport,
    peer: SocketAddr,
    server_name: String,
    provider: Arc<dyn HubProvider>,
) {
    tokio::spawn(async move {
        session::run(transport, peer, server_name, provider).await;
    });
}
