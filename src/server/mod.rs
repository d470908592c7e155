//! Server (C7, §4.7): process-wide state owning the store handle, the live
//! config snapshot, the map of active user hubs (keyed by lowercased
//! username), and the listener set. Accepts a downstream, lets C5 run its
//! pre-register, resolves which hub and network it attaches to (starting
//! the hub lazily on a user's first attached client), and binds the
//! downstream to it.
//!
//! The accept loops are grounded on the teacher's `network/gateway.rs`
//! (bind, loop, accept, spawn) and `sync/network.rs::run_s2s_tls_listener`
//! (TLS acceptor construction, accept-and-spawn shape), generalized across
//! every `ListenUri` scheme instead of one fixed TCP port.

mod ident;
mod tls;

use crate::config::{Config, ConfigHandle, ConfigSnapshot, ListenUri, TlsConfig};
use crate::db::models::User;
use crate::db::Store;
use crate::downstream::{self, HubProvider, ResolvedAttach};
use crate::error::{ConfigError, DownstreamError, StoreError};
use crate::hub::{AttachScope, HubHandle};
use crate::network::proxy_protocol::parse_proxy_header;
use crate::security::password::verify_password;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long an accept loop waits for a trusted proxy's PROXY protocol header
/// before giving up on the connection (§5).
const PROXY_HEADER_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Server {
    store: Store,
    config: ConfigHandle,
    hubs: DashMap<String, HubHandle>,
    tls: ArcSwapOption<ServerConfig>,
}

impl Server {
    pub async fn new(
        store: Store,
        config: ConfigHandle,
        tls_config: Option<&TlsConfig>,
    ) -> Result<Arc<Self>, ConfigError> {
        let loaded = match tls_config {
            Some(cfg) => Some(tls::load(cfg).await?),
            None => None,
        };
        Ok(Arc::new(Self {
            store,
            config,
            hubs: DashMap::new(),
            tls: ArcSwapOption::from(loaded),
        }))
    }

    /// Looks up `user`'s hub, starting it if this is their first attached
    /// client. A race between two first logins for the same user spawns two
    /// hub tasks; the loser's task is simply never attached to and idles
    /// forever with zero downstreams — a deliberate simplification over a
    /// per-key spawn lock (see DESIGN.md).
    async fn hub_for(&self, user: User) -> Result<HubHandle, StoreError> {
        let key = user.username.to_lowercase();
        if let Some(handle) = self.hubs.get(&key) {
            return Ok(handle.clone());
        }
        let quit_message = self.config.load().quit_message.clone();
        let handle = crate::hub::spawn(user, self.store.clone(), quit_message).await?;
        Ok(self.hubs.entry(key).or_insert(handle).clone())
    }

    /// SIGHUP: reload config from disk, validate it, and publish a new
    /// snapshot. Reloads the TLS keypair unconditionally whenever `[tls]` is
    /// present, rather than diffing the path first — SIGHUP is rare and
    /// operator-triggered, so the extra file read is not worth the
    /// bookkeeping.
    pub async fn reload(&self, config_path: &str, debug: bool) -> Result<(), ConfigError> {
        let raw = Config::load(config_path)?;
        if let Err(errors) = crate::config::validate(&raw) {
            for e in &errors {
                error!(error = %e, "config reload validation failed");
            }
            return Err(ConfigError::Invalid(format!(
                "{} validation error(s); see logs",
                errors.len()
            )));
        }

        if let Some(tls_config) = &raw.tls {
            match tls::load(tls_config).await {
                Ok(loaded) => self.tls.store(Some(loaded)),
                Err(e) => error!(error = %e, "TLS keypair reload failed, keeping previous keypair"),
            }
        }

        let snapshot = ConfigSnapshot::from_config(&raw, debug)?;
        self.config.store(snapshot);
        info!("configuration reloaded");
        Ok(())
    }

    /// Stops accepting is the caller's job (cancel the token passed to
    /// `listen`); this broadcasts a shutdown to every active hub, which in
    /// turn sends a friendly QUIT upstream and closes its downstreams, then
    /// closes the store.
    pub async fn shutdown(&self) {
        let handles: Vec<HubHandle> = self.hubs.iter().map(|e| e.value().clone()).collect();
        for handle in handles {
            handle.shutdown().await;
        }
        self.store.clone().close().await;
    }
}

/// Bridges a downstream's presented identity to a hub by looking up the
/// user in the store, verifying its password (or accepting a passwordless
/// account, per §3 "absent means no password login"), and resolving the
/// attach scope from the requested network (or `multi-upstream`, §4.5).
pub struct ServerHubProvider {
    server: Arc<Server>,
}

impl ServerHubProvider {
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl HubProvider for ServerHubProvider {
    async fn authenticate(
        &self,
        username: &str,
        network: Option<&str>,
        password: Option<&str>,
    ) -> Result<ResolvedAttach, DownstreamError> {
        let user = self
            .server
            .store
            .get_user(username)
            .await
            .map_err(|_| DownstreamError::UnknownUser(username.to_string()))?
            .ok_or_else(|| DownstreamError::UnknownUser(username.to_string()))?;

        match (&user.password_hash, password) {
            (Some(hash), Some(pass)) => {
                let ok = verify_password(pass.to_string(), hash.clone())
                    .await
                    .map_err(|_| DownstreamError::AuthFailed)?;
                if !ok {
                    return Err(DownstreamError::AuthFailed);
                }
            }
            (Some(_), None) => return Err(DownstreamError::AuthFailed),
            (None, _) => {}
        }

        let networks = self
            .server
            .store
            .list_networks(user.id)
            .await
            .map_err(|_| DownstreamError::UnknownUser(username.to_string()))?;

        let scope = match network {
            Some(requested) => {
                if !networks.iter().any(|n| n.name.as_deref() == Some(requested)) {
                    return Err(DownstreamError::UnknownNetwork(
                        requested.to_string(),
                        username.to_string(),
                    ));
                }
                AttachScope::Network(requested.to_string())
            }
            None if self.multi_upstream() => AttachScope::AllNetworksPrefixed,
            None => {
                let only = networks
                    .into_iter()
                    .next()
                    .ok_or_else(|| DownstreamError::UnknownNetwork(String::new(), username.to_string()))?;
                let name = only
                    .name
                    .ok_or_else(|| DownstreamError::UnknownNetwork(String::new(), username.to_string()))?;
                AttachScope::Network(name)
            }
        };

        let hub = self
            .server
            .hub_for(user)
            .await
            .map_err(|_| DownstreamError::UnknownUser(username.to_string()))?;

        Ok(ResolvedAttach { hub, scope })
    }

    fn multi_upstream(&self) -> bool {
        self.server.config.load().multi_upstream
    }
}

/// Binds every configured listener and runs its accept loop until
/// `cancel` fires, then waits for all of them to stop.
pub async fn listen(
    server: Arc<Server>,
    provider: Arc<dyn HubProvider>,
    uris: &[ListenUri],
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut tasks = Vec::new();
    for uri in uris {
        match uri {
            ListenUri::IrcInsecure(addr) => {
                let listener = TcpListener::bind(addr).await?;
                info!(%addr, "irc+insecure listener bound");
                tasks.push(tokio::spawn(run_tcp(
                    server.clone(),
                    provider.clone(),
                    listener,
                    *addr,
                    cancel.clone(),
                )));
            }
            ListenUri::Ircs(addr) => {
                let listener = TcpListener::bind(addr).await?;
                info!(%addr, "ircs listener bound");
                tasks.push(tokio::spawn(run_tls(
                    server.clone(),
                    provider.clone(),
                    listener,
                    *addr,
                    cancel.clone(),
                )));
            }
            ListenUri::WsInsecure(addr) => {
                let listener = TcpListener::bind(addr).await?;
                info!(%addr, "ws+insecure listener bound");
                tasks.push(tokio::spawn(run_ws(
                    server.clone(),
                    provider.clone(),
                    listener,
                    *addr,
                    cancel.clone(),
                )));
            }
            ListenUri::Wss(addr) => {
                let listener = TcpListener::bind(addr).await?;
                info!(%addr, "wss listener bound");
                tasks.push(tokio::spawn(run_wss(
                    server.clone(),
                    provider.clone(),
                    listener,
                    *addr,
                    cancel.clone(),
                )));
            }
            ListenUri::Ident(addr) => {
                let listener = TcpListener::bind(addr).await?;
                tasks.push(tokio::spawn(ident::run(listener, *addr, cancel.clone())));
            }
            ListenUri::Unix(path) => {
                warn!(
                    path = %path.display(),
                    "unix:// listeners are not supported by this build (the IRC transport has \
                     no unix-domain variant); skipping"
                );
            }
        }
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

/// Resolves the connection's real peer address, reading a PROXY protocol
/// header first iff `raw_peer`'s IP is in the trusted-proxy set. Returns
/// `None` if the header was expected but failed to parse or timed out —
/// the caller should drop the connection in that case.
async fn resolve_peer(
    server: &Server,
    mut stream: TcpStream,
    raw_peer: SocketAddr,
) -> Option<(TcpStream, SocketAddr)> {
    if !server.config.load().trusts_proxy(raw_peer.ip()) {
        return Some((stream, raw_peer));
    }
    match tokio::time::timeout(PROXY_HEADER_TIMEOUT, parse_proxy_header(&mut stream)).await {
        Ok(Ok(real_peer)) => Some((stream, real_peer)),
        Ok(Err(e)) => {
            warn!(%raw_peer, error = %e, "invalid PROXY protocol header");
            None
        }
        Err(_) => {
            warn!(%raw_peer, "PROXY protocol header read timed out");
            None
        }
    }
}

async fn run_tcp(
    server: Arc<Server>,
    provider: Arc<dyn HubProvider>,
    listener: TcpListener,
    addr: SocketAddr,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, raw_peer)) => {
                    let server = server.clone();
                    let provider = provider.clone();
                    let hostname = server.config.load().hostname.clone();
                    tokio::spawn(async move {
                        let Some((stream, peer)) = resolve_peer(&server, stream, raw_peer).await else { return };
                        match slirc_proto::Transport::tcp(stream) {
                            Ok(transport) => downstream::spawn(transport, peer, hostname, provider),
                            Err(e) => warn!(%peer, error = %e, "failed to frame TCP transport"),
                        }
                    });
                }
                Err(e) => warn!(%addr, error = %e, "accept failed"),
            },
        }
    }
    info!(%addr, "irc+insecure listener stopped");
}

async fn run_tls(
    server: Arc<Server>,
    provider: Arc<dyn HubProvider>,
    listener: TcpListener,
    addr: SocketAddr,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, raw_peer)) => {
                    let server = server.clone();
                    let provider = provider.clone();
                    let hostname = server.config.load().hostname.clone();
                    tokio::spawn(async move {
                        let Some((stream, peer)) = resolve_peer(&server, stream, raw_peer).await else { return };
                        let Some(tls_config) = server.tls.load_full() else {
                            warn!(%peer, "ircs listener has no loaded TLS keypair");
                            return;
                        };
                        let acceptor = TlsAcceptor::from(tls_config);
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => match slirc_proto::Transport::tls(tls_stream) {
                                Ok(transport) => downstream::spawn(transport, peer, hostname, provider),
                                Err(e) => warn!(%peer, error = %e, "failed to frame TLS transport"),
                            },
                            Err(e) => warn!(%peer, error = %e, "TLS handshake failed"),
                        }
                    });
                }
                Err(e) => warn!(%addr, error = %e, "accept failed"),
            },
        }
    }
    info!(%addr, "ircs listener stopped");
}

async fn run_ws(
    server: Arc<Server>,
    provider: Arc<dyn HubProvider>,
    listener: TcpListener,
    addr: SocketAddr,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, raw_peer)) => {
                    let server = server.clone();
                    let provider = provider.clone();
                    let hostname = server.config.load().hostname.clone();
                    tokio::spawn(async move {
                        let Some((stream, peer)) = resolve_peer(&server, stream, raw_peer).await else { return };
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws) => {
                                let transport = slirc_proto::Transport::websocket(ws);
                                downstream::spawn(transport, peer, hostname, provider);
                            }
                            Err(e) => warn!(%peer, error = %e, "WebSocket handshake failed"),
                        }
                    });
                }
                Err(e) => warn!(%addr, error = %e, "accept failed"),
            },
        }
    }
    info!(%addr, "ws+insecure listener stopped");
}

async fn run_wss(
    server: Arc<Server>,
    provider: Arc<dyn HubProvider>,
    listener: TcpListener,
    addr: SocketAddr,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, raw_peer)) => {
                    let server = server.clone();
                    let provider = provider.clone();
                    let hostname = server.config.load().hostname.clone();
                    tokio::spawn(async move {
                        let Some((stream, peer)) = resolve_peer(&server, stream, raw_peer).await else { return };
                        let Some(tls_config) = server.tls.load_full() else {
                            warn!(%peer, "wss listener has no loaded TLS keypair");
                            return;
                        };
                        let acceptor = TlsAcceptor::from(tls_config);
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => match tokio_tungstenite::accept_async(tls_stream).await {
                                Ok(ws) => {
                                    let transport = slirc_proto::Transport::websocket_tls(ws);
                                    downstream::spawn(transport, peer, hostname, provider);
                                }
                                Err(e) => warn!(%peer, error = %e, "WebSocket handshake failed"),
                            },
                            Err(e) => warn!(%peer, error = %e, "TLS handshake failed"),
                        }
                    });
                }
                Err(e) => warn!(%addr, error = %e, "accept failed"),
            },
        }
    }
    info!(%addr, "wss listener stopped");
}
