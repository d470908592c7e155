//! soju-rs - a user-friendly multi-user IRC bouncer.

mod config;
mod db;
mod downstream;
mod error;
mod hub;
mod network;
mod security;
mod server;
mod upstream;

use crate::config::{Config, ConfigHandle, ConfigSnapshot};
use crate::db::models::User;
use crate::db::Store;
use crate::security::password::hash_password;
use crate::server::{Server, ServerHubProvider};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

struct Cli {
    config_path: String,
    listen: Vec<String>,
    debug: bool,
}

/// Parses `--listen <uri>` (repeatable), `--config <path>`, `--debug` (§6).
fn parse_cli() -> Cli {
    let mut config_path = "soju.toml".to_string();
    let mut listen = Vec::new();
    let mut debug = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = args.next().unwrap_or_else(|| {
                    eprintln!("--config requires a path");
                    std::process::exit(1);
                });
            }
            "--listen" => {
                listen.push(args.next().unwrap_or_else(|| {
                    eprintln!("--listen requires a URI");
                    std::process::exit(1);
                }));
            }
            "--debug" => debug = true,
            other => {
                eprintln!("unrecognized argument: {other}");
                std::process::exit(1);
            }
        }
    }

    Cli { config_path, listen, debug }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_cli();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if cli.debug { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();

    let mut config = match Config::load(&cli.config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %cli.config_path, "failed to load config");
            return Err(e.into());
        }
    };
    config.listen.extend(cli.listen);

    if let Err(errors) = crate::config::validate(&config) {
        for e in &errors {
            error!(error = %e, "configuration validation failed");
        }
        return Err(anyhow::anyhow!(
            "configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    let listen_uris = config.listen_uris()?;
    let snapshot = ConfigSnapshot::from_config(&config, cli.debug)?;
    let hostname = snapshot.hostname.clone();
    let config_handle = ConfigHandle::new(snapshot);

    info!(hostname = %hostname, "starting soju-rs");

    // Initialize the persistence store
    let store_path = config.sql.source.clone().unwrap_or_else(|| "soju.db".to_string());
    let store = Store::open(&store_path).await?;

    // One-shot admin bootstrap (§2.2): consumed on first start when the
    // store has zero users.
    if let Some(bootstrap) = &config.bootstrap {
        if store.list_users().await?.is_empty() {
            let password_hash = hash_password(bootstrap.password.clone()).await?;
            store
                .store_user(User {
                    id: 0,
                    username: bootstrap.username.clone(),
                    password_hash: Some(password_hash),
                    admin: true,
                })
                .await?;
            info!(username = %bootstrap.username, "bootstrap admin account created");
        }
    }

    let server = Server::new(store, config_handle, config.tls.as_ref()).await?;
    let provider: Arc<dyn crate::downstream::HubProvider> =
        Arc::new(ServerHubProvider::new(server.clone()));

    let cancel = CancellationToken::new();

    // Signal handling (§6): SIGHUP reloads config + TLS, SIGINT/SIGTERM
    // trigger graceful shutdown.
    {
        let cancel = cancel.clone();
        let server = server.clone();
        let config_path = cli.config_path.clone();
        let debug = cli.debug;
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
            let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            loop {
                tokio::select! {
                    _ = sighup.recv() => {
                        if let Err(e) = server.reload(&config_path, debug).await {
                            error!(error = %e, "config reload failed");
                        }
                    }
                    _ = sigint.recv() => {
                        info!("received SIGINT, shutting down");
                        cancel.cancel();
                        break;
                    }
                    _ = sigterm.recv() => {
                        info!("received SIGTERM, shutting down");
                        cancel.cancel();
                        break;
                    }
                }
            }
        });
    }

    info!(listeners = listen_uris.len(), "listening");
    crate::server::listen(server.clone(), provider, &listen_uris, cancel).await?;

    info!("all listeners stopped, shutting down");
    server.shutdown().await;

    Ok(())
}
