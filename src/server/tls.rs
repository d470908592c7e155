//! TLS keypair loading for downstream listeners. Grounded on
//! `sync/network.rs::run_s2s_tls_listener`'s cert/key loading (same
//! `rustls_pemfile` calls, same `ServerConfig::builder()` shape) minus the
//! mutual-TLS branch — downstream listeners never verify a client cert.

use crate::config::TlsConfig;
use crate::error::ConfigError;
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::io::Cursor;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;

/// Loads the cert chain and private key named by `tls` into a server TLS
/// config. Called at startup and again on every SIGHUP that changes the
/// keypair.
pub async fn load(tls: &TlsConfig) -> Result<Arc<ServerConfig>, ConfigError> {
    let missing = |field: &str, detail: String| ConfigError::MissingTlsMaterial(field.to_string(), detail);

    let cert_data = tokio::fs::read(&tls.cert_path)
        .await
        .map_err(|e| missing("cert-path", e.to_string()))?;
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut Cursor::new(&cert_data))
        .filter_map(|r| r.ok())
        .collect();
    if cert_chain.is_empty() {
        return Err(missing("cert-path", "no certificates found".to_string()));
    }

    let key_data = tokio::fs::read(&tls.key_path)
        .await
        .map_err(|e| missing("key-path", e.to_string()))?;
    let key: PrivateKeyDer<'static> = pkcs8_private_keys(&mut Cursor::new(&key_data))
        .filter_map(|r| r.ok())
        .map(PrivateKeyDer::Pkcs8)
        .next()
        .ok_or_else(|| missing("key-path", "no private key found".to_string()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| missing("cert-path", e.to_string()))?;

    Ok(Arc::new(config))
}
