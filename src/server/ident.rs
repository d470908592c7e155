//! Ident (RFC 1413) responder listener (§6 `ident://`).
//!
//! This bouncer has no registry mapping a listener's local/peer port pair
//! back to the username that owns that downstream connection, so every
//! well-formed query gets a protocol-correct `NO-USER` error rather than a
//! fabricated answer. A real mapping would need the accept loop to thread
//! the negotiated username back out of `downstream::spawn`, which today
//! only reports success/failure via logs (see DESIGN.md).

use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run(listener: TcpListener, addr: SocketAddr, cancel: CancellationToken) {
    info!(%addr, "ident listener started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve(stream, peer));
                }
                Err(e) => warn!(error = %e, "ident accept failed"),
            },
        }
    }
    info!(%addr, "ident listener stopped");
}

async fn serve(stream: TcpStream, peer: SocketAddr) {
    let _ = peer;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    if reader.read_line(&mut line).await.is_err() {
        return;
    }
    let query = line.trim();
    if query.is_empty() {
        return;
    }
    let reply = format!("{query} : ERROR : NO-USER\r\n");
    let _ = write_half.write_all(reply.as_bytes()).await;
    let _ = write_half.shutdown().await;
}
