use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::draft_engine::DraftEngine;

use super::connection::handle_draft_connection;

/// Accept draft protocol connections and spawn a handler task for each.
/// Stops accepting when the cancellation token is triggered. Takes a bound
/// listener so callers (and tests) control the address.
pub async fn serve(listener: TcpListener, engine: Arc<DraftEngine>, cancel: CancellationToken) {
    match listener.local_addr() {
        Ok(addr) => info!("draft listener started on {addr}"),
        Err(_) => info!("draft listener started"),
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("draft listener shutting down");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let engine = engine.clone();
                        let peer = addr.to_string();
                        tokio::spawn(async move {
                            handle_draft_connection(stream, peer, engine).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept draft connection");
                    }
                }
            }
        }
    }
}
