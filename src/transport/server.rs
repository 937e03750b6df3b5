//! TCP accept loop with graceful shutdown.

use crate::error::{constants, Result};
use crate::transport::registry::Registry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Run the accept loop until ctrl-c.
///
/// Convenience wrapper around [`serve_with_shutdown`] that wires the process
/// interrupt signal to the shutdown channel.
#[instrument(skip(listener, registry))]
pub async fn serve(listener: TcpListener, registry: Arc<Registry>) -> Result<()> {
    // Create internal shutdown channel
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    serve_with_shutdown(listener, registry, shutdown_rx).await
}

/// Run the accept loop with an external shutdown channel.
///
/// Per-connection failures (banned peer, server full, handshake-less drop)
/// are logged and contained; they never stop the loop. On shutdown, every
/// live connection is disconnected with a server-shutdown reason before the
/// loop returns.
#[instrument(skip(listener, registry, shutdown_rx))]
pub async fn serve_with_shutdown(
    listener: TcpListener,
    registry: Arc<Registry>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    info!(address = %listener.local_addr()?, "Listening for connections");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutting down server. Disconnecting clients...");
                let drained = tokio::time::timeout(
                    registry.config().server.shutdown_timeout,
                    registry.disconnect_all(constants::REASON_SERVER_SHUTDOWN),
                )
                .await;
                if drained.is_err() {
                    warn!("Shutdown timeout expired before every connection closed");
                }
                return Ok(());
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        match registry.accept(stream).await {
                            Ok(connection) => {
                                debug!(connection = %connection.id(), peer = %peer, "Connection handed to registry");
                            }
                            Err(e) => {
                                warn!(peer = %peer, error = %e, "Connection refused");
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }
}
