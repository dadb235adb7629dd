//! Per-port accept loop
//!
//! One task per listening port. The port's cipher template is built lazily from
//! the current method and the port's password when the first client arrives,
//! then cloned into every connection task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::ServerContext;
use crate::connection::handle_connection;
use crate::crypto::Cipher;
use crate::Result;

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Control handle for a running accept loop
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: u64,
    stop_tx: broadcast::Sender<()>,
    closed_rx: watch::Receiver<bool>,
}

impl ListenerHandle {
    /// Unique id, distinguishes successive listeners on the same port
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the accept loop has exited and released the socket
    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Stop accepting and wait until the listening socket is closed.
    /// Connections already accepted keep running.
    pub async fn close(&self) {
        let _ = self.stop_tx.send(());
        let mut closed_rx = self.closed_rx.clone();
        let _ = closed_rx.wait_for(|closed| *closed).await;
    }

    /// A handle with no accept loop behind it
    #[cfg(test)]
    pub(crate) fn detached(id: u64) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        let (_, closed_rx) = watch::channel(true);
        Self {
            id,
            stop_tx,
            closed_rx,
        }
    }
}

/// Start the accept loop for an already bound `listener`
pub(crate) fn spawn(
    listener: TcpListener,
    port: u16,
    password: String,
    id: u64,
    ctx: Arc<ServerContext>,
) -> Result<ListenerHandle> {
    let local_addr = listener.local_addr()?;
    let (stop_tx, stop_rx) = broadcast::channel(1);
    let (closed_tx, closed_rx) = watch::channel(false);

    tokio::spawn(accept_loop(
        listener, local_addr, port, password, ctx, stop_rx, closed_tx,
    ));

    Ok(ListenerHandle {
        id,
        stop_tx,
        closed_rx,
    })
}

async fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    port: u16,
    password: String,
    ctx: Arc<ServerContext>,
    mut stop_rx: broadcast::Receiver<()>,
    closed_tx: watch::Sender<bool>,
) {
    info!(port = port, "server listening on {}", local_addr);
    let mut cipher: Option<Cipher> = None;

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                info!(port = port, "closing listener");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(port = port, "accept error: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                if cipher.is_none() {
                    let method = ctx.config().method.clone();
                    match Cipher::new(&method, &password) {
                        Ok(template) => {
                            debug!(port = port, "creating cipher for port {}", port);
                            cipher = Some(template);
                        }
                        Err(e) => {
                            warn!(port = port, peer = %peer, "error generating cipher: {}", e);
                            continue;
                        }
                    }
                }

                let Some(template) = cipher.clone() else {
                    continue;
                };
                tokio::spawn(handle_connection(stream, peer, template, Arc::clone(&ctx)));
            }
        }
    }

    drop(listener);
    closed_tx.send_replace(true);
}
