//! Process Signal Handling
//!
//! SIGHUP asks the reload coordinator to re-read the configuration; SIGTERM,
//! SIGINT and Ctrl+C end the wait so the binary can close its listeners.

use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::server::ReloadTrigger;
use crate::Result;

/// Listens for process signals and forwards reload requests
pub struct SignalListener {
    reload_tx: mpsc::Sender<ReloadTrigger>,
}

impl SignalListener {
    pub fn new(reload_tx: mpsc::Sender<ReloadTrigger>) -> Self {
        Self { reload_tx }
    }

    /// Block until a termination signal arrives, forwarding every SIGHUP as a
    /// reload request in the meantime
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        info!("Starting signal listener");

        #[cfg(unix)]
        {
            use signal::unix::{signal as unix_signal, SignalKind};

            let mut sighup = unix_signal(SignalKind::hangup())?;
            let mut sigterm = unix_signal(SignalKind::terminate())?;
            let mut sigint = unix_signal(SignalKind::interrupt())?;

            loop {
                tokio::select! {
                    _ = sighup.recv() => {
                        info!("Received SIGHUP, reloading configuration");
                        self.request_reload();
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                        return Ok(());
                    }
                    _ = sigint.recv() => {
                        info!("Received SIGINT, shutting down");
                        return Ok(());
                    }
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                        return Ok(());
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }

    fn request_reload(&self) {
        if let Err(e) = self.reload_tx.try_send(ReloadTrigger::Signal) {
            warn!("Could not queue reload request: {}", e);
        }
    }
}
