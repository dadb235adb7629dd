//! Reload Coordinator
//!
//! Re-reads the configuration file and reconciles the running listeners with
//! it: every configured port gets `update_port_password`, every port that is no
//! longer configured is closed. Requests arrive over one channel and are
//! handled one at a time.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::context::{PortUpdate, ServerContext};
use crate::config::{Config, ConfigManager};
use crate::Result;

/// What asked for a reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTrigger {
    /// SIGHUP
    Signal,
    /// The configuration file changed on disk
    FileChanged,
}

/// Per-port outcome of one reload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub added: Vec<u16>,
    pub restarted: Vec<u16>,
    pub unchanged: Vec<u16>,
    pub removed: Vec<u16>,
    pub failed: Vec<u16>,
}

pub struct ReloadCoordinator {
    context: Arc<ServerContext>,
    config_path: PathBuf,
}

impl ReloadCoordinator {
    pub fn new(context: Arc<ServerContext>, config_path: PathBuf) -> Self {
        Self {
            context,
            config_path,
        }
    }

    /// Re-read the configuration file and apply it. A file that cannot be read,
    /// parsed or validated leaves everything as it was.
    pub async fn reload(&self) -> Result<ReloadSummary> {
        let config = ConfigManager::load_from_file(&self.config_path)
            .and_then(|config| config.validate().map(|_| config))
            .with_context(|| format!("error parsing config file {}", self.config_path.display()));

        let config = match config {
            Ok(config) => config,
            Err(e) => {
                error!("error reloading configuration, keeping current settings: {:#}", e);
                return Err(e);
            }
        };

        self.apply(config).await
    }

    /// Make the running listeners match `config`
    pub async fn apply(&self, config: Config) -> Result<ReloadSummary> {
        config.warn_ignored_fields();
        let wanted = config.port_passwords()?;
        let old = self.context.replace_config(config);

        let mut summary = ReloadSummary::default();
        for (port, password) in &wanted {
            match self
                .context
                .update_port_password(*port, password.clone())
                .await
            {
                Ok(PortUpdate::Added) => summary.added.push(*port),
                Ok(PortUpdate::Restarted) => summary.restarted.push(*port),
                Ok(PortUpdate::Unchanged) => summary.unchanged.push(*port),
                Err(e) => {
                    error!("error updating port {}: {:#}", port, e);
                    summary.failed.push(*port);
                }
            }
        }

        // Ports from the previous snapshot plus anything still registered, so a
        // port is dropped even if the old snapshot never listed it
        let mut stale: BTreeSet<u16> = old
            .port_passwords()
            .map(|ports| ports.into_keys().collect())
            .unwrap_or_default();
        stale.extend(self.context.passwords().ports());

        for port in stale.into_iter().filter(|port| !wanted.contains_key(port)) {
            if self.context.remove_port(port).await {
                summary.removed.push(port);
            }
        }

        info!(
            added = summary.added.len(),
            restarted = summary.restarted.len(),
            unchanged = summary.unchanged.len(),
            removed = summary.removed.len(),
            failed = summary.failed.len(),
            "configuration reloaded"
        );
        Ok(summary)
    }

    /// Serve reload requests until every sender is dropped
    pub async fn run(self, mut triggers: mpsc::Receiver<ReloadTrigger>) {
        while let Some(trigger) = triggers.recv().await {
            info!(trigger = ?trigger, "reloading configuration");
            let _ = self.reload().await;
        }
    }
}
