//! Configuration File Watcher
//!
//! Turns modifications of the configuration file into reload requests, the same
//! requests SIGHUP produces. Parsing and applying stay with the reload
//! coordinator so both triggers share one path.

use crate::server::ReloadTrigger;
use crate::Result;
use anyhow::{bail, Context};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Configuration file watcher
pub struct ConfigWatcher {
    config_path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `config_path`, sending a trigger on every change
    pub fn new(config_path: PathBuf, reload_tx: mpsc::Sender<ReloadTrigger>) -> Result<Self> {
        let path_clone = config_path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => Self::handle_file_event(event, &path_clone, &reload_tx),
                Err(e) => error!("File watcher error: {}", e),
            },
            NotifyConfig::default(),
        )
        .context("Failed to create file watcher")?;

        // Watch the directory, editors often replace the file instead of writing it
        let parent_dir = match config_path.parent() {
            Some(dir) if dir.as_os_str().is_empty() => Path::new("."),
            Some(dir) => dir,
            None => bail!(
                "Configuration file has no parent directory: {}",
                config_path.display()
            ),
        };
        watcher
            .watch(parent_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", parent_dir.display()))?;

        info!(
            "Started watching configuration directory: {}",
            parent_dir.display()
        );

        Ok(Self {
            config_path,
            _watcher: watcher,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Handle file system events
    fn handle_file_event(event: Event, config_path: &Path, reload_tx: &mpsc::Sender<ReloadTrigger>) {
        debug!("File event: {:?}", event);

        let affects_config = event
            .paths
            .iter()
            .any(|path| path.file_name() == config_path.file_name());

        if !affects_config {
            return;
        }

        match event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => {
                info!("Configuration file changed, requesting reload");
                match reload_tx.try_send(ReloadTrigger::FileChanged) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!("Reload already pending, skipping duplicate request");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        warn!("Reload coordinator is gone, ignoring file change");
                    }
                }
            }
            EventKind::Remove(_) => {
                warn!("Configuration file was removed: {}", config_path.display());
            }
            _ => {
                debug!("Ignoring file event type: {:?}", event.kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_file_change_sends_trigger() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, r#"{"server_port": 8388, "password": "a"}"#).unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let watcher = ConfigWatcher::new(config_path.clone(), tx).unwrap();
        assert_eq!(watcher.config_path(), config_path.as_path());

        fs::write(&config_path, r#"{"server_port": 8388, "password": "b"}"#).unwrap();

        let trigger = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no reload request within timeout");
        assert_eq!(trigger, Some(ReloadTrigger::FileChanged));
    }

    #[tokio::test]
    async fn test_other_files_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, "{}").unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let _watcher = ConfigWatcher::new(config_path, tx).unwrap();

        fs::write(temp_dir.path().join("unrelated.txt"), "noise").unwrap();
        assert!(timeout(Duration::from_millis(500), rx.recv()).await.is_err());
    }
}
