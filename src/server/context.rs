//! Server Context
//!
//! The state every listener and connection shares: the current configuration
//! snapshot, the port registry and the connection counter. It is built once by
//! the binary (or a test) and passed around as an `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::listener::{self, ListenerHandle};
use super::passwords::{PasswordManager, PortListener};
use crate::config::Config;
use crate::connection::ConnectionCounter;
use crate::Result;

/// Outcome of a password update for one port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortUpdate {
    /// Same password, listener left alone
    Unchanged,
    /// Port was not registered, a listener was started
    Added,
    /// Old listener closed and a new one started with the new password
    Restarted,
}

#[derive(Debug)]
pub struct ServerContext {
    config: RwLock<Arc<Config>>,
    passwords: PasswordManager,
    connections: ConnectionCounter,
    next_listener_id: AtomicU64,
}

impl ServerContext {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config: RwLock::new(Arc::new(config)),
            passwords: PasswordManager::new(),
            connections: ConnectionCounter::new(),
            next_listener_id: AtomicU64::new(1),
        })
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<Config> {
        let guard = self.config.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Install a new snapshot, returning the one it replaced
    pub fn replace_config(&self, config: Config) -> Arc<Config> {
        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, Arc::new(config))
    }

    /// Port registry
    pub fn passwords(&self) -> &PasswordManager {
        &self.passwords
    }

    /// Active connection counter
    pub fn connections(&self) -> &ConnectionCounter {
        &self.connections
    }

    /// Bind every configured port. Any bind failure aborts startup.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let config = self.config();
        config.warn_ignored_fields();
        let ports = config.port_passwords()?;

        for (port, password) in ports {
            self.start_port(port, password).await?;
        }

        Ok(())
    }

    /// Bind `port` and start its accept loop, registering it under `password`
    pub async fn start_port(self: &Arc<Self>, port: u16, password: String) -> Result<ListenerHandle> {
        let config = self.config();
        let listener = TcpListener::bind((config.server.as_str(), port))
            .await
            .with_context(|| format!("error listening port {}", port))?;

        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let handle = listener::spawn(listener, port, password.clone(), id, Arc::clone(self))
            .with_context(|| format!("error starting listener on port {}", port))?;

        self.passwords.add(
            port,
            PortListener {
                password,
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }

    /// Hot-swap the password served on `port`.
    ///
    /// Connections accepted under the old password keep running; only the
    /// listening socket is replaced.
    pub async fn update_port_password(
        self: &Arc<Self>,
        port: u16,
        password: String,
    ) -> Result<PortUpdate> {
        let existing = match self.passwords.get(port) {
            None => {
                info!("new port {} added", port);
                self.start_port(port, password).await?;
                return Ok(PortUpdate::Added);
            }
            Some(existing) if existing.password == password => return Ok(PortUpdate::Unchanged),
            Some(existing) => existing,
        };

        warn!("closing port {} to update password", port);
        existing.handle.close().await;

        match self.start_port(port, password).await {
            Ok(_) => Ok(PortUpdate::Restarted),
            Err(e) => {
                // The old socket is gone, so its record must not linger
                self.passwords.remove_if_id(port, existing.handle.id());
                Err(e)
            }
        }
    }

    /// Stop serving `port`. Returns false if it was not registered.
    pub async fn remove_port(&self, port: u16) -> bool {
        match self.passwords.remove(port) {
            Some(record) => {
                info!("closing port {}", port);
                record.handle.close().await;
                info!("port {} closed", port);
                true
            }
            None => false,
        }
    }

    /// Close every listener
    pub async fn shutdown(&self) {
        for port in self.passwords.ports() {
            self.remove_port(port).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn local_config() -> Config {
        Config {
            server: "127.0.0.1".into(),
            timeout: Duration::from_secs(5),
            ..Config::default()
        }
    }

    #[test]
    fn test_replace_config_returns_previous() {
        let ctx = ServerContext::new(local_config());
        let mut next = local_config();
        next.method = "aes-128-gcm".into();

        let old = ctx.replace_config(next);
        assert_eq!(old.method, "aes-256-cfb");
        assert_eq!(ctx.config().method, "aes-128-gcm");
    }

    #[tokio::test]
    async fn test_update_same_password_is_noop() {
        let ctx = ServerContext::new(local_config());
        let port = free_port();

        let first = ctx.update_port_password(port, "one".into()).await.unwrap();
        assert_eq!(first, PortUpdate::Added);
        let id = ctx.passwords().get(port).unwrap().handle.id();

        let again = ctx.update_port_password(port, "one".into()).await.unwrap();
        assert_eq!(again, PortUpdate::Unchanged);
        assert_eq!(ctx.passwords().get(port).unwrap().handle.id(), id);

        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_new_password_restarts_listener() {
        let ctx = ServerContext::new(local_config());
        let port = free_port();

        let old = ctx.start_port(port, "one".into()).await.unwrap();
        let result = ctx.update_port_password(port, "two".into()).await.unwrap();
        assert_eq!(result, PortUpdate::Restarted);
        assert!(old.is_closed());

        let record = ctx.passwords().get(port).unwrap();
        assert_eq!(record.password, "two");
        assert_ne!(record.handle.id(), old.id());
        assert_eq!(ctx.passwords().len(), 1);

        ctx.shutdown().await;
        assert!(record.handle.is_closed());
        assert!(ctx.passwords().is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_port() {
        let ctx = ServerContext::new(local_config());
        assert!(!ctx.remove_port(1).await);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = blocker.local_addr().unwrap().port();

        let ctx = ServerContext::new(local_config());
        let err = ctx.start_port(port, "pw".into()).await.unwrap_err();
        assert!(err.to_string().contains(&port.to_string()));
        assert!(ctx.passwords().get(port).is_none());
    }
}
