//! Port Password Registry
//!
//! Maps each listening port to the password it serves and the handle of its
//! accept loop. Every lookup and mutation takes the one mutex; nothing slow
//! (bind, close, spawn) ever runs while it is held.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::listener::ListenerHandle;

/// Registry record for one port
#[derive(Debug, Clone)]
pub struct PortListener {
    pub password: String,
    pub handle: ListenerHandle,
}

/// Port to listener registry
#[derive(Debug, Default)]
pub struct PasswordManager {
    ports: Mutex<HashMap<u16, PortListener>>,
}

impl PasswordManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u16, PortListener>> {
        self.ports.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `listener` under `port`, returning the record it replaced
    pub fn add(&self, port: u16, listener: PortListener) -> Option<PortListener> {
        self.lock().insert(port, listener)
    }

    /// Snapshot of the record for `port`
    pub fn get(&self, port: u16) -> Option<PortListener> {
        self.lock().get(&port).cloned()
    }

    /// Unregister `port`, returning its record
    pub fn remove(&self, port: u16) -> Option<PortListener> {
        self.lock().remove(&port)
    }

    /// Remove the record for `port` only if it still belongs to listener `id`
    pub fn remove_if_id(&self, port: u16, id: u64) -> Option<PortListener> {
        let mut ports = self.lock();
        match ports.get(&port) {
            Some(record) if record.handle.id() == id => ports.remove(&port),
            _ => None,
        }
    }

    /// Registered ports in ascending order
    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.lock().keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Number of registered ports
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
