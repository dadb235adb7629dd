//! ssrelay Library
//!
//! Encrypting multi-port TCP relay. Clients open a connection to one of the
//! configured ports, send an IV or salt followed by an encrypted destination
//! address, and the relay forwards the decrypted stream to that destination and
//! the encrypted replies back.
//!
//! Each port has its own password. Passwords and ports can change at runtime
//! through [`server::ReloadCoordinator`] without dropping established
//! connections.

pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod signals;
pub mod transport;

pub use config::Config;
pub use crypto::{Cipher, Method};
pub use server::{ReloadCoordinator, ServerContext};
pub use signals::SignalListener;

/// Common error type for startup, configuration and reload paths
pub type Result<T> = anyhow::Result<T>;
