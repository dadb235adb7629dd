//! Data Relay Module
//!
//! Handles bidirectional data relay between an encrypted client and a plain
//! destination.

pub mod engine;
pub mod session;

pub use engine::RelayEngine;
pub use session::RelaySession;
