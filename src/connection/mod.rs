//! Connection Module
//!
//! Per-client session handling and the approximate active-connection count.

pub mod counter;
pub mod handler;

pub use counter::{ConnectionCounter, ConnectionGuard};
pub use handler::{handle_connection, ConnectionState};
