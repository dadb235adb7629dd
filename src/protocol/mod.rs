//! Request Protocol
//!
//! The first plaintext bytes of every client session name the destination:
//! `addrType(1) | address | port(2, big-endian)`.

pub mod constants;
pub mod decoder;
pub mod types;

pub use constants::*;
pub use decoder::read_request;
pub use types::*;
