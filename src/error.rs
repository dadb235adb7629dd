//! Per-connection error types
//!
//! Startup and reload paths use `anyhow` (see [`crate::Result`]); everything that
//! happens inside one client session reports one of these variants so the handler
//! can pick a log severity without string matching.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result alias for cipher, framing and session code.
pub type RelayResult<T> = std::result::Result<T, Error>;

/// Errors raised while serving a single client connection.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured method name is not a known cipher
    #[error("unsupported encryption method: {0}")]
    UnsupportedMethod(String),

    /// Key material did not match what the primitive expects
    #[error("invalid key length for {method}")]
    InvalidKeyLength { method: &'static str },

    /// IV or salt had the wrong size for the method
    #[error("invalid iv length: expected {expected} bytes, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },

    /// AEAD tag verification failed
    #[error("authentication failed")]
    AuthenticationFailure,

    /// Address type byte outside {1, 3, 4}
    #[error("address type {0} not supported")]
    UnsupportedAddressType(u8),

    /// Decoded host cannot be dialed safely
    #[error("invalid host in request: {0:?}")]
    InvalidHost(String),

    /// Malformed or truncated request
    #[error("decode error: {0}")]
    Decode(String),

    /// Request did not arrive before the read deadline
    #[error("timed out after {0:?} waiting for request")]
    RequestTimeout(Duration),

    /// Destination could not be reached
    #[error("error connecting to {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Dial failed because the process or system ran out of file descriptors
    #[error("too many open files while connecting to {target}: {source}")]
    TooManyOpenFiles {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Dial did not complete in time
    #[error("timed out after {timeout:?} connecting to {target}")]
    DialTimeout { target: String, timeout: Duration },

    /// Socket I/O error while relaying
    #[error("network error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    /// Classify a failed dial, separating descriptor exhaustion (EMFILE/ENFILE)
    /// from ordinary per-destination failures.
    pub fn dial(target: impl Into<String>, source: io::Error) -> Self {
        let target = target.into();
        match source.raw_os_error() {
            Some(code) if code == libc::EMFILE || code == libc::ENFILE => {
                Error::TooManyOpenFiles { target, source }
            }
            _ => Error::Dial { target, source },
        }
    }

    /// Whether this error points at a systemic resource problem
    pub fn is_fd_exhaustion(&self) -> bool {
        matches!(self, Error::TooManyOpenFiles { .. })
    }

    /// Whether this error is the peer going away rather than a fault
    pub fn is_peer_closed(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Whether the request phase failed, meaning no dial was attempted
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedAddressType(_)
                | Error::InvalidHost(_)
                | Error::Decode(_)
                | Error::RequestTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_classifies_emfile() {
        let err = Error::dial("example.com:80", io::Error::from_raw_os_error(libc::EMFILE));
        assert!(err.is_fd_exhaustion());

        let err = Error::dial("example.com:80", io::Error::from_raw_os_error(libc::ENFILE));
        assert!(err.is_fd_exhaustion());
    }

    #[test]
    fn test_dial_keeps_ordinary_failures() {
        let err = Error::dial(
            "127.0.0.1:1",
            io::Error::from(io::ErrorKind::ConnectionRefused),
        );
        assert!(!err.is_fd_exhaustion());
        assert!(err.to_string().contains("127.0.0.1:1"));
    }

    #[test]
    fn test_peer_closed() {
        assert!(Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_peer_closed());
        assert!(!Error::AuthenticationFailure.is_peer_closed());
    }
}
