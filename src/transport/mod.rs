//! Encrypted Transport
//!
//! Wraps a client socket with one cipher session. The read half decrypts the
//! client's direction, the write half encrypts the server's direction; each half
//! owns its own IV and keystream or nonce sequence.

pub mod frame;
pub mod reader;
pub mod writer;

pub use reader::EncryptedReader;
pub use writer::EncryptedWriter;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::crypto::Cipher;

/// A client connection paired with a per-connection copy of the port's cipher
pub struct EncryptedStream {
    stream: TcpStream,
    cipher: Cipher,
}

impl EncryptedStream {
    pub fn new(stream: TcpStream, cipher: Cipher) -> Self {
        Self { stream, cipher }
    }

    /// Split into independently owned halves so each relay direction can run
    /// on its own task
    pub fn into_split(
        self,
    ) -> (
        EncryptedReader<OwnedReadHalf>,
        EncryptedWriter<OwnedWriteHalf>,
    ) {
        let (read_half, write_half) = self.stream.into_split();
        (
            EncryptedReader::new(read_half, self.cipher.clone()),
            EncryptedWriter::new(write_half, self.cipher),
        )
    }
}
