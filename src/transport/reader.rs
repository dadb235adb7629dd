//! Decrypting read half of a client connection

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::frame;
use crate::crypto::{Cipher, Decryptor};
use crate::error::RelayResult;

/// Read size for stream-cipher connections
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Reads ciphertext from `R` and exposes the decrypted plaintext.
///
/// The peer's IV or salt is consumed lazily on the first read. Decrypted bytes
/// that the caller has not consumed stay buffered across reads.
pub struct EncryptedReader<R> {
    inner: R,
    cipher: Cipher,
    decryptor: Option<Decryptor>,
    buffer: BytesMut,
    /// AEAD ciphertext holding a chunk not yet complete
    pending: BytesMut,
    scratch: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> EncryptedReader<R> {
    pub fn new(inner: R, cipher: Cipher) -> Self {
        Self {
            inner,
            cipher,
            decryptor: None,
            buffer: BytesMut::new(),
            pending: BytesMut::new(),
            scratch: Vec::new(),
            eof: false,
        }
    }

    /// Plaintext decrypted but not yet consumed
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop `n` bytes from the front of the plaintext buffer
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        let _ = self.buffer.split_to(n);
    }

    /// Whether the peer has closed its side
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Decrypt more data into the buffer. Returns the number of plaintext bytes
    /// added, or 0 once the peer has closed the connection cleanly.
    pub async fn fill(&mut self) -> RelayResult<usize> {
        if self.eof {
            return Ok(0);
        }

        if self.decryptor.is_none() {
            let mut iv = vec![0u8; self.cipher.iv_size()];
            if !self.read_full(&mut iv).await? {
                return Ok(0);
            }
            self.decryptor = Some(self.cipher.decryptor(&iv)?);
        }

        let chunked = matches!(self.decryptor, Some(Decryptor::Aead(_)));
        loop {
            let added = if chunked {
                match self.fill_aead().await? {
                    Some(n) => n,
                    None => return Ok(0),
                }
            } else {
                self.fill_stream().await?
            };

            // Zero-length AEAD chunks carry nothing, keep reading
            if added > 0 || self.eof {
                return Ok(added);
            }
        }
    }

    /// Next block of plaintext, or `None` at end of stream
    pub async fn read(&mut self) -> RelayResult<Option<Bytes>> {
        if self.buffer.is_empty() && self.fill().await? == 0 {
            return Ok(None);
        }
        Ok(Some(self.buffer.split().freeze()))
    }

    async fn fill_stream(&mut self) -> RelayResult<usize> {
        if self.scratch.len() < READ_BUFFER_SIZE {
            self.scratch.resize(READ_BUFFER_SIZE, 0);
        }

        let n = self.inner.read(&mut self.scratch).await?;
        if n == 0 {
            self.eof = true;
            return Ok(0);
        }

        if let Some(Decryptor::Stream(cipher)) = self.decryptor.as_mut() {
            cipher.apply(&mut self.scratch[..n]);
        }
        self.buffer.extend_from_slice(&self.scratch[..n]);
        Ok(n)
    }

    /// Unpack every complete chunk already received, reading more ciphertext
    /// until at least one chunk is whole. `None` means the peer closed between
    /// chunks.
    async fn fill_aead(&mut self) -> RelayResult<Option<usize>> {
        loop {
            let Some(Decryptor::Aead(cipher)) = self.decryptor.as_mut() else {
                return Ok(None);
            };
            let before = self.buffer.len();
            let consumed = frame::unpack(cipher, &self.pending, &mut self.buffer)?;
            if consumed > 0 {
                self.pending.advance(consumed);
                return Ok(Some(self.buffer.len() - before));
            }

            if self.scratch.len() < READ_BUFFER_SIZE {
                self.scratch.resize(READ_BUFFER_SIZE, 0);
            }
            let n = self.inner.read(&mut self.scratch).await?;
            if n == 0 {
                self.eof = true;
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            self.pending.extend_from_slice(&self.scratch[..n]);
        }
    }

    /// Fill `buf` completely. Returns false if the peer closed before sending a
    /// single byte; a close part way through is an `UnexpectedEof` error.
    async fn read_full(&mut self, buf: &mut [u8]) -> RelayResult<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    self.eof = true;
                    return Ok(false);
                }
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            filled += n;
        }
        Ok(true)
    }
}
