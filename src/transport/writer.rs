//! Encrypting write half of a client connection

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::frame;
use crate::crypto::{Cipher, Encryptor};
use crate::error::RelayResult;

/// Encrypts plaintext and writes ciphertext to `W`.
///
/// A fresh IV or salt is generated on the first write and sent in clear ahead
/// of the first ciphertext.
pub struct EncryptedWriter<W> {
    inner: W,
    cipher: Cipher,
    encryptor: Option<Encryptor>,
    out: BytesMut,
}

impl<W: AsyncWrite + Unpin> EncryptedWriter<W> {
    pub fn new(inner: W, cipher: Cipher) -> Self {
        Self {
            inner,
            cipher,
            encryptor: None,
            out: BytesMut::new(),
        }
    }

    /// Encrypt `data` and write all of it
    pub async fn write(&mut self, data: &[u8]) -> RelayResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        self.out.clear();
        let encryptor = match self.encryptor {
            Some(ref mut encryptor) => encryptor,
            None => {
                let iv = self.cipher.generate_iv();
                let encryptor = self.cipher.encryptor(&iv)?;
                self.out.extend_from_slice(&iv);
                self.encryptor.insert(encryptor)
            }
        };

        match encryptor {
            Encryptor::Stream(cipher) => {
                let start = self.out.len();
                self.out.extend_from_slice(data);
                cipher.apply(&mut self.out[start..]);
            }
            Encryptor::Aead(cipher) => {
                frame::pack(cipher, data, &mut self.out)?;
            }
        }

        self.inner.write_all(&self.out).await?;
        Ok(())
    }

    /// Flush the underlying transport
    pub async fn flush(&mut self) -> RelayResult<()> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Close the write side of the underlying transport
    pub async fn shutdown(&mut self) -> RelayResult<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Whether the IV or salt has gone out yet
    pub fn has_sent_iv(&self) -> bool {
        self.encryptor.is_some()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
