//! AEAD ciphers (AES-GCM and ChaCha20-Poly1305)
//!
//! Each direction derives its own session key from the master key and a random
//! salt, then seals every message under a 12-byte nonce holding a little-endian
//! counter that starts at zero and advances once per seal/open.

use aes_gcm::aead::generic_array::{typenum, GenericArray};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;

use super::kdf::session_subkey;
use super::Method;
use crate::error::{Error, RelayResult};

/// Authentication tag length shared by every supported AEAD method
pub const TAG_SIZE: usize = 16;

const NONCE_SIZE: usize = 12;

#[allow(clippy::large_enum_variant)]
#[derive(Clone)]
enum AeadCipherInner {
    Aes128Gcm(Aes128Gcm),
    Aes256Gcm(Aes256Gcm),
    ChaCha20Poly1305(ChaCha20Poly1305),
}

/// One direction of an AEAD session
#[derive(Clone)]
pub struct AeadCipher {
    method: Method,
    inner: AeadCipherInner,
    counter: u64,
}

impl AeadCipher {
    /// Derive the session key for `salt` and set up a fresh nonce counter
    pub fn new(method: Method, master_key: &[u8], salt: &[u8]) -> RelayResult<Self> {
        if salt.len() != method.iv_size() {
            return Err(Error::InvalidIvLength {
                expected: method.iv_size(),
                actual: salt.len(),
            });
        }

        let subkey = session_subkey(master_key, salt)?;
        let bad_key = |_| Error::InvalidKeyLength {
            method: method.name(),
        };

        let inner = match method {
            Method::Aes128Gcm => {
                AeadCipherInner::Aes128Gcm(Aes128Gcm::new_from_slice(&subkey).map_err(bad_key)?)
            }
            Method::Aes256Gcm => {
                AeadCipherInner::Aes256Gcm(Aes256Gcm::new_from_slice(&subkey).map_err(bad_key)?)
            }
            Method::ChaCha20IetfPoly1305 => AeadCipherInner::ChaCha20Poly1305(
                ChaCha20Poly1305::new_from_slice(&subkey).map_err(bad_key)?,
            ),
            other => return Err(Error::UnsupportedMethod(other.name().to_string())),
        };

        Ok(Self {
            method,
            inner,
            counter: 0,
        })
    }

    fn next_nonce(&mut self) -> GenericArray<u8, typenum::U12> {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..8].copy_from_slice(&self.counter.to_le_bytes());
        self.counter = self.counter.wrapping_add(1);
        GenericArray::clone_from_slice(&nonce)
    }

    /// Encrypt `plaintext`, returning ciphertext followed by the tag
    pub fn seal(&mut self, plaintext: &[u8]) -> RelayResult<Vec<u8>> {
        let nonce = self.next_nonce();
        let sealed = match &self.inner {
            AeadCipherInner::Aes128Gcm(cipher) => cipher.encrypt(&nonce, plaintext),
            AeadCipherInner::Aes256Gcm(cipher) => cipher.encrypt(&nonce, plaintext),
            AeadCipherInner::ChaCha20Poly1305(cipher) => cipher.encrypt(&nonce, plaintext),
        };
        sealed.map_err(|_| Error::AuthenticationFailure)
    }

    /// Verify and decrypt one sealed message. A bad tag is fatal to the session.
    pub fn open(&mut self, ciphertext: &[u8]) -> RelayResult<Vec<u8>> {
        let nonce = self.next_nonce();
        let opened = match &self.inner {
            AeadCipherInner::Aes128Gcm(cipher) => cipher.decrypt(&nonce, ciphertext),
            AeadCipherInner::Aes256Gcm(cipher) => cipher.decrypt(&nonce, ciphertext),
            AeadCipherInner::ChaCha20Poly1305(cipher) => cipher.decrypt(&nonce, ciphertext),
        };
        opened.map_err(|_| Error::AuthenticationFailure)
    }

    /// Number of seal/open operations performed so far
    pub fn nonce_counter(&self) -> u64 {
        self.counter
    }

    pub fn method(&self) -> Method {
        self.method
    }
}

impl std::fmt::Debug for AeadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadCipher")
            .field("method", &self.method)
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}
