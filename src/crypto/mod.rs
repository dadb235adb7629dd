//! Cipher Module
//!
//! A [`Cipher`] is the per-listener template built from a method name and a
//! password. It holds only the derived master key; every connection asks it for
//! fresh per-direction state with [`Cipher::encryptor`] and [`Cipher::decryptor`],
//! so no keystream or nonce counter is ever shared between sessions.

pub mod aead;
pub mod kdf;
pub mod stream;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::RngCore;

pub use aead::AeadCipher;
pub use stream::StreamCipher;

use crate::error::{Error, RelayResult};
use stream::Direction;

/// Method used when the configuration leaves it empty
pub const DEFAULT_METHOD: &str = "aes-256-cfb";

/// Cipher family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    /// Byte-for-byte keystream, no integrity
    Stream,
    /// Length-prefixed authenticated chunks
    Aead,
}

/// Supported encryption methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Aes128Cfb,
    Aes192Cfb,
    Aes256Cfb,
    Aes128Ctr,
    Aes192Ctr,
    Aes256Ctr,
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20IetfPoly1305,
}

impl Method {
    /// Every method the relay can serve
    pub const ALL: [Method; 9] = [
        Method::Aes128Cfb,
        Method::Aes192Cfb,
        Method::Aes256Cfb,
        Method::Aes128Ctr,
        Method::Aes192Ctr,
        Method::Aes256Ctr,
        Method::Aes128Gcm,
        Method::Aes256Gcm,
        Method::ChaCha20IetfPoly1305,
    ];

    /// Look a method up by its configuration name (case-insensitive)
    pub fn from_name(name: &str) -> RelayResult<Self> {
        let lower = name.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name() == lower)
            .ok_or_else(|| Error::UnsupportedMethod(name.to_string()))
    }

    /// Configuration name, e.g. `aes-256-gcm`
    pub fn name(&self) -> &'static str {
        match self {
            Method::Aes128Cfb => "aes-128-cfb",
            Method::Aes192Cfb => "aes-192-cfb",
            Method::Aes256Cfb => "aes-256-cfb",
            Method::Aes128Ctr => "aes-128-ctr",
            Method::Aes192Ctr => "aes-192-ctr",
            Method::Aes256Ctr => "aes-256-ctr",
            Method::Aes128Gcm => "aes-128-gcm",
            Method::Aes256Gcm => "aes-256-gcm",
            Method::ChaCha20IetfPoly1305 => "chacha20-ietf-poly1305",
        }
    }

    /// Stream or AEAD family
    pub fn kind(&self) -> CipherKind {
        match self {
            Method::Aes128Gcm | Method::Aes256Gcm | Method::ChaCha20IetfPoly1305 => {
                CipherKind::Aead
            }
            _ => CipherKind::Stream,
        }
    }

    /// Master key length in bytes
    pub fn key_size(&self) -> usize {
        match self {
            Method::Aes128Cfb | Method::Aes128Ctr | Method::Aes128Gcm => 16,
            Method::Aes192Cfb | Method::Aes192Ctr => 24,
            Method::Aes256Cfb
            | Method::Aes256Ctr
            | Method::Aes256Gcm
            | Method::ChaCha20IetfPoly1305 => 32,
        }
    }

    /// Length of the IV (stream) or salt (AEAD) that opens each direction
    pub fn iv_size(&self) -> usize {
        match self.kind() {
            CipherKind::Stream => 16,
            CipherKind::Aead => self.key_size(),
        }
    }

    /// Authentication tag length, zero for stream methods
    pub fn tag_size(&self) -> usize {
        match self.kind() {
            CipherKind::Stream => 0,
            CipherKind::Aead => aead::TAG_SIZE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::from_name(s)
    }
}

/// Per-listener cipher template
///
/// Cloning is cheap and yields an independent template over the same key.
#[derive(Clone)]
pub struct Cipher {
    method: Method,
    key: Arc<[u8]>,
}

impl Cipher {
    /// Build a template from a method name and password.
    /// Fails with [`Error::UnsupportedMethod`] for unknown names.
    pub fn new(method: &str, password: &str) -> RelayResult<Self> {
        let method = Method::from_name(method)?;
        Ok(Self::with_method(method, password))
    }

    pub fn with_method(method: Method, password: &str) -> Self {
        let key = kdf::evp_bytes_to_key(password.as_bytes(), method.key_size());
        Self {
            method,
            key: key.into(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn kind(&self) -> CipherKind {
        self.method.kind()
    }

    pub fn iv_size(&self) -> usize {
        self.method.iv_size()
    }

    /// Random IV or salt for a new outbound direction
    pub fn generate_iv(&self) -> Vec<u8> {
        let mut iv = vec![0u8; self.iv_size()];
        rand::thread_rng().fill_bytes(&mut iv);
        iv
    }

    /// Fresh encrypting state for the direction opened by `iv`
    pub fn encryptor(&self, iv: &[u8]) -> RelayResult<Encryptor> {
        Ok(match self.kind() {
            CipherKind::Stream => Encryptor::Stream(StreamCipher::new(
                self.method,
                &self.key,
                iv,
                Direction::Encrypt,
            )?),
            CipherKind::Aead => Encryptor::Aead(AeadCipher::new(self.method, &self.key, iv)?),
        })
    }

    /// Fresh decrypting state for the direction opened by `iv`
    pub fn decryptor(&self, iv: &[u8]) -> RelayResult<Decryptor> {
        Ok(match self.kind() {
            CipherKind::Stream => Decryptor::Stream(StreamCipher::new(
                self.method,
                &self.key,
                iv,
                Direction::Decrypt,
            )?),
            CipherKind::Aead => Decryptor::Aead(AeadCipher::new(self.method, &self.key, iv)?),
        })
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Outbound half of a session
#[derive(Debug)]
pub enum Encryptor {
    Stream(StreamCipher),
    Aead(AeadCipher),
}

/// Inbound half of a session
#[derive(Debug)]
pub enum Decryptor {
    Stream(StreamCipher),
    Aead(AeadCipher),
}
