//! Legacy stream ciphers (AES-CFB and AES-CTR)
//!
//! These transform bytes one-for-one and carry no authentication tag: a flipped
//! ciphertext bit becomes a flipped (CTR) or garbled (CFB) plaintext byte that is
//! passed downstream as-is. Clients of the legacy wire format depend on this.

use aes::{Aes128, Aes192, Aes256};
use cfb_mode::cipher::{BlockCipher, BlockEncryptMut, KeyIvInit, StreamCipher as _};
use cfb_mode::{BufDecryptor, BufEncryptor};

use super::Method;
use crate::error::{Error, RelayResult};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes192Ctr = ctr::Ctr128BE<Aes192>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Which way a stream cipher instance runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

trait Keystream: Send {
    fn apply(&mut self, buf: &mut [u8]);
}

struct CfbEncrypt<C: BlockEncryptMut + BlockCipher>(BufEncryptor<C>);

impl<C> Keystream for CfbEncrypt<C>
where
    C: BlockEncryptMut + BlockCipher + Send,
{
    fn apply(&mut self, buf: &mut [u8]) {
        self.0.encrypt(buf);
    }
}

struct CfbDecrypt<C: BlockEncryptMut + BlockCipher>(BufDecryptor<C>);

impl<C> Keystream for CfbDecrypt<C>
where
    C: BlockEncryptMut + BlockCipher + Send,
{
    fn apply(&mut self, buf: &mut [u8]) {
        self.0.decrypt(buf);
    }
}

struct Ctr<T>(T);

impl<T> Keystream for Ctr<T>
where
    T: cfb_mode::cipher::StreamCipher + Send,
{
    fn apply(&mut self, buf: &mut [u8]) {
        self.0.apply_keystream(buf);
    }
}

/// One direction of a stream cipher, positioned after the IV
pub struct StreamCipher {
    method: Method,
    inner: Box<dyn Keystream>,
}

impl StreamCipher {
    /// Build a cipher for `method` from the master key and the IV that opens
    /// this direction.
    pub fn new(method: Method, key: &[u8], iv: &[u8], direction: Direction) -> RelayResult<Self> {
        if iv.len() != method.iv_size() {
            return Err(Error::InvalidIvLength {
                expected: method.iv_size(),
                actual: iv.len(),
            });
        }

        let bad_key = |_| Error::InvalidKeyLength {
            method: method.name(),
        };

        let inner: Box<dyn Keystream> = match (method, direction) {
            (Method::Aes128Cfb, Direction::Encrypt) => Box::new(CfbEncrypt(
                BufEncryptor::<Aes128>::new_from_slices(key, iv).map_err(bad_key)?,
            )),
            (Method::Aes192Cfb, Direction::Encrypt) => Box::new(CfbEncrypt(
                BufEncryptor::<Aes192>::new_from_slices(key, iv).map_err(bad_key)?,
            )),
            (Method::Aes256Cfb, Direction::Encrypt) => Box::new(CfbEncrypt(
                BufEncryptor::<Aes256>::new_from_slices(key, iv).map_err(bad_key)?,
            )),
            (Method::Aes128Cfb, Direction::Decrypt) => Box::new(CfbDecrypt(
                BufDecryptor::<Aes128>::new_from_slices(key, iv).map_err(bad_key)?,
            )),
            (Method::Aes192Cfb, Direction::Decrypt) => Box::new(CfbDecrypt(
                BufDecryptor::<Aes192>::new_from_slices(key, iv).map_err(bad_key)?,
            )),
            (Method::Aes256Cfb, Direction::Decrypt) => Box::new(CfbDecrypt(
                BufDecryptor::<Aes256>::new_from_slices(key, iv).map_err(bad_key)?,
            )),
            // CTR is symmetric, both directions apply the same keystream
            (Method::Aes128Ctr, _) => {
                Box::new(Ctr(Aes128Ctr::new_from_slices(key, iv).map_err(bad_key)?))
            }
            (Method::Aes192Ctr, _) => {
                Box::new(Ctr(Aes192Ctr::new_from_slices(key, iv).map_err(bad_key)?))
            }
            (Method::Aes256Ctr, _) => {
                Box::new(Ctr(Aes256Ctr::new_from_slices(key, iv).map_err(bad_key)?))
            }
            (other, _) => return Err(Error::UnsupportedMethod(other.name().to_string())),
        };

        Ok(Self { method, inner })
    }

    /// Transform `buf` in place, continuing the keystream from the last call
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.apply(buf);
    }

    pub fn method(&self) -> Method {
        self.method
    }
}

impl std::fmt::Debug for StreamCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCipher")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::evp_bytes_to_key;

    const STREAM_METHODS: [Method; 6] = [
        Method::Aes128Cfb,
        Method::Aes192Cfb,
        Method::Aes256Cfb,
        Method::Aes128Ctr,
        Method::Aes192Ctr,
        Method::Aes256Ctr,
    ];

    #[test]
    fn test_fragmented_decrypt_matches_single_pass() {
        let plaintext: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 251) as u8).collect();
        let iv = [9u8; 16];

        for method in STREAM_METHODS {
            let key = evp_bytes_to_key(b"password", method.key_size());
            let mut enc = StreamCipher::new(method, &key, &iv, Direction::Encrypt).unwrap();
            let mut ciphertext = plaintext.clone();
            enc.apply(&mut ciphertext);
            assert_ne!(ciphertext, plaintext, "{} left data unchanged", method);

            // Odd-sized pieces cross block boundaries in both CFB and CTR
            let mut dec = StreamCipher::new(method, &key, &iv, Direction::Decrypt).unwrap();
            let mut recovered = ciphertext.clone();
            for piece in recovered.chunks_mut(13) {
                dec.apply(piece);
            }
            assert_eq!(recovered, plaintext, "{} round trip failed", method);
        }
    }

    #[test]
    fn test_corruption_is_not_detected() {
        let key = evp_bytes_to_key(b"password", 32);
        let iv = [1u8; 16];
        let mut enc = StreamCipher::new(Method::Aes256Ctr, &key, &iv, Direction::Encrypt).unwrap();
        let mut data = b"hello stream".to_vec();
        enc.apply(&mut data);
        data[0] ^= 0xff;

        let mut dec = StreamCipher::new(Method::Aes256Ctr, &key, &iv, Direction::Decrypt).unwrap();
        dec.apply(&mut data);
        assert_eq!(data[0], b'h' ^ 0xff);
        assert_eq!(&data[1..], b"ello stream");
    }

    #[test]
    fn test_rejects_wrong_iv_length() {
        let key = evp_bytes_to_key(b"password", 16);
        let err = StreamCipher::new(Method::Aes128Cfb, &key, &[0u8; 8], Direction::Encrypt)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIvLength { expected: 16, actual: 8 }));
    }
}
