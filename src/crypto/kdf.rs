//! Key Derivation

use hkdf::Hkdf;
use md5::{Digest, Md5};
use sha1::Sha1;

use crate::error::{Error, RelayResult};

const SUBKEY_INFO: &[u8] = b"ss-subkey";

/// Derive a master key from a password with OpenSSL's `EVP_BytesToKey` (MD5,
/// one iteration, no salt). Every method uses this key directly (stream
/// ciphers) or as HKDF input (AEAD ciphers).
pub fn evp_bytes_to_key(password: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut prev: Vec<u8> = Vec::new();

    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        prev = hasher.finalize().to_vec();
        key.extend_from_slice(&prev);
    }

    key.truncate(key_len);
    key
}

/// Derive the per-direction AEAD session key from the master key and the salt
/// that opens that direction.
pub fn session_subkey(master_key: &[u8], salt: &[u8]) -> RelayResult<Vec<u8>> {
    let hk = Hkdf::<Sha1>::new(Some(salt), master_key);
    let mut okm = vec![0u8; master_key.len()];
    hk.expand(SUBKEY_INFO, &mut okm)
        .map_err(|_| Error::InvalidKeyLength { method: "hkdf-sha1" })?;
    Ok(okm)
}
