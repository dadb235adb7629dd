//! AEAD chunk framing
//!
//! ```text
//! [encrypted length (2 + tag)][encrypted payload (len + tag)] ...
//! ```
//!
//! The length header and the payload are sealed as two separate messages, so
//! every chunk advances the direction's nonce counter by two.

use bytes::{BufMut, BytesMut};

use crate::crypto::aead::{AeadCipher, TAG_SIZE};
use crate::error::{Error, RelayResult};

/// Largest payload carried by one chunk
pub const MAX_PAYLOAD_SIZE: usize = 0x3FFF;

/// Bits of the length header that carry the payload size
pub const LENGTH_MASK: u16 = 0x3FFF;

/// Size of a sealed length header
pub const HEADER_SIZE: usize = 2 + TAG_SIZE;

/// Number of chunks `len` bytes of payload are split into
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(MAX_PAYLOAD_SIZE)
}

/// Ciphertext length of `len` payload bytes once packed, salt excluded
pub fn packed_len(len: usize) -> usize {
    len + chunk_count(len) * (HEADER_SIZE + TAG_SIZE)
}

/// Seal `data` into length-prefixed chunks appended to `out`.
/// Returns the number of chunks written; empty input writes nothing.
pub fn pack(cipher: &mut AeadCipher, data: &[u8], out: &mut BytesMut) -> RelayResult<usize> {
    out.reserve(packed_len(data.len()));

    let mut chunks = 0;
    for payload in data.chunks(MAX_PAYLOAD_SIZE) {
        let header = (payload.len() as u16).to_be_bytes();
        out.put_slice(&cipher.seal(&header)?);
        out.put_slice(&cipher.seal(payload)?);
        chunks += 1;
    }

    Ok(chunks)
}

/// Open a sealed length header and return the payload size it announces
pub fn open_length(cipher: &mut AeadCipher, header: &[u8]) -> RelayResult<usize> {
    if header.len() != HEADER_SIZE {
        return Err(Error::decode(format!(
            "chunk header must be {} bytes, got {}",
            HEADER_SIZE,
            header.len()
        )));
    }

    let plain = cipher.open(header)?;
    let raw = u16::from_be_bytes([plain[0], plain[1]]);
    Ok((raw & LENGTH_MASK) as usize)
}

/// Unpack every complete chunk held in `data`, appending plaintext to `out`.
/// Returns how many input bytes were consumed; a trailing partial chunk is left
/// for the caller to complete.
pub fn unpack(cipher: &mut AeadCipher, data: &[u8], out: &mut BytesMut) -> RelayResult<usize> {
    let mut consumed = 0;

    while data.len() - consumed >= HEADER_SIZE {
        let header_end = consumed + HEADER_SIZE;

        // Peek the length without advancing the real nonce sequence until the
        // whole chunk is present
        let len = {
            let mut probe = cipher.clone();
            open_length(&mut probe, &data[consumed..header_end])?
        };
        let chunk_end = header_end + len + TAG_SIZE;
        if data.len() < chunk_end {
            break;
        }

        open_length(cipher, &data[consumed..header_end])?;
        out.put_slice(&cipher.open(&data[header_end..chunk_end])?);
        consumed = chunk_end;
    }

    Ok(consumed)
}
