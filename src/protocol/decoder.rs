//! Request decoder
//!
//! Pulls plaintext from an [`EncryptedReader`] until a whole request has been
//! decrypted. Anything the client sent after the request stays buffered in the
//! reader and is the first data forwarded to the destination.

use tokio::io::AsyncRead;
use tracing::trace;

use super::types::Request;
use crate::error::{Error, RelayResult};
use crate::transport::EncryptedReader;

/// Read and decode the destination request that opens a session
pub async fn read_request<R>(reader: &mut EncryptedReader<R>) -> RelayResult<Request>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some((request, used)) = Request::parse(reader.buffered())? {
            reader.consume(used);
            trace!(target = %request.host_port(), leftover = reader.buffered().len(), "request decoded");
            return Ok(request);
        }

        if reader.fill().await? == 0 {
            return Err(Error::decode(format!(
                "connection closed after {} bytes of request",
                reader.buffered().len()
            )));
        }
    }
}
