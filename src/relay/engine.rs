//! Relay Engine
//!
//! Dials the destination and pumps bytes in both directions: decrypting client
//! data toward the destination and encrypting destination data toward the
//! client. The two directions are symmetric tasks; the first to end tears down
//! the other.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinError;
use tokio::time::timeout;
use tracing::debug;

use super::RelaySession;
use crate::error::{Error, RelayResult};
use crate::transport::{EncryptedReader, EncryptedWriter};

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Dials destinations and runs relays with a shared timeout
#[derive(Debug, Clone)]
pub struct RelayEngine {
    timeout: Duration,
}

impl RelayEngine {
    /// `timeout` bounds the dial and every individual relay read
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Engine using the configured timeout
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(config.timeout)
    }

    /// Open a plain TCP connection to `host:port`
    pub async fn connect_to_target(&self, target: &str) -> RelayResult<TcpStream> {
        debug!("connecting to {}", target);

        match timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::dial(target, e)),
            Err(_) => Err(Error::DialTimeout {
                target: target.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    /// Relay until either side closes or fails. Each direction runs on its own
    /// task; whichever finishes first decides the result and the other is
    /// aborted, so both sockets are closed when this returns.
    pub async fn relay<R, W>(
        &self,
        session: Arc<RelaySession>,
        client_reader: EncryptedReader<R>,
        client_writer: EncryptedWriter<W>,
        target: TcpStream,
    ) -> RelayResult<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (target_reader, target_writer) = target.into_split();

        let mut upstream = tokio::spawn(pipe_decrypt(
            client_reader,
            target_writer,
            session.clone(),
            self.timeout,
        ));
        let mut downstream = tokio::spawn(pipe_encrypt(
            target_reader,
            client_writer,
            session,
            self.timeout,
        ));

        let (finished, remaining) = tokio::select! {
            joined = &mut upstream => (joined, downstream),
            joined = &mut downstream => (joined, upstream),
        };

        remaining.abort();
        let _ = remaining.await;
        flatten_join(finished)
    }
}

fn flatten_join(joined: Result<RelayResult<()>, JoinError>) -> RelayResult<()> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(Error::Io(io::Error::new(io::ErrorKind::Other, e))),
    }
}

/// Client to destination: decrypt and forward, including any plaintext left
/// buffered behind the request
pub async fn pipe_decrypt<R, W>(
    mut client: EncryptedReader<R>,
    mut target: W,
    session: Arc<RelaySession>,
    idle: Duration,
) -> RelayResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let block = match timeout(idle, client.read()).await {
            Ok(block) => block?,
            Err(_) => return Err(idle_timeout(idle)),
        };

        match block {
            Some(data) => {
                target.write_all(&data).await?;
                session.add_bytes_up(data.len() as u64);
            }
            None => {
                let _ = target.shutdown().await;
                return Ok(());
            }
        }
    }
}

/// Destination to client: read plaintext and forward it encrypted
pub async fn pipe_encrypt<R, W>(
    mut target: R,
    mut client: EncryptedWriter<W>,
    session: Arc<RelaySession>,
    idle: Duration,
) -> RelayResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = match timeout(idle, target.read(&mut buf)).await {
            Ok(n) => n?,
            Err(_) => return Err(idle_timeout(idle)),
        };

        if n == 0 {
            let _ = client.shutdown().await;
            return Ok(());
        }

        client.write(&buf[..n]).await?;
        session.add_bytes_down(n as u64);
    }
}

fn idle_timeout(idle: Duration) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("no data for {:?}", idle),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Cipher;
    use tokio_test::io::Builder;

    fn session() -> Arc<RelaySession> {
        Arc::new(RelaySession::new(
            "127.0.0.1:40000".parse().unwrap(),
            "127.0.0.1:80",
        ))
    }

    #[tokio::test]
    async fn test_dial_refused_is_dial_error() {
        // Reserve a port then free it so nothing is listening there
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let engine = RelayEngine::new(Duration::from_secs(2));
        let err = engine
            .connect_to_target(&format!("127.0.0.1:{}", port))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Dial { .. }));
        assert!(!err.is_fd_exhaustion());
    }

    #[tokio::test]
    async fn test_pipe_decrypt_forwards_and_counts() {
        let cipher = Cipher::new("aes-256-gcm", "pipe").unwrap();
        let mut writer = EncryptedWriter::new(Vec::new(), cipher.clone());
        writer.write(b"hello ").await.unwrap();
        writer.write(b"destination").await.unwrap();
        let wire = writer.into_inner();

        let client = EncryptedReader::new(Builder::new().read(&wire).build(), cipher);
        let target = Builder::new().write(b"hello ").write(b"destination").build();
        let session = session();

        pipe_decrypt(client, target, session.clone(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(session.bytes_up(), 17);
    }

    #[tokio::test]
    async fn test_pipe_encrypt_round_trips() {
        let cipher = Cipher::new("aes-192-cfb", "pipe").unwrap();
        let target = Builder::new().read(b"response body").build();
        let session = session();

        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let writer = EncryptedWriter::new(server_side, cipher.clone());
        pipe_encrypt(target, writer, session.clone(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(session.bytes_down(), 13);

        let mut reader = EncryptedReader::new(client_side, cipher);
        let mut received = Vec::new();
        while let Some(block) = reader.read().await.unwrap() {
            received.extend_from_slice(&block);
        }
        assert_eq!(received, b"response body");
    }

    #[tokio::test]
    async fn test_idle_read_times_out() {
        let cipher = Cipher::new("aes-128-ctr", "pipe").unwrap();
        let (_client_side, server_side) = tokio::io::duplex(1024);
        let reader = EncryptedReader::new(server_side, cipher);

        let err = pipe_decrypt(reader, tokio::io::sink(), session(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::TimedOut));
    }

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (connected.unwrap(), accepted.unwrap().0)
    }

    /// `(client_remote, client_local, target_local, target_remote)`; the relay
    /// owns the `_local` ends
    async fn relay_fixture() -> (TcpStream, TcpStream, TcpStream, TcpStream) {
        let (client_remote, client_local) = tcp_pair().await;
        let (target_local, target_remote) = tcp_pair().await;
        (client_remote, client_local, target_local, target_remote)
    }

    #[tokio::test]
    async fn test_destination_close_tears_down_client() {
        let cipher = Cipher::new("aes-128-gcm", "relay").unwrap();
        let (mut client_remote, client_local, target_local, target_remote) =
            relay_fixture().await;
        let (reader, writer) =
            crate::transport::EncryptedStream::new(client_local, cipher).into_split();

        let engine = RelayEngine::new(Duration::from_secs(5));
        let relay = tokio::spawn(async move {
            engine.relay(session(), reader, writer, target_local).await
        });

        drop(target_remote);
        let result = timeout(Duration::from_secs(5), relay).await.unwrap().unwrap();
        assert!(result.is_ok());

        // Both client halves are gone: the client sees end of stream
        let mut buf = [0u8; 8];
        let n = timeout(Duration::from_secs(5), client_remote.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(n, Ok(0) | Err(_)));
    }

    #[tokio::test]
    async fn test_client_close_tears_down_destination() {
        let cipher = Cipher::new("aes-256-cfb", "relay").unwrap();
        let (client_remote, client_local, target_local, mut target_remote) =
            relay_fixture().await;
        let (reader, writer) =
            crate::transport::EncryptedStream::new(client_local, cipher).into_split();

        let engine = RelayEngine::new(Duration::from_secs(5));
        let relay = tokio::spawn(async move {
            engine.relay(session(), reader, writer, target_local).await
        });

        drop(client_remote);
        let result = timeout(Duration::from_secs(5), relay).await.unwrap().unwrap();
        assert!(result.is_ok());

        let mut buf = [0u8; 8];
        let n = timeout(Duration::from_secs(5), target_remote.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(n, Ok(0) | Err(_)));
    }
}
