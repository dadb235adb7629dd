//! Connection Handler
//!
//! Drives one client session through
//! `Accepted -> RequestParsed -> Dialing -> Relaying -> Closed`.
//! Any failure jumps straight to `Closed`; dropping the socket halves and the
//! counter guard is the whole of cleanup, so it runs exactly once on every path.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn, Level};

use crate::crypto::Cipher;
use crate::error::{Error, RelayResult};
use crate::protocol::read_request;
use crate::relay::{RelayEngine, RelaySession};
use crate::server::ServerContext;
use crate::transport::EncryptedStream;

/// Session lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    RequestParsed,
    Dialing,
    Relaying,
    Closed,
}

/// Serve one accepted client connection to completion.
/// Errors are logged here and never reach the accept loop.
///
/// Returns `Closed` after a clean relay, otherwise the stage the session had
/// reached when it failed.
#[instrument(skip(stream, cipher, ctx), fields(peer = %peer))]
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    cipher: Cipher,
    ctx: Arc<ServerContext>,
) -> ConnectionState {
    let _guard = ctx.connections().track();
    debug!("new client {}", peer);

    let mut state = ConnectionState::Accepted;
    match serve(stream, peer, cipher, &ctx, &mut state).await {
        Ok(()) => {
            debug!("closed connection from {}", peer);
            ConnectionState::Closed
        }
        Err(e) => {
            log_failure(state, &e);
            state
        }
    }
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    cipher: Cipher,
    ctx: &ServerContext,
    state: &mut ConnectionState,
) -> RelayResult<()> {
    let config = ctx.config();
    let _ = stream.set_nodelay(true);
    let (mut reader, writer) = EncryptedStream::new(stream, cipher).into_split();

    let request = match timeout(config.timeout, read_request(&mut reader)).await {
        Ok(request) => request?,
        Err(_) => return Err(Error::RequestTimeout(config.timeout)),
    };
    *state = ConnectionState::RequestParsed;

    let target = request.host_port();
    debug!("connecting to {}", target);
    *state = ConnectionState::Dialing;

    let engine = RelayEngine::from_config(&config);
    let remote = engine.connect_to_target(&target).await?;
    *state = ConnectionState::Relaying;

    let session = Arc::new(RelaySession::new(peer, target));
    let result = engine.relay(session.clone(), reader, writer, remote).await;
    session.log_stats();
    result
}

/// Log severity for a session that failed at `state`
fn failure_level(state: ConnectionState, err: &Error) -> Level {
    match err {
        e if e.is_fd_exhaustion() => Level::ERROR,
        Error::Dial { .. } | Error::DialTimeout { .. } => Level::ERROR,
        Error::AuthenticationFailure => Level::WARN,
        e if e.is_request_error() => Level::WARN,
        e if e.is_peer_closed() => Level::DEBUG,
        _ if state == ConnectionState::Relaying => Level::INFO,
        _ => Level::WARN,
    }
}

fn log_failure(state: ConnectionState, err: &Error) {
    let level = failure_level(state, err);
    if level == Level::ERROR {
        if err.is_fd_exhaustion() {
            error!("dial error: too many open files, check ulimit -n: {}", err);
        } else {
            error!("{}", err);
        }
    } else if level == Level::WARN {
        match err {
            Error::AuthenticationFailure => {
                warn!(state = ?state, "authentication failed, closing connection");
            }
            e if e.is_request_error() => warn!("error getting request: {}", e),
            e => warn!(state = ?state, "connection failed: {}", e),
        }
    } else if level == Level::INFO {
        info!("relay ended: {}", err);
    } else {
        debug!(state = ?state, "peer closed: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::protocol::types::{Request, TargetAddr};
    use std::io;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn test_context() -> Arc<ServerContext> {
        ServerContext::new(Config {
            server: "127.0.0.1".into(),
            timeout: Duration::from_secs(2),
            ..Config::default()
        })
    }

    /// Accepted server-side socket plus the client's encrypted halves
    async fn accepted(cipher: &Cipher) -> (TcpStream, SocketAddr, EncryptedStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (server_side, peer) = accepted.unwrap();
        (server_side, peer, EncryptedStream::new(client.unwrap(), cipher.clone()))
    }

    fn dead_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_fd_exhaustion_logged_as_error() {
        let emfile = Error::dial("example.com:80", io::Error::from_raw_os_error(libc::EMFILE));
        assert_eq!(failure_level(ConnectionState::Dialing, &emfile), Level::ERROR);

        let refused = Error::dial("example.com:80", io::ErrorKind::ConnectionRefused.into());
        assert_eq!(failure_level(ConnectionState::Dialing, &refused), Level::ERROR);
    }

    #[test]
    fn test_failure_levels() {
        let reset = Error::Io(io::ErrorKind::ConnectionReset.into());
        assert_eq!(failure_level(ConnectionState::Relaying, &reset), Level::DEBUG);

        let timed_out = Error::Io(io::ErrorKind::TimedOut.into());
        assert_eq!(failure_level(ConnectionState::Relaying, &timed_out), Level::INFO);

        assert_eq!(
            failure_level(ConnectionState::Accepted, &Error::AuthenticationFailure),
            Level::WARN
        );
        assert_eq!(
            failure_level(ConnectionState::Accepted, &Error::UnsupportedAddressType(9)),
            Level::WARN
        );
    }

    #[tokio::test]
    async fn test_dial_failure_closes_client_and_releases_counter() {
        let cipher = Cipher::new("aes-256-gcm", "handler").unwrap();
        let ctx = test_context();
        let (server_side, peer, client) = accepted(&cipher).await;
        let (mut client_reader, mut client_writer) = client.into_split();

        let request = Request::new(TargetAddr::Ipv4([127, 0, 0, 1].into()), dead_port());
        client_writer.write(&request.encode().unwrap()).await.unwrap();

        let state = handle_connection(server_side, peer, cipher, ctx.clone()).await;
        assert_eq!(state, ConnectionState::Dialing);
        assert_eq!(ctx.connections().active(), 0);

        let closed = tokio::time::timeout(Duration::from_secs(5), client_reader.read())
            .await
            .unwrap();
        assert!(matches!(closed, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn test_bad_request_never_dials() {
        let cipher = Cipher::new("aes-128-cfb", "handler").unwrap();
        let ctx = test_context();
        let (server_side, peer, client) = accepted(&cipher).await;
        let (_client_reader, mut client_writer) = client.into_split();

        client_writer.write(&[0x09, 1, 2, 3, 4, 5, 6]).await.unwrap();

        let state = handle_connection(server_side, peer, cipher, ctx.clone()).await;
        assert_eq!(state, ConnectionState::Accepted);
        assert_eq!(ctx.connections().active(), 0);
    }
}
