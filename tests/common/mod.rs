//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use ssrelay::crypto::Cipher;
use ssrelay::protocol::types::{Request, TargetAddr};
use ssrelay::transport::{EncryptedReader, EncryptedWriter};
use ssrelay::{Config, ServerContext};

pub type ClientHalves = (
    EncryptedReader<OwnedReadHalf>,
    EncryptedWriter<OwnedWriteHalf>,
);

/// Distinct free loopback ports. All probes are held until every port is known.
pub fn free_ports<const N: usize>() -> [u16; N] {
    let held: Vec<_> = (0..N)
        .map(|_| std::net::TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    std::array::from_fn(|i| held[i].local_addr().unwrap().port())
}

pub fn local_config(method: &str, ports: &[(u16, &str)]) -> Config {
    let mut config = Config {
        server: "127.0.0.1".into(),
        method: method.into(),
        timeout: Duration::from_secs(5),
        ..Config::default()
    };
    for (port, password) in ports {
        config
            .port_password
            .insert(port.to_string(), password.to_string());
    }
    config
}

pub async fn start_relay(config: Config) -> Arc<ServerContext> {
    let ctx = ServerContext::new(config);
    ctx.start().await.unwrap();
    ctx
}

/// Loopback server that writes back everything it reads
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

pub fn request_for(addr: SocketAddr) -> Request {
    let host = match addr {
        SocketAddr::V4(v4) => TargetAddr::Ipv4(*v4.ip()),
        SocketAddr::V6(v6) => TargetAddr::Ipv6(*v6.ip()),
    };
    Request::new(host, addr.port())
}

/// Connect to the relay on `port` and send the request header followed by
/// `payload` in one encrypted write
pub async fn open_client(
    port: u16,
    cipher: Cipher,
    target: &Request,
    payload: &[u8],
) -> ClientHalves {
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read_half, write_half) = stream.into_split();
    let reader = EncryptedReader::new(read_half, cipher.clone());
    let mut writer = EncryptedWriter::new(write_half, cipher);

    let mut first = target.encode().unwrap();
    first.extend_from_slice(payload);
    writer.write(&first).await.unwrap();
    (reader, writer)
}

/// Read until `len` plaintext bytes arrived or the stream ended
pub async fn read_exact_plain(
    reader: &mut EncryptedReader<OwnedReadHalf>,
    len: usize,
) -> ssrelay::error::RelayResult<Vec<u8>> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        match reader.read().await? {
            Some(chunk) => out.extend_from_slice(&chunk),
            None => break,
        }
    }
    Ok(out)
}

/// Poll `cond` until it holds or two seconds pass
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
