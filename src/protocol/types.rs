//! Request Protocol Types

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{Error, RelayResult};
use crate::protocol::constants::*;

/// Destination address carried in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

impl TargetAddr {
    /// Get the address type code for this address
    pub fn address_type(&self) -> u8 {
        match self {
            TargetAddr::Ipv4(_) => ADDR_TYPE_IPV4,
            TargetAddr::Ipv6(_) => ADDR_TYPE_IPV6,
            TargetAddr::Domain(_) => ADDR_TYPE_DOMAIN,
        }
    }

    /// Whether the host form needs brackets when a port is appended
    fn needs_brackets(&self) -> bool {
        match self {
            TargetAddr::Ipv4(_) => false,
            TargetAddr::Ipv6(_) => true,
            TargetAddr::Domain(d) => d.contains(':'),
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ipv4(ip) => write!(f, "{}", ip),
            TargetAddr::Ipv6(ip) => write!(f, "{}", ip),
            TargetAddr::Domain(domain) => f.write_str(domain),
        }
    }
}

/// Decoded destination request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub addr: TargetAddr,
    pub port: u16,
}

impl Request {
    pub fn new(addr: TargetAddr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Dialable `host:port`, with IPv6 hosts in brackets
    pub fn host_port(&self) -> String {
        if self.addr.needs_brackets() {
            format!("[{}]:{}", self.addr, self.port)
        } else {
            format!("{}:{}", self.addr, self.port)
        }
    }

    /// Try to decode a request from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, otherwise the request and
    /// how many bytes it occupied. Bytes after the request belong to the relay
    /// stream and are left alone.
    pub fn parse(buf: &[u8]) -> RelayResult<Option<(Self, usize)>> {
        let Some(&type_byte) = buf.first() else {
            return Ok(None);
        };

        let (addr_start, addr_len) = match type_byte & ADDR_TYPE_MASK {
            ADDR_TYPE_IPV4 => (ADDR_TYPE_LEN, IPV4_LEN),
            ADDR_TYPE_IPV6 => (ADDR_TYPE_LEN, IPV6_LEN),
            ADDR_TYPE_DOMAIN => {
                let Some(&len) = buf.get(ADDR_TYPE_LEN) else {
                    return Ok(None);
                };
                (ADDR_TYPE_LEN + DOMAIN_LEN_LEN, len as usize)
            }
            _ => return Err(Error::UnsupportedAddressType(type_byte)),
        };

        let port_start = addr_start + addr_len;
        let total = port_start + PORT_LEN;
        if buf.len() < total {
            return Ok(None);
        }

        let raw = &buf[addr_start..port_start];
        let addr = match type_byte & ADDR_TYPE_MASK {
            ADDR_TYPE_IPV4 => TargetAddr::Ipv4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3])),
            ADDR_TYPE_IPV6 => {
                let mut octets = [0u8; IPV6_LEN];
                octets.copy_from_slice(raw);
                TargetAddr::Ipv6(Ipv6Addr::from(octets))
            }
            _ => {
                let domain = std::str::from_utf8(raw)
                    .map_err(|_| Error::decode("domain name is not valid UTF-8"))?;
                if domain.contains('\0') {
                    return Err(Error::InvalidHost(domain.to_string()));
                }
                TargetAddr::Domain(domain.to_string())
            }
        };

        let port = u16::from_be_bytes([buf[port_start], buf[port_start + 1]]);
        Ok(Some((Self::new(addr, port), total)))
    }

    /// Encode to the wire form read by [`Request::parse`]
    pub fn encode(&self) -> RelayResult<Vec<u8>> {
        let mut out = Vec::with_capacity(ADDR_TYPE_LEN + DOMAIN_LEN_LEN + 255 + PORT_LEN);
        out.push(self.addr.address_type());
        match &self.addr {
            TargetAddr::Ipv4(ip) => out.extend_from_slice(&ip.octets()),
            TargetAddr::Ipv6(ip) => out.extend_from_slice(&ip.octets()),
            TargetAddr::Domain(domain) => {
                let len = u8::try_from(domain.len())
                    .map_err(|_| Error::decode(format!("domain too long: {} bytes", domain.len())))?;
                out.push(len);
                out.extend_from_slice(domain.as_bytes());
            }
        }
        out.extend_from_slice(&self.port.to_be_bytes());
        Ok(out)
    }
}
