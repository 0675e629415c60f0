//! SOCKS5 type definitions
//!
//! Defines the command and address types used in SOCKS5 protocol handling,
//! together with the wire codec for `ATYP | ADDR | PORT` payloads.

use super::consts::*;
use crate::error::Socks5Error;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - recognized, always rejected
    Bind,
    /// UDP ASSOCIATE - recognized, always rejected
    UdpAssociate,
}

impl SocksCommand {
    /// Parse a command byte into SocksCommand
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Some(SocksCommand::Connect),
            SOCKS5_CMD_TCP_BIND => Some(SocksCommand::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Some(SocksCommand::UdpAssociate),
            _ => None,
        }
    }

    /// Convert SocksCommand to byte
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => SOCKS5_CMD_TCP_CONNECT,
            SocksCommand::Bind => SOCKS5_CMD_TCP_BIND,
            SocksCommand::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Destination address carried by a SOCKS5 request.
///
/// `Ip` covers both the IPv4 and IPv6 address types; `Domain` holds the
/// literal host name, resolved only when dialing. Domain names are 1 to
/// 255 bytes; use [`SocksAddr::domain`] to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocksAddr {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl SocksAddr {
    /// Create an address from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        SocksAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create an address from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        SocksAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create an address from a domain name and port
    pub fn domain(domain: impl Into<String>, port: u16) -> Result<Self, Socks5Error> {
        let domain = domain.into();
        if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
            return Err(Socks5Error::InvalidDomain(domain));
        }
        Ok(SocksAddr::Domain(domain, port))
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            SocksAddr::Ip(addr) => addr.port(),
            SocksAddr::Domain(_, port) => *port,
        }
    }

    /// Get the host part as a string
    pub fn host(&self) -> String {
        match self {
            SocksAddr::Ip(addr) => addr.ip().to_string(),
            SocksAddr::Domain(domain, _) => domain.clone(),
        }
    }

    /// Get the address type byte for SOCKS5 protocol
    pub fn addr_type(&self) -> u8 {
        match self {
            SocksAddr::Ip(SocketAddr::V4(_)) => SOCKS5_ADDR_TYPE_IPV4,
            SocksAddr::Ip(SocketAddr::V6(_)) => SOCKS5_ADDR_TYPE_IPV6,
            SocksAddr::Domain(_, _) => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }

    /// Number of bytes [`SocksAddr::write_to`] produces
    pub fn serialized_len(&self) -> usize {
        match self {
            SocksAddr::Ip(SocketAddr::V4(_)) => 1 + 4 + 2,
            SocksAddr::Ip(SocketAddr::V6(_)) => 1 + 16 + 2,
            SocksAddr::Domain(domain, _) => 1 + 1 + domain.len() + 2,
        }
    }

    /// Append `ATYP | ADDR | PORT` to `buf`
    ///
    /// A domain that does not fit its one-byte length prefix is refused
    /// and nothing is written.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), Socks5Error> {
        match self {
            SocksAddr::Ip(addr) => write_socket_addr(buf, addr),
            SocksAddr::Domain(domain, port) => {
                if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
                    return Err(Socks5Error::InvalidDomain(domain.clone()));
                }
                buf.reserve(self.serialized_len());
                buf.put_u8(SOCKS5_ADDR_TYPE_DOMAIN);
                buf.put_u8(domain.len() as u8);
                buf.put_slice(domain.as_bytes());
                buf.put_u16(*port);
            }
        }
        Ok(())
    }

    /// Serialize to a standalone buffer
    pub fn to_bytes(&self) -> Result<BytesMut, Socks5Error> {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Read `ATYP | ADDR | PORT` from a stream
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, Socks5Error>
    where
        R: AsyncRead + Unpin,
    {
        let addr_type = reader.read_u8().await?;
        Self::read_with_type(reader, addr_type).await
    }

    /// Read `ADDR | PORT` for an already consumed address type byte.
    ///
    /// Every variable-length field is read exactly as declared by its own
    /// length prefix; truncated input surfaces as an IO error.
    pub async fn read_with_type<R>(reader: &mut R, addr_type: u8) -> Result<Self, Socks5Error>
    where
        R: AsyncRead + Unpin,
    {
        match addr_type {
            SOCKS5_ADDR_TYPE_IPV4 => {
                let mut buf = [0u8; 4 + 2];
                reader.read_exact(&mut buf).await?;
                let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
                let port = u16::from_be_bytes([buf[4], buf[5]]);
                Ok(SocksAddr::ipv4(ip, port))
            }

            SOCKS5_ADDR_TYPE_DOMAIN => {
                let domain_len = reader.read_u8().await? as usize;

                // Consume the whole field before validating it
                let mut buf = vec![0u8; domain_len + 2];
                reader.read_exact(&mut buf).await?;
                let port = u16::from_be_bytes([buf[domain_len], buf[domain_len + 1]]);
                buf.truncate(domain_len);

                if buf.is_empty() {
                    return Err(Socks5Error::InvalidDomain(String::new()));
                }

                let domain = String::from_utf8(buf).map_err(|e| {
                    Socks5Error::InvalidDomain(String::from_utf8_lossy(e.as_bytes()).into_owned())
                })?;

                Ok(SocksAddr::Domain(domain, port))
            }

            SOCKS5_ADDR_TYPE_IPV6 => {
                let mut buf = [0u8; 16 + 2];
                reader.read_exact(&mut buf).await?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[..16]);
                let port = u16::from_be_bytes([buf[16], buf[17]]);
                Ok(SocksAddr::ipv6(Ipv6Addr::from(octets), port))
            }

            other => Err(Socks5Error::AddressTypeNotSupported(other)),
        }
    }

    /// Resolve to a concrete socket address.
    ///
    /// IP addresses return immediately. A domain that fails to resolve is an
    /// address error, distinct from a later connect failure.
    pub async fn resolve(&self) -> Result<SocketAddr, Socks5Error> {
        match self {
            SocksAddr::Ip(addr) => Ok(*addr),
            SocksAddr::Domain(domain, port) => {
                let mut addrs = tokio::net::lookup_host((domain.as_str(), *port))
                    .await
                    .map_err(|e| Socks5Error::UnresolvableAddress(format!("{}: {}", self, e)))?;
                addrs
                    .next()
                    .ok_or_else(|| Socks5Error::UnresolvableAddress(self.to_string()))
            }
        }
    }
}

/// Append an IP `ATYP | ADDR | PORT`; cannot fail
pub(crate) fn write_socket_addr(buf: &mut BytesMut, addr: &SocketAddr) {
    match addr {
        SocketAddr::V4(addr) => {
            buf.reserve(1 + 4 + 2);
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
            buf.put_slice(&addr.ip().octets());
            buf.put_u16(addr.port());
        }
        SocketAddr::V6(addr) => {
            buf.reserve(1 + 16 + 2);
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV6);
            buf.put_slice(&addr.ip().octets());
            buf.put_u16(addr.port());
        }
    }
}

impl fmt::Display for SocksAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksAddr::Ip(addr) => write!(f, "{}", addr),
            SocksAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for SocksAddr {
    fn from(addr: SocketAddr) -> Self {
        SocksAddr::Ip(addr)
    }
}
