//! Outbound connection acquisition
//!
//! The gateway dials destinations directly. The forwarder dials its fixed
//! upstream gateway and runs the client side of negotiation and
//! username/password authentication there before handing the stream over.

use super::auth::{request_method, submit_credentials, AuthMethod, Credentials};
use super::types::SocksAddr;
use crate::error::Socks5Error;
use crate::transport::SocketOpts;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Map a dial failure onto the error kind owed to the client
pub fn classify_connect_error(error: io::Error) -> Socks5Error {
    #[cfg(unix)]
    if let Some(code) = error.raw_os_error() {
        match code {
            libc::ENETUNREACH | libc::ENETDOWN => return Socks5Error::NetworkUnreachable,
            libc::EHOSTUNREACH | libc::EHOSTDOWN => return Socks5Error::HostUnreachable,
            libc::ECONNREFUSED => return Socks5Error::ConnectionRefused,
            libc::EAFNOSUPPORT => return Socks5Error::AddressUnavailable(error.to_string()),
            _ => {}
        }
    }

    match error.kind() {
        io::ErrorKind::ConnectionRefused => Socks5Error::ConnectionRefused,
        io::ErrorKind::NetworkUnreachable => Socks5Error::NetworkUnreachable,
        io::ErrorKind::HostUnreachable | io::ErrorKind::TimedOut => Socks5Error::HostUnreachable,
        io::ErrorKind::AddrNotAvailable => Socks5Error::AddressUnavailable(error.to_string()),
        _ => Socks5Error::GeneralFailure(error.to_string()),
    }
}

/// Resolve `target` and dial it
///
/// Resolution failures surface as [`Socks5Error::UnresolvableAddress`];
/// dial failures are classified by [`classify_connect_error`].
pub async fn connect_direct(target: &SocksAddr) -> Result<TcpStream, Socks5Error> {
    let socket_addr = target.resolve().await?;

    debug!("Connecting to target: {} ({})", target, socket_addr);

    TcpStream::connect(socket_addr).await.map_err(|e| {
        warn!("Failed to connect to {}: {}", socket_addr, e);
        classify_connect_error(e)
    })
}

/// Dials the upstream gateway and authenticates as its client
#[derive(Debug, Clone)]
pub struct UpstreamConnector {
    addr: SocketAddr,
    credentials: Credentials,
    timeout: Duration,
    socket_opts: SocketOpts,
}

impl UpstreamConnector {
    /// Create a connector for a resolved upstream address
    pub fn new(addr: SocketAddr, credentials: Credentials, timeout: Duration) -> Self {
        UpstreamConnector {
            addr,
            credentials,
            timeout,
            socket_opts: SocketOpts::default(),
        }
    }

    /// Set socket options applied to the upstream stream
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Upstream gateway address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Dial, negotiate username/password and authenticate
    ///
    /// The deadline covers the whole sequence; the returned stream is ready
    /// to carry the caller's request bytes.
    pub async fn connect(&self) -> Result<TcpStream, Socks5Error> {
        match tokio::time::timeout(self.timeout, self.handshake()).await {
            Ok(result) => result,
            Err(_) => Err(Socks5Error::Timeout(self.timeout.as_secs())),
        }
    }

    async fn handshake(&self) -> Result<TcpStream, Socks5Error> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(classify_connect_error)?;

        if let Err(e) = self.socket_opts.apply(&stream) {
            debug!("Failed to apply socket options to upstream: {}", e);
        }

        request_method(&mut stream, AuthMethod::Password).await?;
        submit_credentials(&mut stream, &self.credentials).await?;

        debug!("Authenticated to upstream {}", self.addr);

        Ok(stream)
    }
}
