//! Forwarding front-end
//!
//! Accepts local SOCKS5 callers without authentication, then tunnels them to
//! the configured upstream gateway, authenticating there on their behalf.
//! The caller's request and payload bytes pass through unparsed.

use crate::config::{Config, ForwarderConfig};
use crate::helper::{close_after_failure, CLOSE_LINGER};
use crate::server::{Server, SessionHandler};
use crate::socks::{negotiate_method, relay_tcp, AuthMethod, UpstreamConnector};
use crate::transport::{resolve_addr, SocketOpts};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Local callers are trusted; only no-auth is offered back to them
const LOCAL_METHODS: &[AuthMethod] = &[AuthMethod::None];

/// Run the forwarder role until shutdown
///
/// The upstream address is resolved once here and reused for every session.
pub async fn run_forwarder(config: &Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let forwarder = config.forwarder()?;
    let listen_addr = resolve_addr(&forwarder.listen_addr).await?;
    let upstream = resolve_addr(&forwarder.upstream_addr).await?;
    let socket_opts = SocketOpts::from_tcp_config(&config.tcp);

    info!(
        "Forwarding to upstream {} ({}) as {}",
        forwarder.upstream_addr, upstream, forwarder.username
    );

    let handler = ForwarderHandler::from_config(forwarder, upstream, socket_opts.clone())?;
    Server::bind(listen_addr, Arc::new(handler))
        .await?
        .with_socket_opts(socket_opts)
        .run(shutdown_rx)
        .await
}

/// Forwarder session handler
#[derive(Debug, Clone)]
pub struct ForwarderHandler {
    connector: UpstreamConnector,
}

impl ForwarderHandler {
    /// Create a handler around an upstream connector
    pub fn new(connector: UpstreamConnector) -> Self {
        ForwarderHandler { connector }
    }

    /// Create a handler from the `[forwarder]` section and a resolved upstream address
    pub fn from_config(
        config: &ForwarderConfig,
        upstream: SocketAddr,
        socket_opts: SocketOpts,
    ) -> Result<Self> {
        let credentials = config
            .credentials()
            .with_context(|| "Invalid forwarder credentials")?;
        let connector = UpstreamConnector::new(upstream, credentials, config.connect_timeout())
            .with_socket_opts(socket_opts);
        Ok(Self::new(connector))
    }

    /// Upstream connector used for every session
    pub fn connector(&self) -> &UpstreamConnector {
        &self.connector
    }
}

#[async_trait::async_trait]
impl SessionHandler for ForwarderHandler {
    fn role(&self) -> &str {
        "forwarder"
    }

    async fn handle_session(&self, stream: TcpStream, _peer: SocketAddr) -> Result<()> {
        serve_forwarder_session(stream, &self.connector).await
    }
}

/// Run one forwarder session on `stream`
///
/// Local negotiation, upstream dial and authentication, then relay. An
/// upstream failure drops the local connection without a SOCKS reply;
/// the caller has not sent its request yet.
pub async fn serve_forwarder_session<S>(mut stream: S, connector: &UpstreamConnector) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let upstream = match establish(&mut stream, connector).await {
        Ok(upstream) => upstream,
        Err(e) => {
            close_after_failure(&mut stream, CLOSE_LINGER).await;
            return Err(e);
        }
    };

    info!("Tunnel to upstream {} established", connector.addr());

    let stats = relay_tcp(stream, upstream)
        .await
        .with_context(|| format!("Relay to upstream {} failed", connector.addr()))?;
    info!(
        "Tunnel to upstream {} closed: {} bytes up, {} bytes down",
        connector.addr(),
        stats.a_to_b,
        stats.b_to_a
    );

    Ok(())
}

/// Local negotiation followed by the upstream dial and handshake
async fn establish<S>(stream: &mut S, connector: &UpstreamConnector) -> Result<TcpStream>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    negotiate_method(stream, LOCAL_METHODS)
        .await
        .with_context(|| "Local SOCKS5 negotiation failed")?;
    debug!("Local caller negotiated, dialing upstream {}", connector.addr());

    connector
        .connect()
        .await
        .with_context(|| format!("Failed to reach upstream gateway {}", connector.addr()))
}
