//! Authenticating gateway
//!
//! Accepts SOCKS5 clients, verifies their credentials, parses the CONNECT
//! request and relays traffic to the destination it names.

use crate::config::{Config, GatewayConfig};
use crate::error::Socks5Error;
use crate::helper::{close_after_failure, CLOSE_LINGER};
use crate::server::{Server, SessionHandler};
use crate::socks::{
    authenticate, connect_direct, parse_request, relay_tcp, send_failure, send_success, AuthMethod,
    CredentialStore, SocksAddr, UserTable,
};
use crate::transport::{resolve_addr, SocketOpts};
use anyhow::{Context, Result};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Run the gateway role until shutdown
pub async fn run_gateway(config: &Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let gateway = config.gateway()?;
    let listen_addr = resolve_addr(&gateway.listen_addr).await?;
    let socket_opts = SocketOpts::from_tcp_config(&config.tcp);

    info!(
        "Gateway methods: {:?}, {} user(s) configured",
        gateway.enabled_methods(),
        gateway.users.len()
    );

    let handler = GatewayHandler::from_config(gateway).with_socket_opts(socket_opts.clone());
    Server::bind(listen_addr, Arc::new(handler))
        .await?
        .with_socket_opts(socket_opts)
        .run(shutdown_rx)
        .await
}

/// Gateway session handler
#[derive(Clone)]
pub struct GatewayHandler {
    methods: Vec<AuthMethod>,
    store: Arc<dyn CredentialStore>,
    socket_opts: SocketOpts,
}

impl fmt::Debug for GatewayHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayHandler")
            .field("methods", &self.methods)
            .field("socket_opts", &self.socket_opts)
            .finish_non_exhaustive()
    }
}

impl GatewayHandler {
    /// Create a handler from enabled methods and a credential store
    pub fn new(methods: Vec<AuthMethod>, store: Arc<dyn CredentialStore>) -> Self {
        GatewayHandler {
            methods,
            store,
            socket_opts: SocketOpts::default(),
        }
    }

    /// Create a handler from the `[gateway]` section
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.enabled_methods(),
            Arc::new(UserTable::from(&config.users)),
        )
    }

    /// Set socket options applied to outbound streams
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Enabled negotiation methods
    pub fn methods(&self) -> &[AuthMethod] {
        &self.methods
    }
}

#[async_trait::async_trait]
impl SessionHandler for GatewayHandler {
    fn role(&self) -> &str {
        "gateway"
    }

    async fn handle_session(&self, stream: TcpStream, _peer: SocketAddr) -> Result<()> {
        serve_gateway_session(stream, &self.methods, self.store.as_ref(), &self.socket_opts).await
    }

    fn validate(&self) -> Result<()> {
        if self.methods.is_empty() {
            anyhow::bail!("gateway has no enabled authentication methods");
        }
        Ok(())
    }
}

/// Run one gateway session on `stream`
///
/// Negotiation, authentication, request, connect, reply, relay. A request
/// or connect failure is answered with its reply status; any failure before
/// the relay ends with an orderly close.
pub async fn serve_gateway_session<S>(
    mut stream: S,
    methods: &[AuthMethod],
    store: &dyn CredentialStore,
    socket_opts: &SocketOpts,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (outbound, target) = match establish(&mut stream, methods, store, socket_opts).await {
        Ok(established) => established,
        Err(e) => {
            close_after_failure(&mut stream, CLOSE_LINGER).await;
            return Err(e);
        }
    };

    info!("SOCKS5 tunnel established to {}", target);

    let stats = relay_tcp(stream, outbound)
        .await
        .with_context(|| format!("Relay to {} failed", target))?;
    info!(
        "Tunnel to {} closed: {} bytes up, {} bytes down",
        target, stats.a_to_b, stats.b_to_a
    );

    Ok(())
}

/// Everything up to and including the success reply
async fn establish<S>(
    stream: &mut S,
    methods: &[AuthMethod],
    store: &dyn CredentialStore,
    socket_opts: &SocketOpts,
) -> Result<(TcpStream, SocksAddr)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let method = authenticate(stream, methods, store)
        .await
        .with_context(|| "SOCKS5 authentication failed")?;
    debug!("Client authenticated with {:?}", method);

    let target = match parse_request(stream).await {
        Ok(target) => target,
        Err(e) => return Err(reply_error(stream, e).await).context("Invalid SOCKS5 request"),
    };

    let outbound = match connect_direct(&target).await {
        Ok(outbound) => outbound,
        Err(e) => {
            return Err(reply_error(stream, e).await)
                .with_context(|| format!("Failed to connect to {}", target))
        }
    };

    if let Err(e) = socket_opts.apply(&outbound) {
        debug!("Failed to apply socket options to {}: {}", target, e);
    }

    let bind_addr = outbound
        .local_addr()
        .with_context(|| "Failed to read outbound local address")?;
    send_success(stream, bind_addr)
        .await
        .with_context(|| "Failed to send SOCKS5 reply")?;

    Ok((outbound, target))
}

/// Send the reply owed for `error`, if any, and hand the error back
async fn reply_error<S>(stream: &mut S, error: Socks5Error) -> Socks5Error
where
    S: AsyncWrite + Unpin,
{
    if let Some(status) = error.reply_status() {
        if let Err(e) = send_failure(stream, status).await {
            warn!("Failed to send failure reply {:?}: {}", status, e);
        }
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const BOTH: &[AuthMethod] = &[AuthMethod::None, AuthMethod::Password];

    fn table() -> UserTable {
        UserTable::from_pairs([("Usr1", "Pwd1"), ("Usr2", "Pwd2")])
    }

    fn spawn_session(
        methods: &'static [AuthMethod],
    ) -> (tokio::io::DuplexStream, tokio::task::JoinHandle<Result<()>>) {
        let (client, server) = duplex(4096);
        let handle = tokio::spawn(async move {
            let store = table();
            serve_gateway_session(server, methods, &store, &SocketOpts::nodelay_only()).await
        });
        (client, handle)
    }

    #[test]
    fn test_from_config() {
        let config = GatewayConfig {
            listen_addr: "127.0.0.1:1080".to_string(),
            auth_methods: vec![2],
            users: HashMap::from([("Usr1".to_string(), "Pwd1".to_string())]),
        };
        let handler = GatewayHandler::from_config(&config);
        assert_eq!(handler.methods(), &[AuthMethod::Password]);
        assert!(handler.validate().is_ok());
        assert_eq!(handler.role(), "gateway");
        assert!(format!("{:?}", handler).contains("GatewayHandler"));
    }

    #[test]
    fn test_validate_requires_methods() {
        let handler = GatewayHandler::new(vec![], Arc::new(UserTable::new()));
        assert!(handler.validate().is_err());
    }

    #[tokio::test]
    async fn test_wrong_password_closes_without_request_phase() {
        let (mut client, handle) = spawn_session(BOTH);

        client.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x02]);

        client.write_all(b"\x01\x04Usr1\x05Wrong").await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x01, 0x01]);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        drop(client);
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_bind_command_rejected() {
        let (mut client, handle) = spawn_session(&[AuthMethod::None]);

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);

        client
            .write_all(&[0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1, 0, 80])
            .await
            .unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, vec![0x05, 0x07, 0x00]);

        drop(client);
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_bad_version_closes_in_order() {
        let (mut client, handle) = spawn_session(BOTH);

        // Version 4 greeting; the trailing method byte is never parsed
        client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut rest))
            .await
            .expect("session was not closed")
            .unwrap();
        assert!(rest.is_empty());

        drop(client);
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("session did not finish")
            .unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_address_type_rejected() {
        let (mut client, handle) = spawn_session(&[AuthMethod::None]);

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();

        client
            .write_all(&[0x05, 0x01, 0x00, 0x02, 127, 0, 0, 1, 0, 80])
            .await
            .unwrap();
        let mut reply = [0u8; 3];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x08, 0x00]);

        drop(client);
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_connect_and_relay() {
        let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target_addr = target.local_addr().unwrap();
        // Echoes one message, then closes its side
        let echo = tokio::spawn(async move {
            let (mut stream, _) = target.accept().await.unwrap();
            let mut buf = [0u8; 19];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let (mut client, handle) = spawn_session(BOTH);

        client.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x02]);

        client.write_all(b"\x01\x04Usr2\x04Pwd2").await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x01, 0x00]);

        let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
        request.extend_from_slice(&target_addr.port().to_be_bytes());
        client.write_all(&request).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);
        assert_eq!(&reply[4..8], &[127, 0, 0, 1]);

        client.write_all(b"through the gateway").await.unwrap();
        let mut buf = [0u8; 19];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"through the gateway");

        drop(client);
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("session did not finish")
            .unwrap();
        assert!(result.is_ok());
        echo.await.unwrap();
    }
}
