//! Listener loop shared by both roles
//!
//! A [`Server`] owns a bound listener and a [`SessionHandler`]. Each accepted
//! connection is served on its own task; a failing session is logged and
//! never affects the listener or other sessions.

use crate::helper::{is_transient_accept_error, ACCEPT_RETRY_DELAY};
use crate::transport::SocketOpts;
use anyhow::{Context, Result};
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn, Instrument};

/// Trait implemented by each proxy role.
///
/// # Example
///
/// ```rust,ignore
/// use sockgate::server::SessionHandler;
///
/// #[derive(Debug)]
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl SessionHandler for Echo {
///     fn role(&self) -> &str { "echo" }
///
///     async fn handle_session(
///         &self,
///         mut stream: tokio::net::TcpStream,
///         _peer: std::net::SocketAddr,
///     ) -> anyhow::Result<()> {
///         let (mut r, mut w) = stream.split();
///         tokio::io::copy(&mut r, &mut w).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait SessionHandler: Send + Sync + Debug {
    /// Short name of the role, used in logs (e.g., "gateway", "forwarder")
    fn role(&self) -> &str;

    /// Serve one accepted connection until both legs are closed.
    async fn handle_session(&self, stream: TcpStream, peer: SocketAddr) -> Result<()>;

    /// Validate the handler's configuration.
    ///
    /// Called once before the listener starts. Default implementation always succeeds.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Bound listener plus the role serving it
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    handler: Arc<dyn SessionHandler>,
    socket_opts: SocketOpts,
}

impl Server {
    /// Bind `addr` for `handler`
    ///
    /// Failing to bind is the only fatal error of a role.
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn SessionHandler>) -> Result<Self> {
        handler.validate()?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {} listener on {}", handler.role(), addr))?;

        Ok(Self::from_listener(listener, handler))
    }

    /// Wrap an already bound listener
    pub fn from_listener(listener: TcpListener, handler: Arc<dyn SessionHandler>) -> Self {
        Server {
            listener,
            handler,
            socket_opts: SocketOpts::default(),
        }
    }

    /// Set socket options applied to accepted streams
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .with_context(|| "Failed to read listener address")
    }

    /// Accept connections until shutdown
    ///
    /// Transient accept errors are retried after a short pause. Any other
    /// accept error ends the loop and is returned. In-flight sessions keep
    /// running after shutdown.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        let role = self.handler.role().to_string();
        info!("{} listening on {}", role, self.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_session(stream, peer),
                        Err(e) if is_transient_accept_error(&e) => {
                            warn!("Transient accept error on {} listener: {}", role, e);
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        }
                        Err(e) => {
                            error!("{} listener failed: {}", role, e);
                            return Err(e).with_context(|| format!("{} accept failed", role));
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping {} listener", role);
                    break;
                }
            }
        }

        info!("{} stopped", role);
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        debug!("Accepted connection from {}", peer);

        if let Err(e) = self.socket_opts.apply(&stream) {
            debug!("Failed to apply socket options for {}: {}", peer, e);
        }

        let handler = self.handler.clone();
        let span = tracing::info_span!("session", role = handler.role(), %peer);

        tokio::spawn(
            async move {
                if let Err(e) = handler.handle_session(stream, peer).await {
                    warn!("Session ended with error: {:#}", e);
                } else {
                    debug!("Session closed");
                }
            }
            .instrument(span),
        );
    }
}
