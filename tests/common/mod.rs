//! Test utilities and mocks for Sockgate
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use sockgate::config::{Config, ForwarderConfig, GatewayConfig, TcpConfig};
use sockgate::server::Server;
use sockgate::{ForwarderHandler, GatewayHandler};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// An address nothing listens on
pub async fn unused_addr() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// Spawn a server that echoes exactly `len` bytes per connection, then closes
pub async fn spawn_echo_server(len: usize) -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; len];
                if stream.read_exact(&mut buf).await.is_ok() {
                    let _ = stream.write_all(&buf).await;
                }
            });
        }
    });
    addr
}

/// A running role plus its shutdown switch
pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown_tx: broadcast::Sender<bool>,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningServer {
    /// Signal shutdown and wait for the listener to stop
    pub async fn stop(self) -> anyhow::Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.handle.await?
    }
}

/// Start a gateway for `config` on an ephemeral port
pub async fn spawn_gateway(config: &GatewayConfig) -> RunningServer {
    let (listener, addr) = create_test_listener().await;
    let handler = GatewayHandler::from_config(config);
    let server = Server::from_listener(listener, Arc::new(handler));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(server.run(shutdown_rx));

    RunningServer {
        addr,
        shutdown_tx,
        handle,
    }
}

/// Start a forwarder for `config` on an ephemeral port, tunnelling to `upstream`
pub async fn spawn_forwarder(config: &ForwarderConfig, upstream: SocketAddr) -> RunningServer {
    let (listener, addr) = create_test_listener().await;
    let handler =
        ForwarderHandler::from_config(config, upstream, Default::default()).unwrap();
    let server = Server::from_listener(listener, Arc::new(handler));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(server.run(shutdown_rx));

    RunningServer {
        addr,
        shutdown_tx,
        handle,
    }
}

/// Test configuration builder
pub struct TestConfigBuilder {
    auth_methods: Vec<u8>,
    users: HashMap<String, String>,
    upstream_addr: String,
    username: String,
    password: String,
    connect_timeout: u64,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            auth_methods: vec![0, 2],
            users: HashMap::from([
                ("Usr1".to_string(), "Pwd1".to_string()),
                ("Usr2".to_string(), "Pwd2".to_string()),
            ]),
            upstream_addr: "127.0.0.1:1080".to_string(),
            username: "Usr1".to_string(),
            password: "Pwd1".to_string(),
            connect_timeout: 120,
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set enabled gateway methods
    pub fn auth_methods(mut self, methods: &[u8]) -> Self {
        self.auth_methods = methods.to_vec();
        self
    }

    /// Set the forwarder's upstream address
    pub fn upstream_addr(mut self, addr: SocketAddr) -> Self {
        self.upstream_addr = addr.to_string();
        self
    }

    /// Set the forwarder's credentials
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Set the forwarder's upstream deadline
    pub fn connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout = secs;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        Config {
            gateway: Some(GatewayConfig {
                listen_addr: "127.0.0.1:0".to_string(),
                auth_methods: self.auth_methods,
                users: self.users,
            }),
            forwarder: Some(ForwarderConfig {
                listen_addr: "127.0.0.1:0".to_string(),
                upstream_addr: self.upstream_addr,
                username: self.username,
                password: self.password,
                connect_timeout: self.connect_timeout,
            }),
            tcp: TcpConfig::default(),
        }
    }
}

/// Connect to `addr` and run a full no-auth or password handshake plus CONNECT
pub async fn connect_through(
    proxy: SocketAddr,
    credentials: Option<(&str, &str)>,
    target: SocketAddr,
) -> (TcpStream, [u8; 4]) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();

    match credentials {
        Some((username, password)) => {
            stream
                .write_all(&socks5_mock::create_auth_request_password())
                .await
                .unwrap();
            let mut reply = [0u8; 2];
            stream.read_exact(&mut reply).await.unwrap();
            assert_eq!(reply, [0x05, 0x02]);

            stream
                .write_all(&socks5_mock::create_credentials(username, password))
                .await
                .unwrap();
            let mut reply = [0u8; 2];
            stream.read_exact(&mut reply).await.unwrap();
            assert_eq!(reply, [0x01, 0x00]);
        }
        None => {
            stream
                .write_all(&socks5_mock::create_auth_request_no_auth())
                .await
                .unwrap();
            let mut reply = [0u8; 2];
            stream.read_exact(&mut reply).await.unwrap();
            assert_eq!(reply, [0x05, 0x00]);
        }
    }

    let ip = match target.ip() {
        std::net::IpAddr::V4(ip) => ip.octets(),
        std::net::IpAddr::V6(_) => panic!("IPv4 target expected"),
    };
    stream
        .write_all(&socks5_mock::create_connect_ipv4(ip, target.port()))
        .await
        .unwrap();

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    if header[1] == 0x00 {
        // Skip BND.ADDR and BND.PORT of an IPv4 reply
        let mut bound = [0u8; 6];
        stream.read_exact(&mut bound).await.unwrap();
    }

    (stream, header)
}

/// Mock SOCKS5 handshake data
pub mod socks5_mock {
    use sockgate::socks::consts::*;

    /// Create a no-auth method selection request
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Create a password auth method selection request
    pub fn create_auth_request_password() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_PASSWORD]
    }

    /// Create a username/password sub-negotiation request
    pub fn create_credentials(username: &str, password: &str) -> Vec<u8> {
        let mut request = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
        request.extend_from_slice(username.as_bytes());
        request.push(password.len() as u8);
        request.extend_from_slice(password.as_bytes());
        request
    }

    /// Create a connect command to IPv4 address
    pub fn create_connect_ipv4(ip: [u8; 4], port: u16) -> Vec<u8> {
        create_command_ipv4(SOCKS5_CMD_TCP_CONNECT, ip, port)
    }

    /// Create an arbitrary command to IPv4 address
    pub fn create_command_ipv4(cmd: u8, ip: [u8; 4], port: u16) -> Vec<u8> {
        let mut request = vec![SOCKS5_VERSION, cmd, SOCKS5_RESERVED, SOCKS5_ADDR_TYPE_IPV4];
        request.extend_from_slice(&ip);
        request.extend_from_slice(&port.to_be_bytes());
        request
    }

    /// Create a connect command to domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut request = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        request.extend_from_slice(domain.as_bytes());
        request.extend_from_slice(&port.to_be_bytes());
        request
    }
}
