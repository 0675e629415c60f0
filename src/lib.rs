//! # Sockgate - SOCKS5 Gateway and Forwarder
//!
//! Sockgate implements a SOCKS5 proxy in two roles that share one protocol
//! engine:
//!
//! - **Gateway**: accepts SOCKS5 clients, verifies username/password
//!   credentials and connects to the requested destination.
//! - **Forwarder**: accepts unauthenticated local SOCKS5 callers and tunnels
//!   them to a remote gateway, authenticating there on their behalf.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockgate::config::load_config;
//! use sockgate::gateway::run_gateway;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("sockgate.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_gateway(&config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Local app -> Forwarder --(Usr/Pwd)--> Gateway -> Destination
//! ```
//!
//! Only the CONNECT command is served. BIND and UDP ASSOCIATE are answered
//! with "command not supported".

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod forwarder;
pub mod gateway;
pub mod helper;
pub mod server;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{ReplyStatus, Socks5Error, SockgateError};
pub use forwarder::{run_forwarder, ForwarderHandler};
pub use gateway::{run_gateway, GatewayHandler};

/// Version of the Sockgate library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
