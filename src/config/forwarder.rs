//! Forwarder role configuration
//!
//! The local front-end: where it listens, which gateway it tunnels to and
//! the credential pair it presents there.

use crate::error::Socks5Error;
use crate::helper::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::socks::Credentials;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Forwarder configuration
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// Local listen address (e.g., "127.0.0.1:1081")
    pub listen_addr: String,

    /// Upstream gateway address (e.g., "gateway.example.com:1080")
    pub upstream_addr: String,

    /// Username presented to the upstream gateway
    pub username: String,

    /// Password presented to the upstream gateway
    pub password: String,

    /// Deadline in seconds for dialing and authenticating upstream
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl std::fmt::Debug for ForwarderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwarderConfig")
            .field("listen_addr", &self.listen_addr)
            .field("upstream_addr", &self.upstream_addr)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ForwarderConfig {
    /// Credential pair in wire form
    pub fn credentials(&self) -> Result<Credentials, Socks5Error> {
        Credentials::new(self.username.as_bytes(), self.password.as_bytes())
    }

    /// Upstream deadline as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.upstream_addr.is_empty() {
            return Err("forwarder.upstream_addr must be set".to_string());
        }
        if self.connect_timeout == 0 {
            return Err("forwarder.connect_timeout must be greater than zero".to_string());
        }
        self.credentials()
            .map_err(|e| format!("forwarder credentials: {}", e))?;
        Ok(())
    }
}
