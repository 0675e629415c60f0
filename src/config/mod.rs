//! Configuration module for Sockgate
//!
//! This module provides configuration types and parsing for both roles.

mod forwarder;
mod gateway;
mod transport;

pub use forwarder::ForwarderConfig;
pub use gateway::GatewayConfig;
pub use transport::TcpConfig;

use crate::error::SockgateError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
///
/// Both role sections are optional; the role selected at startup must have
/// its section present.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Authenticating gateway
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,

    /// Forwarding front-end
    #[serde(default)]
    pub forwarder: Option<ForwarderConfig>,

    /// Socket options for accepted and dialed streams
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Config {
    /// Gateway section, validated
    pub fn gateway(&self) -> Result<&GatewayConfig> {
        let gateway = self
            .gateway
            .as_ref()
            .context("Missing [gateway] section in configuration")?;
        gateway.validate().map_err(SockgateError::Config)?;
        self.tcp.validate().map_err(SockgateError::Config)?;
        Ok(gateway)
    }

    /// Forwarder section, validated
    pub fn forwarder(&self) -> Result<&ForwarderConfig> {
        let forwarder = self
            .forwarder
            .as_ref()
            .context("Missing [forwarder] section in configuration")?;
        forwarder.validate().map_err(SockgateError::Config)?;
        self.tcp.validate().map_err(SockgateError::Config)?;
        Ok(forwarder)
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}
