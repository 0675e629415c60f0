//! Gateway role configuration
//!
//! The authenticating gateway: where it listens, which negotiation methods
//! it accepts and the username/password table it checks against.

use crate::socks::consts::{MAX_CREDENTIAL_LEN, SOCKS5_AUTH_METHOD_NONE, SOCKS5_AUTH_METHOD_PASSWORD};
use crate::socks::AuthMethod;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_auth_methods() -> Vec<u8> {
    vec![SOCKS5_AUTH_METHOD_NONE, SOCKS5_AUTH_METHOD_PASSWORD]
}

/// Gateway configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Listen address (e.g., "127.0.0.1:1080")
    pub listen_addr: String,

    /// Enabled method bytes, from {0, 2}
    #[serde(default = "default_auth_methods")]
    pub auth_methods: Vec<u8>,

    /// Username to password table
    #[serde(default)]
    pub users: HashMap<String, String>,
}

impl GatewayConfig {
    /// Enabled methods as typed values; unknown bytes are skipped
    pub fn enabled_methods(&self) -> Vec<AuthMethod> {
        let mut methods = Vec::with_capacity(self.auth_methods.len());
        for method in self.auth_methods.iter().filter_map(|b| AuthMethod::from_byte(*b)) {
            if !methods.contains(&method) {
                methods.push(method);
            }
        }
        methods
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_methods.is_empty() {
            return Err("gateway.auth_methods must not be empty".to_string());
        }

        if let Some(bad) = self
            .auth_methods
            .iter()
            .find(|b| AuthMethod::from_byte(**b).is_none())
        {
            return Err(format!(
                "gateway.auth_methods contains unsupported method {:#04x}",
                bad
            ));
        }

        if self.enabled_methods().contains(&AuthMethod::Password) && self.users.is_empty() {
            return Err(
                "Username/password authentication enabled but gateway.users is empty".to_string(),
            );
        }

        for (username, password) in &self.users {
            if username.is_empty() || username.len() > MAX_CREDENTIAL_LEN {
                return Err(format!(
                    "gateway.users: username must be 1-{} bytes",
                    MAX_CREDENTIAL_LEN
                ));
            }
            if password.is_empty() || password.len() > MAX_CREDENTIAL_LEN {
                return Err(format!(
                    "gateway.users: password for '{}' must be 1-{} bytes",
                    username, MAX_CREDENTIAL_LEN
                ));
            }
        }

        Ok(())
    }
}
