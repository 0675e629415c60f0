//! Address resolution for configured endpoints
//!
//! Listen and upstream addresses may be given as `host:port`; they are
//! resolved once, up front, and the first result is used from then on.

use anyhow::{Context, Result};
use std::net::SocketAddr;

/// Resolve a `host:port` string to a single socket address
///
/// Literal socket addresses are returned without a lookup.
pub async fn resolve_addr(addr: &str) -> Result<SocketAddr> {
    if let Ok(parsed) = addr.parse::<SocketAddr>() {
        return Ok(parsed);
    }

    tokio::net::lookup_host(addr)
        .await
        .with_context(|| format!("Failed to resolve address: {}", addr))?
        .next()
        .with_context(|| format!("No addresses found for: {}", addr))
}
