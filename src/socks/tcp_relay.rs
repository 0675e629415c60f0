//! Bidirectional TCP relay
//!
//! Copies bytes between the client connection and the outbound connection
//! until both directions have finished.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Byte counts of a finished relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied from `a` to `b`
    pub a_to_b: u64,
    /// Bytes copied from `b` to `a`
    pub b_to_a: u64,
}

/// Relay data bidirectionally between two streams
///
/// Both directions run concurrently and the function returns only after
/// both have stopped. EOF on one side is not propagated as a half-close to
/// the other; a direction simply stops once its source is exhausted. Once
/// both are done, both write halves are shut down.
///
/// The first error seen, if any, is returned after both directions finish.
pub async fn relay_tcp<A, B>(a: A, b: B) -> std::io::Result<RelayStats>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let a_to_b = tokio::io::copy(&mut a_read, &mut b_write);
    let b_to_a = tokio::io::copy(&mut b_read, &mut a_write);

    let (a_to_b, b_to_a) = tokio::join!(a_to_b, b_to_a);

    match &a_to_b {
        Ok(bytes) => debug!("A->B finished: {} bytes", bytes),
        Err(e) => debug!("A->B error: {}", e),
    }
    match &b_to_a {
        Ok(bytes) => debug!("B->A finished: {} bytes", bytes),
        Err(e) => debug!("B->A error: {}", e),
    }

    // Peer may already be gone; nothing useful to report here
    let _ = b_write.shutdown().await;
    let _ = a_write.shutdown().await;

    Ok(RelayStats {
        a_to_b: a_to_b?,
        b_to_a: b_to_a?,
    })
}
