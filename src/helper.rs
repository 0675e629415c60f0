//! Helper utilities for Sockgate
//!
//! This module provides common utility functions used throughout the application.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Default upstream connect deadline in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 120;

/// Pause before retrying after a transient accept error
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How long a failed session waits for its peer to hang up
pub const CLOSE_LINGER: Duration = Duration::from_secs(5);

/// Whether an `accept()` error leaves the listener usable
///
/// Aborted or reset handshakes, interruptions and descriptor exhaustion are
/// transient; everything else is treated as fatal for the listener.
pub fn is_transient_accept_error(error: &io::Error) -> bool {
    match error.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => true,
        _ => is_descriptor_exhaustion(error),
    }
}

#[cfg(unix)]
fn is_descriptor_exhaustion(error: &io::Error) -> bool {
    matches!(error.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}

#[cfg(not(unix))]
fn is_descriptor_exhaustion(_error: &io::Error) -> bool {
    false
}

/// Consume all data from `reader` and throw it away until EOF
pub async fn ignore_until_end<R>(reader: &mut R) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; 2048];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        total += n as u64;
    }

    Ok(total)
}

/// Orderly close for a session that failed before relaying
///
/// Shuts down our write half so the peer reads any reply followed by EOF,
/// then discards input until the peer hangs up or `linger` elapses.
/// Dropping a socket with unread input resets it, and the reset can
/// overtake a reply still in flight.
pub async fn close_after_failure<S>(stream: &mut S, linger: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown after failure: {}", e);
        return;
    }

    match tokio::time::timeout(linger, ignore_until_end(stream)).await {
        Ok(Ok(n)) if n > 0 => debug!("Discarded {} trailing bytes", n),
        Ok(Ok(_)) => {}
        Ok(Err(e)) => debug!("Drain after failure: {}", e),
        Err(_) => debug!("Peer did not close within {:?}", linger),
    }
}

/// Raise the open file descriptor limit
///
/// Sets both the soft and hard `RLIMIT_NOFILE` to `nofile`.
#[cfg(unix)]
pub fn set_nofile(nofile: u64) -> io::Result<()> {
    let lim = libc::rlimit {
        rlim_cur: nofile as libc::rlim_t,
        rlim_max: nofile as libc::rlim_t,
    };

    // SAFETY: `lim` is a fully initialised rlimit that outlives the call
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &lim as *const _) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Raise the open file descriptor limit (unsupported on this platform)
#[cfg(not(unix))]
pub fn set_nofile(_nofile: u64) -> io::Result<()> {
    Ok(())
}
