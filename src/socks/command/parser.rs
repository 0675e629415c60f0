//! SOCKS5 request parser
//!
//! Parses the request that follows a successful negotiation.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::{SocksAddr, SocksCommand};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Parse a SOCKS5 CONNECT request from the stream
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Only CONNECT is served. BIND, UDP ASSOCIATE and unknown commands fail
/// with [`Socks5Error::CommandNotSupported`]; a non-zero RSV fails with
/// [`Socks5Error::InvalidReserved`]. The destination is read off the stream
/// before either check, so a rejected request leaves nothing unread behind
/// the reply.
pub async fn parse_request<S>(stream: &mut S) -> Result<SocksAddr, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    // Read: VER CMD RSV ATYP
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;

    let [version, cmd_byte, reserved, addr_type] = header;

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version));
    }

    // An unknown ATYP has no known length; report it after the command check
    let target = match SocksAddr::read_with_type(stream, addr_type).await {
        Ok(target) => Some(target),
        Err(Socks5Error::AddressTypeNotSupported(_)) => None,
        Err(e) => return Err(e),
    };

    match SocksCommand::from_byte(cmd_byte) {
        Some(SocksCommand::Connect) => {}
        Some(other) => {
            tracing::debug!("Rejecting {} request", other);
            return Err(Socks5Error::CommandNotSupported(cmd_byte));
        }
        None => return Err(Socks5Error::CommandNotSupported(cmd_byte)),
    }

    if reserved != SOCKS5_RESERVED {
        return Err(Socks5Error::InvalidReserved(reserved));
    }

    let target = target.ok_or(Socks5Error::AddressTypeNotSupported(addr_type))?;

    tracing::debug!("Parsed SOCKS5 CONNECT to {}", target);

    Ok(target)
}
