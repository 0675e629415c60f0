//! SOCKS5 reply builder
//!
//! Constructs SOCKS5 reply messages.

use crate::error::{ReplyStatus, Socks5Error};
use crate::socks::consts::*;
use crate::socks::types::write_socket_addr;
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Build a SOCKS5 reply
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// `ATYP` and the bound address are present only when `bind_addr` is given,
/// i.e. when an outbound connection exists.
pub fn encode_reply(status: ReplyStatus, bind_addr: Option<SocketAddr>) -> BytesMut {
    let mut reply = BytesMut::with_capacity(3 + 1 + 16 + 2);
    reply.put_u8(SOCKS5_VERSION);
    reply.put_u8(status.into());
    reply.put_u8(SOCKS5_RESERVED);

    if let Some(addr) = bind_addr {
        write_socket_addr(&mut reply, &addr);
    }

    reply
}

/// Write a reply and flush it
pub async fn write_reply<S>(
    stream: &mut S,
    status: ReplyStatus,
    bind_addr: Option<SocketAddr>,
) -> Result<(), Socks5Error>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&encode_reply(status, bind_addr)).await?;
    stream.flush().await?;
    Ok(())
}

/// Send a success reply carrying the outbound connection's local address
pub async fn send_success<S>(stream: &mut S, bind_addr: SocketAddr) -> Result<(), Socks5Error>
where
    S: AsyncWrite + Unpin,
{
    write_reply(stream, ReplyStatus::Succeeded, Some(bind_addr)).await
}

/// Send a failure reply; no outbound connection exists, so only the header goes out
pub async fn send_failure<S>(stream: &mut S, status: ReplyStatus) -> Result<(), Socks5Error>
where
    S: AsyncWrite + Unpin,
{
    write_reply(stream, status, None).await
}
